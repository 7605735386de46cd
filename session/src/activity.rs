//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Lock-free activity tracking for a single session

use crate::{ActivitySnapshot, IdleStatus};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Activity timestamps and counters for one session
///
/// Timestamps are stored as nanoseconds since `created_at` so they fit in an
/// atomic. Only the processor that owns the session writes here; any thread
/// may read.
#[derive(Debug)]
pub struct ActivityTracker {
    created_at: Instant,

    last_read_ns: AtomicU64,
    last_write_ns: AtomicU64,
    last_idle_ns: [AtomicU64; 3],
    idle_count: [AtomicU64; 3],

    read_bytes: AtomicU64,
    written_bytes: AtomicU64,
    read_messages: AtomicU64,
    written_messages: AtomicU64,
}

impl ActivityTracker {
    /// Create a tracker whose baseline is `created_at`
    pub fn new(created_at: Instant) -> Self {
        Self {
            created_at,
            last_read_ns: AtomicU64::new(0),
            last_write_ns: AtomicU64::new(0),
            last_idle_ns: [AtomicU64::new(0), AtomicU64::new(0), AtomicU64::new(0)],
            idle_count: [AtomicU64::new(0), AtomicU64::new(0), AtomicU64::new(0)],
            read_bytes: AtomicU64::new(0),
            written_bytes: AtomicU64::new(0),
            read_messages: AtomicU64::new(0),
            written_messages: AtomicU64::new(0),
        }
    }

    fn offset(&self, at: Instant) -> u64 {
        u64::try_from(at.saturating_duration_since(self.created_at).as_nanos()).unwrap_or(u64::MAX)
    }

    fn instant(&self, offset_ns: u64) -> Instant {
        self.created_at + Duration::from_nanos(offset_ns)
    }

    /// When the session was created
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Record a read of `bytes` at `now`
    ///
    /// Empty reads are not activity and are ignored.
    pub fn record_read(&self, now: Instant, bytes: usize) {
        if bytes == 0 {
            return;
        }
        self.last_read_ns.store(self.offset(now), Ordering::Release);
        self.read_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
        self.read_messages.fetch_add(1, Ordering::Relaxed);
        self.idle_count[IdleStatus::ReaderIdle.index()].store(0, Ordering::Relaxed);
        self.idle_count[IdleStatus::BothIdle.index()].store(0, Ordering::Relaxed);
    }

    /// Record a write of `bytes` at `now`
    ///
    /// Empty writes are not activity and are ignored.
    pub fn record_write(&self, now: Instant, bytes: usize) {
        if bytes == 0 {
            return;
        }
        self.last_write_ns.store(self.offset(now), Ordering::Release);
        self.written_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
        self.written_messages.fetch_add(1, Ordering::Relaxed);
        self.idle_count[IdleStatus::WriterIdle.index()].store(0, Ordering::Relaxed);
        self.idle_count[IdleStatus::BothIdle.index()].store(0, Ordering::Relaxed);
    }

    /// Record that `status` fired at `now`
    pub fn record_idle(&self, status: IdleStatus, now: Instant) {
        self.last_idle_ns[status.index()].store(self.offset(now), Ordering::Release);
        self.idle_count[status.index()].fetch_add(1, Ordering::Relaxed);
    }

    /// Last read, or creation if nothing was read yet
    pub fn last_read(&self) -> Instant {
        self.instant(self.last_read_ns.load(Ordering::Acquire))
    }

    /// Last write, or creation if nothing was written yet
    pub fn last_write(&self) -> Instant {
        self.instant(self.last_write_ns.load(Ordering::Acquire))
    }

    /// Most recent read or write
    pub fn last_io(&self) -> Instant {
        self.last_read().max(self.last_write())
    }

    /// Last time `status` fired, or creation if it never has
    pub fn last_idle(&self, status: IdleStatus) -> Instant {
        self.instant(self.last_idle_ns[status.index()].load(Ordering::Acquire))
    }

    /// Consecutive notifications of `status` since the relevant activity
    pub fn idle_count(&self, status: IdleStatus) -> u64 {
        self.idle_count[status.index()].load(Ordering::Relaxed)
    }

    /// Total bytes read
    pub fn read_bytes(&self) -> u64 {
        self.read_bytes.load(Ordering::Relaxed)
    }

    /// Total bytes written
    pub fn written_bytes(&self) -> u64 {
        self.written_bytes.load(Ordering::Relaxed)
    }

    /// Total non-empty reads
    pub fn read_messages(&self) -> u64 {
        self.read_messages.load(Ordering::Relaxed)
    }

    /// Total non-empty writes
    pub fn written_messages(&self) -> u64 {
        self.written_messages.load(Ordering::Relaxed)
    }

    /// Copy the timestamps for idle evaluation
    pub fn snapshot(&self) -> ActivitySnapshot {
        ActivitySnapshot {
            created_at: self.created_at,
            last_read: self.last_read(),
            last_write: self.last_write(),
            last_idle: IdleStatus::ALL.map(|s| self.last_idle(s)),
        }
    }
}
