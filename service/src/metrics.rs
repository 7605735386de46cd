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

//! Lock-free metrics for an acceptor and its processors
//!
//! Every update is also forwarded to the `metrics` facade under the
//! `sessionix.*` namespace, so an installed recorder sees the same numbers.

use metrics::{counter, gauge};
use sessionix_session::IdleStatus;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Lock-free service metrics
///
/// All metrics are stored as atomics and can be accessed concurrently
/// without locks. Use the `snapshot()` method to get a view of all metrics
/// at a point in time.
#[derive(Debug)]
pub struct ServiceMetrics {
    // Session counts
    total_sessions: AtomicU64,
    active_sessions: AtomicU64,
    rejected_sessions: AtomicU64,

    // Throughput
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
    messages_read: AtomicU64,
    messages_written: AtomicU64,

    // Idle notifications, indexed by IdleStatus::index
    idle_events: [AtomicU64; 3],

    // Errors
    io_errors: AtomicU64,
    handler_errors: AtomicU64,

    // Timing (stored as nanoseconds)
    total_session_duration_ns: AtomicU64,

    started_at: Instant,
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceMetrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        Self {
            total_sessions: AtomicU64::new(0),
            active_sessions: AtomicU64::new(0),
            rejected_sessions: AtomicU64::new(0),
            bytes_read: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            messages_read: AtomicU64::new(0),
            messages_written: AtomicU64::new(0),
            idle_events: [AtomicU64::new(0), AtomicU64::new(0), AtomicU64::new(0)],
            io_errors: AtomicU64::new(0),
            handler_errors: AtomicU64::new(0),
            total_session_duration_ns: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    // Session tracking

    /// Record a new session being opened
    pub fn session_opened(&self) {
        self.total_sessions.fetch_add(1, Ordering::Relaxed);
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
        counter!("sessionix.sessions.total").increment(1);
        gauge!("sessionix.sessions.active").increment(1.0);
    }

    /// Record a session being closed after `duration`
    pub fn session_closed(&self, duration: Duration) {
        self.active_sessions.fetch_sub(1, Ordering::Relaxed);
        self.total_session_duration_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
        gauge!("sessionix.sessions.active").decrement(1.0);
    }

    /// Record a session refused because of the session limit
    pub fn session_rejected(&self) {
        self.rejected_sessions.fetch_add(1, Ordering::Relaxed);
        counter!("sessionix.sessions.rejected").increment(1);
    }

    /// Get the current number of active sessions
    pub fn active_sessions(&self) -> u64 {
        self.active_sessions.load(Ordering::Relaxed)
    }

    /// Get the total number of sessions since start
    pub fn total_sessions(&self) -> u64 {
        self.total_sessions.load(Ordering::Relaxed)
    }

    // Throughput tracking

    /// Record a read of `count` bytes
    pub fn bytes_read(&self, count: u64) {
        self.bytes_read.fetch_add(count, Ordering::Relaxed);
        self.messages_read.fetch_add(1, Ordering::Relaxed);
        counter!("sessionix.bytes.read").increment(count);
    }

    /// Record a write of `count` bytes
    pub fn bytes_written(&self, count: u64) {
        self.bytes_written.fetch_add(count, Ordering::Relaxed);
        self.messages_written.fetch_add(1, Ordering::Relaxed);
        counter!("sessionix.bytes.written").increment(count);
    }

    // Idle tracking

    /// Record an idle notification
    pub fn idle_event(&self, status: IdleStatus) {
        self.idle_events[status.index()].fetch_add(1, Ordering::Relaxed);
        counter!("sessionix.idle.events", "status" => status.to_string()).increment(1);
    }

    /// Get the number of idle notifications of `status`
    pub fn idle_events(&self, status: IdleStatus) -> u64 {
        self.idle_events[status.index()].load(Ordering::Relaxed)
    }

    // Error tracking

    /// Record a transport failure
    pub fn io_error(&self) {
        self.io_errors.fetch_add(1, Ordering::Relaxed);
        counter!("sessionix.errors.io").increment(1);
    }

    /// Record a handler failure
    pub fn handler_error(&self) {
        self.handler_errors.fetch_add(1, Ordering::Relaxed);
        counter!("sessionix.errors.handler").increment(1);
    }

    // Snapshot

    /// Get a snapshot of all metrics
    ///
    /// Individual counters are loaded independently and may be slightly out of
    /// step with each other under concurrent updates.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_sessions: self.total_sessions.load(Ordering::Relaxed),
            active_sessions: self.active_sessions.load(Ordering::Relaxed),
            rejected_sessions: self.rejected_sessions.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            messages_read: self.messages_read.load(Ordering::Relaxed),
            messages_written: self.messages_written.load(Ordering::Relaxed),
            reader_idle_events: self.idle_events(IdleStatus::ReaderIdle),
            writer_idle_events: self.idle_events(IdleStatus::WriterIdle),
            both_idle_events: self.idle_events(IdleStatus::BothIdle),
            io_errors: self.io_errors.load(Ordering::Relaxed),
            handler_errors: self.handler_errors.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
            avg_session_duration: self.average_session_duration(),
        }
    }

    fn average_session_duration(&self) -> Duration {
        let total = self.total_sessions.load(Ordering::Relaxed);
        let closed = total.saturating_sub(self.active_sessions.load(Ordering::Relaxed));
        if closed == 0 {
            return Duration::ZERO;
        }
        let total_ns = self.total_session_duration_ns.load(Ordering::Relaxed);
        Duration::from_nanos(total_ns / closed)
    }
}

/// A snapshot of service metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    /// Total sessions since start
    pub total_sessions: u64,
    /// Current active sessions
    pub active_sessions: u64,
    /// Sessions refused by the session limit
    pub rejected_sessions: u64,
    /// Total bytes read
    pub bytes_read: u64,
    /// Total bytes written
    pub bytes_written: u64,
    /// Total non-empty reads
    pub messages_read: u64,
    /// Total non-empty writes
    pub messages_written: u64,
    /// `READER_IDLE` notifications
    pub reader_idle_events: u64,
    /// `WRITER_IDLE` notifications
    pub writer_idle_events: u64,
    /// `BOTH_IDLE` notifications
    pub both_idle_events: u64,
    /// Transport failures
    pub io_errors: u64,
    /// Handler failures
    pub handler_errors: u64,
    /// Time since the metrics were created
    pub uptime: Duration,
    /// Average lifetime of closed sessions
    pub avg_session_duration: Duration,
}

impl MetricsSnapshot {
    /// Total idle notifications of every kind
    pub fn total_idle_events(&self) -> u64 {
        self.reader_idle_events + self.writer_idle_events + self.both_idle_events
    }

    /// Total error count
    pub fn total_errors(&self) -> u64 {
        self.io_errors + self.handler_errors
    }

    /// Calculate bytes per second (read)
    pub fn bytes_read_per_sec(&self) -> f64 {
        if self.uptime.is_zero() {
            return 0.0;
        }
        self.bytes_read as f64 / self.uptime.as_secs_f64()
    }

    /// Calculate bytes per second (written)
    pub fn bytes_written_per_sec(&self) -> f64 {
        if self.uptime.is_zero() {
            return 0.0;
        }
        self.bytes_written as f64 / self.uptime.as_secs_f64()
    }
}
