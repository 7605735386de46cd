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

//! Idle status computation
//!
//! [`due_statuses`] decides, for one session at one instant, which idle
//! notifications should fire. It is a pure function over an
//! [`ActivitySnapshot`] and the session's [`IdleThresholds`]; recording that a
//! notification fired is left to the caller.
//!
//! A status `k` with threshold `T` is due when both hold:
//!
//! - the relevant activity (reads, writes, or either) is at least `T` old,
//!   measured from session creation if nothing happened yet, and
//! - at least `T` has passed since `k` last fired (creation counts as the
//!   first baseline).
//!
//! The second condition gives a sliding baseline: while a session stays idle
//! the notification repeats every `T`.

use crate::{IdleStatus, IdleStatuses};
use std::time::Duration;
use tokio::time::Instant;

/// Idle thresholds read from a session's configuration
///
/// A zero duration disables the corresponding status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdleThresholds {
    /// Reader idle threshold
    pub reader: Duration,
    /// Writer idle threshold
    pub writer: Duration,
    /// Both idle threshold
    pub both: Duration,
}

impl IdleThresholds {
    /// Get the threshold for `status`
    pub fn get(&self, status: IdleStatus) -> Duration {
        match status {
            IdleStatus::ReaderIdle => self.reader,
            IdleStatus::WriterIdle => self.writer,
            IdleStatus::BothIdle => self.both,
        }
    }

    /// Smallest enabled threshold, if any
    pub fn min_enabled(&self) -> Option<Duration> {
        IdleStatus::ALL
            .into_iter()
            .map(|s| self.get(s))
            .filter(|d| !d.is_zero())
            .min()
    }
}

/// Point-in-time copy of a session's activity timestamps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivitySnapshot {
    /// When the session was created
    pub created_at: Instant,
    /// Last read of at least one byte
    pub last_read: Instant,
    /// Last write of at least one byte
    pub last_write: Instant,
    /// Last time each status fired, indexed by [`IdleStatus::index`]
    pub last_idle: [Instant; 3],
}

impl ActivitySnapshot {
    /// Snapshot of a session that has seen no activity since `created_at`
    pub fn new(created_at: Instant) -> Self {
        Self {
            created_at,
            last_read: created_at,
            last_write: created_at,
            last_idle: [created_at; 3],
        }
    }

    /// Most recent activity relevant to `status`
    pub fn last_activity(&self, status: IdleStatus) -> Instant {
        let activity = match status {
            IdleStatus::ReaderIdle => self.last_read,
            IdleStatus::WriterIdle => self.last_write,
            IdleStatus::BothIdle => self.last_read.max(self.last_write),
        };
        activity.max(self.created_at)
    }

    /// Last time `status` fired, or creation if it never has
    pub fn last_idle(&self, status: IdleStatus) -> Instant {
        self.last_idle[status.index()].max(self.created_at)
    }
}

/// Check whether a single `status` is due at `now`
pub fn is_due(
    snapshot: &ActivitySnapshot,
    thresholds: &IdleThresholds,
    status: IdleStatus,
    now: Instant,
) -> bool {
    let threshold = thresholds.get(status);
    if threshold.is_zero() {
        return false;
    }

    let idle_for = now.saturating_duration_since(snapshot.last_activity(status));
    let since_fired = now.saturating_duration_since(snapshot.last_idle(status));

    idle_for >= threshold && since_fired >= threshold
}

/// Compute every idle status that is due at `now`
pub fn due_statuses(
    snapshot: &ActivitySnapshot,
    thresholds: &IdleThresholds,
    now: Instant,
) -> IdleStatuses {
    IdleStatus::ALL
        .into_iter()
        .filter(|status| is_due(snapshot, thresholds, *status, now))
        .collect()
}
