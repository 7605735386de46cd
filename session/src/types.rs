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

//! Core identity, state and idle status types

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a session (monotonically increasing, never reused)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// Create a session ID from a raw value
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocate the next process-wide session ID
    pub fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the underlying u64 value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Session lifecycle state
///
/// States are ordered; a session only ever moves forward through them, which
/// lets the owner advance the state with an atomic `fetch_max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum SessionState {
    /// Constructed but not yet registered with a processor
    Created = 0,
    /// Registered and eligible for I/O and idle sweeps
    Connected = 1,
    /// Close requested or I/O failed; teardown in progress
    Closing = 2,
    /// Teardown complete, no further events
    Closed = 3,
}

impl SessionState {
    /// Convert from u8 (for atomic operations)
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Connected,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }

    /// Convert to u8 (for atomic operations)
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Check if the session is closing or closed
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closing | Self::Closed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Connected => write!(f, "connected"),
            Self::Closing => write!(f, "closing"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Kinds of idleness a session can be reported for
///
/// The three conditions are independent and not mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IdleStatus {
    /// No read within the reader idle time
    ReaderIdle,
    /// No write within the writer idle time
    WriterIdle,
    /// Neither a read nor a write within the both idle time
    BothIdle,
}

impl IdleStatus {
    /// All statuses in the order they are reported within one sweep
    pub const ALL: [IdleStatus; 3] = [Self::ReaderIdle, Self::WriterIdle, Self::BothIdle];

    /// Stable index, used for per-status storage
    pub fn index(self) -> usize {
        match self {
            Self::ReaderIdle => 0,
            Self::WriterIdle => 1,
            Self::BothIdle => 2,
        }
    }

    fn bit(self) -> u8 {
        1 << self.index()
    }
}

impl fmt::Display for IdleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReaderIdle => write!(f, "READER_IDLE"),
            Self::WriterIdle => write!(f, "WRITER_IDLE"),
            Self::BothIdle => write!(f, "BOTH_IDLE"),
        }
    }
}

/// Ordered set of idle statuses
///
/// Iteration always yields reader, writer, then both.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct IdleStatuses(u8);

impl IdleStatuses {
    /// The empty set
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Add a status to the set
    pub fn insert(&mut self, status: IdleStatus) {
        self.0 |= status.bit();
    }

    /// Check membership
    pub fn contains(&self, status: IdleStatus) -> bool {
        self.0 & status.bit() != 0
    }

    /// Check if no status is present
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Number of statuses present
    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Iterate in reporting order
    pub fn iter(&self) -> impl Iterator<Item = IdleStatus> + '_ {
        IdleStatus::ALL.into_iter().filter(|s| self.contains(*s))
    }
}

impl FromIterator<IdleStatus> for IdleStatuses {
    fn from_iter<I: IntoIterator<Item = IdleStatus>>(iter: I) -> Self {
        let mut set = Self::empty();
        for status in iter {
            set.insert(status);
        }
        set
    }
}

impl IntoIterator for IdleStatuses {
    type Item = IdleStatus;
    type IntoIter = std::vec::IntoIter<IdleStatus>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter().collect::<Vec<_>>().into_iter()
    }
}

/// Opaque endpoint descriptor for a session's local or remote side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EndpointAddress {
    /// Socket address of a stream or datagram transport
    Inet(SocketAddr),
    /// Port of an in-memory pipe transport
    Pipe(u64),
}

impl EndpointAddress {
    /// Get the socket address, if this is an inet endpoint
    pub fn as_socket_addr(&self) -> Option<SocketAddr> {
        match self {
            Self::Inet(addr) => Some(*addr),
            Self::Pipe(_) => None,
        }
    }
}

impl From<SocketAddr> for EndpointAddress {
    fn from(addr: SocketAddr) -> Self {
        Self::Inet(addr)
    }
}

impl fmt::Display for EndpointAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inet(addr) => write!(f, "{}", addr),
            Self::Pipe(port) => write!(f, "pipe:{}", port),
        }
    }
}
