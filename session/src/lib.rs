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

//! Session model for Sessionix
//!
//! This crate holds the transport-independent half of a session:
//!
//! - [`SessionConfig`]: idle thresholds and tunables, safe to mutate from any
//!   thread while a processor reads them
//! - [`ActivityTracker`]: lock-free read/write/idle timestamps and counters
//! - [`due_statuses`]: the pure idle computation run by every sweep
//!
//! The reactor, transports and acceptors that drive these types live in
//! `sessionix-service`.
//!
//! # Example
//!
//! ```
//! use sessionix_session::{ActivityTracker, IdleStatus, SessionConfig, due_statuses};
//! use std::time::Duration;
//! use tokio::time::Instant;
//!
//! let config = SessionConfig::new();
//! config.set_reader_idle_time(3);
//!
//! let start = Instant::now();
//! let activity = ActivityTracker::new(start);
//!
//! let due = due_statuses(
//!     &activity.snapshot(),
//!     &config.idle_thresholds(),
//!     start + Duration::from_secs(3),
//! );
//! assert!(due.contains(IdleStatus::ReaderIdle));
//! ```

mod activity;
mod config;
mod error;
mod idle;
mod types;

pub use activity::ActivityTracker;
pub use config::{MAX_READ_BUFFER_SIZE, MIN_READ_BUFFER_SIZE, SessionConfig, SessionConfigValues};
pub use error::{ConfigError, ConfigResult};
pub use idle::{ActivitySnapshot, IdleThresholds, due_statuses, is_due};
pub use types::{EndpointAddress, IdleStatus, IdleStatuses, SessionId, SessionState};
