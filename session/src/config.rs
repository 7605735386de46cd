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

//! Per-session configuration
//!
//! A [`SessionConfig`] is the one piece of session state that is written by
//! application code while a processor reads it during its idle sweep. Every
//! field is an independent atomic, so no lock is involved and a sweep always
//! sees the last value stored for each field.
//!
//! Acceptors hold a default configuration and hand each new session a
//! [`copy`](SessionConfig::copy) of it, so later changes to the default never
//! reach sessions that already exist.
//!
//! # Examples
//!
//! ```
//! use sessionix_session::{IdleStatus, SessionConfig};
//!
//! let defaults = SessionConfig::new();
//! defaults.set_reader_idle_time(3);
//! defaults.set_writer_idle_time(5);
//! defaults.set_both_idle_time(7);
//!
//! let session_config = defaults.copy();
//! defaults.set_reader_idle_time(30);
//!
//! assert_eq!(session_config.reader_idle_time(), 3);
//! assert_eq!(session_config.idle_time(IdleStatus::BothIdle), 7);
//! ```

use crate::{ConfigError, ConfigResult, IdleStatus, IdleThresholds};
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

/// Smallest accepted read buffer size in bytes
pub const MIN_READ_BUFFER_SIZE: usize = 64;

/// Largest accepted read buffer size in bytes
pub const MAX_READ_BUFFER_SIZE: usize = 65536;

/// Plain configuration values
///
/// Used to build a [`SessionConfig`] up front and to take a point-in-time
/// snapshot of one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfigValues {
    /// Seconds without a read before `READER_IDLE` fires (0 disables)
    pub reader_idle_time: u32,
    /// Seconds without a write before `WRITER_IDLE` fires (0 disables)
    pub writer_idle_time: u32,
    /// Seconds without any I/O before `BOTH_IDLE` fires (0 disables)
    pub both_idle_time: u32,
    /// Initial read buffer capacity for stream transports
    pub read_buffer_size: usize,
    /// Seconds a single write may take before it fails (0 for no limit)
    pub write_timeout: u32,
}

impl Default for SessionConfigValues {
    fn default() -> Self {
        Self {
            reader_idle_time: 0,
            writer_idle_time: 0,
            both_idle_time: 0,
            read_buffer_size: 2048,
            write_timeout: 60,
        }
    }
}

impl SessionConfigValues {
    /// Set the reader idle time in seconds
    pub fn with_reader_idle_time(mut self, seconds: u32) -> Self {
        self.reader_idle_time = seconds;
        self
    }

    /// Set the writer idle time in seconds
    pub fn with_writer_idle_time(mut self, seconds: u32) -> Self {
        self.writer_idle_time = seconds;
        self
    }

    /// Set the both idle time in seconds
    pub fn with_both_idle_time(mut self, seconds: u32) -> Self {
        self.both_idle_time = seconds;
        self
    }

    /// Set the read buffer size in bytes
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Set the write timeout in seconds
    pub fn with_write_timeout(mut self, seconds: u32) -> Self {
        self.write_timeout = seconds;
        self
    }

    /// Validate the values
    pub fn validate(&self) -> ConfigResult<()> {
        validate_read_buffer_size(self.read_buffer_size)
    }
}

fn validate_read_buffer_size(size: usize) -> ConfigResult<()> {
    if size < MIN_READ_BUFFER_SIZE {
        return Err(ConfigError::invalid(
            "read_buffer_size",
            size,
            "must be at least 64 bytes",
        ));
    }
    if size > MAX_READ_BUFFER_SIZE {
        return Err(ConfigError::invalid(
            "read_buffer_size",
            size,
            "must be at most 65536 bytes",
        ));
    }
    Ok(())
}

/// Live, concurrently mutable session configuration
///
/// Idle times are whole seconds; `0` disables the corresponding check. Changes
/// take effect on the next idle sweep and never re-trigger a notification that
/// has already fired.
pub struct SessionConfig {
    idle_times: [AtomicU32; 3],
    read_buffer_size: AtomicUsize,
    write_timeout: AtomicU32,
}

impl SessionConfig {
    /// Create a configuration with every idle check disabled
    pub fn new() -> Self {
        Self::from_values(SessionConfigValues::default())
    }

    /// Create a configuration from plain values
    ///
    /// The values are not validated here; call
    /// [`SessionConfigValues::validate`] first when they come from outside.
    pub fn from_values(values: SessionConfigValues) -> Self {
        Self {
            idle_times: [
                AtomicU32::new(values.reader_idle_time),
                AtomicU32::new(values.writer_idle_time),
                AtomicU32::new(values.both_idle_time),
            ],
            read_buffer_size: AtomicUsize::new(values.read_buffer_size),
            write_timeout: AtomicU32::new(values.write_timeout),
        }
    }

    /// Produce an independent configuration with identical values
    pub fn copy(&self) -> Self {
        Self::from_values(self.snapshot())
    }

    /// Overwrite every field with the values of `other`
    pub fn set_all(&self, other: &SessionConfig) {
        let values = other.snapshot();
        self.set_reader_idle_time(values.reader_idle_time);
        self.set_writer_idle_time(values.writer_idle_time);
        self.set_both_idle_time(values.both_idle_time);
        self.read_buffer_size
            .store(values.read_buffer_size, Ordering::Relaxed);
        self.set_write_timeout(values.write_timeout);
    }

    /// Read every field into a plain value
    ///
    /// Each field is loaded independently; a concurrent writer may be observed
    /// for some fields and not others.
    pub fn snapshot(&self) -> SessionConfigValues {
        SessionConfigValues {
            reader_idle_time: self.reader_idle_time(),
            writer_idle_time: self.writer_idle_time(),
            both_idle_time: self.both_idle_time(),
            read_buffer_size: self.read_buffer_size(),
            write_timeout: self.write_timeout(),
        }
    }

    /// Get the idle time for `status` in seconds
    pub fn idle_time(&self, status: IdleStatus) -> u32 {
        self.idle_times[status.index()].load(Ordering::Relaxed)
    }

    /// Get the idle time for `status` as a duration (zero when disabled)
    pub fn idle_time_duration(&self, status: IdleStatus) -> Duration {
        Duration::from_secs(u64::from(self.idle_time(status)))
    }

    /// Set the idle time for `status` in seconds (0 disables)
    pub fn set_idle_time(&self, status: IdleStatus, seconds: u32) {
        self.idle_times[status.index()].store(seconds, Ordering::Relaxed);
        tracing::trace!(%status, seconds, "Idle time updated");
    }

    /// Get the reader idle time in seconds
    pub fn reader_idle_time(&self) -> u32 {
        self.idle_time(IdleStatus::ReaderIdle)
    }

    /// Set the reader idle time in seconds (0 disables)
    pub fn set_reader_idle_time(&self, seconds: u32) {
        self.set_idle_time(IdleStatus::ReaderIdle, seconds);
    }

    /// Get the writer idle time in seconds
    pub fn writer_idle_time(&self) -> u32 {
        self.idle_time(IdleStatus::WriterIdle)
    }

    /// Set the writer idle time in seconds (0 disables)
    pub fn set_writer_idle_time(&self, seconds: u32) {
        self.set_idle_time(IdleStatus::WriterIdle, seconds);
    }

    /// Get the both idle time in seconds
    pub fn both_idle_time(&self) -> u32 {
        self.idle_time(IdleStatus::BothIdle)
    }

    /// Set the both idle time in seconds (0 disables)
    pub fn set_both_idle_time(&self, seconds: u32) {
        self.set_idle_time(IdleStatus::BothIdle, seconds);
    }

    /// Read the three idle thresholds for one sweep
    pub fn idle_thresholds(&self) -> IdleThresholds {
        IdleThresholds {
            reader: self.idle_time_duration(IdleStatus::ReaderIdle),
            writer: self.idle_time_duration(IdleStatus::WriterIdle),
            both: self.idle_time_duration(IdleStatus::BothIdle),
        }
    }

    /// Get the read buffer size in bytes
    pub fn read_buffer_size(&self) -> usize {
        self.read_buffer_size.load(Ordering::Relaxed)
    }

    /// Set the read buffer size in bytes
    ///
    /// Rejects sizes outside `64..=65536`; the stored value is left unchanged
    /// on error.
    pub fn set_read_buffer_size(&self, size: usize) -> ConfigResult<()> {
        validate_read_buffer_size(size)?;
        self.read_buffer_size.store(size, Ordering::Relaxed);
        Ok(())
    }

    /// Get the write timeout in seconds (0 for no limit)
    pub fn write_timeout(&self) -> u32 {
        self.write_timeout.load(Ordering::Relaxed)
    }

    /// Get the write timeout as a duration, `None` when unlimited
    pub fn write_timeout_duration(&self) -> Option<Duration> {
        match self.write_timeout() {
            0 => None,
            seconds => Some(Duration::from_secs(u64::from(seconds))),
        }
    }

    /// Set the write timeout in seconds (0 for no limit)
    pub fn set_write_timeout(&self, seconds: u32) {
        self.write_timeout.store(seconds, Ordering::Relaxed);
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for SessionConfig {
    fn clone(&self) -> Self {
        self.copy()
    }
}

impl From<SessionConfigValues> for SessionConfig {
    fn from(values: SessionConfigValues) -> Self {
        Self::from_values(values)
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values = self.snapshot();
        f.debug_struct("SessionConfig")
            .field("reader_idle_time", &values.reader_idle_time)
            .field("writer_idle_time", &values.writer_idle_time)
            .field("both_idle_time", &values.both_idle_time)
            .field("read_buffer_size", &values.read_buffer_size)
            .field("write_timeout", &values.write_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.reader_idle_time(), 0);
        assert_eq!(config.writer_idle_time(), 0);
        assert_eq!(config.both_idle_time(), 0);
        assert_eq!(config.read_buffer_size(), 2048);
        assert_eq!(config.write_timeout_duration(), Some(Duration::from_secs(60)));
        assert_eq!(config.idle_thresholds(), IdleThresholds::default());
    }

    #[test]
    fn test_copy_is_independent() {
        let source = SessionConfig::new();
        source.set_reader_idle_time(3);
        source.set_writer_idle_time(5);
        source.set_both_idle_time(7);

        let copy = source.copy();
        source.set_reader_idle_time(10);
        source.set_both_idle_time(0);

        assert_eq!(copy.reader_idle_time(), 3);
        assert_eq!(copy.writer_idle_time(), 5);
        assert_eq!(copy.both_idle_time(), 7);
        assert_eq!(source.reader_idle_time(), 10);
    }

    #[test]
    fn test_set_all() {
        let source = SessionConfig::from_values(
            SessionConfigValues::default()
                .with_reader_idle_time(1)
                .with_writer_idle_time(2)
                .with_both_idle_time(3)
                .with_read_buffer_size(4096)
                .with_write_timeout(0),
        );
        let target = SessionConfig::new();
        target.set_all(&source);

        assert_eq!(target.snapshot(), source.snapshot());
        assert_eq!(target.write_timeout_duration(), None);
    }

    #[test]
    fn test_read_buffer_size_validation() {
        let config = SessionConfig::new();

        assert!(config.set_read_buffer_size(8192).is_ok());
        assert_eq!(config.read_buffer_size(), 8192);

        let err = config.set_read_buffer_size(16).unwrap_err();
        assert_eq!(err.field(), "read_buffer_size");
        assert_eq!(config.read_buffer_size(), 8192);

        assert!(config.set_read_buffer_size(1 << 20).is_err());
        assert!(
            SessionConfigValues::default()
                .with_read_buffer_size(0)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_idle_thresholds() {
        let config = SessionConfig::new();
        config.set_idle_time(IdleStatus::WriterIdle, 5);

        let thresholds = config.idle_thresholds();
        assert_eq!(thresholds.reader, Duration::ZERO);
        assert_eq!(thresholds.writer, Duration::from_secs(5));
        assert_eq!(thresholds.both, Duration::ZERO);
    }

    #[test]
    fn test_concurrent_mutation() {
        let config = Arc::new(SessionConfig::new());
        let writer = {
            let config = config.clone();
            std::thread::spawn(move || {
                for seconds in 0..1000 {
                    config.set_reader_idle_time(seconds);
                }
            })
        };

        for _ in 0..1000 {
            assert!(config.reader_idle_time() < 1000);
            assert_eq!(config.writer_idle_time(), 0);
        }

        writer.join().unwrap();
        assert_eq!(config.reader_idle_time(), 999);
    }
}
