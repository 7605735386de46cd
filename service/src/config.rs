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

//! Processor and acceptor configuration
//!
//! # Example
//!
//! ```
//! use sessionix_service::{AcceptorConfig, ProcessorConfig};
//! use std::time::Duration;
//!
//! let config = AcceptorConfig::default()
//!     .with_max_sessions(500)
//!     .with_processor(ProcessorConfig::default().with_sweep_interval(Duration::from_millis(500)))
//!     .with_processor_count(2);
//! assert!(config.validate().is_ok());
//! ```

use sessionix_session::{ConfigError, ConfigResult};
use std::time::Duration;

/// Longest accepted sweep interval
///
/// Idle times are whole seconds, so a one second sweep never lags a
/// threshold by more than one period.
pub const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Configuration for a single I/O processor
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// How often the idle sweep runs
    pub sweep_interval: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(1),
        }
    }
}

impl ProcessorConfig {
    /// Set the idle sweep interval
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.sweep_interval.is_zero() {
            return Err(ConfigError::invalid(
                "sweep_interval",
                format!("{:?}", self.sweep_interval),
                "must be greater than 0",
            ));
        }
        if self.sweep_interval > MAX_SWEEP_INTERVAL {
            return Err(ConfigError::invalid(
                "sweep_interval",
                format!("{:?}", self.sweep_interval),
                "must not exceed 1 second",
            ));
        }
        Ok(())
    }
}

/// Acceptor configuration
#[derive(Debug, Clone)]
pub struct AcceptorConfig {
    /// Maximum number of concurrently managed sessions
    pub max_sessions: usize,

    /// Number of processors sessions are spread across
    pub processor_count: usize,

    /// Configuration applied to every processor
    pub processor: ProcessorConfig,

    /// Largest datagram the datagram acceptor will receive
    pub max_datagram_size: usize,
}

impl Default for AcceptorConfig {
    fn default() -> Self {
        Self {
            max_sessions: 10_000,
            processor_count: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            processor: ProcessorConfig::default(),
            max_datagram_size: 65_507,
        }
    }
}

impl AcceptorConfig {
    /// Set the maximum number of managed sessions
    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }

    /// Set the number of processors
    pub fn with_processor_count(mut self, count: usize) -> Self {
        self.processor_count = count;
        self
    }

    /// Set the processor configuration
    pub fn with_processor(mut self, processor: ProcessorConfig) -> Self {
        self.processor = processor;
        self
    }

    /// Set the largest datagram the acceptor will receive
    pub fn with_max_datagram_size(mut self, size: usize) -> Self {
        self.max_datagram_size = size;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_sessions == 0 {
            return Err(ConfigError::invalid(
                "max_sessions",
                self.max_sessions,
                "must be greater than 0",
            ));
        }
        if self.processor_count == 0 {
            return Err(ConfigError::invalid(
                "processor_count",
                self.processor_count,
                "must be greater than 0",
            ));
        }
        if self.max_datagram_size == 0 {
            return Err(ConfigError::invalid(
                "max_datagram_size",
                self.max_datagram_size,
                "must be greater than 0",
            ));
        }
        self.processor.validate()
    }
}
