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

//! Configuration error types

use thiserror::Error;

/// Result type for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Errors raised when a configuration value is rejected
///
/// These never reach a session handler; they are returned to whoever tried
/// to apply the value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A field was given a value outside its accepted range
    #[error("Invalid value {value} for {field}: {reason}")]
    InvalidValue {
        /// Name of the offending field
        field: &'static str,
        /// Rejected value, rendered for diagnostics
        value: String,
        /// Why the value was rejected
        reason: &'static str,
    },
}

impl ConfigError {
    /// Build an [`ConfigError::InvalidValue`]
    pub fn invalid(field: &'static str, value: impl ToString, reason: &'static str) -> Self {
        Self::InvalidValue {
            field,
            value: value.to_string(),
            reason,
        }
    }

    /// Name of the field the error refers to
    pub fn field(&self) -> &'static str {
        match self {
            Self::InvalidValue { field, .. } => field,
        }
    }
}
