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

//! Error types for sessions, processors and acceptors

use sessionix_session::{ConfigError, EndpointAddress};
use thiserror::Error;

/// Result type for service operations
pub type Result<T> = std::result::Result<T, SessionError>;

/// Failure to establish a binding
#[derive(Debug, Error)]
pub enum BindError {
    /// The address is already bound, by this acceptor or another socket
    #[error("Address {0} already in use")]
    AddressInUse(EndpointAddress),

    /// The address is not bound by this acceptor
    #[error("Address {0} is not bound")]
    NotBound(EndpointAddress),

    /// Any other failure from the operating system
    #[error("Bind failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Service error types
#[derive(Debug, Error)]
pub enum SessionError {
    /// Rejected configuration value
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Binding failed
    #[error("Bind error: {0}")]
    Bind(#[from] BindError),

    /// Transport failure on a session
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A handler callback returned an error or panicked
    #[error("Handler error: {0}")]
    Handler(String),

    /// A write did not complete within the session's write timeout
    #[error("Write timed out")]
    WriteTimeout,

    /// The session is closing or closed
    #[error("Session closed")]
    SessionClosed,

    /// No handler was set before the acceptor was used
    #[error("Handler not set")]
    HandlerNotSet,

    /// The acceptor's session limit was reached
    #[error("Maximum sessions ({0}) reached")]
    MaxSessionsReached(usize),

    /// The owning processor has stopped
    #[error("Processor unavailable")]
    ProcessorUnavailable,

    /// The acceptor has been disposed
    #[error("Acceptor disposed")]
    Disposed,
}

impl SessionError {
    /// Check if the error is a transport failure that closes the session
    pub fn is_io_error(&self) -> bool {
        matches!(self, SessionError::Io(_) | SessionError::WriteTimeout)
    }

    /// Check if the error came out of a handler callback
    pub fn is_handler_error(&self) -> bool {
        matches!(self, SessionError::Handler(_))
    }

    /// Check if the error refers to an address that is already taken
    pub fn is_address_in_use(&self) -> bool {
        matches!(self, SessionError::Bind(BindError::AddressInUse(_)))
    }

    /// Check if the error means the session can no longer be used
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            SessionError::SessionClosed | SessionError::ProcessorUnavailable | SessionError::Disposed
        )
    }
}

impl BindError {
    /// Map an OS bind failure, folding `AddrInUse` into [`BindError::AddressInUse`]
    pub fn from_io(addr: EndpointAddress, error: std::io::Error) -> Self {
        if error.kind() == std::io::ErrorKind::AddrInUse {
            BindError::AddressInUse(addr)
        } else {
            BindError::Io(error)
        }
    }
}
