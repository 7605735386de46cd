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

//! Handler traits and implementations for session events

use crate::{Session, SessionError};
use async_trait::async_trait;
use bytes::Bytes;
use sessionix_session::IdleStatus;

/// Error returned by a handler callback
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result returned by a handler callback
pub type HandlerResult = std::result::Result<(), HandlerError>;

/// Session event handler trait
///
/// Implement this trait to receive session lifecycle and idle events. All
/// methods are async and have default implementations that do nothing.
///
/// Callbacks run on the processor that owns the session, one at a time. A
/// callback that takes long delays every other session on that processor,
/// including their idle notifications.
///
/// Events for one session arrive in this order: `session_created`,
/// `session_opened`, any mix of `message_received`, `message_sent` and
/// `session_idle`, then `session_closed` exactly once. `exception_caught` may
/// arrive at any point before `session_closed`.
///
/// # Example
///
/// ```no_run
/// use sessionix_service::{HandlerResult, IdleStatus, Session, SessionHandler};
/// use async_trait::async_trait;
///
/// struct MyHandler;
///
/// #[async_trait]
/// impl SessionHandler for MyHandler {
///     async fn session_idle(&self, session: &Session, status: IdleStatus) -> HandlerResult {
///         if status == IdleStatus::BothIdle {
///             session.close();
///         }
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait SessionHandler: Send + Sync + 'static {
    /// Called when a session has been created, before it is opened
    async fn session_created(&self, _session: &Session) -> HandlerResult {
        Ok(())
    }

    /// Called when a session is ready for I/O
    ///
    /// Idle sweeps only consider the session after this returns.
    async fn session_opened(&self, _session: &Session) -> HandlerResult {
        Ok(())
    }

    /// Called for every chunk of data read from the transport
    async fn message_received(&self, _session: &Session, _message: Bytes) -> HandlerResult {
        Ok(())
    }

    /// Called after data has been written to the transport
    async fn message_sent(&self, _session: &Session, _message: Bytes) -> HandlerResult {
        Ok(())
    }

    /// Called once per due idle status per sweep
    async fn session_idle(&self, _session: &Session, _status: IdleStatus) -> HandlerResult {
        Ok(())
    }

    /// Called when a transport or handler failure is caught for this session
    ///
    /// Failures raised from here are logged and dropped.
    async fn exception_caught(&self, _session: &Session, _error: &SessionError) {}

    /// Called once when the session has closed
    async fn session_closed(&self, _session: &Session) -> HandlerResult {
        Ok(())
    }
}

type SessionCallback = Box<dyn Fn(&Session) + Send + Sync + 'static>;
type MessageCallback = Box<dyn Fn(&Session, Bytes) + Send + Sync + 'static>;

/// Callback-based handler implementation
///
/// This provides a way to implement handlers using closures instead of
/// implementing the `SessionHandler` trait.
///
/// # Example
///
/// ```no_run
/// use sessionix_service::CallbackHandler;
/// use std::sync::Arc;
///
/// let handler = Arc::new(CallbackHandler {
///     on_opened: Some(Box::new(|session| {
///         println!("Session {} opened", session.id());
///     })),
///     on_idle: Some(Box::new(|session, status| {
///         println!("Session {} is {}", session.id(), status);
///     })),
///     ..Default::default()
/// });
/// ```
#[derive(Default)]
pub struct CallbackHandler {
    /// Called on session creation
    pub on_created: Option<SessionCallback>,
    /// Called when the session opens
    pub on_opened: Option<SessionCallback>,
    /// Called for received data
    pub on_message: Option<MessageCallback>,
    /// Called for written data
    pub on_sent: Option<MessageCallback>,
    /// Called on idle notifications
    pub on_idle: Option<Box<dyn Fn(&Session, IdleStatus) + Send + Sync + 'static>>,
    /// Called on caught failures
    pub on_exception: Option<Box<dyn Fn(&Session, &SessionError) + Send + Sync + 'static>>,
    /// Called when the session closes
    pub on_closed: Option<SessionCallback>,
}

#[async_trait]
impl SessionHandler for CallbackHandler {
    async fn session_created(&self, session: &Session) -> HandlerResult {
        if let Some(ref f) = self.on_created {
            f(session);
        }
        Ok(())
    }

    async fn session_opened(&self, session: &Session) -> HandlerResult {
        if let Some(ref f) = self.on_opened {
            f(session);
        }
        Ok(())
    }

    async fn message_received(&self, session: &Session, message: Bytes) -> HandlerResult {
        if let Some(ref f) = self.on_message {
            f(session, message);
        }
        Ok(())
    }

    async fn message_sent(&self, session: &Session, message: Bytes) -> HandlerResult {
        if let Some(ref f) = self.on_sent {
            f(session, message);
        }
        Ok(())
    }

    async fn session_idle(&self, session: &Session, status: IdleStatus) -> HandlerResult {
        if let Some(ref f) = self.on_idle {
            f(session, status);
        }
        Ok(())
    }

    async fn exception_caught(&self, session: &Session, error: &SessionError) {
        if let Some(ref f) = self.on_exception {
            f(session, error);
        }
    }

    async fn session_closed(&self, session: &Session) -> HandlerResult {
        if let Some(ref f) = self.on_closed {
            f(session);
        }
        Ok(())
    }
}
