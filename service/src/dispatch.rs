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

//! Guarded delivery of session events to handlers
//!
//! Every callback is awaited in place on the owning processor. Errors and
//! panics are turned into [`SessionError::Handler`] and routed to
//! `exception_caught`; anything escaping `exception_caught` or
//! `session_closed` only reaches the log.

use crate::{HandlerResult, ServiceMetrics, Session, SessionError};
use bytes::Bytes;
use futures::FutureExt;
use sessionix_session::IdleStatus;
use std::any::Any;
use std::panic::AssertUnwindSafe;

/// Events delivered through [`dispatch`]
#[derive(Debug, Clone)]
pub(crate) enum SessionEvent {
    Created,
    Opened,
    Received(Bytes),
    Sent(Bytes),
    Idle(IdleStatus),
    Closed,
}

impl SessionEvent {
    fn name(&self) -> &'static str {
        match self {
            SessionEvent::Created => "session_created",
            SessionEvent::Opened => "session_opened",
            SessionEvent::Received(_) => "message_received",
            SessionEvent::Sent(_) => "message_sent",
            SessionEvent::Idle(_) => "session_idle",
            SessionEvent::Closed => "session_closed",
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}

/// Deliver `event` to the session's handler
pub(crate) async fn dispatch(session: &Session, metrics: &ServiceMetrics, event: SessionEvent) {
    let name = event.name();
    let handler = session.handler().clone();
    let is_closed = matches!(event, SessionEvent::Closed);

    let callback = match event {
        SessionEvent::Created => handler.session_created(session),
        SessionEvent::Opened => handler.session_opened(session),
        SessionEvent::Received(message) => handler.message_received(session, message),
        SessionEvent::Sent(message) => handler.message_sent(session, message),
        SessionEvent::Idle(status) => handler.session_idle(session, status),
        SessionEvent::Closed => handler.session_closed(session),
    };

    let outcome: HandlerResult = match AssertUnwindSafe(callback).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(format!("{} panicked: {}", name, panic_message(panic.as_ref())).into()),
    };

    if let Err(error) = outcome {
        metrics.handler_error();
        let error = SessionError::Handler(error.to_string());
        if is_closed {
            tracing::error!(
                session_id = %session.id(),
                error = %error,
                "Handler failed in session_closed"
            );
        } else {
            exception(session, error).await;
        }
    }
}

/// Deliver a caught failure to `exception_caught`
pub(crate) async fn exception(session: &Session, error: SessionError) {
    tracing::warn!(
        session_id = %session.id(),
        error = %error,
        "Exception caught"
    );

    let handler = session.handler().clone();
    let callback = handler.exception_caught(session, &error);
    if let Err(panic) = AssertUnwindSafe(callback).catch_unwind().await {
        tracing::error!(
            session_id = %session.id(),
            panic = %panic_message(panic.as_ref()),
            "Handler panicked in exception_caught"
        );
    }
}
