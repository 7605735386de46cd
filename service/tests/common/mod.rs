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

//! Shared helpers for service integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use sessionix_service::{
    AcceptorConfig, HandlerResult, IdleStatus, IoAcceptor, PipeAcceptor, Session, SessionError,
    SessionHandler, SessionId,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout};

/// Port every test acceptor binds
pub const PORT: u64 = 1;

/// Everything a handler saw, with the time it saw it
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Created,
    Opened,
    Received(Bytes),
    Sent(Bytes),
    Idle(IdleStatus),
    Exception(String),
    Closed,
}

/// Handler forwarding every callback to a channel
pub struct RecordingHandler {
    events: mpsc::UnboundedSender<(SessionId, Event, Instant)>,
}

impl RecordingHandler {
    pub fn new() -> (Arc<Self>, Recorder) {
        let (events, receiver) = mpsc::unbounded_channel();
        (Arc::new(Self { events }), Recorder { receiver })
    }

    fn record(&self, session: &Session, event: Event) {
        let _ = self.events.send((session.id(), event, Instant::now()));
    }
}

#[async_trait]
impl SessionHandler for RecordingHandler {
    async fn session_created(&self, session: &Session) -> HandlerResult {
        self.record(session, Event::Created);
        Ok(())
    }

    async fn session_opened(&self, session: &Session) -> HandlerResult {
        self.record(session, Event::Opened);
        Ok(())
    }

    async fn message_received(&self, session: &Session, message: Bytes) -> HandlerResult {
        self.record(session, Event::Received(message));
        Ok(())
    }

    async fn message_sent(&self, session: &Session, message: Bytes) -> HandlerResult {
        self.record(session, Event::Sent(message));
        Ok(())
    }

    async fn session_idle(&self, session: &Session, status: IdleStatus) -> HandlerResult {
        self.record(session, Event::Idle(status));
        Ok(())
    }

    async fn exception_caught(&self, session: &Session, error: &SessionError) {
        self.record(session, Event::Exception(error.to_string()));
    }

    async fn session_closed(&self, session: &Session) -> HandlerResult {
        self.record(session, Event::Closed);
        Ok(())
    }
}

/// Receiving end of a [`RecordingHandler`]
pub struct Recorder {
    receiver: mpsc::UnboundedReceiver<(SessionId, Event, Instant)>,
}

impl Recorder {
    /// Next event of any kind, or `None` after `limit`
    pub async fn next(&mut self, limit: Duration) -> Option<(SessionId, Event, Instant)> {
        timeout(limit, self.receiver.recv()).await.ok().flatten()
    }

    /// Next idle event, skipping everything else
    pub async fn next_idle(&mut self, limit: Duration) -> Option<(SessionId, IdleStatus, Instant)> {
        let deadline = Instant::now() + limit;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.next(remaining).await? {
                (id, Event::Idle(status), at) => return Some((id, status, at)),
                _ => continue,
            }
        }
    }

    /// Next idle event for `session`, skipping everything else
    pub async fn next_idle_of(
        &mut self,
        session: &Session,
        limit: Duration,
    ) -> Option<(IdleStatus, Instant)> {
        let deadline = Instant::now() + limit;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.next_idle(remaining).await? {
                (id, status, at) if id == session.id() => return Some((status, at)),
                _ => continue,
            }
        }
    }

    /// Events already delivered, without waiting
    pub fn drain(&mut self) -> Vec<(SessionId, Event, Instant)> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Single processor pipe acceptor with a recording handler, bound to [`PORT`]
pub fn pipe_acceptor() -> (PipeAcceptor, Recorder) {
    let acceptor = PipeAcceptor::new(AcceptorConfig::default().with_processor_count(1)).unwrap();
    let (handler, recorder) = RecordingHandler::new();
    acceptor.set_handler(handler);
    acceptor.bind(PORT).unwrap();
    (acceptor, recorder)
}
