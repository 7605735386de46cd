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

//! I/O processor implementation
//!
//! An IoProcessor is a single task that exclusively owns a set of sessions.
//! Its loop waits on three things at once:
//!
//! - control commands (register, write, close, shutdown)
//! - inbound data from every owned session, merged into one stream
//! - the idle sweep timer
//!
//! Because only this task touches a session's idle state, none of that needs
//! a lock. Handler callbacks are awaited in place, so a slow handler holds up
//! every session on the same processor. Transport writes are not: each session
//! has its own writer task, and completed writes come back to the loop as
//! outcomes, so a peer that stops draining only stalls its own session.

use crate::dispatch::{SessionEvent, dispatch, exception};
use crate::{ProcessorConfig, Result, ServiceMetrics, Session, SessionError, Transport, TransportWriter};
use bytes::Bytes;
use futures::stream::{self, AbortHandle, BoxStream, SelectAll, StreamExt};
use sessionix_session::{SessionId, SessionState, due_statuses};
use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::select;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval, timeout};

/// Called once after a session has closed, for owner bookkeeping
pub(crate) type CloseHook = Box<dyn FnOnce(&Session) + Send + 'static>;

type InboundEvent = (SessionId, Option<io::Result<Bytes>>);

/// Result of one transport write, reported by a session's writer task
type WriteOutcome = (SessionId, Bytes, Result<usize>);

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

tokio::task_local! {
    /// Serial of the processor whose task is currently running
    static ACTIVE_PROCESSOR: u64;
}

/// Control messages for the processor
pub(crate) enum ProcessorCommand {
    /// Take ownership of a session and open it
    Register {
        session: Session,
        transport: Transport,
        on_closed: Option<CloseHook>,
        ack: oneshot::Sender<()>,
    },
    /// Write data to a session
    Write { id: SessionId, data: Bytes },
    /// Close a session
    Close { id: SessionId },
    /// Close every session and stop
    Shutdown,
}

impl std::fmt::Debug for ProcessorCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Register { session, .. } => write!(f, "Register({})", session.id()),
            Self::Write { id, data } => write!(f, "Write({}, {} bytes)", id, data.len()),
            Self::Close { id } => write!(f, "Close({})", id),
            Self::Shutdown => write!(f, "Shutdown"),
        }
    }
}

/// Handle for sending commands to a running processor
#[derive(Debug, Clone)]
pub struct ProcessorHandle {
    index: usize,
    serial: u64,
    commands: mpsc::UnboundedSender<ProcessorCommand>,
}

impl ProcessorHandle {
    /// Index of the processor within its pool
    pub fn index(&self) -> usize {
        self.index
    }

    /// Check if the processor is still accepting commands
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    /// Check if the caller is running on this processor's task
    pub(crate) fn is_current(&self) -> bool {
        ACTIVE_PROCESSOR
            .try_with(|serial| *serial == self.serial)
            .unwrap_or(false)
    }

    /// Hand a session over and wait until it has been opened
    ///
    /// From a handler callback running on this same processor the wait would
    /// never end, so there the session is only queued and opens once the
    /// callback returns.
    pub(crate) async fn register(
        &self,
        session: Session,
        transport: Transport,
        on_closed: Option<CloseHook>,
    ) -> Result<()> {
        let (ack, opened) = oneshot::channel();
        self.commands
            .send(ProcessorCommand::Register {
                session,
                transport,
                on_closed,
                ack,
            })
            .map_err(|_| SessionError::ProcessorUnavailable)?;
        if self.is_current() {
            return Ok(());
        }
        opened.await.map_err(|_| SessionError::ProcessorUnavailable)
    }

    pub(crate) fn write(&self, id: SessionId, data: Bytes) -> Result<()> {
        self.commands
            .send(ProcessorCommand::Write { id, data })
            .map_err(|_| SessionError::ProcessorUnavailable)
    }

    pub(crate) fn close(&self, id: SessionId) -> Result<()> {
        self.commands
            .send(ProcessorCommand::Close { id })
            .map_err(|_| SessionError::ProcessorUnavailable)
    }

    pub(crate) fn shutdown(&self) {
        let _ = self.commands.send(ProcessorCommand::Shutdown);
    }

    #[cfg(test)]
    pub(crate) fn detached(index: usize) -> (Self, mpsc::UnboundedReceiver<ProcessorCommand>) {
        let (commands, receiver) = mpsc::unbounded_channel();
        let serial = NEXT_SERIAL.fetch_add(1, Ordering::Relaxed);
        (Self { index, serial, commands }, receiver)
    }
}

/// Owned state of one session
struct SessionSlot {
    session: Session,
    outbound: mpsc::UnboundedSender<Bytes>,
    inbound: AbortHandle,
    on_closed: Option<CloseHook>,
}

/// Reactor task owning a disjoint set of sessions
pub struct IoProcessor {
    index: usize,
    config: ProcessorConfig,
    metrics: Arc<ServiceMetrics>,
    commands: mpsc::UnboundedReceiver<ProcessorCommand>,
    slots: BTreeMap<SessionId, SessionSlot>,
    inbound: SelectAll<BoxStream<'static, InboundEvent>>,
    outcomes: mpsc::UnboundedSender<WriteOutcome>,
    written: mpsc::UnboundedReceiver<WriteOutcome>,
}

impl IoProcessor {
    /// Validate `config` and spawn a processor on the current runtime
    pub fn spawn(
        index: usize,
        config: ProcessorConfig,
        metrics: Arc<ServiceMetrics>,
    ) -> Result<(ProcessorHandle, JoinHandle<()>)> {
        config.validate()?;
        let (commands, receiver) = mpsc::unbounded_channel();
        let (outcomes, written) = mpsc::unbounded_channel();
        let serial = NEXT_SERIAL.fetch_add(1, Ordering::Relaxed);
        let processor = Self {
            index,
            config,
            metrics,
            commands: receiver,
            slots: BTreeMap::new(),
            inbound: SelectAll::new(),
            outcomes,
            written,
        };
        let task = tokio::spawn(ACTIVE_PROCESSOR.scope(serial, processor.run()));
        Ok((
            ProcessorHandle {
                index,
                serial,
                commands,
            },
            task,
        ))
    }

    /// Run the processor loop until shutdown
    async fn run(mut self) {
        tracing::debug!(processor = self.index, "Processor started");

        let mut sweep = interval(self.config.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            select! {
                command = self.commands.recv() => {
                    match command {
                        Some(ProcessorCommand::Shutdown) | None => break,
                        Some(command) => self.handle_command(command).await,
                    }
                }

                Some((id, event)) = self.inbound.next(), if !self.inbound.is_empty() => {
                    self.handle_inbound(id, event).await;
                }

                Some((id, data, result)) = self.written.recv() => {
                    self.handle_written(id, data, result).await;
                }

                _ = sweep.tick() => {
                    self.sweep(Instant::now()).await;
                }
            }
        }

        self.flush_written().await;
        self.close_all().await;
        tracing::debug!(processor = self.index, "Processor stopped");
    }

    async fn handle_command(&mut self, command: ProcessorCommand) {
        match command {
            ProcessorCommand::Register {
                session,
                transport,
                on_closed,
                ack,
            } => {
                self.register(session, transport, on_closed).await;
                let _ = ack.send(());
            }
            ProcessorCommand::Write { id, data } => self.write(id, data),
            ProcessorCommand::Close { id } => {
                self.flush_written().await;
                self.close_session(id).await;
            }
            ProcessorCommand::Shutdown => {}
        }
    }

    /// Open a session, then make it visible to I/O and the idle sweep
    async fn register(
        &mut self,
        session: Session,
        transport: Transport,
        on_closed: Option<CloseHook>,
    ) {
        let id = session.id();
        let (inbound, writer) = transport.into_parts();

        session.advance_state(SessionState::Connected);
        self.metrics.session_opened();
        tracing::debug!(
            processor = self.index,
            session_id = %id,
            remote = %session.remote_address(),
            "Registering session"
        );

        dispatch(&session, &self.metrics, SessionEvent::Created).await;
        dispatch(&session, &self.metrics, SessionEvent::Opened).await;

        let (outbound, queue) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(
            session.clone(),
            writer,
            queue,
            self.outcomes.clone(),
        ));

        let (inbound, abort) = stream::abortable(inbound);
        self.inbound.push(
            inbound
                .map(move |item| (id, Some(item)))
                .chain(stream::once(async move { (id, None) }))
                .boxed(),
        );
        self.slots.insert(
            id,
            SessionSlot {
                session,
                outbound,
                inbound: abort,
                on_closed,
            },
        );
    }

    async fn handle_inbound(&mut self, id: SessionId, event: Option<io::Result<Bytes>>) {
        let Some(session) = self.slots.get(&id).map(|slot| slot.session.clone()) else {
            return;
        };

        match event {
            Some(Ok(data)) => {
                if !data.is_empty() {
                    session.activity().record_read(Instant::now(), data.len());
                    self.metrics.bytes_read(data.len() as u64);
                }
                tracing::trace!(session_id = %id, bytes = data.len(), "Read");
                dispatch(&session, &self.metrics, SessionEvent::Received(data)).await;
            }
            Some(Err(error)) => {
                self.metrics.io_error();
                exception(&session, SessionError::Io(error)).await;
                self.close_session(id).await;
            }
            None => {
                tracing::debug!(session_id = %id, "Peer closed");
                self.close_session(id).await;
            }
        }
    }

    /// Queue `data` on the session's writer task
    fn write(&self, id: SessionId, data: Bytes) {
        let Some(slot) = self.slots.get(&id) else {
            tracing::debug!(session_id = %id, bytes = data.len(), "Write for closed session dropped");
            return;
        };
        if slot.outbound.send(data).is_err() {
            tracing::debug!(session_id = %id, "Writer stopped, write dropped");
        }
    }

    async fn handle_written(&mut self, id: SessionId, data: Bytes, result: Result<usize>) {
        let Some(session) = self.slots.get(&id).map(|slot| slot.session.clone()) else {
            return;
        };

        match result {
            Ok(written) => {
                session.activity().record_write(Instant::now(), written);
                self.metrics.bytes_written(written as u64);
                dispatch(&session, &self.metrics, SessionEvent::Sent(data)).await;
            }
            Err(error) => {
                self.metrics.io_error();
                exception(&session, error).await;
                self.close_session(id).await;
            }
        }
    }

    /// Report writes that completed before a close was requested
    async fn flush_written(&mut self) {
        while let Ok((id, data, result)) = self.written.try_recv() {
            self.handle_written(id, data, result).await;
        }
    }

    /// Evaluate every owned session and report due idle statuses
    async fn sweep(&mut self, now: Instant) {
        let sessions: Vec<Session> = self.slots.values().map(|slot| slot.session.clone()).collect();

        for session in sessions {
            if !session.is_connected() {
                continue;
            }

            let thresholds = session.config().idle_thresholds();
            if thresholds.min_enabled().is_none() {
                continue;
            }
            let due = due_statuses(&session.activity().snapshot(), &thresholds, now);

            for status in due {
                if !session.is_connected() {
                    break;
                }
                session.activity().record_idle(status, now);
                self.metrics.idle_event(status);
                tracing::debug!(
                    session_id = %session.id(),
                    %status,
                    count = session.idle_count(status),
                    "Session idle"
                );
                dispatch(&session, &self.metrics, SessionEvent::Idle(status)).await;
            }
        }
    }

    /// Tear a session down; does nothing if it is not owned
    async fn close_session(&mut self, id: SessionId) {
        let Some(mut slot) = self.slots.remove(&id) else {
            return;
        };
        let session = slot.session;

        session.advance_state(SessionState::Closing);
        slot.inbound.abort();
        // The writer task drains what is queued, then closes the transport
        drop(slot.outbound);

        self.metrics
            .session_closed(session.created_at().elapsed());
        dispatch(&session, &self.metrics, SessionEvent::Closed).await;

        if let Some(on_closed) = slot.on_closed.take() {
            on_closed(&session);
        }
        session.mark_closed();

        tracing::debug!(processor = self.index, session_id = %id, "Session closed");
    }

    async fn close_all(&mut self) {
        let ids: Vec<SessionId> = self.slots.keys().copied().collect();
        for id in ids {
            self.close_session(id).await;
        }
    }
}

/// Perform one session's transport writes in order, off the processor loop
async fn write_loop(
    session: Session,
    mut writer: Box<dyn TransportWriter>,
    mut queue: mpsc::UnboundedReceiver<Bytes>,
    outcomes: mpsc::UnboundedSender<WriteOutcome>,
) {
    while let Some(data) = queue.recv().await {
        let result = match session.config().write_timeout_duration() {
            Some(limit) => match timeout(limit, writer.write(&data)).await {
                Ok(result) => result.map_err(SessionError::Io),
                Err(_) => Err(SessionError::WriteTimeout),
            },
            None => writer.write(&data).await.map_err(SessionError::Io),
        };
        let failed = result.is_err();
        if outcomes.send((session.id(), data, result)).is_err() || failed {
            break;
        }
    }

    if let Err(error) = writer.close().await {
        tracing::debug!(session_id = %session.id(), error = %error, "Error closing transport");
    }
}

impl std::fmt::Debug for IoProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoProcessor")
            .field("index", &self.index)
            .field("sessions", &self.slots.len())
            .finish()
    }
}
