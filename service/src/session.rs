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

//! Session handle

use crate::{ProcessorHandle, Result, SessionError, SessionHandler};
use bytes::Bytes;
use sessionix_session::{
    ActivityTracker, EndpointAddress, IdleStatus, SessionConfig, SessionId, SessionState,
};
use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

type Attributes = HashMap<String, Arc<dyn Any + Send + Sync>>;

/// A single connection or peer association
///
/// This is a cheap handle; clones refer to the same session. The processor
/// that owns the session is the only writer of its activity timestamps and
/// idle state. Application code uses the handle to read those, to change
/// the session's [`SessionConfig`], and to request writes or a close.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    // Identity (immutable)
    id: SessionId,
    remote_address: EndpointAddress,
    local_address: EndpointAddress,

    config: SessionConfig,
    activity: ActivityTracker,
    state: AtomicU8,

    handler: Arc<dyn SessionHandler>,
    processor: ProcessorHandle,
    closed: CancellationToken,

    // User-defined metadata storage
    attributes: RwLock<Attributes>,
}

impl Session {
    /// Create a session in the `Created` state; creation time is now
    pub(crate) fn new(
        id: SessionId,
        remote_address: EndpointAddress,
        local_address: EndpointAddress,
        config: SessionConfig,
        handler: Arc<dyn SessionHandler>,
        processor: ProcessorHandle,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                id,
                remote_address,
                local_address,
                config,
                activity: ActivityTracker::new(Instant::now()),
                state: AtomicU8::new(SessionState::Created.as_u8()),
                handler,
                processor,
                closed: CancellationToken::new(),
                attributes: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Get the session ID
    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    /// Get the remote endpoint
    pub fn remote_address(&self) -> EndpointAddress {
        self.inner.remote_address
    }

    /// Get the local endpoint
    pub fn local_address(&self) -> EndpointAddress {
        self.inner.local_address
    }

    /// Get the live per-session configuration
    ///
    /// Changes apply from the next idle sweep on.
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Get the handler receiving this session's events
    pub fn handler(&self) -> &Arc<dyn SessionHandler> {
        &self.inner.handler
    }

    /// Index of the processor that owns this session
    pub fn processor_index(&self) -> usize {
        self.inner.processor.index()
    }

    pub(crate) fn processor(&self) -> &ProcessorHandle {
        &self.inner.processor
    }

    // State

    /// Get the current state
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    /// Check if the session is registered and not closing
    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Check if the session is closing or closed
    pub fn is_closing(&self) -> bool {
        self.state().is_terminal()
    }

    /// Move the state forward to `state`, never backwards
    ///
    /// Returns the previous state.
    pub(crate) fn advance_state(&self, state: SessionState) -> SessionState {
        SessionState::from_u8(self.inner.state.fetch_max(state.as_u8(), Ordering::AcqRel))
    }

    pub(crate) fn activity(&self) -> &ActivityTracker {
        &self.inner.activity
    }

    pub(crate) fn mark_closed(&self) {
        self.advance_state(SessionState::Closed);
        self.inner.closed.cancel();
    }

    // Activity

    /// When the session was created
    pub fn created_at(&self) -> Instant {
        self.inner.activity.created_at()
    }

    /// Last read, or creation time if nothing was read yet
    pub fn last_read_time(&self) -> Instant {
        self.inner.activity.last_read()
    }

    /// Last write, or creation time if nothing was written yet
    pub fn last_write_time(&self) -> Instant {
        self.inner.activity.last_write()
    }

    /// Most recent read or write
    pub fn last_io_time(&self) -> Instant {
        self.inner.activity.last_io()
    }

    /// Last time `status` was reported, or creation time if never
    pub fn last_idle_time(&self, status: IdleStatus) -> Instant {
        self.inner.activity.last_idle(status)
    }

    /// Consecutive `status` notifications since the relevant activity
    pub fn idle_count(&self, status: IdleStatus) -> u64 {
        self.inner.activity.idle_count(status)
    }

    /// Check if `status` has been reported since the relevant activity
    pub fn is_idle(&self, status: IdleStatus) -> bool {
        self.idle_count(status) > 0
    }

    /// Total bytes read
    pub fn read_bytes(&self) -> u64 {
        self.inner.activity.read_bytes()
    }

    /// Total bytes written
    pub fn written_bytes(&self) -> u64 {
        self.inner.activity.written_bytes()
    }

    /// Total non-empty reads
    pub fn read_messages(&self) -> u64 {
        self.inner.activity.read_messages()
    }

    /// Total non-empty writes
    pub fn written_messages(&self) -> u64 {
        self.inner.activity.written_messages()
    }

    // Commands

    /// Queue `data` to be written by the owning processor
    ///
    /// Completion is reported through `message_sent`; failures through
    /// `exception_caught`, after which the session closes.
    pub fn write(&self, data: impl Into<Bytes>) -> Result<()> {
        if self.is_closing() {
            return Err(SessionError::SessionClosed);
        }
        self.inner.processor.write(self.id(), data.into())
    }

    /// Request the session be closed
    ///
    /// Returns `true` if this call started the close; calls on a session that
    /// is already closing or closed do nothing and return `false`.
    pub fn close(&self) -> bool {
        let mut current = self.inner.state.load(Ordering::Acquire);
        loop {
            if SessionState::from_u8(current).is_terminal() {
                return false;
            }
            match self.inner.state.compare_exchange(
                current,
                SessionState::Closing.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        tracing::debug!(session_id = %self.id(), "Close requested");
        if self.inner.processor.close(self.id()).is_err() {
            tracing::warn!(
                session_id = %self.id(),
                "Processor unavailable, marking session closed"
            );
            self.mark_closed();
        }
        true
    }

    /// Wait until the session is closed and `session_closed` has run
    pub async fn closed(&self) {
        self.inner.closed.cancelled().await
    }

    // Attributes

    /// Store a user attribute, replacing any previous value under `key`
    pub fn set_attribute<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.inner
            .attributes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), Arc::new(value));
    }

    /// Get a user attribute, if present and of type `T`
    pub fn attribute<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let value = self
            .inner
            .attributes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()?;
        value.downcast::<T>().ok()
    }

    /// Remove a user attribute, returning whether it existed
    pub fn remove_attribute(&self, key: &str) -> bool {
        self.inner
            .attributes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some()
    }

    /// Check if a user attribute exists under `key`
    pub fn contains_attribute(&self, key: &str) -> bool {
        self.inner
            .attributes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }
}

impl PartialEq for Session {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Session {}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id())
            .field("state", &self.state())
            .field("remote_address", &self.remote_address())
            .field("local_address", &self.local_address())
            .field("config", self.config())
            .finish()
    }
}
