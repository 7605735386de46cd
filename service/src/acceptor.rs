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

//! Acceptor core shared by every transport
//!
//! The core owns what all acceptors have in common: the default session
//! configuration, the handler, the processor pool and the registry of
//! managed sessions. Transport specific acceptors only decide where
//! transports come from and hand them to [`AcceptorCore::create_session`].

use crate::processor::CloseHook;
use crate::{
    AcceptorConfig, ProcessorPool, Result, ServiceMetrics, Session, SessionError, SessionHandler,
    Transport,
};
use dashmap::DashMap;
use sessionix_session::{EndpointAddress, SessionConfig, SessionId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

/// How long `dispose` waits for managed sessions to finish closing
const DISPOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// State shared by all acceptor implementations
pub struct AcceptorCore {
    config: AcceptorConfig,
    session_config: SessionConfig,
    handler: RwLock<Option<Arc<dyn SessionHandler>>>,
    pool: ProcessorPool,
    sessions: Arc<DashMap<SessionId, Session>>,
    metrics: Arc<ServiceMetrics>,
    disposed: AtomicBool,
}

impl AcceptorCore {
    /// Validate `config` and start the processor pool
    pub fn new(config: AcceptorConfig) -> Result<Arc<Self>> {
        config.validate()?;
        let metrics = Arc::new(ServiceMetrics::new());
        let pool = ProcessorPool::new(
            config.processor_count,
            config.processor.clone(),
            metrics.clone(),
        )?;

        Ok(Arc::new(Self {
            config,
            session_config: SessionConfig::new(),
            handler: RwLock::new(None),
            pool,
            sessions: Arc::new(DashMap::new()),
            metrics,
            disposed: AtomicBool::new(false),
        }))
    }

    /// Get the acceptor configuration
    pub fn config(&self) -> &AcceptorConfig {
        &self.config
    }

    /// Default configuration copied into each new session
    pub fn session_config(&self) -> &SessionConfig {
        &self.session_config
    }

    /// Set the handler used for sessions created from now on
    pub fn set_handler(&self, handler: Arc<dyn SessionHandler>) {
        *self.handler.write().unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    /// Get the current handler
    pub fn handler(&self) -> Option<Arc<dyn SessionHandler>> {
        self.handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Snapshot of the sessions currently managed
    pub fn managed_sessions(&self) -> Vec<Session> {
        self.sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Get a managed session by ID
    pub fn managed_session(&self, id: SessionId) -> Option<Session> {
        self.sessions.get(&id).map(|entry| entry.value().clone())
    }

    /// Number of sessions currently managed
    pub fn managed_session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Get the acceptor metrics
    pub fn metrics(&self) -> &Arc<ServiceMetrics> {
        &self.metrics
    }

    /// Check if the acceptor has been disposed
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Fail if no handler is set or the acceptor is disposed
    pub(crate) fn ensure_ready(&self) -> Result<Arc<dyn SessionHandler>> {
        if self.is_disposed() {
            return Err(SessionError::Disposed);
        }
        self.handler().ok_or(SessionError::HandlerNotSet)
    }

    /// Create a session over `transport` and open it on a processor
    ///
    /// Returns once `session_created` and `session_opened` have run, unless
    /// called from a handler on the processor the session lands on. The
    /// session receives a copy of the acceptor's configuration as it is now;
    /// later changes to either side do not affect the other. `on_closed`
    /// runs after the session has left the acceptor registry.
    pub(crate) async fn create_session(
        &self,
        remote_address: EndpointAddress,
        local_address: EndpointAddress,
        transport: Transport,
        on_closed: Option<CloseHook>,
    ) -> Result<Session> {
        let session = self.prepare_session(remote_address, local_address)?;
        self.open_session(&session, transport, on_closed).await?;
        Ok(session)
    }

    /// Build a session and enter it in the registry without opening it
    pub(crate) fn prepare_session(
        &self,
        remote_address: EndpointAddress,
        local_address: EndpointAddress,
    ) -> Result<Session> {
        let handler = self.ensure_ready()?;

        if self.sessions.len() >= self.config.max_sessions {
            self.metrics.session_rejected();
            tracing::warn!(
                remote = %remote_address,
                max_sessions = self.config.max_sessions,
                "Session limit reached, rejecting"
            );
            return Err(SessionError::MaxSessionsReached(self.config.max_sessions));
        }

        let session = Session::new(
            SessionId::next(),
            remote_address,
            local_address,
            self.session_config.copy(),
            handler,
            self.pool.next().clone(),
        );
        self.sessions.insert(session.id(), session.clone());
        Ok(session)
    }

    /// Hand a prepared session to its processor
    ///
    /// On failure the session leaves the registry and is marked closed.
    pub(crate) async fn open_session(
        &self,
        session: &Session,
        transport: Transport,
        on_closed: Option<CloseHook>,
    ) -> Result<()> {
        let id = session.id();
        let sessions = self.sessions.clone();
        let hook: CloseHook = Box::new(move |session: &Session| {
            sessions.remove(&session.id());
            if let Some(on_closed) = on_closed {
                on_closed(session);
            }
        });

        let processor = session.processor();
        if let Err(error) = processor.register(session.clone(), transport, Some(hook)).await {
            self.sessions.remove(&id);
            session.mark_closed();
            return Err(error);
        }

        tracing::info!(
            session_id = %id,
            remote = %session.remote_address(),
            local = %session.local_address(),
            processor = processor.index(),
            "Session created"
        );
        Ok(())
    }

    /// Close every managed session and stop the processors
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        let sessions = self.managed_sessions();
        tracing::info!(sessions = sessions.len(), "Disposing acceptor");
        for session in &sessions {
            session.close();
        }

        let all_closed =
            futures_util::future::join_all(sessions.iter().map(|session| session.closed()));
        if tokio::time::timeout(DISPOSE_TIMEOUT, all_closed).await.is_err() {
            tracing::warn!("Timed out waiting for sessions to close");
        }

        self.pool.dispose().await;
        self.sessions.clear();
    }
}

impl std::fmt::Debug for AcceptorCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcceptorCore")
            .field("config", &self.config)
            .field("session_config", &self.session_config)
            .field("managed_sessions", &self.managed_session_count())
            .field("processors", &self.pool.size())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Operations common to every acceptor
///
/// Implementors only provide access to their [`AcceptorCore`].
pub trait IoAcceptor: Send + Sync {
    /// Get the shared acceptor state
    fn core(&self) -> &Arc<AcceptorCore>;

    /// Set the handler for sessions created from now on
    fn set_handler(&self, handler: Arc<dyn SessionHandler>) {
        self.core().set_handler(handler);
    }

    /// Get the current handler
    fn handler(&self) -> Option<Arc<dyn SessionHandler>> {
        self.core().handler()
    }

    /// Live default configuration for future sessions
    fn session_config(&self) -> &SessionConfig {
        self.core().session_config()
    }

    /// Snapshot of the sessions currently managed
    fn managed_sessions(&self) -> Vec<Session> {
        self.core().managed_sessions()
    }

    /// Number of sessions currently managed
    fn managed_session_count(&self) -> usize {
        self.core().managed_session_count()
    }

    /// Get the acceptor metrics
    fn metrics(&self) -> &Arc<ServiceMetrics> {
        self.core().metrics()
    }
}
