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

//! In-process acceptor
//!
//! Pipe sessions run through the same processors, dispatch and idle sweep
//! as network sessions but never touch a socket. Together with paused tokio
//! time this makes idle behavior testable without real waiting.

use crate::{
    AcceptorConfig, AcceptorCore, BindError, IoAcceptor, PipePeer, Result, Session, Transport,
};
use dashmap::DashSet;
use sessionix_session::EndpointAddress;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// First port handed out to connecting peers
const FIRST_REMOTE_PORT: u64 = 1 << 32;

/// A connected pipe: the server side session and the client side peer
#[derive(Debug)]
pub struct PipeConnection {
    /// Session as seen by the acceptor's handler
    pub session: Session,
    /// Client end of the pipe
    pub peer: PipePeer,
}

/// Acceptor for in-memory pipe transports
pub struct PipeAcceptor {
    core: Arc<AcceptorCore>,
    ports: DashSet<u64>,
    next_remote: AtomicU64,
}

impl PipeAcceptor {
    /// Create an acceptor and start its processors
    pub fn new(config: AcceptorConfig) -> Result<Self> {
        Ok(Self {
            core: AcceptorCore::new(config)?,
            ports: DashSet::new(),
            next_remote: AtomicU64::new(FIRST_REMOTE_PORT),
        })
    }

    /// Start accepting connections on `port`
    pub fn bind(&self, port: u64) -> Result<()> {
        self.core.ensure_ready()?;
        if !self.ports.insert(port) {
            return Err(BindError::AddressInUse(EndpointAddress::Pipe(port)).into());
        }
        tracing::debug!(port, "Pipe acceptor bound");
        Ok(())
    }

    /// Stop accepting connections on `port`
    pub fn unbind(&self, port: u64) -> Result<()> {
        self.ports
            .remove(&port)
            .ok_or(BindError::NotBound(EndpointAddress::Pipe(port)))?;
        tracing::debug!(port, "Pipe acceptor unbound");
        Ok(())
    }

    /// Ports currently bound
    pub fn local_ports(&self) -> Vec<u64> {
        self.ports.iter().map(|port| *port).collect()
    }

    /// Connect to `port`
    ///
    /// Returns once the session has been opened by its processor.
    pub async fn connect(&self, port: u64) -> Result<PipeConnection> {
        if !self.ports.contains(&port) {
            return Err(BindError::NotBound(EndpointAddress::Pipe(port)).into());
        }

        let remote = self.next_remote.fetch_add(1, Ordering::Relaxed);
        let (transport, peer) = Transport::pipe();
        let session = self
            .core
            .create_session(
                EndpointAddress::Pipe(remote),
                EndpointAddress::Pipe(port),
                transport,
                None,
            )
            .await?;
        Ok(PipeConnection { session, peer })
    }

    /// Unbind everything, close managed sessions and stop the processors
    pub async fn dispose(&self) {
        self.ports.clear();
        self.core.dispose().await;
    }
}

impl IoAcceptor for PipeAcceptor {
    fn core(&self) -> &Arc<AcceptorCore> {
        &self.core
    }
}

impl std::fmt::Debug for PipeAcceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeAcceptor")
            .field("ports", &self.local_ports())
            .field("core", &self.core)
            .finish()
    }
}
