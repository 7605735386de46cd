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

//! Connectionless (UDP) acceptor
//!
//! Each bound socket has one receive loop. A session stands for one remote
//! peer of one local socket; the first datagram from an unknown peer creates
//! it, and later datagrams from that peer are routed into its inbound stream.
//! Sessions can also be created up front with
//! [`new_session`](DatagramAcceptor::new_session), without any traffic.

use crate::processor::CloseHook;
use crate::{
    AcceptorConfig, AcceptorCore, BindError, IoAcceptor, Result, Session, Transport,
};
use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::channel::mpsc;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::select;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

type RouteKey = (SocketAddr, SocketAddr);

#[derive(Clone)]
struct Route {
    session: Session,
    inbound: mpsc::UnboundedSender<Bytes>,
}

struct Binding {
    socket: Arc<UdpSocket>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// State shared with the receive loops
struct Shared {
    core: Arc<AcceptorCore>,
    routes: Arc<DashMap<RouteKey, Route>>,
}

impl Shared {
    /// Find the session for `remote` on `local`, creating it if needed
    ///
    /// The route is published before the session is opened, so handlers
    /// reacting to `session_opened` can look up or create sessions
    /// themselves. A concurrent caller for the same peer may get the session
    /// while it is still opening.
    async fn route(&self, socket: &Arc<UdpSocket>, local: SocketAddr, remote: SocketAddr) -> Result<Route> {
        let key = (local, remote);
        if let Some(route) = self.routes.get(&key) {
            return Ok(route.value().clone());
        }

        let (route, receiver) = match self.routes.entry(key) {
            Entry::Occupied(entry) => return Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let session = self.core.prepare_session(remote.into(), local.into())?;
                let (inbound, receiver) = mpsc::unbounded();
                let route = Route { session, inbound };
                entry.insert(route.clone());
                (route, receiver)
            }
        };

        let transport = Transport::datagram(socket.clone(), remote, receiver);
        let routes = self.routes.clone();
        let hook: CloseHook = Box::new(move |session: &Session| {
            routes.remove_if(&key, |_, route| route.session == *session);
        });

        if let Err(error) = self
            .core
            .open_session(&route.session, transport, Some(hook))
            .await
        {
            self.routes
                .remove_if(&key, |_, current| current.session == route.session);
            return Err(error);
        }
        Ok(route)
    }
}

/// Acceptor for connectionless datagram transports
///
/// # Example
///
/// ```no_run
/// use sessionix_service::{AcceptorConfig, CallbackHandler, DatagramAcceptor, IoAcceptor};
/// use std::sync::Arc;
///
/// # async fn run() -> sessionix_service::Result<()> {
/// let acceptor = DatagramAcceptor::new(AcceptorConfig::default())?;
/// acceptor.session_config().set_reader_idle_time(3);
/// acceptor.set_handler(Arc::new(CallbackHandler::default()));
///
/// let local = acceptor.bind("127.0.0.1:0".parse().unwrap()).await?;
/// let session = acceptor
///     .new_session("127.0.0.1:9999".parse().unwrap(), local)
///     .await?;
/// assert_eq!(session.config().reader_idle_time(), 3);
/// # Ok(())
/// # }
/// ```
pub struct DatagramAcceptor {
    shared: Arc<Shared>,
    bindings: DashMap<SocketAddr, Binding>,
}

impl DatagramAcceptor {
    /// Create an acceptor and start its processors
    pub fn new(config: AcceptorConfig) -> Result<Self> {
        Ok(Self {
            shared: Arc::new(Shared {
                core: AcceptorCore::new(config)?,
                routes: Arc::new(DashMap::new()),
            }),
            bindings: DashMap::new(),
        })
    }

    /// Bind a socket and start receiving on it
    ///
    /// Returns the bound address, which differs from `addr` when an
    /// ephemeral port was requested.
    #[tracing::instrument(skip(self))]
    pub async fn bind(&self, addr: SocketAddr) -> Result<SocketAddr> {
        self.shared.core.ensure_ready()?;
        if self.bindings.contains_key(&addr) {
            return Err(BindError::AddressInUse(addr.into()).into());
        }

        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|error| BindError::from_io(addr.into(), error))?;
        let local = socket.local_addr()?;

        match self.bindings.entry(local) {
            Entry::Occupied(_) => Err(BindError::AddressInUse(local.into()).into()),
            Entry::Vacant(entry) => {
                let socket = Arc::new(socket);
                let cancel = CancellationToken::new();
                let task = tokio::spawn(receive_loop(
                    self.shared.clone(),
                    socket.clone(),
                    local,
                    cancel.clone(),
                ));
                entry.insert(Binding {
                    socket,
                    cancel,
                    task,
                });
                tracing::info!(%local, "Datagram acceptor bound");
                Ok(local)
            }
        }
    }

    /// Stop receiving on `addr`
    ///
    /// Sessions created through the binding stay open.
    #[tracing::instrument(skip(self))]
    pub async fn unbind(&self, addr: SocketAddr) -> Result<()> {
        let (_, binding) = self
            .bindings
            .remove(&addr)
            .ok_or(BindError::NotBound(addr.into()))?;
        binding.cancel.cancel();
        if let Err(error) = binding.task.await {
            tracing::error!(%addr, error = %error, "Receive loop failed");
        }
        tracing::info!(%addr, "Datagram acceptor unbound");
        Ok(())
    }

    /// Addresses currently bound
    pub fn local_addresses(&self) -> Vec<SocketAddr> {
        self.bindings.iter().map(|entry| *entry.key()).collect()
    }

    /// Create, or return the existing, session for `remote` on `local`
    ///
    /// The session is opened without any datagram having been received. Its
    /// idle tracking starts now.
    pub async fn new_session(&self, remote: SocketAddr, local: SocketAddr) -> Result<Session> {
        let socket = self
            .bindings
            .get(&local)
            .map(|binding| binding.socket.clone())
            .ok_or(BindError::NotBound(local.into()))?;
        let route = self.shared.route(&socket, local, remote).await?;
        Ok(route.session)
    }

    /// Unbind everything, close managed sessions and stop the processors
    pub async fn dispose(&self) {
        let addresses = self.local_addresses();
        for addr in addresses {
            let _ = self.unbind(addr).await;
        }
        self.shared.core.dispose().await;
        self.shared.routes.clear();
    }
}

impl IoAcceptor for DatagramAcceptor {
    fn core(&self) -> &Arc<AcceptorCore> {
        &self.shared.core
    }
}

impl Drop for DatagramAcceptor {
    fn drop(&mut self) {
        for binding in self.bindings.iter() {
            binding.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for DatagramAcceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatagramAcceptor")
            .field("local_addresses", &self.local_addresses())
            .field("core", &self.shared.core)
            .finish()
    }
}

async fn receive_loop(
    shared: Arc<Shared>,
    socket: Arc<UdpSocket>,
    local: SocketAddr,
    cancel: CancellationToken,
) {
    let mut buf = vec![0u8; shared.core.config().max_datagram_size];

    loop {
        let (len, remote) = select! {
            _ = cancel.cancelled() => break,
            result = socket.recv_from(&mut buf) => match result {
                Ok(received) => received,
                Err(error) => {
                    tracing::error!(%local, error = %error, "Failed to receive datagram");
                    shared.core.metrics().io_error();

                    // Back off on errors to avoid tight loop
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
            },
        };

        let data = Bytes::copy_from_slice(&buf[..len]);
        match shared.route(&socket, local, remote).await {
            Ok(route) => {
                if route.inbound.unbounded_send(data).is_err() {
                    tracing::debug!(%remote, "Session closed, datagram dropped");
                }
            }
            Err(error) => {
                tracing::warn!(%remote, error = %error, "Datagram dropped");
            }
        }
    }

    tracing::debug!(%local, "Receive loop terminated");
}
