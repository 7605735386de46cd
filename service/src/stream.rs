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

//! Connection oriented (TCP) acceptor

use crate::{AcceptorConfig, AcceptorCore, BindError, IoAcceptor, Result, Transport};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::select;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct Listener {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Acceptor for TCP connections
///
/// Every accepted connection becomes a session on one of the acceptor's
/// processors.
///
/// # Example
///
/// ```no_run
/// use sessionix_service::{AcceptorConfig, CallbackHandler, IoAcceptor, StreamAcceptor};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let acceptor = StreamAcceptor::new(AcceptorConfig::default())?;
///     acceptor.session_config().set_both_idle_time(30);
///     acceptor.set_handler(Arc::new(CallbackHandler::default()));
///
///     let local = acceptor.bind("127.0.0.1:2323".parse()?).await?;
///     println!("Listening on {}", local);
///
///     tokio::signal::ctrl_c().await?;
///     acceptor.dispose().await;
///     Ok(())
/// }
/// ```
pub struct StreamAcceptor {
    core: Arc<AcceptorCore>,
    listeners: DashMap<SocketAddr, Listener>,
}

impl StreamAcceptor {
    /// Create an acceptor and start its processors
    pub fn new(config: AcceptorConfig) -> Result<Self> {
        Ok(Self {
            core: AcceptorCore::new(config)?,
            listeners: DashMap::new(),
        })
    }

    /// Bind a listener and start accepting on it
    ///
    /// Returns the bound address.
    #[tracing::instrument(skip(self))]
    pub async fn bind(&self, addr: SocketAddr) -> Result<SocketAddr> {
        self.core.ensure_ready()?;
        if self.listeners.contains_key(&addr) {
            return Err(BindError::AddressInUse(addr.into()).into());
        }

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|error| BindError::from_io(addr.into(), error))?;
        let local = listener.local_addr()?;

        match self.listeners.entry(local) {
            Entry::Occupied(_) => Err(BindError::AddressInUse(local.into()).into()),
            Entry::Vacant(entry) => {
                let cancel = CancellationToken::new();
                let task = tokio::spawn(accept_loop(
                    self.core.clone(),
                    listener,
                    local,
                    cancel.clone(),
                ));
                entry.insert(Listener { cancel, task });
                tracing::info!(%local, "Stream acceptor bound");
                Ok(local)
            }
        }
    }

    /// Stop accepting on `addr`
    ///
    /// Established sessions stay open.
    #[tracing::instrument(skip(self))]
    pub async fn unbind(&self, addr: SocketAddr) -> Result<()> {
        let (_, listener) = self
            .listeners
            .remove(&addr)
            .ok_or(BindError::NotBound(addr.into()))?;
        listener.cancel.cancel();
        if let Err(error) = listener.task.await {
            tracing::error!(%addr, error = %error, "Accept loop failed");
        }
        tracing::info!(%addr, "Stream acceptor unbound");
        Ok(())
    }

    /// Addresses currently bound
    pub fn local_addresses(&self) -> Vec<SocketAddr> {
        self.listeners.iter().map(|entry| *entry.key()).collect()
    }

    /// Unbind everything, close managed sessions and stop the processors
    pub async fn dispose(&self) {
        for addr in self.local_addresses() {
            let _ = self.unbind(addr).await;
        }
        self.core.dispose().await;
    }
}

impl IoAcceptor for StreamAcceptor {
    fn core(&self) -> &Arc<AcceptorCore> {
        &self.core
    }
}

impl Drop for StreamAcceptor {
    fn drop(&mut self) {
        for listener in self.listeners.iter() {
            listener.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for StreamAcceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamAcceptor")
            .field("local_addresses", &self.local_addresses())
            .field("core", &self.core)
            .finish()
    }
}

async fn accept_loop(
    core: Arc<AcceptorCore>,
    listener: TcpListener,
    local: SocketAddr,
    cancel: CancellationToken,
) {
    loop {
        let (socket, remote) = select! {
            _ = cancel.cancelled() => break,
            result = listener.accept() => match result {
                Ok(accepted) => accepted,
                Err(error) => {
                    tracing::error!(%local, error = %error, "Failed to accept connection");
                    core.metrics().io_error();

                    // Back off on errors to avoid tight loop
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
            },
        };

        tracing::debug!(%remote, "Accepted connection");
        let transport = Transport::tcp(socket, core.session_config().read_buffer_size());

        // Opening runs handler callbacks; keep accepting meanwhile
        let core = core.clone();
        tokio::spawn(async move {
            if let Err(error) = core
                .create_session(remote.into(), local.into(), transport, None)
                .await
            {
                tracing::warn!(%remote, error = %error, "Connection rejected");
            }
        });
    }

    tracing::info!(%local, "Accept loop terminated");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CallbackHandler, SessionError};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    fn echo_acceptor() -> StreamAcceptor {
        let acceptor =
            StreamAcceptor::new(AcceptorConfig::default().with_processor_count(2)).unwrap();
        acceptor.set_handler(Arc::new(CallbackHandler {
            on_message: Some(Box::new(|session, message| {
                let _ = session.write(message);
            })),
            ..Default::default()
        }));
        acceptor
    }

    #[tokio::test]
    async fn test_echo() {
        let acceptor = echo_acceptor();
        let local = acceptor.bind("127.0.0.1:0".parse().unwrap()).await.unwrap();

        let mut client = TcpStream::connect(local).await.unwrap();
        client.write_all(b"ping").await.unwrap();

        let mut buf = [0u8; 4];
        tokio::time::timeout(Duration::from_secs(5), client.read_exact(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf, b"ping");
        assert_eq!(acceptor.managed_session_count(), 1);

        acceptor.dispose().await;
        assert_eq!(acceptor.managed_session_count(), 0);
    }

    #[tokio::test]
    async fn test_bind_twice_fails() {
        let acceptor = echo_acceptor();
        let local = acceptor.bind("127.0.0.1:0".parse().unwrap()).await.unwrap();

        let error = acceptor.bind(local).await.unwrap_err();
        assert!(error.is_address_in_use());

        let other = echo_acceptor();
        let error = other.bind(local).await.unwrap_err();
        assert!(error.is_address_in_use());
    }

    #[tokio::test]
    async fn test_unbind_keeps_sessions() {
        let acceptor = echo_acceptor();
        let local = acceptor.bind("127.0.0.1:0".parse().unwrap()).await.unwrap();

        let mut client = TcpStream::connect(local).await.unwrap();
        client.write_all(b"a").await.unwrap();
        let mut buf = [0u8; 1];
        client.read_exact(&mut buf).await.unwrap();

        acceptor.unbind(local).await.unwrap();
        assert!(matches!(
            acceptor.unbind(local).await,
            Err(SessionError::Bind(BindError::NotBound(_)))
        ));

        client.write_all(b"b").await.unwrap();
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"b");
        assert_eq!(acceptor.managed_session_count(), 1);
    }
}
