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

//! Session transports
//!
//! A [`Transport`] is the pair a processor needs to drive a session: a stream
//! of inbound chunks, polled together with every other session it owns, and
//! a writer for outbound data. The inbound stream ending means the peer went
//! away; an `Err` item is a transport failure.

use async_trait::async_trait;
use bytes::Bytes;
use futures::channel::mpsc;
use futures::stream::{BoxStream, StreamExt};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpStream, UdpSocket};
use tokio_util::codec::{BytesCodec, FramedRead};

/// Inbound half of a transport
pub type InboundStream = BoxStream<'static, io::Result<Bytes>>;

/// Outbound half of a transport
#[async_trait]
pub trait TransportWriter: Send + 'static {
    /// Write `data`, returning the number of bytes transferred
    async fn write(&mut self, data: &Bytes) -> io::Result<usize>;

    /// Release the outbound side
    async fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Inbound stream and writer for one session
pub struct Transport {
    inbound: InboundStream,
    writer: Box<dyn TransportWriter>,
}

impl Transport {
    /// Build a transport from its parts
    pub fn new(inbound: InboundStream, writer: Box<dyn TransportWriter>) -> Self {
        Self { inbound, writer }
    }

    /// Wrap an accepted TCP stream
    pub fn tcp(stream: TcpStream, read_buffer_size: usize) -> Self {
        let (read_half, write_half) = stream.into_split();
        let inbound = FramedRead::with_capacity(read_half, BytesCodec::new(), read_buffer_size)
            .map(|chunk| chunk.map(|bytes| bytes.freeze()))
            .boxed();
        Self::new(inbound, Box::new(TcpWriter { inner: write_half }))
    }

    /// Wrap one remote peer of a shared datagram socket
    ///
    /// The acceptor's receive loop feeds datagrams from `remote` into the
    /// channel behind `inbound`.
    pub fn datagram(
        socket: Arc<UdpSocket>,
        remote: SocketAddr,
        inbound: mpsc::UnboundedReceiver<Bytes>,
    ) -> Self {
        Self::new(
            inbound.map(Ok).boxed(),
            Box::new(DatagramWriter { socket, remote }),
        )
    }

    /// Create an in-memory transport and the peer end that drives it
    pub fn pipe() -> (Self, PipePeer) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded();
        let (outbound_tx, outbound_rx) = mpsc::unbounded();
        let transport = Self::new(
            inbound_rx.boxed(),
            Box::new(PipeWriter {
                outbound: outbound_tx,
            }),
        );
        let peer = PipePeer {
            inbound: inbound_tx,
            outbound: outbound_rx,
        };
        (transport, peer)
    }

    pub(crate) fn into_parts(self) -> (InboundStream, Box<dyn TransportWriter>) {
        (self.inbound, self.writer)
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport").finish_non_exhaustive()
    }
}

struct TcpWriter {
    inner: OwnedWriteHalf,
}

#[async_trait]
impl TransportWriter for TcpWriter {
    async fn write(&mut self, data: &Bytes) -> io::Result<usize> {
        self.inner.write_all(data).await?;
        self.inner.flush().await?;
        Ok(data.len())
    }

    async fn close(&mut self) -> io::Result<()> {
        self.inner.shutdown().await
    }
}

struct DatagramWriter {
    socket: Arc<UdpSocket>,
    remote: SocketAddr,
}

#[async_trait]
impl TransportWriter for DatagramWriter {
    async fn write(&mut self, data: &Bytes) -> io::Result<usize> {
        self.socket.send_to(data, self.remote).await
    }
}

struct PipeWriter {
    outbound: mpsc::UnboundedSender<Bytes>,
}

#[async_trait]
impl TransportWriter for PipeWriter {
    async fn write(&mut self, data: &Bytes) -> io::Result<usize> {
        self.outbound
            .unbounded_send(data.clone())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "pipe peer dropped"))?;
        Ok(data.len())
    }

    async fn close(&mut self) -> io::Result<()> {
        self.outbound.close_channel();
        Ok(())
    }
}

/// Remote end of an in-memory pipe transport
///
/// Bytes sent here are read by the session; bytes the session writes are
/// received here.
#[derive(Debug)]
pub struct PipePeer {
    inbound: mpsc::UnboundedSender<io::Result<Bytes>>,
    outbound: mpsc::UnboundedReceiver<Bytes>,
}

impl PipePeer {
    /// Deliver `data` to the session; returns `false` once the session is gone
    pub fn send(&self, data: impl Into<Bytes>) -> bool {
        self.inbound.unbounded_send(Ok(data.into())).is_ok()
    }

    /// Deliver a transport failure to the session
    pub fn fail(&self, error: io::Error) -> bool {
        self.inbound.unbounded_send(Err(error)).is_ok()
    }

    /// Receive the next chunk written by the session
    ///
    /// Returns `None` once the session closed its side.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.outbound.next().await
    }

    /// Hang up, ending the session's inbound stream
    pub fn close(&self) {
        self.inbound.close_channel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pipe_round_trip() {
        let (transport, mut peer) = Transport::pipe();
        let (mut inbound, mut writer) = transport.into_parts();

        assert!(peer.send("ping"));
        assert_eq!(
            inbound.next().await.unwrap().unwrap(),
            Bytes::from_static(b"ping")
        );

        assert_eq!(writer.write(&Bytes::from_static(b"pong")).await.unwrap(), 4);
        assert_eq!(peer.recv().await, Some(Bytes::from_static(b"pong")));

        writer.close().await.unwrap();
        assert_eq!(peer.recv().await, None);
    }

    #[tokio::test]
    async fn test_pipe_hang_up_and_failure() {
        let (transport, peer) = Transport::pipe();
        let (mut inbound, _writer) = transport.into_parts();

        assert!(peer.fail(io::Error::new(io::ErrorKind::ConnectionReset, "reset")));
        let failure = inbound.next().await.unwrap().unwrap_err();
        assert_eq!(failure.kind(), io::ErrorKind::ConnectionReset);

        peer.close();
        assert!(inbound.next().await.is_none());
        assert!(!peer.send("late"));
    }

    #[tokio::test]
    async fn test_tcp_transport() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client_task = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });
        let (server, _) = listener.accept().await.unwrap();
        let mut client = client_task.await.unwrap();

        let (mut inbound, mut writer) = Transport::tcp(server, 1024).into_parts();

        client.write_all(b"hello").await.unwrap();
        let mut received = Vec::new();
        while received.len() < 5 {
            received.extend_from_slice(&inbound.next().await.unwrap().unwrap());
        }
        assert_eq!(received, b"hello");

        writer.write(&Bytes::from_static(b"world")).await.unwrap();
        let mut buf = [0u8; 5];
        tokio::io::AsyncReadExt::read_exact(&mut client, &mut buf)
            .await
            .unwrap();
        assert_eq!(&buf, b"world");

        drop(client);
        assert!(inbound.next().await.is_none());
    }
}
