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

//! Idle detection over the datagram acceptor
//!
//! A session is created for a remote peer that never sends anything, and
//! must report reader, writer and both idle in that order.

use async_trait::async_trait;
use bytes::Bytes;
use sessionix_service::{
    AcceptorConfig, DatagramAcceptor, HandlerResult, IdleStatus, IoAcceptor, Session,
    SessionHandler,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout};

// ============================================================================
// Test Handler
// ============================================================================

struct IdleHandler {
    idle: mpsc::UnboundedSender<(IdleStatus, Instant)>,
    received: mpsc::UnboundedSender<Bytes>,
}

impl IdleHandler {
    fn new() -> (
        Arc<Self>,
        mpsc::UnboundedReceiver<(IdleStatus, Instant)>,
        mpsc::UnboundedReceiver<Bytes>,
    ) {
        let (idle, idle_rx) = mpsc::unbounded_channel();
        let (received, received_rx) = mpsc::unbounded_channel();
        (Arc::new(Self { idle, received }), idle_rx, received_rx)
    }
}

#[async_trait]
impl SessionHandler for IdleHandler {
    async fn message_received(&self, session: &Session, message: Bytes) -> HandlerResult {
        let _ = self.received.send(message.clone());
        session.write(message)?;
        Ok(())
    }

    async fn session_idle(&self, _session: &Session, status: IdleStatus) -> HandlerResult {
        let _ = self.idle.send((status, Instant::now()));
        Ok(())
    }
}

fn acceptor() -> DatagramAcceptor {
    DatagramAcceptor::new(AcceptorConfig::default().with_processor_count(2)).unwrap()
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_session_idle_without_traffic() {
    let (handler, mut idle, _received) = IdleHandler::new();
    let acceptor = acceptor();
    acceptor.session_config().set_reader_idle_time(3);
    acceptor.session_config().set_writer_idle_time(5);
    acceptor.session_config().set_both_idle_time(7);
    acceptor.set_handler(handler);

    let local = acceptor.bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let remote: SocketAddr = "127.0.0.1:9".parse().unwrap();
    let session = acceptor.new_session(remote, local).await.unwrap();

    assert_eq!(session.config().reader_idle_time(), 3);
    assert_eq!(session.config().writer_idle_time(), 5);
    assert_eq!(session.config().both_idle_time(), 7);

    let mut first_seen: Vec<(IdleStatus, Duration)> = Vec::new();
    while first_seen.len() < 3 {
        let (status, at) = timeout(Duration::from_secs(10), idle.recv())
            .await
            .expect("idle notification in time")
            .expect("handler alive");
        if !first_seen.iter().any(|(seen, _)| *seen == status) {
            first_seen.push((status, at - session.created_at()));
        }
    }

    assert_eq!(first_seen[0].0, IdleStatus::ReaderIdle);
    assert_eq!(first_seen[1].0, IdleStatus::WriterIdle);
    assert_eq!(first_seen[2].0, IdleStatus::BothIdle);
    for ((_, elapsed), threshold) in first_seen.iter().zip([3u64, 5, 7]) {
        let threshold = Duration::from_secs(threshold);
        assert!(*elapsed >= threshold && *elapsed < threshold + Duration::from_secs(1));
    }

    acceptor.dispose().await;
}

#[tokio::test]
async fn test_datagrams_reach_the_same_session() {
    let (handler, mut idle, mut received) = IdleHandler::new();
    let acceptor = acceptor();
    acceptor.session_config().set_reader_idle_time(1);
    acceptor.set_handler(handler);
    let local = acceptor.bind("127.0.0.1:0".parse().unwrap()).await.unwrap();

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let mut buf = [0u8; 64];
    for message in [&b"one"[..], b"two"] {
        client.send_to(message, local).await.unwrap();
        let (len, _) = timeout(Duration::from_secs(5), client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..len], message);
        assert_eq!(received.recv().await.as_deref(), Some(message));
    }
    assert_eq!(acceptor.managed_session_count(), 1);

    let session = acceptor.managed_sessions().remove(0);
    assert_eq!(session.read_messages(), 2);
    assert_eq!(session.written_messages(), 2);

    let (status, _) = timeout(Duration::from_secs(3), idle.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status, IdleStatus::ReaderIdle);

    acceptor.dispose().await;
}
