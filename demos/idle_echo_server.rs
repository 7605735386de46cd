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

//! Idle-Aware Echo Server Example
//!
//! This example demonstrates a TCP and UDP echo server that:
//! - Accepts TCP connections on port 4000 and datagrams on port 4001
//! - Echoes back anything received
//! - Nudges clients that have not sent anything for 10 seconds
//! - Disconnects clients that have been silent both ways for 30 seconds
//!
//! ## Usage
//!
//! Run the server:
//! ```bash
//! cargo run --example idle_echo_server
//! ```
//!
//! Connect with a TCP client:
//! ```bash
//! nc localhost 4000
//! ```
//!
//! Or send datagrams:
//! ```bash
//! nc -u localhost 4001
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use sessionix_service::{
    AcceptorConfig, DatagramAcceptor, HandlerResult, IdleStatus, IoAcceptor, Session,
    SessionError, SessionHandler, StreamAcceptor,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for logging
    tracing_subscriber::fmt::init();

    println!("Starting Sessionix idle echo server");
    println!("TCP on 127.0.0.1:4000, UDP on 127.0.0.1:4001");
    println!("Press Ctrl+C to stop the server\n");

    let config = AcceptorConfig::default().with_max_sessions(100);
    let handler = Arc::new(EchoHandler);

    let stream = StreamAcceptor::new(config.clone())?;
    stream.session_config().set_reader_idle_time(10);
    stream.session_config().set_both_idle_time(30);
    stream.set_handler(handler.clone());
    stream.bind("127.0.0.1:4000".parse()?).await?;

    let datagram = DatagramAcceptor::new(config)?;
    datagram.session_config().set_reader_idle_time(10);
    datagram.session_config().set_both_idle_time(30);
    datagram.set_handler(handler);
    datagram.bind("127.0.0.1:4001".parse()?).await?;

    // Wait for Ctrl+C
    tokio::signal::ctrl_c().await?;
    println!("\nShutting down server...");

    stream.dispose().await;
    datagram.dispose().await;

    let snapshot = stream.metrics().snapshot();
    println!(
        "Served {} TCP sessions, {} idle notifications",
        snapshot.total_sessions,
        snapshot.total_idle_events()
    );
    println!("Server stopped");

    Ok(())
}

/// Echo handler that nags quiet clients and drops silent ones
struct EchoHandler;

#[async_trait]
impl SessionHandler for EchoHandler {
    async fn session_opened(&self, session: &Session) -> HandlerResult {
        tracing::info!("Client {} connected from {}", session.id(), session.remote_address());
        Ok(())
    }

    async fn message_received(&self, session: &Session, message: Bytes) -> HandlerResult {
        session.write(message)?;
        Ok(())
    }

    async fn session_idle(&self, session: &Session, status: IdleStatus) -> HandlerResult {
        match status {
            IdleStatus::ReaderIdle => {
                let count = session.idle_count(status);
                session.write(format!("Still there? ({} reminders)\n", count))?;
            }
            IdleStatus::BothIdle => {
                tracing::info!("Client {} silent, disconnecting", session.id());
                session.close();
            }
            _ => {}
        }
        Ok(())
    }

    async fn exception_caught(&self, session: &Session, error: &SessionError) {
        tracing::error!("Error for client {}: {}", session.id(), error);
    }

    async fn session_closed(&self, session: &Session) -> HandlerResult {
        tracing::info!(
            "Client {} disconnected after {:?}",
            session.id(),
            session.created_at().elapsed()
        );
        Ok(())
    }
}
