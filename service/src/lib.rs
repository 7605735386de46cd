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

//! Session Service Implementation
//!
//! This crate drives sessions over stream, datagram and in-memory transports
//! and tells handlers when a session has gone quiet:
//!
//! - Per-session reader, writer and both idle thresholds, in seconds
//! - Repeated notification while a session stays idle
//! - Acceptor defaults copied into each session at creation
//! - Handler failures routed to `exception_caught`, never to the caller
//! - Lock-free metrics and monitoring
//!
//! # Architecture
//!
//! ```text
//! StreamAcceptor / DatagramAcceptor / PipeAcceptor
//!     ↓
//! AcceptorCore (handler, default SessionConfig, session registry)
//!     ↓
//! ProcessorPool → IoProcessor (I/O, dispatch, idle sweep) → Session
//! ```
//!
//! # Example
//!
//! ```no_run
//! use sessionix_service::{
//!     AcceptorConfig, HandlerResult, IdleStatus, IoAcceptor, Session, SessionHandler,
//!     StreamAcceptor,
//! };
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! struct Reaper;
//!
//! #[async_trait]
//! impl SessionHandler for Reaper {
//!     async fn session_idle(&self, session: &Session, status: IdleStatus) -> HandlerResult {
//!         if status == IdleStatus::BothIdle {
//!             session.close();
//!         }
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let acceptor = StreamAcceptor::new(AcceptorConfig::default())?;
//!     acceptor.session_config().set_both_idle_time(60);
//!     acceptor.set_handler(Arc::new(Reaper));
//!     acceptor.bind("0.0.0.0:4000".parse()?).await?;
//!     tokio::signal::ctrl_c().await?;
//!     acceptor.dispose().await;
//!     Ok(())
//! }
//! ```

mod acceptor;
mod config;
mod datagram;
mod dispatch;
mod error;
mod handler;
mod metrics;
mod pipe;
mod pool;
mod processor;
mod session;
mod stream;
mod transport;

pub use acceptor::{AcceptorCore, IoAcceptor};
pub use config::{AcceptorConfig, MAX_SWEEP_INTERVAL, ProcessorConfig};
pub use datagram::DatagramAcceptor;
pub use error::{BindError, Result, SessionError};
pub use handler::{CallbackHandler, HandlerError, HandlerResult, SessionHandler};
pub use metrics::{MetricsSnapshot, ServiceMetrics};
pub use pipe::{PipeAcceptor, PipeConnection};
pub use pool::ProcessorPool;
pub use processor::{IoProcessor, ProcessorHandle};
pub use session::Session;
pub use stream::StreamAcceptor;
pub use transport::{InboundStream, PipePeer, Transport, TransportWriter};

pub use sessionix_session::{
    ConfigError, EndpointAddress, IdleStatus, IdleStatuses, SessionConfig, SessionConfigValues,
    SessionId, SessionState,
};
