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

//! Idle detection tests
//!
//! All tests run on paused tokio time, so every sweep lands exactly on a
//! whole second after the acceptor was created.

mod common;

use async_trait::async_trait;
use common::{Event, PORT, pipe_acceptor};
use sessionix_service::{
    AcceptorConfig, HandlerResult, IdleStatus, IoAcceptor, PipeAcceptor, Session, SessionError,
    SessionHandler,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep, sleep_until};

const SECOND: Duration = Duration::from_secs(1);

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

/// Assert `at` falls within one sweep period after `created + threshold`
fn assert_fired_within_one_sweep(created: Instant, at: Instant, threshold: Duration) {
    let elapsed = at - created;
    assert!(
        elapsed >= threshold && elapsed < threshold + SECOND,
        "fired after {:?}, expected [{:?}, {:?})",
        elapsed,
        threshold,
        threshold + SECOND
    );
}

#[tokio::test(start_paused = true)]
async fn test_statuses_fire_in_threshold_order() {
    let (acceptor, mut recorder) = pipe_acceptor();
    acceptor.session_config().set_reader_idle_time(3);
    acceptor.session_config().set_writer_idle_time(5);
    acceptor.session_config().set_both_idle_time(7);

    let connection = acceptor.connect(PORT).await.unwrap();
    let created = connection.session.created_at();

    let mut first_seen: Vec<(IdleStatus, Instant)> = Vec::new();
    while first_seen.len() < 3 {
        let (status, at) = recorder
            .next_idle_of(&connection.session, secs(10))
            .await
            .expect("idle notification");
        if !first_seen.iter().any(|(seen, _)| *seen == status) {
            first_seen.push((status, at));
        }
    }

    let order: Vec<IdleStatus> = first_seen.iter().map(|(status, _)| *status).collect();
    assert_eq!(
        order,
        vec![
            IdleStatus::ReaderIdle,
            IdleStatus::WriterIdle,
            IdleStatus::BothIdle
        ]
    );
    assert_fired_within_one_sweep(created, first_seen[0].1, secs(3));
    assert_fired_within_one_sweep(created, first_seen[1].1, secs(5));
    assert_fired_within_one_sweep(created, first_seen[2].1, secs(7));
}

#[tokio::test(start_paused = true)]
async fn test_idle_repeats_from_last_notification() {
    let (acceptor, mut recorder) = pipe_acceptor();
    acceptor.session_config().set_reader_idle_time(2);

    let connection = acceptor.connect(PORT).await.unwrap();
    let session = &connection.session;

    let mut fired = Vec::new();
    while let Some((status, at)) = recorder
        .next_idle_of(session, secs(5).saturating_sub(Instant::now() - session.created_at()))
        .await
    {
        assert_eq!(status, IdleStatus::ReaderIdle);
        fired.push(at);
    }

    assert!(fired.len() >= 2, "fired {} times", fired.len());
    assert!(fired[1] - fired[0] >= secs(2));
    assert_eq!(session.idle_count(IdleStatus::ReaderIdle), fired.len() as u64);
    assert_eq!(session.last_idle_time(IdleStatus::ReaderIdle), *fired.last().unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_read_resets_both_idle() {
    let (acceptor, mut recorder) = pipe_acceptor();
    acceptor.session_config().set_both_idle_time(5);

    let connection = acceptor.connect(PORT).await.unwrap();
    let created = connection.session.created_at();

    sleep(secs(3)).await;
    assert!(connection.peer.send("still here"));

    let (status, at) = recorder
        .next_idle_of(&connection.session, secs(10))
        .await
        .expect("both idle");
    assert_eq!(status, IdleStatus::BothIdle);
    assert_eq!(connection.session.last_read_time() - created, secs(3));
    assert_fired_within_one_sweep(created, at, secs(8));
}

#[tokio::test(start_paused = true)]
async fn test_read_after_reader_idle_delays_both_idle() {
    let (acceptor, mut recorder) = pipe_acceptor();
    acceptor.session_config().set_reader_idle_time(3);
    acceptor.session_config().set_writer_idle_time(5);
    acceptor.session_config().set_both_idle_time(7);

    let connection = acceptor.connect(PORT).await.unwrap();
    let session = &connection.session;
    let created = session.created_at();

    let (status, at) = recorder
        .next_idle_of(session, secs(10))
        .await
        .expect("reader idle");
    assert_eq!(status, IdleStatus::ReaderIdle);
    assert_fired_within_one_sweep(created, at, secs(3));

    sleep_until(created + Duration::from_millis(4500)).await;
    assert!(connection.peer.send("back"));

    let mut after_read = Vec::new();
    while let Some((status, at)) = recorder.next_idle_of(session, secs(15)).await {
        after_read.push((status, at));
        if status == IdleStatus::BothIdle {
            break;
        }
    }

    let first = |wanted: IdleStatus| {
        after_read
            .iter()
            .find(|(status, _)| *status == wanted)
            .map(|(_, at)| *at)
            .unwrap_or_else(|| panic!("no {} after the read", wanted))
    };
    let read_at = session.last_read_time();
    assert_eq!(read_at - created, Duration::from_millis(4500));

    // Writes never happened, so writer idle keeps its schedule
    assert_fired_within_one_sweep(created, first(IdleStatus::WriterIdle), secs(5));
    assert_fired_within_one_sweep(read_at, first(IdleStatus::ReaderIdle), secs(3));
    assert_fired_within_one_sweep(read_at, first(IdleStatus::BothIdle), secs(7));
    assert_eq!(session.idle_count(IdleStatus::BothIdle), 1);
}

#[tokio::test(start_paused = true)]
async fn test_write_resets_writer_idle() {
    let (acceptor, mut recorder) = pipe_acceptor();
    acceptor.session_config().set_writer_idle_time(2);

    let mut connection = acceptor.connect(PORT).await.unwrap();
    let created = connection.session.created_at();

    sleep(SECOND).await;
    connection.session.write("tick").unwrap();
    assert_eq!(
        connection.peer.recv().await,
        Some(bytes::Bytes::from_static(b"tick"))
    );

    let (status, at) = recorder
        .next_idle_of(&connection.session, secs(10))
        .await
        .expect("writer idle");
    assert_eq!(status, IdleStatus::WriterIdle);
    assert_fired_within_one_sweep(created, at, secs(3));
    assert_eq!(connection.session.idle_count(IdleStatus::WriterIdle), 1);
}

#[tokio::test(start_paused = true)]
async fn test_activity_clears_idle_state() {
    let (acceptor, mut recorder) = pipe_acceptor();
    acceptor.session_config().set_reader_idle_time(1);

    let connection = acceptor.connect(PORT).await.unwrap();
    recorder
        .next_idle_of(&connection.session, secs(5))
        .await
        .expect("reader idle");
    assert!(connection.session.is_idle(IdleStatus::ReaderIdle));

    connection.peer.send("wake");
    loop {
        match recorder.next(secs(5)).await.expect("message") {
            (_, Event::Received(_), _) => break,
            _ => continue,
        }
    }
    assert!(!connection.session.is_idle(IdleStatus::ReaderIdle));
}

#[tokio::test(start_paused = true)]
async fn test_zero_thresholds_never_fire() {
    let (acceptor, mut recorder) = pipe_acceptor();
    let connection = acceptor.connect(PORT).await.unwrap();

    assert!(
        recorder
            .next_idle_of(&connection.session, secs(30))
            .await
            .is_none()
    );
    assert_eq!(acceptor.metrics().snapshot().total_idle_events(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_thresholds_change_at_runtime() {
    let (acceptor, mut recorder) = pipe_acceptor();
    let connection = acceptor.connect(PORT).await.unwrap();
    let session = &connection.session;

    session.config().set_reader_idle_time(2);
    let (status, at) = recorder
        .next_idle_of(session, secs(5))
        .await
        .expect("reader idle");
    assert_eq!(status, IdleStatus::ReaderIdle);
    assert_fired_within_one_sweep(session.created_at(), at, secs(2));

    session.config().set_reader_idle_time(0);
    assert!(recorder.next_idle_of(session, secs(10)).await.is_none());
    assert_eq!(acceptor.session_config().reader_idle_time(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_sessions_are_isolated() {
    let acceptor = PipeAcceptor::new(AcceptorConfig::default().with_processor_count(2)).unwrap();
    let (handler, mut recorder) = common::RecordingHandler::new();
    acceptor.set_handler(handler);
    acceptor.bind(PORT).unwrap();
    acceptor.session_config().set_reader_idle_time(1);

    let quiet = acceptor.connect(PORT).await.unwrap();
    let silent = acceptor.connect(PORT).await.unwrap();
    silent.session.config().set_reader_idle_time(0);
    assert_ne!(quiet.session.processor_index(), silent.session.processor_index());

    let mut quiet_count = 0;
    for _ in 0..3 {
        let (id, status, _) = recorder.next_idle(secs(2)).await.expect("idle");
        assert_eq!(id, quiet.session.id());
        assert_eq!(status, IdleStatus::ReaderIdle);
        silent.peer.send("chatter");
        quiet_count += 1;
    }

    assert_eq!(quiet_count, 3);
    assert_eq!(quiet.session.idle_count(IdleStatus::ReaderIdle), 3);
    assert_eq!(silent.session.idle_count(IdleStatus::ReaderIdle), 0);
}

/// Fails the first idle callback, panics in the second, then behaves
struct UnreliableHandler {
    calls: AtomicUsize,
    exceptions: AtomicUsize,
    idle: mpsc::UnboundedSender<usize>,
}

#[async_trait]
impl SessionHandler for UnreliableHandler {
    async fn session_idle(&self, _session: &Session, _status: IdleStatus) -> HandlerResult {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.idle.send(call);
        match call {
            1 => Err("idle handler failed".into()),
            2 => panic!("idle handler panicked"),
            _ => Ok(()),
        }
    }

    async fn exception_caught(&self, _session: &Session, error: &SessionError) {
        assert!(error.is_handler_error());
        self.exceptions.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test(start_paused = true)]
async fn test_handler_failures_do_not_stop_the_sweep() {
    let (idle, mut calls) = mpsc::unbounded_channel();
    let handler = Arc::new(UnreliableHandler {
        calls: AtomicUsize::new(0),
        exceptions: AtomicUsize::new(0),
        idle,
    });

    let acceptor = PipeAcceptor::new(AcceptorConfig::default().with_processor_count(1)).unwrap();
    acceptor.set_handler(handler.clone());
    acceptor.bind(PORT).unwrap();
    acceptor.session_config().set_reader_idle_time(1);

    let connection = acceptor.connect(PORT).await.unwrap();
    assert_eq!(calls.recv().await, Some(1));
    assert_eq!(calls.recv().await, Some(2));
    assert_eq!(calls.recv().await, Some(3));

    assert!(connection.session.is_connected());
    assert_eq!(handler.exceptions.load(Ordering::SeqCst), 2);
    assert_eq!(acceptor.metrics().snapshot().handler_errors, 2);
}

/// Closes the session on its first idle notification
struct ClosingHandler {
    events: mpsc::UnboundedSender<Event>,
}

#[async_trait]
impl SessionHandler for ClosingHandler {
    async fn session_idle(&self, session: &Session, status: IdleStatus) -> HandlerResult {
        let _ = self.events.send(Event::Idle(status));
        session.close();
        Ok(())
    }

    async fn session_closed(&self, _session: &Session) -> HandlerResult {
        let _ = self.events.send(Event::Closed);
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_no_idle_notification_after_close() {
    let (events, mut seen) = mpsc::unbounded_channel();
    let acceptor = PipeAcceptor::new(AcceptorConfig::default().with_processor_count(1)).unwrap();
    acceptor.set_handler(Arc::new(ClosingHandler { events }));
    acceptor.bind(PORT).unwrap();
    acceptor.session_config().set_reader_idle_time(1);
    acceptor.session_config().set_writer_idle_time(1);
    acceptor.session_config().set_both_idle_time(1);

    let connection = acceptor.connect(PORT).await.unwrap();
    connection.session.closed().await;

    assert_eq!(seen.recv().await, Some(Event::Idle(IdleStatus::ReaderIdle)));
    assert_eq!(seen.recv().await, Some(Event::Closed));
    assert!(seen.try_recv().is_err());
    assert_eq!(acceptor.managed_session_count(), 0);
}
