//! Shared helpers for channel integration tests.
//!
//! [`TestConnector`] answers each connection attempt from a scripted queue,
//! so tests can dictate exactly how every attempt goes without touching the
//! network. A successful script hands the test a [`TestTransport`]: the far
//! side of the transport the channel driver holds, used to read outbound
//! frames, inject inbound ones, and simulate closures.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;

use dentavia_channel::message::ChatPayload;
use dentavia_channel::{
    ChannelEvent, ChannelStatus, ConnectContext, Connector, Envelope, MessageKind, Phase,
    TransportEvent, TransportHandle, TransportKind,
};
use dentavia_core::config::ChannelConfig;
use dentavia_core::types::ConnectionId;
use dentavia_core::{AppError, AppResult};

/// Ceiling on every wait. Larger than the full backoff ladder so paused-time
/// tests can sit through many scheduled retries inside a single wait.
pub const WAIT: Duration = Duration::from_secs(120);

/// One scripted answer for a connection attempt.
enum Script {
    Open {
        frames: mpsc::Sender<String>,
        events: mpsc::Receiver<TransportEvent>,
        cancel: CancellationToken,
    },
    Refuse(String),
    Reject(String),
    Hang,
}

/// Connector that answers attempts from a scripted queue and records them.
///
/// Unscripted attempts are refused with a transient error, so a test that
/// scripts nothing sees every attempt fail the way a dead endpoint would.
#[derive(Default)]
pub struct TestConnector {
    scripts: Mutex<VecDeque<Script>>,
    attempts: Mutex<Vec<(TransportKind, ConnectionId)>>,
}

impl TestConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the next attempt to succeed, returning the test's side of
    /// the transport.
    pub fn script_open(&self) -> TestTransport {
        let (frames_tx, frames_rx) = mpsc::channel(64);
        let (events_tx, events_rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        self.scripts.lock().expect("script queue").push_back(Script::Open {
            frames: frames_tx,
            events: events_rx,
            cancel: cancel.clone(),
        });
        TestTransport { sent: frames_rx, events: events_tx, cancel }
    }

    /// Script the next attempt to fail with a transient transport error.
    pub fn script_refuse(&self, reason: &str) {
        self.scripts.lock().expect("script queue").push_back(Script::Refuse(reason.to_string()));
    }

    /// Script the next attempt to fail as unbuildable (configuration error).
    pub fn script_reject(&self, reason: &str) {
        self.scripts.lock().expect("script queue").push_back(Script::Reject(reason.to_string()));
    }

    /// Script the next attempt to never resolve, driving the connect timeout.
    pub fn script_hang(&self) {
        self.scripts.lock().expect("script queue").push_back(Script::Hang);
    }

    /// Attempts observed so far, in order.
    pub fn attempts(&self) -> Vec<(TransportKind, ConnectionId)> {
        self.attempts.lock().expect("attempt log").clone()
    }

    pub fn attempt_kinds(&self) -> Vec<TransportKind> {
        self.attempts().into_iter().map(|(kind, _)| kind).collect()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().expect("attempt log").len()
    }
}

#[async_trait]
impl Connector for TestConnector {
    async fn connect(
        &self,
        kind: TransportKind,
        ctx: &ConnectContext,
    ) -> AppResult<TransportHandle> {
        self.attempts.lock().expect("attempt log").push((kind, ctx.connection_id));
        let script = self.scripts.lock().expect("script queue").pop_front();
        match script {
            Some(Script::Open { frames, events, cancel }) => {
                Ok(TransportHandle::new(kind, frames, events, cancel))
            }
            Some(Script::Refuse(reason)) => Err(AppError::transport(reason)),
            Some(Script::Reject(reason)) => Err(AppError::configuration(reason)),
            Some(Script::Hang) => std::future::pending().await,
            None => Err(AppError::transport("connection refused")),
        }
    }
}

/// The far side of one scripted transport.
///
/// Dropping it closes the transport from the channel's point of view, the
/// same way a dying socket would.
pub struct TestTransport {
    sent: mpsc::Receiver<String>,
    events: mpsc::Sender<TransportEvent>,
    cancel: CancellationToken,
}

impl TestTransport {
    /// Next frame the channel transmitted, decoded from JSON.
    pub async fn sent_envelope(&mut self) -> Envelope {
        let frame = within("an outbound frame", self.sent.recv())
            .await
            .expect("channel dropped the transport");
        serde_json::from_str(&frame).expect("outbound frame is a valid envelope")
    }

    /// Raw frame if one is already waiting, without blocking.
    pub fn try_sent(&mut self) -> Option<String> {
        self.sent.try_recv().ok()
    }

    /// Inject one raw inbound frame.
    pub async fn push_frame(&self, frame: &str) {
        let _ = self.events.send(TransportEvent::Frame(frame.to_string())).await;
    }

    /// Inject one inbound envelope.
    pub async fn push_envelope(&self, envelope: &Envelope) {
        let frame = serde_json::to_string(envelope).expect("envelope serializes");
        self.push_frame(&frame).await;
    }

    /// Report the transport closed. Ignored if the channel already
    /// discarded this transport.
    pub async fn close(&self, code: Option<u16>, reason: &str) {
        let _ = self.events.send(TransportEvent::Closed { code, reason: reason.to_string() }).await;
    }

    /// Whether the channel tore this transport down.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Channel configuration without keepalives or notices, so tests can assert
/// on exact frame and event sequences.
pub fn quiet_config() -> ChannelConfig {
    ChannelConfig {
        ping_interval_seconds: 0,
        surface_notices: false,
        ..ChannelConfig::default()
    }
}

/// A chat envelope carrying the given text.
pub fn chat(text: &str) -> Envelope {
    Envelope::of(MessageKind::Chat)
        .with_typed_payload(&ChatPayload {
            message: text.to_string(),
            thread_id: None,
            attachment_url: None,
        })
        .expect("chat payload serializes")
}

/// Await a future, panicking with context if it outlives [`WAIT`].
pub async fn within<T>(what: &str, fut: impl Future<Output = T>) -> T {
    match tokio::time::timeout(WAIT, fut).await {
        Ok(value) => value,
        Err(_) => panic!("timed out waiting for {what}"),
    }
}

/// Wait until the channel reports the given phase.
pub async fn wait_for_phase(
    status: &mut watch::Receiver<ChannelStatus>,
    phase: Phase,
) -> ChannelStatus {
    let observed = within(&format!("phase {phase}"), status.wait_for(|s| s.phase == phase)).await;
    observed.expect("channel driver stopped publishing status").clone()
}

/// Wait for the first event matching the predicate, skipping the rest.
pub async fn wait_for_event<F>(
    events: &mut broadcast::Receiver<ChannelEvent>,
    what: &str,
    matches: F,
) -> ChannelEvent
where
    F: Fn(&ChannelEvent) -> bool,
{
    within(what, async {
        loop {
            match events.recv().await {
                Ok(event) if matches(&event) => break event,
                Ok(_) => continue,
                Err(e) => panic!("event stream ended while waiting for {what}: {e}"),
            }
        }
    })
    .await
}

/// Let the driver task drain its pending work without the clock moving.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
