//! Channel facade: the object the rest of the application holds.
//!
//! A [`ResilientChannel`] is cheap to clone and safe to use from any task.
//! All connection work happens in a driver task owned by the channel;
//! `connect`, `send` and `disconnect` never block and never return errors,
//! since they are called from UI-facing code that cannot do anything with
//! one. Failures surface through [`ChannelStatus`] and [`ChannelEvent`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::info;

use dentavia_core::config::{AppConfig, ChannelConfig, EndpointConfig};
use dentavia_core::traits::MarkerStore;
use dentavia_core::types::ConnectionId;

use crate::connection::machine::Phase;
use crate::dispatch::HandlerRegistry;
use crate::driver::{Command, Driver, DriverParts};
use crate::journal::{ConnectionJournal, MemoryMarkerStore};
use crate::message::{Envelope, MessageKind};
use crate::metrics::{ChannelMetrics, MetricsSnapshot};
use crate::transport::{Connector, NetConnector};

/// Snapshot of the channel's observable state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelStatus {
    /// Lifecycle phase of the current attempt.
    pub phase: Phase,
    /// Identifier of the current (or most recent) attempt.
    pub connection_id: Option<ConnectionId>,
    /// Consecutive failed attempts since the last successful open.
    pub reconnect_attempt: u32,
    /// Most recent failure description, cleared on open.
    pub last_error: Option<String>,
    /// Whether attempts currently use the fallback transport.
    pub using_fallback: bool,
    /// Whether reconnection was abandoned pending an explicit `connect()`.
    pub gave_up: bool,
}

impl ChannelStatus {
    /// Whether a transport is currently open.
    pub fn is_connected(&self) -> bool {
        self.phase == Phase::Open
    }
}

impl Default for ChannelStatus {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            connection_id: None,
            reconnect_attempt: 0,
            last_error: None,
            using_fallback: false,
            gave_up: false,
        }
    }
}

/// Events broadcast to channel subscribers.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// A transport reached the open phase.
    Opened {
        /// Identifier of the now-live connection.
        connection_id: ConnectionId,
    },
    /// An inbound envelope of a known kind arrived.
    Message(Envelope),
    /// The channel closed (manually, cleanly, or after a failure).
    Closed {
        /// Close reason text.
        reason: String,
    },
    /// The fallback transport was engaged for subsequent attempts.
    FallbackEngaged,
    /// Reconnection was abandoned.
    GaveUp {
        /// Terminal user-facing error.
        error: String,
    },
    /// A user-facing notice (toast-style) was emitted.
    Notice(ChannelNotice),
}

/// Severity of a user-facing notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    /// Informational ("connected").
    Info,
    /// Degraded but working ("using backup link").
    Warning,
    /// Requires user attention ("gave up").
    Error,
}

/// A user-facing notice the embedding UI may render as a toast.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelNotice {
    /// Notice severity.
    pub level: NoticeLevel,
    /// Display text.
    pub message: String,
}

/// Callback hooks invoked from the driver task.
#[derive(Clone, Default)]
pub(crate) struct ChannelCallbacks {
    pub on_open: Option<Arc<dyn Fn(&ChannelStatus) + Send + Sync>>,
    pub on_message: Option<Arc<dyn Fn(&Envelope) + Send + Sync>>,
    pub on_close: Option<Arc<dyn Fn(&str) + Send + Sync>>,
    pub on_error: Option<Arc<dyn Fn(&str) + Send + Sync>>,
    pub on_notice: Option<Arc<dyn Fn(&ChannelNotice) + Send + Sync>>,
}

/// Builds a [`ResilientChannel`], wiring hooks, handlers, and overrides.
pub struct ChannelBuilder {
    endpoint: EndpointConfig,
    channel: ChannelConfig,
    connector: Option<Arc<dyn Connector>>,
    marker_store: Option<Arc<dyn MarkerStore>>,
    registry: Arc<HandlerRegistry>,
    callbacks: ChannelCallbacks,
}

impl ChannelBuilder {
    /// Start a builder from endpoint and channel configuration.
    pub fn new(endpoint: EndpointConfig, channel: ChannelConfig) -> Self {
        Self {
            endpoint,
            channel,
            connector: None,
            marker_store: None,
            registry: Arc::new(HandlerRegistry::new()),
            callbacks: ChannelCallbacks::default(),
        }
    }

    /// Start a builder from a loaded application config.
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.endpoint.clone(), config.channel.clone())
    }

    /// Replace the connector. Tests use this to script transports.
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Replace the marker store backing the diagnostics journal.
    pub fn marker_store(mut self, store: Arc<dyn MarkerStore>) -> Self {
        self.marker_store = Some(store);
        self
    }

    /// Hook invoked whenever the channel reaches open.
    pub fn on_open<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ChannelStatus) + Send + Sync + 'static,
    {
        self.callbacks.on_open = Some(Arc::new(hook));
        self
    }

    /// Hook invoked for every inbound envelope of a known kind.
    pub fn on_message<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.callbacks.on_message = Some(Arc::new(hook));
        self
    }

    /// Hook invoked whenever the channel reaches closed.
    pub fn on_close<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_close = Some(Arc::new(hook));
        self
    }

    /// Hook invoked when a failure is recorded.
    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_error = Some(Arc::new(hook));
        self
    }

    /// Hook invoked for user-facing notices (unless suppressed by config).
    pub fn on_notice<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ChannelNotice) + Send + Sync + 'static,
    {
        self.callbacks.on_notice = Some(Arc::new(hook));
        self
    }

    /// Register a handler for one message kind.
    pub fn on_kind<F>(self, kind: MessageKind, handler: F) -> Self
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.registry.register(kind, handler);
        self
    }

    /// Build the channel and spawn its driver task.
    ///
    /// Must be called within a tokio runtime. The channel starts idle;
    /// nothing connects until `connect()` (or the first `send`).
    pub fn build(self) -> ResilientChannel {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ChannelStatus::default());
        let (events_tx, _) = broadcast::channel(self.channel.event_buffer_size.max(1));
        let metrics = Arc::new(ChannelMetrics::new());

        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(NetConnector::new(self.endpoint.clone(), &self.channel)));
        let store = self.marker_store.unwrap_or_else(|| Arc::new(MemoryMarkerStore::new()));
        let journal = ConnectionJournal::new(store, self.channel.marker_prefix.clone());
        let identity = self.endpoint.sender();

        let driver = Driver::new(DriverParts {
            config: self.channel,
            identity,
            connector,
            registry: self.registry.clone(),
            callbacks: self.callbacks,
            journal,
            metrics: metrics.clone(),
            commands: command_rx,
            status_tx,
            events_tx: events_tx.clone(),
        });
        tokio::spawn(driver.run());
        info!("realtime channel constructed");

        ResilientChannel {
            commands: command_tx,
            status_rx,
            events_tx,
            metrics,
            registry: self.registry,
        }
    }
}

/// Handle to the realtime channel.
#[derive(Clone)]
pub struct ResilientChannel {
    commands: mpsc::UnboundedSender<Command>,
    status_rx: watch::Receiver<ChannelStatus>,
    events_tx: broadcast::Sender<ChannelEvent>,
    metrics: Arc<ChannelMetrics>,
    registry: Arc<HandlerRegistry>,
}

impl std::fmt::Debug for ResilientChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientChannel").field("status", &self.status()).finish()
    }
}

impl ResilientChannel {
    /// Start a builder.
    pub fn builder(endpoint: EndpointConfig, channel: ChannelConfig) -> ChannelBuilder {
        ChannelBuilder::new(endpoint, channel)
    }

    /// Request a connection. Idempotent while connecting or open; after a
    /// manual disconnect or a give-up this starts a fresh cycle on the
    /// primary transport.
    pub fn connect(&self) {
        let _ = self.commands.send(Command::Connect);
    }

    /// Send an envelope: transmitted immediately while open, queued
    /// otherwise. Never fails from the caller's perspective.
    pub fn send(&self, envelope: Envelope) {
        let _ = self.commands.send(Command::Send(envelope));
    }

    /// Disconnect and stay down until `connect()` is called again. Safe to
    /// call repeatedly and before any connection was established.
    pub fn disconnect(&self) {
        let _ = self.commands.send(Command::Disconnect);
    }

    /// Current observable state.
    pub fn status(&self) -> ChannelStatus {
        self.status_rx.borrow().clone()
    }

    /// Watch for state changes.
    pub fn watch_status(&self) -> watch::Receiver<ChannelStatus> {
        self.status_rx.clone()
    }

    /// Subscribe to channel events.
    pub fn events(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events_tx.subscribe()
    }

    /// Register a handler for one message kind on the live channel.
    pub fn on_kind<F>(&self, kind: MessageKind, handler: F)
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.registry.register(kind, handler);
    }

    /// Whether a transport is currently open.
    pub fn is_connected(&self) -> bool {
        self.status_rx.borrow().is_connected()
    }

    /// Identifier of the current (or most recent) attempt.
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.status_rx.borrow().connection_id
    }

    /// Consecutive failed attempts since the last successful open.
    pub fn reconnect_attempt(&self) -> u32 {
        self.status_rx.borrow().reconnect_attempt
    }

    /// Most recent failure description.
    pub fn last_error(&self) -> Option<String> {
        self.status_rx.borrow().last_error.clone()
    }

    /// Whether attempts currently use the fallback transport.
    pub fn using_fallback(&self) -> bool {
        self.status_rx.borrow().using_fallback
    }

    /// Snapshot of the channel's metrics counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_status_is_idle() {
        let status = ChannelStatus::default();
        assert_eq!(status.phase, Phase::Idle);
        assert!(!status.is_connected());
        assert!(status.last_error.is_none());
        assert!(!status.using_fallback);
    }

    #[test]
    fn test_status_serializes_for_diagnostics() {
        let status = ChannelStatus { phase: Phase::Open, ..ChannelStatus::default() };
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["phase"], "open");
        assert_eq!(value["reconnect_attempt"], 0);
    }
}
