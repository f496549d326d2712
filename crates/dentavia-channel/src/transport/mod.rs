//! Transport layer: the primary WebSocket path, the long-poll fallback,
//! and the handle the channel driver uses to talk to either one.

mod polling;
mod websocket;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use dentavia_core::config::{ChannelConfig, EndpointConfig};
use dentavia_core::types::ConnectionId;
use dentavia_core::{AppError, AppResult};

use crate::connection::selector::TransportKind;

/// Events a live transport reports to the channel driver.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A complete text frame arrived.
    Frame(String),
    /// The transport is gone.
    Closed {
        /// Close code, when the transport protocol carries one.
        code: Option<u16>,
        /// Close reason text.
        reason: String,
    },
}

/// Handle to one live transport.
///
/// The transport's IO runs in its own task; the handle holds the frame
/// sender, the event receiver, and the token that tears the task down.
/// Dropping the handle cancels the task, so replacing a handle is enough
/// to discard the attempt it belongs to.
#[derive(Debug)]
pub struct TransportHandle {
    kind: TransportKind,
    frames: mpsc::Sender<String>,
    events: mpsc::Receiver<TransportEvent>,
    cancel: CancellationToken,
}

impl TransportHandle {
    /// Assemble a handle from its parts.
    pub fn new(
        kind: TransportKind,
        frames: mpsc::Sender<String>,
        events: mpsc::Receiver<TransportEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self { kind, frames, events, cancel }
    }

    /// Which transport this handle drives.
    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// Hand a frame to the transport task for transmission.
    pub async fn send(&self, frame: String) -> AppResult<()> {
        self.frames
            .send(frame)
            .await
            .map_err(|_| AppError::transport("transport task is gone"))
    }

    /// Wait for the next transport event. Once the task exits, reports a
    /// final close instead of hanging.
    pub async fn next_event(&mut self) -> TransportEvent {
        self.events.recv().await.unwrap_or(TransportEvent::Closed {
            code: None,
            reason: "transport task ended".to_string(),
        })
    }

    /// Ask the transport task to shut down.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for TransportHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Per-attempt context a connector needs to establish a transport.
#[derive(Debug, Clone)]
pub struct ConnectContext {
    /// Identifier of the attempt, carried in the connection URL.
    pub connection_id: ConnectionId,
}

/// Establishes transports on behalf of the channel driver.
///
/// The channel is written against this trait so tests can swap the real
/// network connector for a scripted one.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Establish a transport of the requested kind.
    ///
    /// Errors of kind [`dentavia_core::ErrorKind::Configuration`] mean the
    /// transport cannot be built at all and retrying it is pointless; any
    /// other kind is treated as a transient attempt failure.
    async fn connect(&self, kind: TransportKind, ctx: &ConnectContext)
    -> AppResult<TransportHandle>;
}

/// Production connector: WebSocket for the primary transport, HTTP
/// long-polling for the fallback.
#[derive(Debug, Clone)]
pub struct NetConnector {
    endpoint: EndpointConfig,
    poll_wait_seconds: u64,
}

impl NetConnector {
    /// Create a connector for the given endpoint.
    pub fn new(endpoint: EndpointConfig, channel: &ChannelConfig) -> Self {
        Self { endpoint, poll_wait_seconds: channel.poll_wait_seconds }
    }
}

#[async_trait]
impl Connector for NetConnector {
    async fn connect(
        &self,
        kind: TransportKind,
        ctx: &ConnectContext,
    ) -> AppResult<TransportHandle> {
        match kind {
            TransportKind::Primary => websocket::connect(&self.endpoint, ctx).await,
            TransportKind::Fallback => {
                polling::connect(&self.endpoint, self.poll_wait_seconds, ctx).await
            }
        }
    }
}
