//! # dentavia-channel
//!
//! Resilient realtime client channel for Dentavia. Provides:
//!
//! - A reconnecting WebSocket transport with exponential backoff
//! - Transparent fallback to HTTP long-polling when the socket is unusable
//! - FIFO queueing of messages composed while disconnected
//! - Typed envelope decoding with per-kind handler dispatch
//! - Observable connection state, metrics, and diagnostics markers

pub mod channel;
pub mod connection;
pub mod dispatch;
mod driver;
pub mod journal;
pub mod message;
pub mod metrics;
pub mod outbox;
pub mod transport;

pub use channel::{
    ChannelBuilder, ChannelEvent, ChannelNotice, ChannelStatus, NoticeLevel, ResilientChannel,
};
pub use connection::machine::Phase;
pub use connection::selector::TransportKind;
pub use dispatch::HandlerRegistry;
pub use journal::{ConnectionJournal, MemoryMarkerStore};
pub use message::{Envelope, InboundEvent, MessageKind};
pub use metrics::{ChannelMetrics, MetricsSnapshot};
pub use transport::{ConnectContext, Connector, TransportEvent, TransportHandle};
