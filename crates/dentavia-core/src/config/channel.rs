//! Resilient channel behavior configuration.

use serde::{Deserialize, Serialize};

/// Tuning for the resilient channel: reconnect policy, fallback,
/// outbound queueing, keepalive, and UX side effects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Base reconnect delay in milliseconds.
    #[serde(default = "default_base_delay")]
    pub reconnect_base_delay_ms: u64,
    /// Multiplier applied per failed attempt.
    #[serde(default = "default_growth_factor")]
    pub reconnect_growth_factor: f64,
    /// Upper bound on the reconnect delay in milliseconds.
    #[serde(default = "default_max_delay")]
    pub reconnect_max_delay_ms: u64,
    /// Failed attempts before switching to the fallback transport.
    #[serde(default = "default_fallback_after")]
    pub fallback_after_attempts: u32,
    /// Failed attempts before giving up entirely.
    #[serde(default = "default_give_up_after")]
    pub give_up_after_attempts: u32,
    /// Seconds an attempt may spend connecting before it counts as failed.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
    /// Keepalive ping interval in seconds; 0 disables pings.
    #[serde(default = "default_ping_interval")]
    pub ping_interval_seconds: u64,
    /// Long-poll wait passed to the fallback endpoint, in seconds.
    #[serde(default = "default_poll_wait")]
    pub poll_wait_seconds: u64,
    /// Maximum envelopes buffered while disconnected (oldest dropped beyond).
    #[serde(default = "default_outbox_capacity")]
    pub outbox_capacity: usize,
    /// Buffer size of the broadcast event stream handed to subscribers.
    #[serde(default = "default_event_buffer")]
    pub event_buffer_size: usize,
    /// Whether the fallback transport may be used at all.
    #[serde(default = "default_true")]
    pub resilient_mode: bool,
    /// Whether to emit user-facing notices (connected, fallback, give-up).
    #[serde(default = "default_true")]
    pub surface_notices: bool,
    /// Verbose per-frame and per-transition logging.
    #[serde(default)]
    pub debug: bool,
    /// Prefix for diagnostic markers, e.g. `"realtime"` →
    /// `"realtime_connected"`.
    #[serde(default = "default_marker_prefix")]
    pub marker_prefix: String,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            reconnect_base_delay_ms: default_base_delay(),
            reconnect_growth_factor: default_growth_factor(),
            reconnect_max_delay_ms: default_max_delay(),
            fallback_after_attempts: default_fallback_after(),
            give_up_after_attempts: default_give_up_after(),
            connect_timeout_seconds: default_connect_timeout(),
            ping_interval_seconds: default_ping_interval(),
            poll_wait_seconds: default_poll_wait(),
            outbox_capacity: default_outbox_capacity(),
            event_buffer_size: default_event_buffer(),
            resilient_mode: true,
            surface_notices: true,
            debug: false,
            marker_prefix: default_marker_prefix(),
        }
    }
}

fn default_base_delay() -> u64 {
    1000
}

fn default_growth_factor() -> f64 {
    1.5
}

fn default_max_delay() -> u64 {
    10_000
}

fn default_fallback_after() -> u32 {
    5
}

fn default_give_up_after() -> u32 {
    10
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_ping_interval() -> u64 {
    30
}

fn default_poll_wait() -> u64 {
    25
}

fn default_outbox_capacity() -> usize {
    256
}

fn default_event_buffer() -> usize {
    64
}

fn default_true() -> bool {
    true
}

fn default_marker_prefix() -> String {
    "realtime".to_string()
}
