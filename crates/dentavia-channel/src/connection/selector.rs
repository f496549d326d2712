//! Transport selection between the primary and fallback paths.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which transport a connection attempt should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// WebSocket.
    Primary,
    /// HTTP long-polling.
    Fallback,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => f.write_str("websocket"),
            Self::Fallback => f.write_str("long-poll"),
        }
    }
}

/// Chooses which transport each attempt uses.
///
/// Selection is sticky: once the fallback engages, every later attempt in
/// the same connection cycle uses it too. Only an explicit reconnect request
/// resets the selector to the primary transport.
#[derive(Debug, Clone)]
pub struct TransportSelector {
    fallback_enabled: bool,
    engaged: bool,
}

impl TransportSelector {
    /// Create a selector. With `fallback_enabled` false the selector never
    /// leaves the primary transport.
    pub fn new(fallback_enabled: bool) -> Self {
        Self { fallback_enabled, engaged: false }
    }

    /// Transport the next attempt should use.
    pub fn current(&self) -> TransportKind {
        if self.engaged { TransportKind::Fallback } else { TransportKind::Primary }
    }

    /// Whether the fallback transport is currently selected.
    pub fn using_fallback(&self) -> bool {
        self.engaged
    }

    /// Whether fallback is available at all.
    pub fn fallback_enabled(&self) -> bool {
        self.fallback_enabled
    }

    /// Switch to the fallback transport. Returns true only on the transition,
    /// false when already engaged or fallback is disabled.
    pub fn engage(&mut self) -> bool {
        if !self.fallback_enabled || self.engaged {
            return false;
        }
        self.engaged = true;
        true
    }

    /// Return to the primary transport for a fresh connection cycle.
    pub fn reset(&mut self) {
        self.engaged = false;
    }
}
