//! Channel metrics counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Counters tracking one channel's lifetime activity.
#[derive(Debug)]
pub struct ChannelMetrics {
    /// Connection attempts started (any transport).
    pub attempts: AtomicU64,
    /// Attempts that reached the open phase.
    pub connections_opened: AtomicU64,
    /// Frames handed to a live transport.
    pub frames_sent: AtomicU64,
    /// Frames received from a live transport.
    pub frames_received: AtomicU64,
    /// Envelopes queued while no transport was open.
    pub messages_queued: AtomicU64,
    /// Queued envelopes evicted because the outbox was full.
    pub outbox_evictions: AtomicU64,
    /// Received frames dropped because they failed to parse.
    pub parse_failures: AtomicU64,
    /// Received envelopes dropped because their kind was unknown.
    pub unknown_kinds: AtomicU64,
    /// Times the fallback transport was engaged.
    pub fallback_engagements: AtomicU64,
    /// Times reconnection was abandoned after exhausting attempts.
    pub give_ups: AtomicU64,
}

impl ChannelMetrics {
    /// Create new zeroed metrics.
    pub fn new() -> Self {
        Self {
            attempts: AtomicU64::new(0),
            connections_opened: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            messages_queued: AtomicU64::new(0),
            outbox_evictions: AtomicU64::new(0),
            parse_failures: AtomicU64::new(0),
            unknown_kinds: AtomicU64::new(0),
            fallback_engagements: AtomicU64::new(0),
            give_ups: AtomicU64::new(0),
        }
    }

    /// Increment a counter by one.
    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            attempts: self.attempts.load(Ordering::Relaxed),
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            messages_queued: self.messages_queued.load(Ordering::Relaxed),
            outbox_evictions: self.outbox_evictions.load(Ordering::Relaxed),
            parse_failures: self.parse_failures.load(Ordering::Relaxed),
            unknown_kinds: self.unknown_kinds.load(Ordering::Relaxed),
            fallback_engagements: self.fallback_engagements.load(Ordering::Relaxed),
            give_ups: self.give_ups.load(Ordering::Relaxed),
        }
    }
}

impl Default for ChannelMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable metrics snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Connection attempts started.
    pub attempts: u64,
    /// Attempts that reached open.
    pub connections_opened: u64,
    /// Frames handed to a transport.
    pub frames_sent: u64,
    /// Frames received from a transport.
    pub frames_received: u64,
    /// Envelopes queued while disconnected.
    pub messages_queued: u64,
    /// Queued envelopes evicted by the cap.
    pub outbox_evictions: u64,
    /// Unparseable frames dropped.
    pub parse_failures: u64,
    /// Unknown-kind envelopes dropped.
    pub unknown_kinds: u64,
    /// Fallback engagements.
    pub fallback_engagements: u64,
    /// Reconnect give-ups.
    pub give_ups: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_increments() {
        let metrics = ChannelMetrics::new();
        metrics.inc(&metrics.attempts);
        metrics.inc(&metrics.attempts);
        metrics.inc(&metrics.frames_sent);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.attempts, 2);
        assert_eq!(snapshot.frames_sent, 1);
        assert_eq!(snapshot.frames_received, 0);
    }
}
