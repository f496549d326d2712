//! Reconnection backoff policy.

use std::time::Duration;

use dentavia_core::config::ChannelConfig;

/// Exponential backoff schedule with a delay cap and two attempt thresholds.
///
/// Attempts are numbered from zero. `delay_for(n)` is the pause scheduled
/// after failed attempt `n`, so the first retry waits the base delay and
/// each later retry waits `growth` times longer, up to `max_delay`.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    base_delay: Duration,
    growth: f64,
    max_delay: Duration,
    fallback_after: u32,
    give_up_after: u32,
}

impl ReconnectPolicy {
    /// Build the policy from channel configuration.
    ///
    /// A growth factor below 1.0 would shrink delays on every retry and is
    /// clamped up to 1.0 with a warning.
    pub fn from_config(config: &ChannelConfig) -> Self {
        let mut growth = config.reconnect_growth_factor;
        if growth < 1.0 {
            tracing::warn!(growth, "reconnect growth factor below 1.0, clamping to 1.0");
            growth = 1.0;
        }
        Self {
            base_delay: Duration::from_millis(config.reconnect_base_delay_ms),
            growth,
            max_delay: Duration::from_millis(config.reconnect_max_delay_ms),
            fallback_after: config.fallback_after_attempts,
            give_up_after: config.give_up_after_attempts,
        }
    }

    /// Delay to wait after failed attempt number `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let cap_ms = self.max_delay.as_millis() as f64;
        let ms = (base_ms * self.growth.powi(attempt.min(1024) as i32)).min(cap_ms);
        Duration::from_millis(ms as u64)
    }

    /// Whether the channel should switch to the fallback transport once
    /// `failed` consecutive attempts have failed.
    pub fn should_fall_back(&self, failed: u32) -> bool {
        failed >= self.fallback_after
    }

    /// Whether the channel should stop retrying after `failed` consecutive
    /// failed attempts.
    pub fn is_exhausted(&self, failed: u32) -> bool {
        failed >= self.give_up_after
    }

    /// The configured give-up threshold.
    pub fn give_up_after(&self) -> u32 {
        self.give_up_after
    }
}
