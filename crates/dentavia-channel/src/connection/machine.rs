//! Connection lifecycle state machine.
//!
//! The machine is pure: it consumes [`MachineInput`] events and returns
//! [`Effect`]s for the caller to enact. It never performs IO itself, so
//! every transition can be exercised directly in tests by feeding
//! synthetic events and asserting on the returned effects.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use dentavia_core::types::ConnectionId;

use super::retry::ReconnectPolicy;
use super::selector::{TransportKind, TransportSelector};

/// Lifecycle phase of the current connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No connection requested yet.
    Idle,
    /// An attempt is establishing its transport.
    Connecting,
    /// A transport is live.
    Open,
    /// A manual disconnect is tearing the transport down.
    Closing,
    /// No transport; a retry may or may not be pending.
    Closed,
}

impl Phase {
    /// Lowercase phase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events fed into the machine by the channel driver.
#[derive(Debug, Clone, PartialEq)]
pub enum MachineInput {
    /// The caller explicitly requested a connection.
    ConnectRequested,
    /// A send while disconnected wants a connection, if allowed.
    OpportunisticConnect,
    /// The transport for the current attempt is live.
    Opened,
    /// The live transport reported a close.
    TransportClosed {
        /// Close code if the transport reported one.
        code: Option<u16>,
        /// Close reason text.
        reason: String,
    },
    /// The current attempt failed for a transient reason (refused, reset,
    /// handshake error, connect timeout).
    AttemptFailed {
        /// Failure description.
        reason: String,
    },
    /// The current attempt's transport could not be constructed at all
    /// (invalid URL, unusable environment). Not expected to heal by
    /// retrying the same transport.
    ConstructionFailed {
        /// Failure description.
        error: String,
    },
    /// The reconnect timer elapsed.
    RetryTimerFired,
    /// The caller explicitly requested a disconnect.
    DisconnectRequested,
}

/// Actions the driver must enact after a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Launch a transport attempt.
    StartAttempt {
        /// Transport the attempt must use.
        kind: TransportKind,
        /// Identifier generated for this attempt.
        connection_id: ConnectionId,
    },
    /// Drain the outbound queue onto the now-open transport.
    FlushOutbox,
    /// Arm the reconnect timer.
    ScheduleRetry {
        /// Backoff delay before the next attempt.
        delay: Duration,
    },
    /// Disarm the reconnect timer and abandon any in-flight attempt.
    CancelRetry,
    /// Tear down the live transport.
    CloseTransport,
    /// The channel reached `open`.
    NotifyOpened,
    /// The channel reached `closed`.
    NotifyClosed {
        /// Close reason text.
        reason: String,
    },
    /// A failure was recorded.
    NotifyError {
        /// Failure description.
        error: String,
    },
    /// The fallback transport was engaged for subsequent attempts.
    NotifyFallbackEngaged,
    /// Retries are exhausted; the channel will not reconnect on its own.
    NotifyGaveUp {
        /// Terminal user-facing error.
        error: String,
    },
}

/// Tracks one connection cycle across repeated attempts.
#[derive(Debug)]
pub struct ConnectionMachine {
    policy: ReconnectPolicy,
    selector: TransportSelector,
    phase: Phase,
    attempt: u32,
    connection_id: Option<ConnectionId>,
    manual_disconnect: bool,
    gave_up: bool,
    last_error: Option<String>,
}

impl ConnectionMachine {
    /// Create a machine in the idle phase.
    pub fn new(policy: ReconnectPolicy, selector: TransportSelector) -> Self {
        Self {
            policy,
            selector,
            phase: Phase::Idle,
            attempt: 0,
            connection_id: None,
            manual_disconnect: false,
            gave_up: false,
            last_error: None,
        }
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Count of consecutive failed attempts since the last successful open.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Identifier of the current (or most recent) attempt.
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.connection_id
    }

    /// Whether attempts currently use the fallback transport.
    pub fn using_fallback(&self) -> bool {
        self.selector.using_fallback()
    }

    /// Whether the manual-disconnect flag is set.
    pub fn manual_disconnect(&self) -> bool {
        self.manual_disconnect
    }

    /// Whether retries are exhausted pending an explicit reconnect.
    pub fn gave_up(&self) -> bool {
        self.gave_up
    }

    /// Most recent failure description, cleared on open.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Apply one input and return the effects to enact, in order.
    pub fn handle(&mut self, input: MachineInput) -> Vec<Effect> {
        match input {
            MachineInput::ConnectRequested => self.on_connect_requested(),
            MachineInput::OpportunisticConnect => self.on_opportunistic_connect(),
            MachineInput::Opened => self.on_opened(),
            MachineInput::TransportClosed { code, reason } => self.on_transport_closed(code, reason),
            MachineInput::AttemptFailed { reason } => {
                if self.phase != Phase::Connecting {
                    return Vec::new();
                }
                self.on_failure(reason, false)
            }
            MachineInput::ConstructionFailed { error } => {
                if self.phase != Phase::Connecting {
                    return Vec::new();
                }
                self.on_failure(error, true)
            }
            MachineInput::RetryTimerFired => self.on_retry_timer(),
            MachineInput::DisconnectRequested => self.on_disconnect_requested(),
        }
    }

    fn on_connect_requested(&mut self) -> Vec<Effect> {
        match self.phase {
            // Idempotent while an attempt is establishing or live.
            Phase::Connecting | Phase::Open | Phase::Closing => Vec::new(),
            Phase::Idle | Phase::Closed => {
                // An explicit connect starts a fresh cycle: clear the manual
                // flag and the give-up latch, retry the primary transport.
                self.manual_disconnect = false;
                self.gave_up = false;
                self.attempt = 0;
                self.selector.reset();
                let mut effects = vec![Effect::CancelRetry];
                effects.extend(self.start_attempt());
                effects
            }
        }
    }

    fn on_opportunistic_connect(&mut self) -> Vec<Effect> {
        if self.manual_disconnect || self.gave_up {
            return Vec::new();
        }
        match self.phase {
            Phase::Idle | Phase::Closed => self.start_attempt(),
            _ => Vec::new(),
        }
    }

    fn on_opened(&mut self) -> Vec<Effect> {
        if self.phase != Phase::Connecting {
            return Vec::new();
        }
        self.phase = Phase::Open;
        self.attempt = 0;
        self.last_error = None;
        vec![Effect::FlushOutbox, Effect::NotifyOpened]
    }

    fn on_transport_closed(&mut self, code: Option<u16>, reason: String) -> Vec<Effect> {
        match self.phase {
            Phase::Closing => {
                self.phase = Phase::Closed;
                vec![Effect::NotifyClosed { reason }]
            }
            Phase::Open | Phase::Connecting => {
                if code == Some(1000) && !self.manual_disconnect {
                    // Clean server-side close: stay down without retrying.
                    self.phase = Phase::Closed;
                    vec![Effect::NotifyClosed { reason }]
                } else {
                    self.on_failure(describe_close(code, &reason), false)
                }
            }
            // A stray close from an already-discarded transport.
            Phase::Idle | Phase::Closed => Vec::new(),
        }
    }

    fn on_retry_timer(&mut self) -> Vec<Effect> {
        if self.manual_disconnect || self.gave_up || self.phase != Phase::Closed {
            return Vec::new();
        }
        self.start_attempt()
    }

    fn on_disconnect_requested(&mut self) -> Vec<Effect> {
        if self.manual_disconnect && matches!(self.phase, Phase::Idle | Phase::Closed) {
            return Vec::new();
        }
        self.manual_disconnect = true;
        match self.phase {
            Phase::Open | Phase::Connecting => {
                self.phase = Phase::Closing;
                vec![Effect::CancelRetry, Effect::CloseTransport]
            }
            Phase::Closing => Vec::new(),
            Phase::Idle | Phase::Closed => {
                self.phase = Phase::Closed;
                vec![Effect::CancelRetry]
            }
        }
    }

    fn start_attempt(&mut self) -> Vec<Effect> {
        let connection_id = ConnectionId::new();
        self.connection_id = Some(connection_id);
        self.phase = Phase::Connecting;
        vec![Effect::StartAttempt { kind: self.selector.current(), connection_id }]
    }

    /// Shared failure handling for abnormal closes, transient attempt
    /// failures, and construction failures.
    fn on_failure(&mut self, reason: String, construction: bool) -> Vec<Effect> {
        self.phase = Phase::Closed;
        self.last_error = Some(reason.clone());
        let mut effects = vec![
            Effect::NotifyError { error: reason.clone() },
            Effect::NotifyClosed { reason },
        ];
        if self.manual_disconnect {
            return effects;
        }

        let delay = self.policy.delay_for(self.attempt);
        self.attempt += 1;

        if construction {
            // The transport cannot be built at all, so retrying it is
            // pointless. Switch to the fallback if one is available,
            // otherwise this cycle is over.
            if self.selector.engage() {
                effects.push(Effect::NotifyFallbackEngaged);
                effects.push(Effect::ScheduleRetry { delay });
            } else {
                self.give_up(&mut effects);
            }
            return effects;
        }

        if self.policy.is_exhausted(self.attempt) {
            self.give_up(&mut effects);
            return effects;
        }
        if self.policy.should_fall_back(self.attempt) && self.selector.engage() {
            effects.push(Effect::NotifyFallbackEngaged);
        }
        effects.push(Effect::ScheduleRetry { delay });
        effects
    }

    fn give_up(&mut self, effects: &mut Vec<Effect>) {
        self.gave_up = true;
        let message = format!(
            "Unable to reach the realtime service after {} failed attempts",
            self.attempt
        );
        self.last_error = Some(message.clone());
        effects.push(Effect::NotifyGaveUp { error: message });
    }
}

fn describe_close(code: Option<u16>, reason: &str) -> String {
    match (code, reason.is_empty()) {
        (Some(code), true) => format!("connection closed abnormally (code {code})"),
        (Some(code), false) => format!("connection closed abnormally (code {code}): {reason}"),
        (None, true) => "connection lost".to_string(),
        (None, false) => format!("connection lost: {reason}"),
    }
}
