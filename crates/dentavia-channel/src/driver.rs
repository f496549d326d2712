//! Channel driver task.
//!
//! One task owns the state machine, the outbox, and the live transport.
//! The facade talks to it over a command channel, transports feed it
//! events, and it publishes status and events back out. Because every
//! mutation happens on this task, no lock guards the connection state.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior, Sleep};
use tracing::{debug, error, info, warn};

use dentavia_core::ErrorKind;
use dentavia_core::config::ChannelConfig;
use dentavia_core::types::ActorRef;

use crate::channel::{ChannelCallbacks, ChannelEvent, ChannelNotice, ChannelStatus, NoticeLevel};
use crate::connection::machine::{ConnectionMachine, Effect, MachineInput, Phase};
use crate::connection::retry::ReconnectPolicy;
use crate::connection::selector::{TransportKind, TransportSelector};
use crate::dispatch::HandlerRegistry;
use crate::journal::ConnectionJournal;
use crate::message::{Envelope, MessageKind, serializer};
use crate::metrics::ChannelMetrics;
use crate::outbox::Outbox;
use crate::transport::{ConnectContext, Connector, TransportEvent, TransportHandle};

/// Requests from the facade.
#[derive(Debug)]
pub(crate) enum Command {
    /// Establish a connection (or start a fresh cycle).
    Connect,
    /// Transmit or queue an envelope.
    Send(Envelope),
    /// Tear the connection down and stay down.
    Disconnect,
}

/// Result of one connection attempt, reported by its task.
#[derive(Debug)]
enum ConnectOutcome {
    Connected(TransportHandle),
    Failed { error: String, construction: bool },
}

/// Everything the driver needs, assembled by the builder.
pub(crate) struct DriverParts {
    pub config: ChannelConfig,
    pub identity: Option<ActorRef>,
    pub connector: Arc<dyn Connector>,
    pub registry: Arc<HandlerRegistry>,
    pub callbacks: ChannelCallbacks,
    pub journal: ConnectionJournal,
    pub metrics: Arc<ChannelMetrics>,
    pub commands: mpsc::UnboundedReceiver<Command>,
    pub status_tx: watch::Sender<ChannelStatus>,
    pub events_tx: broadcast::Sender<ChannelEvent>,
}

pub(crate) struct Driver {
    config: ChannelConfig,
    identity: Option<ActorRef>,
    connector: Arc<dyn Connector>,
    registry: Arc<HandlerRegistry>,
    callbacks: ChannelCallbacks,
    journal: ConnectionJournal,
    metrics: Arc<ChannelMetrics>,
    machine: ConnectionMachine,
    outbox: Outbox,
    commands: mpsc::UnboundedReceiver<Command>,
    status_tx: watch::Sender<ChannelStatus>,
    events_tx: broadcast::Sender<ChannelEvent>,
    transport: Option<TransportHandle>,
    pending_connect: Option<oneshot::Receiver<ConnectOutcome>>,
    retry_sleep: Option<Pin<Box<Sleep>>>,
    ping_timer: Option<Interval>,
}

impl Driver {
    pub(crate) fn new(parts: DriverParts) -> Self {
        let machine = ConnectionMachine::new(
            ReconnectPolicy::from_config(&parts.config),
            TransportSelector::new(parts.config.resilient_mode),
        );
        let outbox = Outbox::new(parts.config.outbox_capacity);
        Self {
            config: parts.config,
            identity: parts.identity,
            connector: parts.connector,
            registry: parts.registry,
            callbacks: parts.callbacks,
            journal: parts.journal,
            metrics: parts.metrics,
            machine,
            outbox,
            commands: parts.commands,
            status_tx: parts.status_tx,
            events_tx: parts.events_tx,
            transport: None,
            pending_connect: None,
            retry_sleep: None,
            ping_timer: None,
        }
    }

    /// Drive the channel until every facade handle is dropped.
    pub(crate) async fn run(mut self) {
        debug!("channel driver started");
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.on_command(command).await,
                    None => break,
                },
                event = next_transport_event(&mut self.transport), if self.transport.is_some() => {
                    self.on_transport_event(event).await;
                    self.publish_status();
                }
                outcome = await_outcome(&mut self.pending_connect), if self.pending_connect.is_some() => {
                    self.on_connect_outcome(outcome).await;
                    self.publish_status();
                }
                () = await_sleep(&mut self.retry_sleep), if self.retry_sleep.is_some() => {
                    self.retry_sleep = None;
                    self.apply(MachineInput::RetryTimerFired).await;
                    self.publish_status();
                }
                _ = next_tick(&mut self.ping_timer), if self.ping_timer.is_some() => {
                    self.send_keepalive().await;
                }
            }
        }

        if let Some(transport) = self.transport.take() {
            transport.shutdown();
        }
        self.pending_connect = None;
        debug!("channel driver stopped");
    }

    async fn on_command(&mut self, command: Command) {
        match command {
            Command::Connect => self.apply(MachineInput::ConnectRequested).await,
            Command::Disconnect => self.apply(MachineInput::DisconnectRequested).await,
            Command::Send(envelope) => self.on_send(envelope).await,
        }
        self.publish_status();
    }

    async fn on_send(&mut self, envelope: Envelope) {
        if self.machine.phase() == Phase::Open && self.transport.is_some() {
            self.transmit(envelope).await;
            return;
        }
        self.enqueue(envelope);
        // The retry timer or an in-flight attempt will open the channel on
        // its own; only a fully parked channel connects opportunistically.
        if self.retry_sleep.is_none() && self.pending_connect.is_none() {
            self.apply(MachineInput::OpportunisticConnect).await;
        }
    }

    fn enqueue(&mut self, envelope: Envelope) {
        self.metrics.inc(&self.metrics.messages_queued);
        debug!(kind = %envelope.kind, queued = self.outbox.len() + 1, "queued message while disconnected");
        if let Some(evicted) = self.outbox.enqueue(envelope) {
            self.metrics.inc(&self.metrics.outbox_evictions);
            warn!(kind = %evicted.kind, "outbox full, dropped oldest queued message");
        }
    }

    async fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Frame(frame) => self.on_frame(frame).await,
            TransportEvent::Closed { code, reason } => {
                self.transport = None;
                self.apply(MachineInput::TransportClosed { code, reason }).await;
            }
        }
    }

    async fn on_frame(&mut self, frame: String) {
        self.metrics.inc(&self.metrics.frames_received);
        let envelope = match serializer::decode(&frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.metrics.inc(&self.metrics.parse_failures);
                warn!(error = %e, "dropped unparseable inbound frame");
                return;
            }
        };
        if self.config.debug {
            debug!(kind = %envelope.kind, "inbound envelope");
        }

        if envelope.kind.is_keepalive() {
            // Answer server pings in kind; neither direction of keepalive
            // traffic reaches handlers or subscribers.
            if envelope.kind == MessageKind::Ping {
                self.transmit(Envelope::pong_for(&envelope)).await;
            }
            return;
        }
        if !envelope.kind.is_known() {
            self.metrics.inc(&self.metrics.unknown_kinds);
            debug!(kind = %envelope.kind, "ignored envelope of unknown kind");
            return;
        }

        if let Some(on_message) = &self.callbacks.on_message {
            on_message(&envelope);
        }
        self.registry.dispatch(&envelope);
        let _ = self.events_tx.send(ChannelEvent::Message(envelope));
    }

    async fn on_connect_outcome(&mut self, outcome: ConnectOutcome) {
        self.pending_connect = None;
        match outcome {
            ConnectOutcome::Connected(handle) => {
                if self.machine.phase() != Phase::Connecting {
                    // The attempt was abandoned while the handshake finished;
                    // dropping the handle cancels its IO task.
                    debug!("discarding transport from an abandoned attempt");
                    return;
                }
                info!(transport = %handle.kind(), "transport established");
                self.transport = Some(handle);
                self.apply(MachineInput::Opened).await;
            }
            ConnectOutcome::Failed { error, construction } => {
                let input = if construction {
                    MachineInput::ConstructionFailed { error }
                } else {
                    MachineInput::AttemptFailed { reason: error }
                };
                self.apply(input).await;
            }
        }
    }

    async fn apply(&mut self, input: MachineInput) {
        let effects = self.machine.handle(input);
        self.enact(effects).await;
    }

    async fn enact(&mut self, effects: Vec<Effect>) {
        let mut queue: VecDeque<Effect> = effects.into();
        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::StartAttempt { kind, connection_id } => {
                    self.metrics.inc(&self.metrics.attempts);
                    info!(
                        %connection_id,
                        transport = %kind,
                        failed_attempts = self.machine.attempt(),
                        "starting connection attempt"
                    );
                    self.spawn_attempt(kind, ConnectContext { connection_id });
                }
                Effect::FlushOutbox => self.flush_outbox().await,
                Effect::ScheduleRetry { delay } => {
                    debug!(delay_ms = delay.as_millis() as u64, "reconnect scheduled");
                    self.retry_sleep = Some(Box::pin(tokio::time::sleep(delay)));
                }
                Effect::CancelRetry => {
                    self.retry_sleep = None;
                    self.pending_connect = None;
                }
                Effect::CloseTransport => {
                    if let Some(transport) = self.transport.take() {
                        transport.shutdown();
                    }
                    self.pending_connect = None;
                    // Complete the manual close now instead of waiting for
                    // the discarded task to report back.
                    let next = self.machine.handle(MachineInput::TransportClosed {
                        code: Some(1000),
                        reason: "manual disconnect".to_string(),
                    });
                    for (position, effect) in next.into_iter().enumerate() {
                        queue.insert(position, effect);
                    }
                }
                Effect::NotifyOpened => self.on_opened().await,
                Effect::NotifyClosed { reason } => self.on_closed(&reason).await,
                Effect::NotifyError { error } => {
                    warn!(error, "realtime channel error");
                    if let Some(on_error) = &self.callbacks.on_error {
                        on_error(&error);
                    }
                }
                Effect::NotifyFallbackEngaged => {
                    self.metrics.inc(&self.metrics.fallback_engagements);
                    warn!("switching to the long-poll fallback transport");
                    let _ = self.events_tx.send(ChannelEvent::FallbackEngaged);
                    self.notice(NoticeLevel::Warning, "Realtime connection degraded, using backup link");
                }
                Effect::NotifyGaveUp { error } => {
                    self.metrics.inc(&self.metrics.give_ups);
                    error!(error, "reconnection abandoned");
                    if let Some(on_error) = &self.callbacks.on_error {
                        on_error(&error);
                    }
                    let _ = self.events_tx.send(ChannelEvent::GaveUp { error });
                    self.notice(
                        NoticeLevel::Error,
                        "Unable to reach Dentavia realtime service. Check your connection and retry.",
                    );
                }
            }
        }
    }

    async fn on_opened(&mut self) {
        self.metrics.inc(&self.metrics.connections_opened);
        self.ping_timer = self.make_ping_timer();
        if let Some(connection_id) = self.machine.connection_id() {
            info!(%connection_id, "realtime channel open");
            self.journal.record_connected(connection_id).await;
            let _ = self.events_tx.send(ChannelEvent::Opened { connection_id });
        }
        if let Some(on_open) = &self.callbacks.on_open {
            on_open(&self.current_status());
        }
        self.notice(NoticeLevel::Info, "Realtime connection established");
    }

    async fn on_closed(&mut self, reason: &str) {
        self.ping_timer = None;
        info!(reason, "realtime channel closed");
        self.journal.record_disconnected().await;
        if let Some(on_close) = &self.callbacks.on_close {
            on_close(reason);
        }
        let _ = self.events_tx.send(ChannelEvent::Closed { reason: reason.to_string() });
    }

    fn spawn_attempt(&mut self, kind: TransportKind, ctx: ConnectContext) {
        let connector = self.connector.clone();
        let deadline = Duration::from_secs(self.config.connect_timeout_seconds.max(1));
        let (outcome_tx, outcome_rx) = oneshot::channel();
        self.pending_connect = Some(outcome_rx);

        tokio::spawn(async move {
            let outcome = match tokio::time::timeout(deadline, connector.connect(kind, &ctx)).await
            {
                Ok(Ok(handle)) => ConnectOutcome::Connected(handle),
                Ok(Err(e)) => ConnectOutcome::Failed {
                    construction: e.kind == ErrorKind::Configuration,
                    error: e.to_string(),
                },
                Err(_) => ConnectOutcome::Failed {
                    error: format!("connect timed out after {}s", deadline.as_secs()),
                    construction: false,
                },
            };
            // A dropped receiver means the attempt was abandoned; dropping
            // the outcome here cancels any transport it carries.
            let _ = outcome_tx.send(outcome);
        });
    }

    async fn flush_outbox(&mut self) {
        if self.outbox.is_empty() {
            return;
        }
        let queued = self.outbox.len();
        while let Some(envelope) = self.outbox.pop() {
            let retained = envelope.clone();
            if !self.transmit(envelope).await {
                // The transport died mid-flush; keep the message queued
                // for the next open.
                self.outbox.requeue_front(retained);
                break;
            }
        }
        debug!(flushed = queued - self.outbox.len(), remaining = self.outbox.len(), "outbox flushed");
    }

    /// Stamp one envelope and hand it to the live transport. Returns false
    /// when the transport refused it, which ends a flush early.
    async fn transmit(&mut self, mut envelope: Envelope) -> bool {
        let Some(connection_id) = self.machine.connection_id() else {
            return false;
        };
        let Some(transport) = &self.transport else {
            return false;
        };
        envelope.stamp(connection_id, self.identity.as_ref());
        let frame = match serializer::encode(&envelope) {
            Ok(frame) => frame,
            Err(e) => {
                // An envelope that cannot encode never will; skip it rather
                // than wedging the queue.
                warn!(error = %e, kind = %envelope.kind, "dropped unencodable envelope");
                return true;
            }
        };
        match transport.send(frame).await {
            Ok(()) => {
                self.metrics.inc(&self.metrics.frames_sent);
                true
            }
            Err(e) => {
                warn!(error = %e, kind = %envelope.kind, "transport refused frame, message dropped");
                false
            }
        }
    }

    async fn send_keepalive(&mut self) {
        if self.machine.phase() != Phase::Open {
            return;
        }
        self.transmit(Envelope::ping()).await;
    }

    fn make_ping_timer(&self) -> Option<Interval> {
        let seconds = self.config.ping_interval_seconds;
        if seconds == 0 {
            return None;
        }
        let period = Duration::from_secs(seconds);
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Some(interval)
    }

    fn notice(&self, level: NoticeLevel, message: &str) {
        if !self.config.surface_notices {
            return;
        }
        let notice = ChannelNotice { level, message: message.to_string() };
        if let Some(on_notice) = &self.callbacks.on_notice {
            on_notice(&notice);
        }
        let _ = self.events_tx.send(ChannelEvent::Notice(notice));
    }

    fn current_status(&self) -> ChannelStatus {
        ChannelStatus {
            phase: self.machine.phase(),
            connection_id: self.machine.connection_id(),
            reconnect_attempt: self.machine.attempt(),
            last_error: self.machine.last_error().map(str::to_owned),
            using_fallback: self.machine.using_fallback(),
            gave_up: self.machine.gave_up(),
        }
    }

    fn publish_status(&self) {
        let status = self.current_status();
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }
}

async fn next_transport_event(transport: &mut Option<TransportHandle>) -> TransportEvent {
    match transport {
        Some(handle) => handle.next_event().await,
        None => std::future::pending().await,
    }
}

async fn await_outcome(pending: &mut Option<oneshot::Receiver<ConnectOutcome>>) -> ConnectOutcome {
    match pending {
        Some(outcome) => outcome.await.unwrap_or_else(|_| ConnectOutcome::Failed {
            error: "connect task vanished".to_string(),
            construction: false,
        }),
        None => std::future::pending().await,
    }
}

async fn await_sleep(sleep: &mut Option<Pin<Box<Sleep>>>) {
    match sleep {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
