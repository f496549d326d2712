//! Message envelope framing every payload crossing the channel.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use dentavia_core::types::{ActorRef, ConnectionId};
use dentavia_core::{AppError, AppResult};

use super::types::{
    AppointmentReminderPayload, ChatPayload, InboundEvent, MessageKind, NotificationPayload,
    QuoteUpdatePayload, SystemPayload, TreatmentPlanUpdatePayload,
};

/// Envelope wrapping every message sent or received on the channel.
///
/// Only `type` is mandatory on the wire. Older server builds emit the payload
/// under `data` instead of `payload`; deserialization accepts either and
/// normalizes onto [`Envelope::payload`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "RawEnvelope")]
pub struct Envelope {
    /// Message kind discriminant.
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Kind-specific payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Creation time, epoch milliseconds UTC.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    /// Connection the message was sent over.
    #[serde(rename = "connectionId", skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,
    /// Originating actor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<ActorRef>,
    /// Routing hint naming the intended recipient.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

/// Wire shape as older and newer server builds actually produce it.
#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: MessageKind,
    #[serde(default)]
    payload: Option<Value>,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    timestamp: Option<i64>,
    #[serde(rename = "connectionId", default)]
    connection_id: Option<String>,
    #[serde(default)]
    sender: Option<ActorRef>,
    #[serde(default)]
    target: Option<String>,
}

impl From<RawEnvelope> for Envelope {
    fn from(raw: RawEnvelope) -> Self {
        let payload = match (non_null(raw.payload), non_null(raw.data)) {
            (Some(payload), _) => Some(payload),
            (None, data) => data,
        };
        Self {
            kind: raw.kind,
            payload,
            timestamp: raw.timestamp,
            connection_id: raw.connection_id,
            sender: raw.sender,
            target: raw.target,
        }
    }
}

fn non_null(value: Option<Value>) -> Option<Value> {
    value.filter(|v| !v.is_null())
}

impl Envelope {
    /// Create a bare envelope of the given kind.
    pub fn of(kind: MessageKind) -> Self {
        Self {
            kind,
            payload: None,
            timestamp: None,
            connection_id: None,
            sender: None,
            target: None,
        }
    }

    /// Attach a payload.
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Attach a typed payload, serializing it to JSON.
    pub fn with_typed_payload<T: Serialize>(mut self, payload: &T) -> AppResult<Self> {
        self.payload = Some(serde_json::to_value(payload)?);
        Ok(self)
    }

    /// Set the routing target.
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Set the originating actor.
    pub fn with_sender(mut self, sender: ActorRef) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Build a keepalive ping carrying the current timestamp.
    pub fn ping() -> Self {
        let mut envelope = Self::of(MessageKind::Ping);
        envelope.timestamp = Some(Utc::now().timestamp_millis());
        envelope
    }

    /// Build the keepalive reply for a received ping, echoing its timestamp.
    pub fn pong_for(ping: &Envelope) -> Self {
        let mut envelope = Self::of(MessageKind::Pong);
        envelope.timestamp = ping.timestamp.or_else(|| Some(Utc::now().timestamp_millis()));
        envelope
    }

    /// Stamp transmission metadata immediately before the envelope goes out.
    ///
    /// The connection id always reflects the connection actually used, so a
    /// message queued during an outage carries the id of the connection that
    /// finally transmits it, not the one that was live when it was composed.
    /// The timestamp and sender are only filled if absent.
    pub fn stamp(&mut self, connection_id: ConnectionId, sender: Option<&ActorRef>) {
        if self.timestamp.is_none() {
            self.timestamp = Some(Utc::now().timestamp_millis());
        }
        self.connection_id = Some(connection_id.to_string());
        if self.sender.is_none() {
            self.sender = sender.copied();
        }
    }

    /// Decode the payload into a typed [`InboundEvent`].
    ///
    /// Fails on unknown kinds and on payloads that do not match the kind's
    /// schema. Keepalive kinds decode from the envelope itself and need no
    /// payload.
    pub fn decode(&self) -> AppResult<InboundEvent> {
        match &self.kind {
            MessageKind::Ping => Ok(InboundEvent::Ping { timestamp: self.timestamp }),
            MessageKind::Pong => Ok(InboundEvent::Pong { timestamp: self.timestamp }),
            MessageKind::Notification => {
                Ok(InboundEvent::Notification(self.typed_payload::<NotificationPayload>()?))
            }
            MessageKind::Chat => Ok(InboundEvent::Chat(self.typed_payload::<ChatPayload>()?)),
            MessageKind::System => Ok(InboundEvent::System(self.typed_payload::<SystemPayload>()?)),
            MessageKind::QuoteUpdate => {
                Ok(InboundEvent::QuoteUpdate(self.typed_payload::<QuoteUpdatePayload>()?))
            }
            MessageKind::AppointmentReminder => Ok(InboundEvent::AppointmentReminder(
                self.typed_payload::<AppointmentReminderPayload>()?,
            )),
            MessageKind::TreatmentPlanUpdate => Ok(InboundEvent::TreatmentPlanUpdate(
                self.typed_payload::<TreatmentPlanUpdatePayload>()?,
            )),
            MessageKind::Unknown(other) => Err(AppError::validation(format!(
                "cannot decode payload of unknown message kind '{other}'"
            ))),
        }
    }

    fn typed_payload<T: for<'de> Deserialize<'de>>(&self) -> AppResult<T> {
        let payload = self.payload.clone().ok_or_else(|| {
            AppError::validation(format!("{} envelope is missing its payload", self.kind))
        })?;
        serde_json::from_value(payload).map_err(|e| {
            AppError::with_source(
                dentavia_core::ErrorKind::Serialization,
                format!("malformed {} payload", self.kind),
                e,
            )
        })
    }
}
