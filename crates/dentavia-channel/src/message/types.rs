//! Message kind discriminants and typed payload definitions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Wire-level message kind carried in the envelope `type` field.
///
/// Kinds the client does not recognize are preserved as [`MessageKind::Unknown`]
/// rather than rejected, so newer server builds can ship new kinds without
/// breaking older clients.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageKind {
    /// User-facing notification (badge, toast).
    Notification,
    /// Patient/clinic chat message.
    Chat,
    /// Keepalive probe.
    Ping,
    /// Keepalive reply.
    Pong,
    /// System announcement (maintenance, service notices).
    System,
    /// Quote status changed for a treatment request.
    QuoteUpdate,
    /// Upcoming appointment reminder.
    AppointmentReminder,
    /// Treatment plan stage or status changed.
    TreatmentPlanUpdate,
    /// Kind not recognized by this client build.
    Unknown(String),
}

impl MessageKind {
    /// Wire name of the kind.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Notification => "notification",
            Self::Chat => "chat",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::System => "system",
            Self::QuoteUpdate => "quote_update",
            Self::AppointmentReminder => "appointment_reminder",
            Self::TreatmentPlanUpdate => "treatment_plan_update",
            Self::Unknown(other) => other.as_str(),
        }
    }

    /// Whether the kind is one this client build understands.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }

    /// Whether the kind is part of the keepalive exchange.
    pub fn is_keepalive(&self) -> bool {
        matches!(self, Self::Ping | Self::Pong)
    }
}

impl From<String> for MessageKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "notification" => Self::Notification,
            "chat" => Self::Chat,
            "ping" => Self::Ping,
            "pong" => Self::Pong,
            "system" => Self::System,
            "quote_update" => Self::QuoteUpdate,
            "appointment_reminder" => Self::AppointmentReminder,
            "treatment_plan_update" => Self::TreatmentPlanUpdate,
            _ => Self::Unknown(value),
        }
    }
}

impl From<&str> for MessageKind {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<MessageKind> for String {
    fn from(kind: MessageKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a [`MessageKind::Notification`] envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPayload {
    /// Notification title.
    pub title: String,
    /// Notification body.
    pub message: String,
    /// Notification category (e.g., "booking", "billing").
    #[serde(default)]
    pub category: Option<String>,
    /// Priority level (e.g., "low", "normal", "high").
    #[serde(default)]
    pub priority: Option<String>,
}

/// Payload of a [`MessageKind::Chat`] envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatPayload {
    /// Message text.
    pub message: String,
    /// Conversation thread the message belongs to.
    #[serde(default)]
    pub thread_id: Option<i64>,
    /// Optional attachment (treatment photo, document).
    #[serde(default)]
    pub attachment_url: Option<String>,
}

/// Payload of a [`MessageKind::System`] envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemPayload {
    /// Announcement text.
    pub message: String,
    /// Severity level (e.g., "info", "warning").
    #[serde(default)]
    pub severity: Option<String>,
}

/// Payload of a [`MessageKind::QuoteUpdate`] envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteUpdatePayload {
    /// Quote being updated.
    pub quote_id: i64,
    /// New quote status (e.g., "sent", "accepted", "revised").
    pub status: String,
    /// Quoted total, if the update changed it.
    #[serde(default)]
    pub total: Option<f64>,
    /// Currency code for the total.
    #[serde(default)]
    pub currency: Option<String>,
}

/// Payload of a [`MessageKind::AppointmentReminder`] envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentReminderPayload {
    /// Appointment being reminded about.
    pub appointment_id: i64,
    /// Scheduled start, epoch milliseconds UTC.
    pub starts_at: i64,
    /// Clinic display name.
    #[serde(default)]
    pub clinic_name: Option<String>,
    /// Short description of the visit.
    #[serde(default)]
    pub summary: Option<String>,
}

/// Payload of a [`MessageKind::TreatmentPlanUpdate`] envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreatmentPlanUpdatePayload {
    /// Treatment plan being updated.
    pub plan_id: i64,
    /// New plan status.
    pub status: String,
    /// Current stage label, if the plan tracks stages.
    #[serde(default)]
    pub stage: Option<String>,
}

/// A fully decoded inbound message, payload parsed per kind.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    /// User-facing notification.
    Notification(NotificationPayload),
    /// Chat message.
    Chat(ChatPayload),
    /// Keepalive probe from the server.
    Ping {
        /// Server timestamp, epoch milliseconds.
        timestamp: Option<i64>,
    },
    /// Keepalive reply from the server.
    Pong {
        /// Echoed timestamp, epoch milliseconds.
        timestamp: Option<i64>,
    },
    /// System announcement.
    System(SystemPayload),
    /// Quote status change.
    QuoteUpdate(QuoteUpdatePayload),
    /// Appointment reminder.
    AppointmentReminder(AppointmentReminderPayload),
    /// Treatment plan change.
    TreatmentPlanUpdate(TreatmentPlanUpdatePayload),
}

impl InboundEvent {
    /// Kind discriminant matching the event variant.
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Notification(_) => MessageKind::Notification,
            Self::Chat(_) => MessageKind::Chat,
            Self::Ping { .. } => MessageKind::Ping,
            Self::Pong { .. } => MessageKind::Pong,
            Self::System(_) => MessageKind::System,
            Self::QuoteUpdate(_) => MessageKind::QuoteUpdate,
            Self::AppointmentReminder(_) => MessageKind::AppointmentReminder,
            Self::TreatmentPlanUpdate(_) => MessageKind::TreatmentPlanUpdate,
        }
    }
}
