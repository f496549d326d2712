//! Message layer: envelope framing, kind discriminants, and frame codecs.

pub mod envelope;
pub mod serializer;
pub mod types;

pub use envelope::Envelope;
pub use types::{
    AppointmentReminderPayload, ChatPayload, InboundEvent, MessageKind, NotificationPayload,
    QuoteUpdatePayload, SystemPayload, TreatmentPlanUpdatePayload,
};
