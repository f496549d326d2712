//! Realtime endpoint locations and client identity.

use serde::{Deserialize, Serialize};

use crate::types::{ActorRef, ActorRole};

/// Where the realtime endpoints live and who this client is.
///
/// The identity fields become query parameters on the WebSocket URL and
/// the default `sender` stamped onto outbound envelopes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// WebSocket endpoint, e.g. `wss://app.dentavia.com/ws`.
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    /// Base URL of the long-poll fallback endpoints.
    #[serde(default = "default_poll_url")]
    pub poll_url: String,
    /// Platform user id of this client, if known.
    #[serde(default)]
    pub user_id: Option<i64>,
    /// Clinic id, for clinic-portal clients.
    #[serde(default)]
    pub clinic_id: Option<i64>,
    /// Whether this client connects as a clinic rather than a patient.
    #[serde(default)]
    pub is_clinic: bool,
}

impl EndpointConfig {
    /// The sender identity stamped onto outbound envelopes.
    ///
    /// Clinic clients stamp their clinic id; everyone else stamps their
    /// user id as a patient. Returns `None` for anonymous clients.
    pub fn sender(&self) -> Option<ActorRef> {
        if self.is_clinic {
            self.clinic_id
                .map(|id| ActorRef::new(id, ActorRole::Clinic))
        } else {
            self.user_id.map(|id| ActorRef::new(id, ActorRole::Patient))
        }
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            poll_url: default_poll_url(),
            user_id: None,
            clinic_id: None,
            is_clinic: false,
        }
    }
}

fn default_ws_url() -> String {
    "ws://localhost:5000/ws".to_string()
}

fn default_poll_url() -> String {
    "http://localhost:5000/api/realtime".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clinic_identity_wins_when_flagged() {
        let cfg = EndpointConfig {
            user_id: Some(11),
            clinic_id: Some(42),
            is_clinic: true,
            ..Default::default()
        };
        let sender = cfg.sender().unwrap();
        assert_eq!(sender.id, 42);
        assert_eq!(sender.role, ActorRole::Clinic);
    }

    #[test]
    fn test_patient_identity_by_default() {
        let cfg = EndpointConfig {
            user_id: Some(11),
            ..Default::default()
        };
        let sender = cfg.sender().unwrap();
        assert_eq!(sender.id, 11);
        assert_eq!(sender.role, ActorRole::Patient);
    }

    #[test]
    fn test_anonymous_client_has_no_sender() {
        assert!(EndpointConfig::default().sender().is_none());
    }
}
