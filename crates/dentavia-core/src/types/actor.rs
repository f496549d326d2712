//! Actor identity types carried in envelope `sender` fields.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// The three kinds of actors that exchange messages on the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorRole {
    /// A patient using the quote builder / patient portal.
    Patient,
    /// A clinic staff member using the clinic portal.
    Clinic,
    /// A platform administrator.
    Admin,
}

impl ActorRole {
    /// Return the role as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Patient => "patient",
            Self::Clinic => "clinic",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ActorRole {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "patient" => Ok(Self::Patient),
            "clinic" => Ok(Self::Clinic),
            "admin" => Ok(Self::Admin),
            other => Err(AppError::validation(format!("Unknown actor role: {other}"))),
        }
    }
}

/// Identity of the actor that produced (or should receive) a message.
///
/// Serialized inside envelopes as `{ "id": 42, "type": "clinic" }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorRef {
    /// Numeric platform id of the actor.
    pub id: i64,
    /// What kind of actor this is.
    #[serde(rename = "type")]
    pub role: ActorRole,
}

impl ActorRef {
    /// Create a new actor reference.
    pub fn new(id: i64, role: ActorRole) -> Self {
        Self { id, role }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trips_as_lowercase() {
        let json = serde_json::to_string(&ActorRole::Clinic).unwrap();
        assert_eq!(json, "\"clinic\"");
        let parsed: ActorRole = serde_json::from_str("\"admin\"").unwrap();
        assert_eq!(parsed, ActorRole::Admin);
    }

    #[test]
    fn test_actor_ref_uses_type_field() {
        let sender = ActorRef::new(7, ActorRole::Patient);
        let json = serde_json::to_value(&sender).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["type"], "patient");
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        assert!("dentist".parse::<ActorRole>().is_err());
    }
}
