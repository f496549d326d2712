//! Shared types for the Dentavia realtime channel.

pub mod actor;
pub mod id;

pub use actor::{ActorRef, ActorRole};
pub use id::ConnectionId;
