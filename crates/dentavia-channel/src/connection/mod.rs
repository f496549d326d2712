//! Connection lifecycle: the state machine, backoff policy, and
//! transport selection.

pub mod machine;
pub mod retry;
pub mod selector;

pub use machine::{ConnectionMachine, Effect, MachineInput, Phase};
pub use retry::ReconnectPolicy;
pub use selector::{TransportKind, TransportSelector};
