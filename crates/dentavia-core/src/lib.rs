//! # dentavia-core
//!
//! Core crate for the Dentavia realtime channel. Contains configuration
//! schemas, shared types, the marker-store trait, and the unified error
//! system.
//!
//! This crate has **no** internal dependencies on other Dentavia crates.

pub mod config;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

pub use error::{AppError, ErrorKind};
pub use result::AppResult;
