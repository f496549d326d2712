//! Traits implemented by pluggable backends.

pub mod markers;

pub use markers::MarkerStore;
