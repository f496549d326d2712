//! Marker store trait for session-scoped diagnostic state.
//!
//! The channel records small key/value markers (connected flag, last
//! successful connection time) for diagnostics and UX. They are never
//! used to resume a connection. Hosts can plug any backend; an in-memory
//! store ships with `dentavia-channel`.

use async_trait::async_trait;

use crate::result::AppResult;

/// Trait for diagnostic marker backends.
///
/// All values are plain strings. Keys are namespaced by the channel
/// (e.g. `"realtime_connected"`), so backends do not need their own
/// prefixing.
#[async_trait]
pub trait MarkerStore: Send + Sync + std::fmt::Debug + 'static {
    /// Get a marker by key. Returns `None` if the key does not exist.
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// Set a marker, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> AppResult<()>;

    /// Remove a marker. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> AppResult<()>;
}
