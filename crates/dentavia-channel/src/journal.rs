//! Connection diagnostics journal.
//!
//! Persists session-scoped markers ("is the channel connected", "when did
//! it last connect successfully") through a [`MarkerStore`]. The markers
//! exist purely for diagnostics and support tooling; nothing reads them to
//! resume a connection.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::warn;

use dentavia_core::AppResult;
use dentavia_core::traits::MarkerStore;
use dentavia_core::types::ConnectionId;

/// Marker key recording the most recent successful connection time.
pub const LAST_SUCCESSFUL_CONNECTION_KEY: &str = "last_successful_connection";

/// Records connection lifecycle markers.
///
/// Store failures are logged and swallowed: diagnostics must never take
/// the channel down with them.
#[derive(Debug, Clone)]
pub struct ConnectionJournal {
    store: Arc<dyn MarkerStore>,
    prefix: String,
}

impl ConnectionJournal {
    /// Create a journal writing markers under the given prefix.
    pub fn new(store: Arc<dyn MarkerStore>, prefix: impl Into<String>) -> Self {
        Self { store, prefix: prefix.into() }
    }

    fn connected_key(&self) -> String {
        format!("{}_connected", self.prefix)
    }

    /// Record a successful open.
    pub async fn record_connected(&self, connection_id: ConnectionId) {
        if let Err(e) = self.store.set(&self.connected_key(), "true").await {
            warn!(error = %e, "failed to persist connected marker");
        }
        let stamp = Utc::now().to_rfc3339();
        if let Err(e) = self.store.set(LAST_SUCCESSFUL_CONNECTION_KEY, &stamp).await {
            warn!(error = %e, "failed to persist last-connection marker");
        }
        tracing::debug!(%connection_id, "connection recorded in journal");
    }

    /// Record that the channel is down.
    pub async fn record_disconnected(&self) {
        if let Err(e) = self.store.set(&self.connected_key(), "false").await {
            warn!(error = %e, "failed to persist disconnected marker");
        }
    }

    /// Whether the connected marker currently reads true.
    pub async fn is_marked_connected(&self) -> bool {
        matches!(
            self.store.get(&self.connected_key()).await,
            Ok(Some(value)) if value == "true"
        )
    }

    /// Timestamp of the last successful connection, if one was recorded
    /// and parses.
    pub async fn last_successful_connection(&self) -> Option<DateTime<Utc>> {
        let raw = self.store.get(LAST_SUCCESSFUL_CONNECTION_KEY).await.ok()??;
        DateTime::parse_from_rfc3339(&raw).ok().map(|dt| dt.with_timezone(&Utc))
    }
}

/// In-process marker store used by default and in tests.
#[derive(Debug, Default)]
pub struct MemoryMarkerStore {
    entries: DashMap<String, String>,
}

impl MemoryMarkerStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MarkerStore for MemoryMarkerStore {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn set(&self, key: &str, value: &str) -> AppResult<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> AppResult<()> {
        self.entries.remove(key);
        Ok(())
    }
}
