//! State persistence service for wallet synchronization.
//!
//! This module provides the `StatePersistenceService`, which loads and saves the wallet snapshot
//! through a [`LocalStore`]. The snapshot is one JSON document at a fixed key path; a missing
//! document means a fresh wallet, an unreadable one is an error the caller must surface.

use crate::wallet::WalletSyncError;
use crate::wallet::state::WalletState;
use crate::wallet::sync::repositories::LocalStore;

use std::sync::Arc;
use tracing::{debug, info};

/// Service for managing state persistence operations.
pub struct StatePersistenceService {
    store: Arc<dyn LocalStore>,
    path: String,
}

impl StatePersistenceService {
    /// Create a persistence service writing the snapshot to `path` inside `store`.
    pub fn new(store: Arc<dyn LocalStore>, path: String) -> Self {
        Self { store, path }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Load the persisted snapshot, if one exists.
    pub async fn load(
        &self,
        primary_currency: &str,
    ) -> Result<Option<WalletState>, WalletSyncError> {
        let Some(text) = self.store.get_text(&self.path).await? else {
            info!("No wallet snapshot at {}", self.path);
            return Ok(None);
        };

        let state = WalletState::from_json(&text, primary_currency).map_err(|e| {
            WalletSyncError::ParseError(format!("Failed to parse {}: {}", self.path, e))
        })?;

        info!(
            "Restored wallet state: height {}, {} addresses, {} queued transactions",
            state.block_height,
            state.addresses.len(),
            state.transactions_to_fetch.len()
        );
        Ok(Some(state))
    }

    /// Write a snapshot, replacing the previous one.
    pub async fn save(&self, state: &WalletState) -> Result<(), WalletSyncError> {
        let text = state.to_json().map_err(|e| {
            WalletSyncError::ParseError(format!("Failed to serialize wallet state: {}", e))
        })?;
        self.store.set_text(&self.path, &text).await?;
        debug!("Saved wallet state at height {}", state.block_height);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::sync::repositories::MemoryLocalStore;

    #[tokio::test]
    async fn load_missing_snapshot_is_none() {
        let service = StatePersistenceService::new(
            Arc::new(MemoryLocalStore::new()),
            "txEngineFolder/walletLocalData.json".to_string(),
        );
        assert!(service.load("TRD").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_then_load() {
        let store = Arc::new(MemoryLocalStore::new());
        let service = StatePersistenceService::new(store.clone(), "w/state.json".to_string());

        let mut state = WalletState::new("pubabc", "TRD");
        state.block_height = 77;
        service.save(&state).await.unwrap();

        let restored = service.load("TRD").await.unwrap().unwrap();
        assert_eq!(restored, state);
    }

    #[tokio::test]
    async fn corrupt_snapshot_is_a_parse_error() {
        let store = Arc::new(MemoryLocalStore::new());
        store.set_text("w/state.json", "{oops").await.unwrap();
        let service = StatePersistenceService::new(store, "w/state.json".to_string());

        assert!(matches!(
            service.load("TRD").await,
            Err(WalletSyncError::ParseError(_))
        ));
    }
}
