use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};

/// Error types for local store access
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid store path: {0}")]
    InvalidPath(String),
}

/// Path-addressed durable text storage.
///
/// Paths are `/`-separated keys such as `txEngineFolder/walletLocalData.json`. Reading a
/// path that was never written yields `Ok(None)`.
#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn get_text(&self, path: &str) -> Result<Option<String>, StoreError>;
    async fn set_text(&self, path: &str, text: &str) -> Result<(), StoreError>;
}

/// File-based implementation of LocalStore rooted at a data directory
pub struct FileLocalStore {
    data_dir: PathBuf,
}

impl FileLocalStore {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    /// Map a store key onto a file below `data_dir`, refusing anything that could escape it.
    fn resolve(&self, path: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(path);
        let is_plain = !path.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !is_plain {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        Ok(self.data_dir.join(relative))
    }
}

#[async_trait]
impl LocalStore for FileLocalStore {
    async fn get_text(&self, path: &str) -> Result<Option<String>, StoreError> {
        let filename = self.resolve(path)?;
        match tokio::fs::read_to_string(&filename).await {
            Ok(text) => {
                debug!("Loaded {} bytes from {:?}", text.len(), filename);
                Ok(Some(text))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set_text(&self, path: &str, text: &str) -> Result<(), StoreError> {
        let filename = self.resolve(path)?;
        if let Some(parent) = filename.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write next to the target and rename so a crash never leaves a torn snapshot
        let mut tmp_name = filename.clone().into_os_string();
        tmp_name.push(".tmp");
        let tmp_filename = PathBuf::from(tmp_name);
        tokio::fs::write(&tmp_filename, text).await?;
        tokio::fs::rename(&tmp_filename, &filename).await?;

        info!("Saved {} bytes to {:?}", text.len(), filename);
        Ok(())
    }
}

/// In-memory implementation of LocalStore, for hosts without durable storage and for tests
#[derive(Default)]
pub struct MemoryLocalStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LocalStore for MemoryLocalStore {
    async fn get_text(&self, path: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(path).cloned())
    }

    async fn set_text(&self, path: &str, text: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(path.to_string(), text.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileLocalStore::new(dir.path().to_path_buf());

        assert_eq!(store.get_text("txEngineFolder/wallet.json").await.unwrap(), None);

        store
            .set_text("txEngineFolder/wallet.json", "{\"a\":1}")
            .await
            .unwrap();
        assert_eq!(
            store.get_text("txEngineFolder/wallet.json").await.unwrap(),
            Some("{\"a\":1}".to_string())
        );

        store
            .set_text("txEngineFolder/wallet.json", "{\"a\":2}")
            .await
            .unwrap();
        assert_eq!(
            store.get_text("txEngineFolder/wallet.json").await.unwrap(),
            Some("{\"a\":2}".to_string())
        );
        assert!(!dir.path().join("txEngineFolder/wallet.json.tmp").exists());
    }

    #[tokio::test]
    async fn file_store_rejects_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileLocalStore::new(dir.path().to_path_buf());

        for bad in ["", "../outside.json", "/etc/passwd", "a/../../b"] {
            assert!(
                matches!(store.set_text(bad, "x").await, Err(StoreError::InvalidPath(_))),
                "accepted {bad:?}"
            );
        }
    }

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemoryLocalStore::new();
        assert_eq!(store.get_text("a/b").await.unwrap(), None);
        store.set_text("a/b", "hello").await.unwrap();
        assert_eq!(store.get_text("a/b").await.unwrap(), Some("hello".to_string()));
    }
}
