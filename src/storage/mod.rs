//! Object storage for persisted run records
//! Uses Apache Arrow object_store crate

use futures::TryStreamExt;
use object_store::{ObjectStore, local::LocalFileSystem, path::Path as StoragePath};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to prepare storage root {path}: {source}")]
    Root {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Object store error: {0}")]
    ObjectStoreError(#[from] object_store::Error),
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

/// Storage client wrapping object_store
#[derive(Clone)]
pub struct StorageClient {
    store: Arc<dyn ObjectStore>,
}

impl StorageClient {
    /// Create new storage client with any object_store backend
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Create in-memory storage for testing/development
    pub fn in_memory() -> Self {
        Self::new(Arc::new(object_store::memory::InMemory::new()))
    }

    /// Create storage rooted at a local directory, creating it if needed
    pub fn local(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root).map_err(|source| StorageError::Root {
            path: root.display().to_string(),
            source,
        })?;

        let store = LocalFileSystem::new_with_prefix(root)?;
        Ok(Self::new(Arc::new(store)))
    }

    /// Upload bytes to storage
    pub async fn upload(&self, key: &str, data: Vec<u8>) -> Result<()> {
        let path = StoragePath::from(key);
        let size = data.len();

        let put_result = self.store.put(&path, data.into()).await?;

        tracing::info!(key, size, etag = ?put_result.e_tag, "Uploaded to storage");

        Ok(())
    }

    /// Download from storage
    pub async fn download(&self, key: &str) -> Result<Vec<u8>> {
        let path = StoragePath::from(key);

        let result = self.store.get(&path).await?;
        let bytes = result.bytes().await?;

        tracing::debug!(key, size = bytes.len(), "Downloaded from storage");

        Ok(bytes.to_vec())
    }

    /// List keys stored under a prefix
    pub async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let prefix = StoragePath::from(prefix);

        let objects: Vec<_> = self.store.list(Some(&prefix)).try_collect().await?;

        Ok(objects
            .into_iter()
            .map(|meta| meta.location.to_string())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_in_memory_roundtrip() {
        let storage = StorageClient::in_memory();
        storage.upload("runs/a.json", b"{}".to_vec()).await.unwrap();

        assert_eq!(storage.download("runs/a.json").await.unwrap(), b"{}");
        assert_eq!(storage.list("runs").await.unwrap(), vec!["runs/a.json".to_string()]);
    }

    #[tokio::test]
    async fn test_local_creates_root() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("nested").join("runs");

        let storage = StorageClient::local(&root).unwrap();
        storage.upload("x/record.json", b"[]".to_vec()).await.unwrap();

        assert!(root.join("x").join("record.json").exists());
    }

    #[tokio::test]
    async fn test_download_missing_key() {
        let storage = StorageClient::in_memory();
        let err = storage.download("missing.json").await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::ObjectStoreError(object_store::Error::NotFound { .. })
        ));
    }
}
