use std::path::PathBuf;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

/// Errors that can occur during blob store operations.
#[derive(Debug, Error)]
pub enum BlobStoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Write-only object storage for shipped logs.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Backend identifier for diagnostics.
    fn kind(&self) -> &'static str;

    /// Store an object under a key.
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<(), BlobStoreError>;
}

/// In-memory blob store for local runs and tests.
pub struct MemoryBlobStore {
    objects: DashMap<String, Vec<u8>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self {
            objects: DashMap::new(),
        }
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.get(key).map(|o| o.clone())
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.iter().map(|o| o.key().clone()).collect()
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn put(&self, key: &str, body: Vec<u8>) -> Result<(), BlobStoreError> {
        self.objects.insert(key.to_string(), body);
        Ok(())
    }
}

/// Filesystem blob store; keys become paths under the root directory.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    fn kind(&self) -> &'static str {
        "fs"
    }

    async fn put(&self, key: &str, body: Vec<u8>) -> Result<(), BlobStoreError> {
        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, body).await?;
        Ok(())
    }
}
