//! Connection registry: one row per live client identity.

mod memory;
mod redis_store;
mod types;

use std::sync::Arc;

use async_trait::async_trait;

pub use memory::MemoryRegistryStore;
pub use redis_store::RedisRegistryStore;
pub use types::{Connection, RegistryError, ScanCursor, ScanPage};

use crate::config::RegistryConfig;
use crate::redis::RedisPool;

/// Key-value store holding the connection rows.
///
/// Implementations provide per-row overwrite semantics only; there is no
/// transactional isolation between concurrent writers for the same identity.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Backend identifier for diagnostics.
    fn kind(&self) -> &'static str;

    /// Fetch the row for an identity.
    async fn get(&self, identity: &str) -> Result<Option<Connection>, RegistryError>;

    /// Write a row, replacing any existing row for the same identity.
    async fn put(&self, row: &Connection) -> Result<(), RegistryError>;

    /// Delete the row for an identity. Deleting an absent row is not an error.
    async fn delete(&self, identity: &str) -> Result<(), RegistryError>;

    /// Return one page of rows. Callers must keep scanning with the returned
    /// cursor until the store reports no further cursor.
    async fn scan(&self, cursor: Option<ScanCursor>) -> Result<ScanPage, RegistryError>;

    /// Total row count, for diagnostics only.
    async fn count(&self) -> Result<usize, RegistryError> {
        let mut total = 0;
        let mut cursor = None;
        loop {
            let page = self.scan(cursor.take()).await?;
            total += page.rows.len();
            match page.next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(total)
    }
}

/// Create a registry store based on configuration.
pub fn create_registry_store(
    config: &RegistryConfig,
    pool: Option<Arc<RedisPool>>,
) -> Arc<dyn RegistryStore> {
    if config.backend == "redis" {
        if let Some(pool) = pool {
            tracing::info!(
                page_size = config.scan_page_size,
                "Creating Redis registry store"
            );
            Arc::new(RedisRegistryStore::new(pool, config.scan_page_size))
        } else {
            tracing::warn!("Redis registry requested but pool not available, falling back to memory");
            Arc::new(MemoryRegistryStore::new(config.scan_page_size))
        }
    } else {
        tracing::info!("Using in-memory registry store");
        Arc::new(MemoryRegistryStore::new(config.scan_page_size))
    }
}
