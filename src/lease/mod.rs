//! Renewable, auto-expiring lease used to elect the single active broadcaster.

mod keeper;
mod memory;
mod redis_store;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use keeper::{HeldLease, LeaseKeeper};
pub use memory::MemoryLeaseStore;
pub use redis_store::RedisLeaseStore;

use crate::config::LeaseConfig;
use crate::redis::{PoolError, RedisPool};

/// Errors that can occur during lease store operations.
#[derive(Debug, Error)]
pub enum LeaseError {
    /// Redis operation failed
    #[error("Redis error: {0}")]
    Redis(#[from] PoolError),
}

/// Store holding lease rows keyed by lock id.
///
/// All operations compare the caller's owner token, so a holder can never
/// renew or release a lease that has expired and been taken by someone else.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Backend identifier for diagnostics.
    fn kind(&self) -> &'static str;

    /// Try to take the lease. Returns `false` when another owner's lease has
    /// not yet expired.
    async fn try_acquire(
        &self,
        lock_id: &str,
        owner: &str,
        max_age: Duration,
    ) -> Result<bool, LeaseError>;

    /// Extend the lease. Returns `false` when the caller no longer holds it.
    async fn renew(
        &self,
        lock_id: &str,
        owner: &str,
        max_age: Duration,
    ) -> Result<bool, LeaseError>;

    /// Release the lease if still held by the caller. Releasing a lease that
    /// was already lost is not an error.
    async fn release(&self, lock_id: &str, owner: &str) -> Result<(), LeaseError>;
}

/// Create a lease store based on configuration.
pub fn create_lease_store(
    config: &LeaseConfig,
    pool: Option<Arc<RedisPool>>,
) -> Arc<dyn LeaseStore> {
    if config.backend == "redis" {
        if let Some(pool) = pool {
            tracing::info!(lock_id = %config.lock_id, "Creating Redis lease store");
            Arc::new(RedisLeaseStore::new(pool))
        } else {
            tracing::warn!("Redis lease store requested but pool not available, falling back to memory");
            Arc::new(MemoryLeaseStore::new())
        }
    } else {
        tracing::info!("Using in-memory lease store");
        Arc::new(MemoryLeaseStore::new())
    }
}
