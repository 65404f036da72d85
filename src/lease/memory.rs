//! In-memory lease store.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use super::{LeaseError, LeaseStore};

struct LeaseRow {
    owner: String,
    expires_at: Instant,
}

/// In-memory lease store.
///
/// Expiry is evaluated lazily on access; a row whose deadline has passed is
/// treated as absent. `DashMap::entry` serializes competing acquirers on the
/// same lock id.
pub struct MemoryLeaseStore {
    rows: DashMap<String, LeaseRow>,
}

impl MemoryLeaseStore {
    pub fn new() -> Self {
        Self {
            rows: DashMap::new(),
        }
    }
}

impl Default for MemoryLeaseStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LeaseStore for MemoryLeaseStore {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn try_acquire(
        &self,
        lock_id: &str,
        owner: &str,
        max_age: Duration,
    ) -> Result<bool, LeaseError> {
        let now = Instant::now();
        let row = LeaseRow {
            owner: owner.to_string(),
            expires_at: now + max_age,
        };

        match self.rows.entry(lock_id.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(mut entry) => {
                let current = entry.get();
                if current.expires_at > now && current.owner != owner {
                    return Ok(false);
                }
                entry.insert(row);
                Ok(true)
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(row);
                Ok(true)
            }
        }
    }

    async fn renew(
        &self,
        lock_id: &str,
        owner: &str,
        max_age: Duration,
    ) -> Result<bool, LeaseError> {
        let now = Instant::now();
        match self.rows.get_mut(lock_id) {
            Some(mut entry) => {
                if entry.owner != owner || entry.expires_at <= now {
                    return Ok(false);
                }
                entry.expires_at = now + max_age;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn release(&self, lock_id: &str, owner: &str) -> Result<(), LeaseError> {
        let _ = self.rows.remove_if(lock_id, |_, row| row.owner == owner);
        Ok(())
    }
}
