//! Lease acquisition with background renewal.

use std::sync::Arc;

use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::LeaseConfig;
use crate::metrics::{LEASE_ACQUISITIONS_TOTAL, LEASE_CONTENTION_TOTAL};

use super::{LeaseError, LeaseStore};

/// Acquires leases and keeps them renewed while held.
pub struct LeaseKeeper {
    store: Arc<dyn LeaseStore>,
    config: LeaseConfig,
}

impl LeaseKeeper {
    pub fn new(store: Arc<dyn LeaseStore>, config: LeaseConfig) -> Self {
        Self { store, config }
    }

    pub fn backend_kind(&self) -> &'static str {
        self.store.kind()
    }

    /// Try to take the lease.
    ///
    /// `Ok(None)` means another holder's lease has not expired; the caller
    /// must treat this as "already running" and return without side effects.
    /// On success a renewal task heartbeats the lease until it is released
    /// or the holder dies, after which the lease expires on its own.
    pub async fn acquire(&self, lock_id: &str) -> Result<Option<HeldLease>, LeaseError> {
        let owner = Uuid::new_v4().to_string();
        let max_age = self.config.max_age();

        if !self.store.try_acquire(lock_id, &owner, max_age).await? {
            LEASE_CONTENTION_TOTAL.inc();
            tracing::debug!(lock_id = %lock_id, "Lease already held");
            return Ok(None);
        }

        LEASE_ACQUISITIONS_TOTAL.inc();
        tracing::info!(lock_id = %lock_id, owner = %owner, "Lease acquired");

        let renew_task = spawn_renewal(
            self.store.clone(),
            lock_id.to_string(),
            owner.clone(),
            self.config.clone(),
        );

        Ok(Some(HeldLease {
            store: self.store.clone(),
            lock_id: lock_id.to_string(),
            owner,
            renew_task,
        }))
    }
}

fn spawn_renewal(
    store: Arc<dyn LeaseStore>,
    lock_id: String,
    owner: String,
    config: LeaseConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(config.heartbeat_interval());
        // Skip immediate first tick
        timer.tick().await;

        loop {
            timer.tick().await;
            match store.renew(&lock_id, &owner, config.max_age()).await {
                Ok(true) => {
                    tracing::trace!(lock_id = %lock_id, "Lease renewed");
                }
                Ok(false) => {
                    tracing::warn!(
                        lock_id = %lock_id,
                        owner = %owner,
                        "Lease no longer held, stopping renewal"
                    );
                    break;
                }
                Err(e) => {
                    // Tolerated: the lease survives a missed renewal or two
                    tracing::warn!(lock_id = %lock_id, error = %e, "Lease renewal failed");
                }
            }
        }
    })
}

/// An acquired lease.
///
/// `release` consumes the value, so each exit path releases at most once.
/// Dropping without releasing (a crash or panic unwind) stops the heartbeat
/// and leaves the lease to expire after `max_age`, which is the sole
/// crash-recovery mechanism.
pub struct HeldLease {
    store: Arc<dyn LeaseStore>,
    lock_id: String,
    owner: String,
    renew_task: JoinHandle<()>,
}

impl HeldLease {
    pub async fn release(self) {
        self.renew_task.abort();
        if let Err(e) = self.store.release(&self.lock_id, &self.owner).await {
            tracing::warn!(
                lock_id = %self.lock_id,
                error = %e,
                "Failed to release lease; it will expire on its own"
            );
        } else {
            tracing::info!(lock_id = %self.lock_id, "Lease released");
        }
    }
}

impl Drop for HeldLease {
    fn drop(&mut self) {
        self.renew_task.abort();
    }
}
