//! The broadcast coordinator: the single active broadcaster elected through
//! the lease lock.
//!
//! One instance repeatedly sweeps the connection registry, evicts rows whose
//! transport is presumed dead, fans a timestamp payload out to everything
//! alive, and ends in one of three ways: another instance already holds the
//! lease, the registry drained, or the compute quantum is nearly exhausted
//! and a successor instance has been scheduled.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use thiserror::Error;
use tokio::time::Instant;

use crate::config::CoordinatorConfig;
use crate::continuation::{ContinuationError, ContinuationScheduler};
use crate::gateway::TransportGateway;
use crate::lease::{LeaseError, LeaseKeeper};
use crate::metrics::{
    BROADCAST_SENDS_TOTAL, BROADCAST_SEND_FAILURES_TOTAL, CONNECTIONS_LIVE,
    CONTINUATIONS_DISPATCHED_TOTAL, STALE_EVICTIONS_TOTAL, SWEEP_DURATION_SECONDS,
};
use crate::protocol::{ContinuationMarker, OutboundFrame};
use crate::registry::{Connection, RegistryError, RegistryStore};

/// Errors that abort a coordinator instance.
///
/// Per-connection failures never surface here; only store-level and hand-off
/// failures do, and the lease is released before they propagate.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Lease(#[from] LeaseError),

    #[error(transparent)]
    Continuation(#[from] ContinuationError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// How a coordinator instance ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorOutcome {
    /// Another instance holds the lease; nothing was done.
    AlreadyRunning,
    /// A full pass found no live connections; the session is over.
    Drained,
    /// The quantum was nearly exhausted; a successor has been dispatched.
    Rescheduled,
}

pub struct BroadcastCoordinator {
    registry: Arc<dyn RegistryStore>,
    gateway: Arc<dyn TransportGateway>,
    scheduler: Arc<dyn ContinuationScheduler>,
    leases: Arc<LeaseKeeper>,
    config: CoordinatorConfig,
    lock_id: String,
}

impl BroadcastCoordinator {
    pub fn new(
        registry: Arc<dyn RegistryStore>,
        gateway: Arc<dyn TransportGateway>,
        scheduler: Arc<dyn ContinuationScheduler>,
        leases: Arc<LeaseKeeper>,
        config: CoordinatorConfig,
        lock_id: String,
    ) -> Self {
        Self {
            registry,
            gateway,
            scheduler,
            leases,
            config,
            lock_id,
        }
    }

    /// Run one coordinator instance to completion.
    ///
    /// Holds the lease for the lifetime of the scan loop and releases it on
    /// every exit path, including errors. A contended acquisition is not an
    /// error: it means a broadcaster is already running.
    pub async fn run(&self) -> Result<CoordinatorOutcome, CoordinatorError> {
        let Some(lease) = self.leases.acquire(&self.lock_id).await? else {
            return Ok(CoordinatorOutcome::AlreadyRunning);
        };

        let started = Instant::now();
        tracing::info!(lock_id = %self.lock_id, "Broadcast coordinator started");

        let result = self.sweep_loop(started).await;
        lease.release().await;

        match &result {
            Ok(outcome) => {
                tracing::info!(
                    outcome = ?outcome,
                    elapsed_secs = started.elapsed().as_secs(),
                    "Broadcast coordinator finished"
                );
            }
            Err(e) => {
                tracing::error!(error = %e, "Broadcast coordinator aborted");
            }
        }

        result
    }

    async fn sweep_loop(&self, started: Instant) -> Result<CoordinatorOutcome, CoordinatorError> {
        let reinvoke_after = self.config.reinvoke_after();

        loop {
            let pass_started = Instant::now();
            let live = self.sweep_once().await?;
            SWEEP_DURATION_SECONDS.observe(pass_started.elapsed().as_secs_f64());
            CONNECTIONS_LIVE.set(live as i64);

            if live == 0 {
                tracing::info!("No live connections remain, exiting");
                return Ok(CoordinatorOutcome::Drained);
            }

            tokio::time::sleep(self.config.scan_interval()).await;

            if started.elapsed() >= reinvoke_after {
                tracing::info!(
                    elapsed_secs = started.elapsed().as_secs(),
                    "Quantum nearly exhausted, handing off to a successor"
                );
                self.scheduler
                    .invoke_self(&ContinuationMarker::sweep())
                    .await?;
                CONTINUATIONS_DISPATCHED_TOTAL.inc();
                return Ok(CoordinatorOutcome::Rescheduled);
            }
        }
    }

    /// One full pass over the registry. Returns the live-connection count.
    async fn sweep_once(&self) -> Result<usize, CoordinatorError> {
        let now = Utc::now();
        let stale_after = self.config.stale_after();
        let payload = serde_json::to_vec(&OutboundFrame::Tick { now })?;

        let mut live = 0usize;
        let mut cursor = None;

        loop {
            let page = self.registry.scan(cursor.take()).await?;

            let mut sends = Vec::new();
            for row in page.rows {
                if row.age(now) > stale_after {
                    self.evict(&row, now).await;
                } else {
                    live += 1;
                    sends.push(self.send_tick(row, &payload));
                }
            }
            // Fan out concurrently; one bad connection never aborts the rest
            join_all(sends).await;

            match page.next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(live)
    }

    async fn evict(&self, row: &Connection, now: DateTime<Utc>) {
        if let Err(e) = self.gateway.close(&row.handle).await {
            tracing::debug!(
                identity = %row.identity,
                handle = %row.handle,
                error = %e,
                "Close failed for stale handle"
            );
        }

        match self.registry.delete(&row.identity).await {
            Ok(()) => {
                STALE_EVICTIONS_TOTAL.inc();
                tracing::info!(
                    identity = %row.identity,
                    age_secs = row.age(now).num_seconds(),
                    "Evicted stale connection"
                );
            }
            Err(e) => {
                tracing::warn!(
                    identity = %row.identity,
                    error = %e,
                    "Failed to delete stale row, leaving it for the next pass"
                );
            }
        }
    }

    async fn send_tick(&self, row: Connection, payload: &[u8]) {
        match self.gateway.send(&row.handle, payload).await {
            Ok(()) => {
                BROADCAST_SENDS_TOTAL.inc();
            }
            Err(e) => {
                BROADCAST_SEND_FAILURES_TOTAL.inc();
                tracing::debug!(
                    identity = %row.identity,
                    handle = %row.handle,
                    error = %e,
                    "Broadcast send failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LeaseConfig;
    use crate::continuation::ContinuationScheduler;
    use crate::gateway::LocalTransportGateway;
    use crate::lease::{LeaseStore, MemoryLeaseStore};
    use crate::registry::MemoryRegistryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct RecordingScheduler {
        dispatched: AtomicUsize,
    }

    impl RecordingScheduler {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                dispatched: AtomicUsize::new(0),
            })
        }

        fn count(&self) -> usize {
            self.dispatched.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ContinuationScheduler for RecordingScheduler {
        fn kind(&self) -> &'static str {
            "recording"
        }

        async fn invoke_self(&self, _marker: &ContinuationMarker) -> Result<(), ContinuationError> {
            self.dispatched.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct TestHarness {
        registry: Arc<MemoryRegistryStore>,
        gateway: Arc<LocalTransportGateway>,
        scheduler: Arc<RecordingScheduler>,
        lease_store: Arc<MemoryLeaseStore>,
        coordinator: BroadcastCoordinator,
    }

    fn harness(config: CoordinatorConfig) -> TestHarness {
        let registry = Arc::new(MemoryRegistryStore::new(4));
        let gateway = Arc::new(LocalTransportGateway::new());
        let scheduler = RecordingScheduler::new();
        let lease_store = Arc::new(MemoryLeaseStore::new());
        let leases = Arc::new(LeaseKeeper::new(
            lease_store.clone() as Arc<dyn LeaseStore>,
            LeaseConfig::default(),
        ));
        let coordinator = BroadcastCoordinator::new(
            registry.clone(),
            gateway.clone(),
            scheduler.clone(),
            leases,
            config,
            "broadcast-coordinator".to_string(),
        );
        TestHarness {
            registry,
            gateway,
            scheduler,
            lease_store,
            coordinator,
        }
    }

    fn aged_row(identity: &str, handle: &str, age_minutes: i64) -> Connection {
        let mut row = Connection::new(identity, handle);
        row.last_seen = Utc::now() - chrono::Duration::minutes(age_minutes);
        row
    }

    #[tokio::test]
    async fn test_empty_registry_drains_immediately() {
        let h = harness(CoordinatorConfig::default());
        let outcome = h.coordinator.run().await.unwrap();
        assert_eq!(outcome, CoordinatorOutcome::Drained);

        // The lease was released and is acquirable again
        assert!(h
            .lease_store
            .try_acquire("broadcast-coordinator", "probe", Duration::from_secs(10))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_contended_lease_short_circuits() {
        let h = harness(CoordinatorConfig::default());
        h.registry.put(&aged_row("a", "h-a", 0)).await.unwrap();

        // Simulate another holder
        assert!(h
            .lease_store
            .try_acquire("broadcast-coordinator", "other", Duration::from_secs(60))
            .await
            .unwrap());

        let outcome = h.coordinator.run().await.unwrap();
        assert_eq!(outcome, CoordinatorOutcome::AlreadyRunning);

        // No registry mutation, no sends, no continuation
        assert_eq!(h.registry.len(), 1);
        assert_eq!(h.scheduler.count(), 0);
    }

    #[tokio::test]
    async fn test_sweep_evicts_stale_and_sends_to_fresh() {
        let h = harness(CoordinatorConfig::default());
        let mut fresh_rx = h.gateway.open("h-fresh");
        let mut stale_rx = h.gateway.open("h-stale");

        h.registry.put(&aged_row("fresh", "h-fresh", 1)).await.unwrap();
        h.registry.put(&aged_row("stale", "h-stale", 200)).await.unwrap();

        let live = h.coordinator.sweep_once().await.unwrap();
        assert_eq!(live, 1);

        // The aged row is gone and its handle was closed
        assert!(h.registry.get("stale").await.unwrap().is_none());
        assert!(stale_rx.recv().await.is_none());

        // The fresh row is untouched and received a tick
        assert!(h.registry.get("fresh").await.unwrap().is_some());
        let frame: OutboundFrame = serde_json::from_slice(&fresh_rx.recv().await.unwrap()).unwrap();
        assert!(matches!(frame, OutboundFrame::Tick { .. }));
    }

    #[tokio::test]
    async fn test_sweep_paginates_past_one_page() {
        // Page size is 4; ten rows force three pages
        let h = harness(CoordinatorConfig::default());
        let mut receivers = Vec::new();
        for i in 0..10 {
            let handle = format!("h-{}", i);
            receivers.push(h.gateway.open(&handle));
            h.registry
                .put(&aged_row(&format!("id-{}", i), &handle, 0))
                .await
                .unwrap();
        }

        let live = h.coordinator.sweep_once().await.unwrap();
        assert_eq!(live, 10);

        for rx in &mut receivers {
            assert!(rx.recv().await.is_some());
        }
    }

    #[tokio::test]
    async fn test_send_failure_does_not_abort_fanout() {
        let h = harness(CoordinatorConfig::default());
        // "dead" has no open link; "alive" does
        let mut alive_rx = h.gateway.open("h-alive");
        h.registry.put(&aged_row("dead", "h-dead", 1)).await.unwrap();
        h.registry.put(&aged_row("alive", "h-alive", 1)).await.unwrap();

        let live = h.coordinator.sweep_once().await.unwrap();
        // Both rows count as live; delivery is best-effort
        assert_eq!(live, 2);
        assert!(alive_rx.recv().await.is_some());
        assert!(h.registry.get("dead").await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_quantum_handoff_dispatches_exactly_one_continuation() {
        let config = CoordinatorConfig {
            scan_interval_ms: 1000,
            quantum_secs: 3,
            quantum_safety_margin_secs: 1,
            ..Default::default()
        };
        let h = harness(config);
        let _rx = h.gateway.open("h-a");
        h.registry.put(&aged_row("a", "h-a", 0)).await.unwrap();

        let outcome = h.coordinator.run().await.unwrap();
        assert_eq!(outcome, CoordinatorOutcome::Rescheduled);
        assert_eq!(h.scheduler.count(), 1);

        // The row survives for the successor instance
        assert_eq!(h.registry.len(), 1);

        // The lease was released for the successor
        assert!(h
            .lease_store
            .try_acquire("broadcast-coordinator", "probe", Duration::from_secs(10))
            .await
            .unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drains_when_registry_empties_mid_session() {
        let config = CoordinatorConfig {
            scan_interval_ms: 1000,
            quantum_secs: 600,
            quantum_safety_margin_secs: 60,
            ..Default::default()
        };
        let h = harness(config);
        let _rx = h.gateway.open("h-a");
        h.registry.put(&aged_row("a", "h-a", 0)).await.unwrap();

        let registry = h.registry.clone();
        let scheduler = h.scheduler.clone();
        let run = tokio::spawn(async move {
            let outcome = h.coordinator.run().await.unwrap();
            (outcome, scheduler.count())
        });

        // Let a few passes happen, then disconnect the only client
        tokio::time::sleep(Duration::from_secs(3)).await;
        registry.delete("a").await.unwrap();

        let (outcome, continuations) = tokio::time::timeout(Duration::from_secs(30), run)
            .await
            .expect("coordinator should finish")
            .unwrap();
        assert_eq!(outcome, CoordinatorOutcome::Drained);
        assert_eq!(continuations, 0);
    }
}
