//! Classifies inbound events and dispatches them.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;

use crate::continuation::{ContinuationError, ContinuationScheduler};
use crate::gateway::TransportGateway;
use crate::metrics::INVOCATIONS_TOTAL;
use crate::protocol::{
    identity_from_addr, ClientEvent, ContinuationMarker, EventReply, OutboundFrame,
    CONTINUATION_KEY, SWEEP_MARKER,
};
use crate::registry::{Connection, RegistryError, RegistryStore};

/// Errors that can occur while routing an event.
#[derive(Debug, Error)]
pub enum RouterError {
    /// Event body did not deserialize into any known shape
    #[error("Malformed event: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Event deserialized but matched no routing rule
    #[error("Unrecognized event: {0}")]
    Unrecognized(String),

    /// Registry store failure
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Self-continuation dispatch failure
    #[error(transparent)]
    Continuation(#[from] ContinuationError),
}

/// Outcome of routing one event.
#[derive(Debug)]
pub enum Routed {
    /// A client event was handled; reply with this body.
    Reply(EventReply),
    /// A self-continuation marker; the caller hands it to the coordinator.
    Continuation(ContinuationMarker),
}

/// Routes raw inbound events to their handlers.
pub struct EventRouter {
    registry: Arc<dyn RegistryStore>,
    gateway: Arc<dyn TransportGateway>,
    scheduler: Arc<dyn ContinuationScheduler>,
}

impl EventRouter {
    pub fn new(
        registry: Arc<dyn RegistryStore>,
        gateway: Arc<dyn TransportGateway>,
        scheduler: Arc<dyn ContinuationScheduler>,
    ) -> Self {
        Self {
            registry,
            gateway,
            scheduler,
        }
    }

    /// Classify and dispatch one raw event.
    ///
    /// The continuation marker is recognized structurally before any schema
    /// parsing, so marker payloads never collide with client event shapes.
    pub async fn route(&self, raw: &serde_json::Value) -> Result<Routed, RouterError> {
        if let Some(marker_value) = raw.get(CONTINUATION_KEY) {
            let Some(marker) = marker_value.as_str() else {
                return Err(RouterError::Unrecognized(format!(
                    "non-string continuation marker: {}",
                    marker_value
                )));
            };
            if marker != SWEEP_MARKER {
                return Err(RouterError::Unrecognized(format!(
                    "unknown continuation marker: {}",
                    marker
                )));
            }
            INVOCATIONS_TOTAL.with_label_values(&["continuation"]).inc();
            return Ok(Routed::Continuation(ContinuationMarker::sweep()));
        }

        let event: ClientEvent = serde_json::from_value(raw.clone())?;
        match event {
            ClientEvent::Connect {
                remote_addr,
                handle,
            } => {
                INVOCATIONS_TOTAL.with_label_values(&["connect"]).inc();
                self.handle_connect(&remote_addr, handle).await
            }
            ClientEvent::Message { handle, .. } => {
                INVOCATIONS_TOTAL.with_label_values(&["message"]).inc();
                self.handle_message(handle).await
            }
            ClientEvent::Disconnect { remote_addr } => {
                INVOCATIONS_TOTAL.with_label_values(&["disconnect"]).inc();
                self.handle_disconnect(&remote_addr).await
            }
        }
    }

    async fn handle_connect(
        &self,
        remote_addr: &str,
        handle: String,
    ) -> Result<Routed, RouterError> {
        let identity = identity_from_addr(remote_addr);

        // A reconnecting identity supersedes its previous transport. The old
        // handle must be closed before the new row becomes visible to a scan.
        if let Some(previous) = self.registry.get(&identity).await? {
            if let Err(e) = self.gateway.close(&previous.handle).await {
                tracing::debug!(
                    identity = %identity,
                    handle = %previous.handle,
                    error = %e,
                    "Failed to close superseded handle"
                );
            }
        }

        let row = Connection::new(identity.clone(), handle);
        self.registry.put(&row).await?;

        tracing::info!(identity = %identity, handle = %row.handle, "Connection registered");

        // Make sure a broadcaster is running for the new connection. A
        // rejected dispatch is fatal: nobody else would start one.
        self.scheduler
            .invoke_self(&ContinuationMarker::sweep())
            .await?;

        Ok(Routed::Reply(EventReply::Connected { identity }))
    }

    async fn handle_message(&self, handle: String) -> Result<Routed, RouterError> {
        let ack = OutboundFrame::Ack {
            received_at: Utc::now(),
        };
        let payload = serde_json::to_vec(&ack)?;

        if let Err(e) = self.gateway.send(&handle, &payload).await {
            tracing::warn!(handle = %handle, error = %e, "Failed to acknowledge message");
        }

        Ok(Routed::Reply(EventReply::MessageAcked { handle }))
    }

    async fn handle_disconnect(&self, remote_addr: &str) -> Result<Routed, RouterError> {
        let identity = identity_from_addr(remote_addr);

        if let Some(row) = self.registry.get(&identity).await? {
            if let Err(e) = self.gateway.close(&row.handle).await {
                tracing::debug!(
                    identity = %identity,
                    handle = %row.handle,
                    error = %e,
                    "Failed to close handle on disconnect"
                );
            }
        }
        self.registry.delete(&identity).await?;

        tracing::info!(identity = %identity, "Connection unregistered");

        Ok(Routed::Reply(EventReply::Disconnected { identity }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::LocalTransportGateway;
    use crate::registry::MemoryRegistryStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

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
        router: EventRouter,
    }

    fn harness() -> TestHarness {
        let registry = Arc::new(MemoryRegistryStore::new(16));
        let gateway = Arc::new(LocalTransportGateway::new());
        let scheduler = RecordingScheduler::new();
        let router = EventRouter::new(registry.clone(), gateway.clone(), scheduler.clone());
        TestHarness {
            registry,
            gateway,
            scheduler,
            router,
        }
    }

    fn connect(addr: &str, handle: &str) -> serde_json::Value {
        json!({ "kind": "connect", "remote_addr": addr, "handle": handle })
    }

    #[tokio::test]
    async fn test_connect_registers_row_and_schedules_broadcaster() {
        let h = harness();
        let routed = h.router.route(&connect("203.0.113.7:1000", "h-1")).await.unwrap();

        match routed {
            Routed::Reply(EventReply::Connected { identity }) => {
                assert_eq!(identity, "203.0.113.7");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        let row = h.registry.get("203.0.113.7").await.unwrap().unwrap();
        assert_eq!(row.handle, "h-1");
        assert_eq!(h.scheduler.count(), 1);
    }

    #[tokio::test]
    async fn test_reconnect_closes_prior_handle_before_overwrite() {
        let h = harness();
        let mut old_rx = h.gateway.open("h-old");

        h.router.route(&connect("203.0.113.7:1000", "h-old")).await.unwrap();
        h.router.route(&connect("203.0.113.7:2000", "h-new")).await.unwrap();

        // The old link was actively closed
        assert!(old_rx.recv().await.is_none());
        assert!(!h.gateway.is_open("h-old"));

        // One row per identity, pointing at the new handle
        let row = h.registry.get("203.0.113.7").await.unwrap().unwrap();
        assert_eq!(row.handle, "h-new");
        assert_eq!(h.registry.len(), 1);
    }

    #[tokio::test]
    async fn test_message_acks_originating_connection() {
        let h = harness();
        let mut rx = h.gateway.open("h-1");

        let routed = h
            .router
            .route(&json!({ "kind": "message", "handle": "h-1", "body": {"text": "hi"} }))
            .await
            .unwrap();
        assert!(matches!(
            routed,
            Routed::Reply(EventReply::MessageAcked { .. })
        ));

        let frame: OutboundFrame = serde_json::from_slice(&rx.recv().await.unwrap()).unwrap();
        assert!(matches!(frame, OutboundFrame::Ack { .. }));
    }

    #[tokio::test]
    async fn test_message_ack_failure_still_succeeds() {
        let h = harness();
        // No open link for the handle: the ack send fails and is swallowed
        let routed = h
            .router
            .route(&json!({ "kind": "message", "handle": "h-missing" }))
            .await
            .unwrap();
        assert!(matches!(routed, Routed::Reply(_)));
    }

    #[tokio::test]
    async fn test_disconnect_removes_row_and_closes_handle() {
        let h = harness();
        let mut rx = h.gateway.open("h-1");
        h.router.route(&connect("203.0.113.7:1000", "h-1")).await.unwrap();

        let routed = h
            .router
            .route(&json!({ "kind": "disconnect", "remote_addr": "203.0.113.7:1000" }))
            .await
            .unwrap();
        assert!(matches!(
            routed,
            Routed::Reply(EventReply::Disconnected { .. })
        ));

        assert!(h.registry.get("203.0.113.7").await.unwrap().is_none());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_marker_recognized_before_schema_parsing() {
        let h = harness();
        let routed = h
            .router
            .route(&json!({ "continuation": "broadcast-sweep" }))
            .await
            .unwrap();
        assert!(matches!(routed, Routed::Continuation(m) if m.is_sweep()));
        // Marker handling mutates nothing and schedules nothing
        assert_eq!(h.scheduler.count(), 0);
        assert!(h.registry.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_marker_is_unrecognized() {
        let h = harness();
        let err = h
            .router
            .route(&json!({ "continuation": "defrag" }))
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::Unrecognized(_)));
    }

    #[tokio::test]
    async fn test_malformed_event_is_fatal() {
        let h = harness();
        let err = h
            .router
            .route(&json!({ "kind": "teleport", "remote_addr": "x" }))
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::Malformed(_)));
    }
}
