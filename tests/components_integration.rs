//! End-to-end tests over a real listener: platform events in, registry
//! mutations and broadcast frames out.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use pulse_broadcast_service::config::Settings;
use pulse_broadcast_service::continuation::{ContinuationScheduler, HttpContinuationScheduler};
use pulse_broadcast_service::gateway::LocalTransportGateway;
use pulse_broadcast_service::lease::{LeaseKeeper, LeaseStore, MemoryLeaseStore};
use pulse_broadcast_service::logship::{LogShipper, MemoryBlobStore};
use pulse_broadcast_service::registry::{MemoryRegistryStore, RegistryStore};
use pulse_broadcast_service::server::{create_app, AppState};

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    gateway: Arc<LocalTransportGateway>,
    registry: Arc<MemoryRegistryStore>,
    blob_store: Arc<MemoryBlobStore>,
    shipper: Arc<LogShipper>,
}

impl TestServer {
    async fn invoke(&self, event: serde_json::Value) -> reqwest::Response {
        self.client
            .post(format!("{}/invoke", self.base_url))
            .json(&event)
            .send()
            .await
            .unwrap()
    }
}

async fn start_server() -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mut settings = Settings::default();
    settings.continuation.target_url = format!("http://{}/invoke", addr);
    settings.coordinator.scan_interval_ms = 200;

    let registry = Arc::new(MemoryRegistryStore::new(16));
    let gateway = Arc::new(LocalTransportGateway::new());
    let lease_store: Arc<dyn LeaseStore> = Arc::new(MemoryLeaseStore::new());
    let lease_keeper = Arc::new(LeaseKeeper::new(lease_store, settings.lease.clone()));
    let scheduler: Arc<dyn ContinuationScheduler> =
        Arc::new(HttpContinuationScheduler::new(&settings.continuation).unwrap());
    let blob_store = Arc::new(MemoryBlobStore::new());
    let shipper = Arc::new(LogShipper::new(
        blob_store.clone(),
        settings.logship.clone(),
    ));

    let state = AppState::from_parts(
        settings,
        registry.clone(),
        gateway.clone(),
        lease_keeper,
        scheduler,
        shipper.clone(),
    );
    let app = create_app(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        base_url: format!("http://{}", addr),
        client: reqwest::Client::new(),
        gateway,
        registry,
        blob_store,
        shipper,
    }
}

/// Read frames off a link until one of the wanted kind shows up.
async fn wait_for_frame(rx: &mut mpsc::Receiver<Vec<u8>>, kind: &str) -> serde_json::Value {
    let deadline = Duration::from_secs(10);
    tokio::time::timeout(deadline, async {
        loop {
            let bytes = rx.recv().await.expect("link closed while waiting");
            let frame: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
            if frame["kind"] == kind {
                return frame;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("no {} frame within {:?}", kind, deadline))
}

#[tokio::test]
async fn test_connect_starts_broadcast_session() {
    let server = start_server().await;
    let mut rx = server.gateway.open("h-1");

    let resp = server
        .invoke(json!({ "kind": "connect", "remote_addr": "203.0.113.7:1000", "handle": "h-1" }))
        .await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["kind"], "connected");
    assert_eq!(body["identity"], "203.0.113.7");

    // One row for the identity
    let row = server.registry.get("203.0.113.7").await.unwrap().unwrap();
    assert_eq!(row.handle, "h-1");

    // The connect scheduled a broadcaster; periodic ticks arrive on the link
    let tick = wait_for_frame(&mut rx, "tick").await;
    assert!(tick["now"].is_string());

    // Messages are acknowledged back through the gateway
    let resp = server
        .invoke(json!({ "kind": "message", "handle": "h-1", "body": { "text": "hi" } }))
        .await;
    assert_eq!(resp.status(), 200);
    wait_for_frame(&mut rx, "ack").await;

    // Disconnect removes the row; the broadcaster drains on its next pass
    let resp = server
        .invoke(json!({ "kind": "disconnect", "remote_addr": "203.0.113.7:1000" }))
        .await;
    assert_eq!(resp.status(), 200);
    assert!(server.registry.get("203.0.113.7").await.unwrap().is_none());
}

#[tokio::test]
async fn test_reconnect_closes_superseded_handle() {
    let server = start_server().await;
    let mut old_rx = server.gateway.open("h-old");
    let _new_rx = server.gateway.open("h-new");

    server
        .invoke(json!({ "kind": "connect", "remote_addr": "203.0.113.8:1000", "handle": "h-old" }))
        .await;
    server
        .invoke(json!({ "kind": "connect", "remote_addr": "203.0.113.8:2000", "handle": "h-new" }))
        .await;

    // The superseded link ends; drain any ticks that arrived before the close
    let closed = tokio::time::timeout(Duration::from_secs(10), async {
        while old_rx.recv().await.is_some() {}
    })
    .await;
    assert!(closed.is_ok(), "old link should be closed");

    let row = server.registry.get("203.0.113.8").await.unwrap().unwrap();
    assert_eq!(row.handle, "h-new");

    server
        .invoke(json!({ "kind": "disconnect", "remote_addr": "203.0.113.8:2000" }))
        .await;
}

#[tokio::test]
async fn test_unreadable_event_is_structured_5xx() {
    let server = start_server().await;

    let resp = server
        .client
        .post(format!("{}/invoke", server.base_url))
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "PROTOCOL_ERROR");
    assert!(body["error"]["stack"].is_string());
}

#[tokio::test]
async fn test_unknown_event_kind_is_structured_5xx() {
    let server = start_server().await;

    let resp = server
        .invoke(json!({ "kind": "teleport", "remote_addr": "203.0.113.9:1" }))
        .await;
    assert_eq!(resp.status(), 500);

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "PROTOCOL_ERROR");
}

#[tokio::test]
async fn test_continuation_marker_is_accepted_async() {
    let server = start_server().await;

    let resp = server.invoke(json!({ "continuation": "broadcast-sweep" })).await;
    assert_eq!(resp.status(), 202);
}

#[tokio::test]
async fn test_diagnostic_endpoints() {
    let server = start_server().await;
    let _rx = server.gateway.open("h-1");
    server
        .invoke(json!({ "kind": "connect", "remote_addr": "203.0.113.10:1", "handle": "h-1" }))
        .await;

    let version: serde_json::Value = server
        .client
        .get(format!("{}/api/version", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(version["name"], "pulse-broadcast-service");
    assert_eq!(version["connections"], 1);
    assert_eq!(version["backends"]["registry"], "memory");
    assert_eq!(version["backends"]["gateway"], "local");

    let time: serde_json::Value = server
        .client
        .get(format!("{}/api/time", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(time["epoch_ms"].is_i64() || time["epoch_ms"].is_u64());

    let echoed: serde_json::Value = server
        .client
        .post(format!("{}/api/echo", server.base_url))
        .json(&json!({ "ping": "pong" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(echoed["ping"], "pong");

    let metrics = server
        .client
        .get(format!("{}/metrics", server.base_url))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(metrics.contains("pulse_invocations_total"));

    // No assets are deployed alongside the tests
    let status = server
        .client
        .get(format!("{}/no-such-page", server.base_url))
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_invocation_lines_ship_to_blob_store() {
    let server = start_server().await;
    server
        .invoke(json!({ "kind": "message", "handle": "h-x" }))
        .await;

    assert!(server.shipper.pending() > 0);
    let shipped = server.shipper.flush().await;
    assert!(shipped > 0);
    assert_eq!(server.blob_store.object_count(), 1);

    let key = server.blob_store.keys().pop().unwrap();
    let body = String::from_utf8(server.blob_store.get(&key).unwrap()).unwrap();
    assert!(body.contains("message"));
}
