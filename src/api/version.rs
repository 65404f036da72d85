//! Version and inventory diagnostic endpoint.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::error::AppError;
use crate::gateway::TransportGateway;
use crate::registry::RegistryStore;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub name: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub connections: usize,
    pub backends: BackendInventory,
}

#[derive(Debug, Serialize)]
pub struct BackendInventory {
    pub registry: String,
    pub lease: String,
    pub gateway: String,
    pub log_shipping: String,
}

/// GET /api/version
pub async fn version(State(state): State<AppState>) -> Result<Json<VersionResponse>, AppError> {
    let connections = state.registry.count().await?;

    Ok(Json(VersionResponse {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        connections,
        backends: BackendInventory {
            registry: state.registry.kind().to_string(),
            lease: state.lease_keeper.backend_kind().to_string(),
            gateway: state.gateway.kind().to_string(),
            log_shipping: state.log_shipper.backend_kind().to_string(),
        },
    }))
}
