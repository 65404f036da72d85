//! Send/close primitives over the managed bidirectional messaging channel.

mod http;
mod local;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

pub use http::HttpTransportGateway;
pub use local::LocalTransportGateway;

use crate::config::GatewayConfig;

/// Errors that can occur during gateway operations.
///
/// Callers treat all of these as best-effort failures: logged, never
/// propagated past the operation that hit them.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The handle no longer refers to a live connection
    #[error("Connection handle {0} is gone")]
    Gone(String),

    /// Transport request failed
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Management endpoint answered with an unexpected status
    #[error("Unexpected status {status} from management endpoint")]
    UnexpectedStatus { status: u16 },
}

/// Push access to live connections.
#[async_trait]
pub trait TransportGateway: Send + Sync {
    /// Backend identifier for diagnostics.
    fn kind(&self) -> &'static str;

    /// Send a payload to a connection.
    async fn send(&self, handle: &str, payload: &[u8]) -> Result<(), GatewayError>;

    /// Close a connection.
    async fn close(&self, handle: &str) -> Result<(), GatewayError>;
}

/// Create a transport gateway based on configuration.
pub fn create_gateway(config: &GatewayConfig) -> Result<Arc<dyn TransportGateway>, GatewayError> {
    if config.backend == "http" {
        if config.endpoint.is_empty() {
            tracing::warn!("HTTP gateway requested without endpoint, falling back to local");
            return Ok(Arc::new(LocalTransportGateway::new()));
        }
        tracing::info!(endpoint = %config.endpoint, "Creating HTTP transport gateway");
        Ok(Arc::new(HttpTransportGateway::new(config)?))
    } else {
        tracing::info!("Using local transport gateway");
        Ok(Arc::new(LocalTransportGateway::new()))
    }
}
