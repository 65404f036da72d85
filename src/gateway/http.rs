//! Transport gateway speaking the management HTTP API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::config::GatewayConfig;

use super::{GatewayError, TransportGateway};

/// Gateway client for a managed messaging channel's management API.
///
/// `POST {endpoint}/connections/{handle}` pushes a payload to a connection;
/// `DELETE` closes it. `410 Gone` means the connection was already torn down
/// by the transport.
pub struct HttpTransportGateway {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransportGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn connection_url(&self, handle: &str) -> String {
        format!("{}/connections/{}", self.endpoint, handle)
    }
}

#[async_trait]
impl TransportGateway for HttpTransportGateway {
    fn kind(&self) -> &'static str {
        "http"
    }

    async fn send(&self, handle: &str, payload: &[u8]) -> Result<(), GatewayError> {
        let response = self
            .client
            .post(self.connection_url(handle))
            .body(payload.to_vec())
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::GONE => Err(GatewayError::Gone(handle.to_string())),
            status => Err(GatewayError::UnexpectedStatus {
                status: status.as_u16(),
            }),
        }
    }

    async fn close(&self, handle: &str) -> Result<(), GatewayError> {
        let response = self
            .client
            .delete(self.connection_url(handle))
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            // Already closed on the transport side
            StatusCode::GONE | StatusCode::NOT_FOUND => Ok(()),
            status => Err(GatewayError::UnexpectedStatus {
                status: status.as_u16(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_url_trims_trailing_slash() {
        let gateway = HttpTransportGateway::new(&GatewayConfig {
            backend: "http".to_string(),
            endpoint: "http://gateway.internal/".to_string(),
            request_timeout_secs: 5,
        })
        .unwrap();

        assert_eq!(
            gateway.connection_url("h-1"),
            "http://gateway.internal/connections/h-1"
        );
    }
}
