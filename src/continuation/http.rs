use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::config::ContinuationConfig;
use crate::protocol::ContinuationMarker;

use super::{ContinuationError, ContinuationScheduler};

/// Scheduler that POSTs the marker to the handler's own invocation endpoint.
///
/// The platform queues marker invocations and answers `202 Accepted` before
/// any work runs; that status is the only acceptable outcome.
pub struct HttpContinuationScheduler {
    client: reqwest::Client,
    target_url: String,
}

impl HttpContinuationScheduler {
    pub fn new(config: &ContinuationConfig) -> Result<Self, ContinuationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            target_url: config.target_url.clone(),
        })
    }
}

#[async_trait]
impl ContinuationScheduler for HttpContinuationScheduler {
    fn kind(&self) -> &'static str {
        "http"
    }

    async fn invoke_self(&self, marker: &ContinuationMarker) -> Result<(), ContinuationError> {
        let response = self
            .client
            .post(&self.target_url)
            .json(marker)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::ACCEPTED {
            return Err(ContinuationError::NotAccepted(status.as_u16()));
        }

        tracing::debug!(target = %self.target_url, "Continuation dispatched");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode as AxumStatus, routing::post, Router};
    use tokio::net::TcpListener;
    use tokio_test::assert_ok;

    async fn serve(status: AxumStatus) -> String {
        let app = Router::new().route("/invoke", post(move || async move { status }));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/invoke", addr)
    }

    fn scheduler(target_url: String) -> HttpContinuationScheduler {
        HttpContinuationScheduler::new(&ContinuationConfig {
            target_url,
            request_timeout_secs: 2,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_accepted_dispatch() {
        let url = serve(AxumStatus::ACCEPTED).await;
        let result = scheduler(url).invoke_self(&ContinuationMarker::sweep()).await;
        assert_ok!(result);
    }

    #[tokio::test]
    async fn test_non_accepted_status_is_fatal() {
        let url = serve(AxumStatus::OK).await;
        let err = scheduler(url)
            .invoke_self(&ContinuationMarker::sweep())
            .await
            .unwrap_err();
        assert!(matches!(err, ContinuationError::NotAccepted(200)));
    }

    #[tokio::test]
    async fn test_unreachable_target_is_fatal() {
        // Port 9 (discard) is almost certainly closed
        let result = scheduler("http://127.0.0.1:9/invoke".to_string())
            .invoke_self(&ContinuationMarker::sweep())
            .await;
        assert!(matches!(result, Err(ContinuationError::Transport(_))));
    }
}
