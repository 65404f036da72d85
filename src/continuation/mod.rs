//! Asynchronous self-invocation of the handler.

mod http;

use async_trait::async_trait;
use thiserror::Error;

pub use http::HttpContinuationScheduler;

/// Errors that can occur when dispatching a self-continuation.
///
/// Every variant is fatal for the invocation that requested the dispatch: a
/// hand-off that silently failed would silently stop the broadcast session.
#[derive(Debug, Error)]
pub enum ContinuationError {
    /// The dispatch request could not be delivered
    #[error("Continuation dispatch failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The platform did not accept the asynchronous dispatch
    #[error("Continuation dispatch not accepted: status {0}")]
    NotAccepted(u16),
}

/// Schedules a fresh invocation of this handler.
///
/// Dispatch is fire-and-forget with at-least-once semantics; the marker is
/// handled idempotently on the receiving side, so a duplicate start costs
/// one contended lease acquisition and nothing else.
#[async_trait]
pub trait ContinuationScheduler: Send + Sync {
    /// Backend identifier for diagnostics.
    fn kind(&self) -> &'static str;

    /// Issue the self-invocation carrying `marker`.
    ///
    /// Succeeds only when the platform confirms it accepted the asynchronous
    /// dispatch.
    async fn invoke_self(
        &self,
        marker: &crate::protocol::ContinuationMarker,
    ) -> Result<(), ContinuationError>;
}
