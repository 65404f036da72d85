//! The platform-facing invocation endpoint.
//!
//! One POST carries one event. The routing work runs on a background task
//! and the response blocks on its completion, so a panic in the work is
//! intercepted at the join boundary and converted into a structured error
//! instead of tearing down the process. Continuation markers are the
//! exception: they are acknowledged `202 Accepted` immediately and the
//! coordinator runs as a supervised background task with its own quantum
//! clock.

use std::time::Instant;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::error::AppError;
use crate::metrics::INVOCATION_FAILURES_TOTAL;
use crate::protocol::{ContinuationMarker, CONTINUATION_KEY};
use crate::router::Routed;

use super::AppState;

/// POST /invoke
pub async fn invoke(State(state): State<AppState>, body: Bytes) -> Response {
    let started = Instant::now();

    let raw: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            let response =
                AppError::protocol(format!("unreadable event body: {}", e)).into_response();
            finish(&state, "unreadable", response.status(), started);
            return response;
        }
    };
    let kind = event_kind(&raw);

    let work = {
        let router = state.router.clone();
        let raw = raw.clone();
        tokio::spawn(async move { router.route(&raw).await })
    };

    let response = match work.await {
        Ok(Ok(Routed::Reply(reply))) => (StatusCode::OK, Json(reply)).into_response(),
        Ok(Ok(Routed::Continuation(marker))) => {
            run_coordinator(&state, marker);
            StatusCode::ACCEPTED.into_response()
        }
        Ok(Err(router_err)) => AppError::from(router_err).into_response(),
        Err(join_err) => AppError::from_join_error(join_err).into_response(),
    };

    finish(&state, &kind, response.status(), started);
    response
}

fn event_kind(raw: &serde_json::Value) -> String {
    if raw.get(CONTINUATION_KEY).is_some() {
        return "continuation".to_string();
    }
    raw.get("kind")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string()
}

fn finish(state: &AppState, kind: &str, status: StatusCode, started: Instant) {
    let elapsed_ms = started.elapsed().as_millis() as u64;
    if status.is_server_error() {
        INVOCATION_FAILURES_TOTAL.inc();
    }
    tracing::info!(
        status = status.as_u16(),
        kind = %kind,
        elapsed_ms = elapsed_ms,
        "Invocation complete"
    );
    state
        .log_shipper
        .append(format!("{} {} {}ms", status.as_u16(), kind, elapsed_ms));
}

/// Start a coordinator instance for an accepted continuation.
///
/// Supervised through an inner spawn so a panic is logged as a structured
/// error rather than vanishing with the task.
fn run_coordinator(state: &AppState, marker: ContinuationMarker) {
    let coordinator = state.coordinator.clone();
    tokio::spawn(async move {
        tracing::debug!(marker = %marker.continuation, "Continuation accepted");
        let work = tokio::spawn(async move { coordinator.run().await });
        match work.await {
            Ok(Ok(outcome)) => {
                tracing::debug!(outcome = ?outcome, "Coordinator instance finished");
            }
            Ok(Err(e)) => {
                INVOCATION_FAILURES_TOTAL.inc();
                tracing::error!(error = %e, "Coordinator instance failed");
            }
            Err(join_err) => {
                INVOCATION_FAILURES_TOTAL.inc();
                let err = AppError::from_join_error(join_err);
                tracing::error!(error = %err, "Coordinator instance panicked");
            }
        }
    });
}
