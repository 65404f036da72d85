use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct TimeResponse {
    pub now: DateTime<Utc>,
    pub epoch_ms: i64,
}

/// GET /api/time
pub async fn time() -> Json<TimeResponse> {
    let now = Utc::now();
    Json(TimeResponse {
        now,
        epoch_ms: now.timestamp_millis(),
    })
}

/// POST /api/echo - returns the request body unchanged
pub async fn echo(Json(body): Json<serde_json::Value>) -> Json<serde_json::Value> {
    Json(body)
}
