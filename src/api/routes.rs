use axum::{
    routing::{get, post},
    Router,
};

use crate::server::AppState;

use super::metrics::prometheus_metrics;
use super::time::{echo, time};
use super::version::version;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/metrics", get(prometheus_metrics))
        .nest(
            "/api",
            Router::new()
                .route("/time", get(time))
                .route("/echo", post(echo))
                .route("/version", get(version)),
        )
}
