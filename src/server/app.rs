use axum::{routing::post, Router};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    map_response_body::MapResponseBodyLayer,
    trace::TraceLayer,
};

use crate::api::api_routes;
use crate::content::asset_service;

use super::invoke::invoke;
use super::AppState;

/// Events are small control payloads; anything larger is not ours.
const MAX_EVENT_BYTES: usize = 256 * 1024;

pub fn create_app(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Platform invocation endpoint
        .route("/invoke", post(invoke))
        // Merge API routes
        .merge(api_routes())
        // Static assets with index fallback
        .fallback_service(asset_service(&state.settings.content))
        // Add middleware
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(MapResponseBodyLayer::new(axum::body::Body::new))
                .layer(RequestBodyLimitLayer::new(MAX_EVENT_BYTES)),
        )
        // Add state
        .with_state(state)
}
