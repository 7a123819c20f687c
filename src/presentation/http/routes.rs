//! Route Configuration

use axum::{
    middleware,
    response::IntoResponse,
    routing::{delete, get, post},
    Router,
};

use super::handlers;
use crate::infrastructure::metrics;
use crate::presentation::middleware::{
    create_trace_layer, identity_middleware, rate_limit, track_http_metrics,
};
use crate::startup::AppState;

/// Create the main router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/v1", api_routes(state.clone()))
        // Health check endpoints
        .route("/health", get(handlers::health::health_check))
        .route("/health/live", get(handlers::health::liveness))
        .route("/health/ready", get(handlers::health::readiness))
        // Prometheus metrics endpoint
        .route("/metrics", get(metrics_handler))
        .route_layer(middleware::from_fn(track_http_metrics))
        .layer(create_trace_layer())
        .with_state(state)
}

/// Prometheus metrics endpoint handler
async fn metrics_handler() -> impl IntoResponse {
    let metrics = metrics::gather_metrics();
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        metrics,
    )
}

/// Client-facing routes: identity first, then rate limiting. Identity never
/// rejects; anonymous requests are counted by address and refused by the
/// `AuthUser` extractor in the handlers.
fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/frames", post(handlers::frames::handle_frame))
        .route("/presence", delete(handlers::frames::clear_presence))
        .route_layer(middleware::from_fn_with_state(state, rate_limit))
        .route_layer(middleware::from_fn(identity_middleware))
}
