use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::api::handlers;
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    let cors = if state.config.server.cors_origins.iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .server
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    Router::new()
        .route("/convert", post(handlers::convert::convert))
        .route("/validate", post(handlers::validate::validate_bundle))
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .route("/readiness", get(handlers::health::ready))
        .route("/live", get(handlers::health::live))
        .route("/liveness", get(handlers::health::live))
        .route("/metrics/prometheus", get(handlers::metrics::prometheus))
        .layer(RequestBodyLimitLayer::new(
            state.config.server.max_request_body_size,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
