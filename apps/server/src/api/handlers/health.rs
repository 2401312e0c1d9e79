//! Operational probes.

use axum::Json;
use serde_json::{json, Value};

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy", "version": env!("CARGO_PKG_VERSION") }))
}

/// The service holds no external connections at startup; readiness is
/// process liveness plus configuration having loaded.
pub async fn ready() -> Json<Value> {
    Json(json!({ "status": "ready" }))
}

pub async fn live() -> Json<Value> {
    Json(json!({ "status": "alive" }))
}
