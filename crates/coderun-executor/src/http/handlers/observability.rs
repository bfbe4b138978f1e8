//! Liveness and metrics endpoints.

use std::sync::Arc;

use axum::{extract::State, http::header, response::IntoResponse, Json};
use serde_json::json;

use crate::state::AppState;

/// `GET /health`: the process is up and serving requests.
pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// `GET /metrics`: Prometheus text exposition.
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.render_metrics(),
    )
}
