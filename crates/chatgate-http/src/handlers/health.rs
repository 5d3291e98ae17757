//! Health / heartbeat endpoint.

use std::sync::Arc;

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::router::AppState;

/// `GET /health`: `{"status": "ok", "version": ..., "sessions": n}`.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": state.sessions.len().await,
    }))
}
