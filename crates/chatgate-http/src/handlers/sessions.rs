use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;
use tracing::info;

use crate::router::AppState;

#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub session_id: String,
}

/// `POST /api/start-session`
pub async fn start_session(State(state): State<Arc<AppState>>) -> Json<StartSessionResponse> {
    let id = state.sessions.create_session().await;
    info!(session_id = %id, "session started");
    Json(StartSessionResponse { session_id: id.0 })
}
