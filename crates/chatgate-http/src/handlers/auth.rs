use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::Serialize;
use tracing::{info, warn};

use chatgate_core::{auth::TelegramAssertion, domain::UserId, errors::Error};

use crate::{error::ApiResult, router::AppState};

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user_id: i64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub tokens_left: u64,
}

/// `POST /api/auth/telegram`
///
/// A payload that does not even parse as an assertion is rejected like a bad
/// signature.
pub async fn telegram(
    State(state): State<Arc<AppState>>,
    body: Result<Json<TelegramAssertion>, JsonRejection>,
) -> ApiResult<Json<AuthResponse>> {
    let Ok(Json(assertion)) = body else {
        warn!("telegram auth rejected: malformed assertion");
        return Err(Error::InvalidSignature.into());
    };

    if !state.verifier.verify_now(&assertion) {
        warn!(user_id = assertion.id, "telegram auth rejected: bad signature");
        return Err(Error::InvalidSignature.into());
    }

    let user = UserId(assertion.id);
    let tokens_left = state
        .ledger
        .initialize_if_absent(user, state.cfg.default_user_tokens);
    info!(user_id = %user, tokens_left, "telegram user authenticated");

    Ok(Json(AuthResponse {
        user_id: assertion.id,
        username: assertion.username,
        first_name: assertion.first_name,
        last_name: assertion.last_name,
        tokens_left,
    }))
}
