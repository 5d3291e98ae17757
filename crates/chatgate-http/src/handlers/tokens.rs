use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use chatgate_core::{domain::UserId, errors::Error};

use crate::{error::ApiResult, router::AppState};

#[derive(Debug, Serialize)]
pub struct TokensResponse {
    pub user_id: i64,
    pub tokens_left: u64,
}

/// `GET /api/tokens/{user_id}`
pub async fn balance(
    State(state): State<Arc<AppState>>,
    path: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<TokensResponse>> {
    let Path(user_id) = path?;
    Ok(Json(TokensResponse {
        user_id,
        tokens_left: state.ledger.get_balance(UserId(user_id)),
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct ReplenishParams {
    pub user_id: Option<i64>,
    pub amount: Option<i64>,
}

impl ReplenishParams {
    /// Query-string values win; the JSON body fills whatever is missing.
    fn merge(self, body: ReplenishParams) -> Self {
        Self {
            user_id: self.user_id.or(body.user_id),
            amount: self.amount.or(body.amount),
        }
    }
}

/// `POST /api/tokens/replenish`
///
/// Accepts `user_id` and `amount` as query parameters or as a JSON body.
pub async fn replenish(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ReplenishParams>, QueryRejection>,
    body: Bytes,
) -> ApiResult<Json<TokensResponse>> {
    let Query(from_query) = query?;
    let from_body = if body.iter().all(u8::is_ascii_whitespace) {
        ReplenishParams::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| Error::InvalidArgument(format!("invalid JSON body: {e}")))?
    };
    let params = from_query.merge(from_body);

    let user_id = params
        .user_id
        .ok_or_else(|| Error::InvalidArgument("user_id is required".to_string()))?;
    let amount = params
        .amount
        .ok_or_else(|| Error::InvalidArgument("amount is required".to_string()))?;

    let tokens_left = state.ledger.replenish(UserId(user_id), amount)?;
    info!(user_id, amount, tokens_left, "tokens replenished");

    Ok(Json(TokensResponse {
        user_id,
        tokens_left,
    }))
}
