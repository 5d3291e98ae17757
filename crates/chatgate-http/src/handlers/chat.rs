use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use chatgate_core::{
    domain::{Role, SessionId, Turn, UserId},
    errors::Error,
};

use crate::{error::ApiResult, router::AppState};

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    pub session_id: String,
    pub user_id: i64,
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
}

/// `POST /api/chat`
pub async fn chat(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ChatBody>, JsonRejection>,
) -> ApiResult<Json<ChatResponse>> {
    let Json(body) = body?;
    let session_id = SessionId(body.session_id);

    let response = state
        .orchestrator
        .handle_chat(&session_id, UserId(body.user_id), &body.query)
        .await?;

    Ok(Json(ChatResponse { response }))
}

#[derive(Debug, Serialize)]
pub struct MessageView {
    pub role: &'static str,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl From<Turn> for MessageView {
    fn from(t: Turn) -> Self {
        let role = match t.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        Self {
            role,
            content: t.text,
            created_at: t.created_at,
        }
    }
}

/// Longest sidebar title, in characters.
const TITLE_MAX_CHARS: usize = 48;

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub id: String,
    pub title: String,
    pub messages: Vec<MessageView>,
}

/// The session's first user message, cut to [`TITLE_MAX_CHARS`]; empty when
/// nothing has been asked yet.
fn title_for(turns: &[Turn]) -> String {
    let Some(first) = turns.iter().find(|t| t.role == Role::User) else {
        return String::new();
    };
    let text = first.text.trim();
    match text.char_indices().nth(TITLE_MAX_CHARS) {
        Some((cut, _)) => format!("{}…", text[..cut].trim_end()),
        None => text.to_string(),
    }
}

/// `GET /api/chat/{session_id}`: the session's turns in order.
pub async fn history(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<HistoryResponse>> {
    let id = SessionId(session_id);
    let turns = state
        .sessions
        .turns(&id)
        .await
        .ok_or_else(|| Error::NotFound(format!("session {id} not found")))?;

    Ok(Json(HistoryResponse {
        id: id.0,
        title: title_for(&turns),
        messages: turns.into_iter().map(MessageView::from).collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_is_first_user_message_truncated() {
        assert_eq!(title_for(&[]), "");
        let turns = [
            Turn::new(Role::Assistant, "hi"),
            Turn::new(Role::User, "  what is rust? "),
        ];
        assert_eq!(title_for(&turns), "what is rust?");

        let long = "é".repeat(60);
        let title = title_for(&[Turn::new(Role::User, long)]);
        assert_eq!(title.chars().count(), TITLE_MAX_CHARS + 1);
        assert!(title.ends_with('…'));
    }
}
