use std::{future::Future, sync::Arc};

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tracing::info;

use chatgate_core::{
    auth::TelegramVerifier,
    chat::{ChatSettings, Orchestrator},
    config::Config,
    model::client::ChatModel,
    quota::QuotaLedger,
    session::{Retention, SessionStore},
};

use crate::handlers;
use crate::middleware::{cors_layer, trace_requests};

/// Process-wide state shared by every handler.
pub struct AppState {
    pub cfg: Arc<Config>,
    pub sessions: Arc<SessionStore>,
    pub ledger: Arc<QuotaLedger>,
    pub verifier: TelegramVerifier,
    pub orchestrator: Orchestrator,
}

impl AppState {
    /// Build the stores and the orchestrator from config.
    pub fn new(cfg: Arc<Config>, model: Arc<dyn ChatModel>) -> Self {
        let sessions = Arc::new(SessionStore::new(Retention {
            idle_ttl: cfg.session_idle_ttl,
            max_sessions: cfg.session_max_count,
        }));
        let ledger = Arc::new(QuotaLedger::new());
        let verifier = TelegramVerifier::new(&cfg.telegram_bot_token)
            .with_max_age(cfg.telegram_auth_max_age);
        let orchestrator = Orchestrator::new(
            sessions.clone(),
            ledger.clone(),
            model,
            ChatSettings::from_config(&cfg),
        );

        Self {
            cfg,
            sessions,
            ledger,
            verifier,
            orchestrator,
        }
    }
}

/// Assemble the complete application router.
pub fn build(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/chat", post(handlers::chat::chat))
        .route("/chat/{session_id}", get(handlers::chat::history))
        .route("/start-session", post(handlers::sessions::start_session))
        .route("/auth/telegram", post(handlers::auth::telegram))
        .route("/tokens/{user_id}", get(handlers::tokens::balance))
        .route("/tokens/replenish", post(handlers::tokens::replenish));

    Router::new()
        .route("/health", get(handlers::health::health))
        .nest("/api", api)
        // Outermost layers execute first on the way in.
        .layer(cors_layer(&state.cfg.cors_allowed_origins))
        .layer(middleware::from_fn(trace_requests))
        .with_state(state)
}

/// Serve until `shutdown` resolves, then drain in-flight requests.
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, provider = ?state.orchestrator.provider(), "HTTP server listening");
    }
    axum::serve(listener, build(state))
        .with_graceful_shutdown(shutdown)
        .await
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use chatgate_core::{
        auth::{sign, TelegramAssertion},
        errors::Error,
        model::types::{ChatReply, ChatRequest, ProviderKind},
        Result,
    };

    use super::*;

    const BOT_TOKEN: &str = "123456:test-bot-token";

    #[derive(Default)]
    struct FakeModel {
        fail: bool,
        requests: Mutex<Vec<ChatRequest>>,
    }

    #[async_trait]
    impl ChatModel for FakeModel {
        fn provider(&self) -> ProviderKind {
            ProviderKind::Local
        }

        async fn chat(&self, req: ChatRequest) -> Result<ChatReply> {
            self.requests.lock().unwrap().push(req);
            if self.fail {
                return Err(Error::Upstream("provider exploded: key=abc".to_string()));
            }
            Ok(ChatReply {
                text: "  <reply>  ".to_string(),
            })
        }
    }

    fn state_with(model: FakeModel) -> Arc<AppState> {
        let cfg = Arc::new(Config::with_secrets(BOT_TOKEN, "cohere-key"));
        Arc::new(AppState::new(cfg, Arc::new(model)))
    }

    async fn call(
        state: &Arc<AppState>,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                req = req.header("content-type", "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let resp = build(state.clone())
            .oneshot(req.body(body).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::String(
                String::from_utf8_lossy(&bytes).into_owned(),
            ))
        };
        (status, value)
    }

    fn assertion(id: i64) -> Value {
        let mut a = TelegramAssertion {
            id,
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            username: "ada".to_string(),
            photo_url: "https://t.me/i/userpic/320/ada.jpg".to_string(),
            auth_date: chrono::Utc::now().timestamp(),
            hash: String::new(),
        };
        a.hash = sign(BOT_TOKEN, &a).unwrap();
        serde_json::to_value(a).unwrap()
    }

    #[tokio::test]
    async fn quota_scenario_end_to_end() {
        let state = state_with(FakeModel::default());

        let (status, body) = call(&state, "POST", "/api/start-session", None).await;
        assert_eq!(status, StatusCode::OK);
        let sid = body["session_id"].as_str().unwrap().to_string();

        let chat = json!({ "session_id": sid, "user_id": 42, "query": "hello" });
        let (status, body) = call(&state, "POST", "/api/chat", Some(chat.clone())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(body["detail"].as_str().unwrap().contains("Token limit"));

        let (_, body) = call(&state, "GET", "/api/tokens/42", None).await;
        assert_eq!(body, json!({ "user_id": 42, "tokens_left": 0 }));

        let (status, body) = call(
            &state,
            "POST",
            "/api/tokens/replenish?user_id=42&amount=5",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "user_id": 42, "tokens_left": 5 }));

        let (status, body) = call(&state, "POST", "/api/chat", Some(chat)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "response": "<reply>" }));

        let (_, body) = call(&state, "GET", "/api/tokens/42", None).await;
        assert_eq!(body["tokens_left"], 4);

        let (status, body) = call(&state, "GET", &format!("/api/chat/{sid}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["title"], "hello");
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[0]["content"], "hello");
        assert_eq!(messages[1]["role"], "assistant");
        assert_eq!(messages[1]["content"], "<reply>");
    }

    #[tokio::test]
    async fn upstream_failure_is_500_with_generic_detail() {
        let state = state_with(FakeModel {
            fail: true,
            ..Default::default()
        });
        state.ledger.replenish(chatgate_core::domain::UserId(1), 1).unwrap();

        let chat = json!({ "session_id": "s", "user_id": 1, "query": "q" });
        let (status, body) = call(&state, "POST", "/api/chat", Some(chat)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body.to_string().contains("key=abc"));
        assert_eq!(state.ledger.get_balance(chatgate_core::domain::UserId(1)), 0);
    }

    #[tokio::test]
    async fn telegram_auth_seeds_tokens_once() {
        let state = state_with(FakeModel::default());

        let (status, body) = call(&state, "POST", "/api/auth/telegram", Some(assertion(7))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user_id"], 7);
        assert_eq!(body["username"], "ada");
        assert_eq!(body["first_name"], "Ada");
        assert_eq!(body["last_name"], "Lovelace");
        assert_eq!(body["tokens_left"], 10);

        let chat = json!({ "session_id": "s", "user_id": 7, "query": "q" });
        let (status, _) = call(&state, "POST", "/api/chat", Some(chat)).await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = call(&state, "POST", "/api/auth/telegram", Some(assertion(7))).await;
        assert_eq!(body["tokens_left"], 9);
    }

    #[tokio::test]
    async fn telegram_auth_rejects_bad_or_malformed_assertions() {
        let state = state_with(FakeModel::default());

        let mut forged = assertion(7);
        forged["username"] = json!("mallory");
        let (status, body) = call(&state, "POST", "/api/auth/telegram", Some(forged)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["detail"], "Invalid Telegram authentication");

        let (status, _) = call(
            &state,
            "POST",
            "/api/auth/telegram",
            Some(json!({ "id": "not-a-number" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(state.ledger.user_count(), 0);
    }

    #[tokio::test]
    async fn replenish_validates_amount_and_accepts_json_body() {
        let state = state_with(FakeModel::default());

        for amount in [0, -3] {
            let (status, _) = call(
                &state,
                "POST",
                &format!("/api/tokens/replenish?user_id=5&amount={amount}"),
                None,
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }
        let (status, _) = call(&state, "POST", "/api/tokens/replenish?user_id=5", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(
            &state,
            "POST",
            "/api/tokens/replenish",
            Some(json!({ "user_id": 5, "amount": 3 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tokens_left"], 3);
    }

    #[tokio::test]
    async fn non_numeric_user_id_gets_json_detail() {
        let state = state_with(FakeModel::default());

        let (status, body) = call(&state, "GET", "/api/tokens/abc", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].is_string(), "{body}");
    }

    #[tokio::test]
    async fn unknown_history_is_404_and_health_reports_sessions() {
        let state = state_with(FakeModel::default());

        let (status, _) = call(&state, "GET", "/api/chat/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        call(&state, "POST", "/api/start-session", None).await;
        let (status, body) = call(&state, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["sessions"], 1);
    }

    #[tokio::test]
    async fn responses_carry_trace_id() {
        let state = state_with(FakeModel::default());
        let id = "6f1c1c2e-8d59-4c55-9a3c-2d7f2f5b9a10";
        let resp = build(state)
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header("x-trace-id", id)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.headers()["x-trace-id"], id);
    }
}
