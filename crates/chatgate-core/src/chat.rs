//! Conversation orchestration: quota gate → history → upstream → history.

use std::{sync::Arc, time::Duration};

use tracing::{debug, info, warn};

use crate::{
    config::Config,
    domain::{Role, SessionId, Turn, UserId},
    errors::Error,
    model::{
        client::ChatModel,
        types::{ChatRequest, ProviderKind},
    },
    quota::QuotaLedger,
    session::SessionStore,
    Result,
};

/// Tokens charged per chat request.
pub const CHAT_COST: u64 = 1;

/// Fixed per-process knobs for every chat request.
#[derive(Clone, Debug)]
pub struct ChatSettings {
    pub persona: String,
    pub temperature: f64,
    pub upstream_timeout: Duration,
    /// Give the token back when the upstream call fails. Off by default:
    /// requests are charged per attempt.
    pub refund_on_upstream_error: bool,
}

impl ChatSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            persona: cfg.persona_prompt.clone(),
            temperature: cfg.temperature,
            upstream_timeout: cfg.upstream_timeout,
            refund_on_upstream_error: cfg.refund_on_upstream_error,
        }
    }
}

pub struct Orchestrator {
    sessions: Arc<SessionStore>,
    ledger: Arc<QuotaLedger>,
    model: Arc<dyn ChatModel>,
    settings: ChatSettings,
}

impl Orchestrator {
    pub fn new(
        sessions: Arc<SessionStore>,
        ledger: Arc<QuotaLedger>,
        model: Arc<dyn ChatModel>,
        settings: ChatSettings,
    ) -> Self {
        Self {
            sessions,
            ledger,
            model,
            settings,
        }
    }

    pub fn provider(&self) -> ProviderKind {
        self.model.provider()
    }

    /// Charge one token, record the query, ask the model, record the reply.
    ///
    /// The session's exchange lock is held from the USER append to the
    /// ASSISTANT append, so concurrent requests on one session are applied one
    /// after another. History reads are not blocked by it. A failed upstream
    /// call leaves the USER turn in place.
    pub async fn handle_chat(
        &self,
        session_id: &SessionId,
        user: UserId,
        query: &str,
    ) -> Result<String> {
        if !self.ledger.try_deduct(user, CHAT_COST) {
            info!(user_id = %user, "chat rejected: no tokens left");
            return Err(Error::QuotaExceeded);
        }

        let session = self.sessions.get_or_create(session_id).await;
        let _exchange = session.begin_exchange().await;
        session.push(Role::User, query);

        let history = session.turns();
        let req = ChatRequest {
            message: render_context(&history, query),
            preamble: self.settings.persona.clone(),
            temperature: self.settings.temperature,
        };
        debug!(
            session_id = %session_id,
            turns = history.len(),
            context_len = req.message.len(),
            "calling upstream model"
        );

        let call = self.model.chat(req);
        let outcome = match tokio::time::timeout(self.settings.upstream_timeout, call).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(Error::Upstream(msg))) => Err(Error::Upstream(msg)),
            Ok(Err(other)) => Err(Error::Upstream(other.to_string())),
            Err(_) => Err(Error::Upstream(format!(
                "no reply within {}s",
                self.settings.upstream_timeout.as_secs_f64()
            ))),
        };

        match outcome {
            Ok(reply) => {
                let text = reply.text.trim().to_string();
                session.push(Role::Assistant, text.clone());
                info!(
                    session_id = %session_id,
                    user_id = %user,
                    reply_len = text.len(),
                    "chat completed"
                );
                Ok(text)
            }
            Err(e) => {
                if self.settings.refund_on_upstream_error {
                    let balance = self.ledger.refund(user, CHAT_COST);
                    warn!(
                        session_id = %session_id,
                        user_id = %user,
                        balance,
                        error = %e,
                        "upstream failed; token refunded"
                    );
                } else {
                    warn!(
                        session_id = %session_id,
                        user_id = %user,
                        error = %e,
                        "upstream failed"
                    );
                }
                Err(e)
            }
        }
    }
}

/// Every turn as `ROLE: text`, one per line, then the new query once more.
///
/// Assistant turns are labelled `CHATBOT`, the provider's own role name.
pub fn render_context(turns: &[Turn], query: &str) -> String {
    let history = turns
        .iter()
        .map(|t| format!("{}: {}", t.role.label(), t.text))
        .collect::<Vec<_>>()
        .join("\n");
    format!("{history}\nUSER: {query}")
}
