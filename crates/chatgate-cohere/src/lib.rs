//! Cohere adapter (chat completions).
//!
//! Implements the core `ChatModel` port over Cohere's `v1/chat` endpoint:
//! the rendered conversation goes in `message`, the persona in `preamble`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use chatgate_core::{
    errors::Error,
    model::{
        client::ChatModel,
        types::{ChatReply, ChatRequest, ProviderKind},
    },
    Result,
};

#[derive(Clone)]
pub struct CohereClient {
    api_key: String,
    base_url: String,
    model: Option<String>,
    http: reqwest::Client,
}

impl std::fmt::Debug for CohereClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CohereClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
struct CohereChatBody<'a> {
    message: &'a str,
    preamble: &'a str,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct CohereChatResponse {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CohereErrorBody {
    message: Option<String>,
}

impl CohereClient {
    /// `timeout` bounds each HTTP request; the orchestrator applies its own
    /// deadline on top.
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("chatgate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("cohere http client: {e}")))?;

        Ok(Self {
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model,
            http,
        })
    }

    fn chat_url(&self) -> String {
        format!("{}/v1/chat", self.base_url)
    }

    fn body<'a>(&'a self, req: &'a ChatRequest) -> CohereChatBody<'a> {
        CohereChatBody {
            message: &req.message,
            preamble: &req.preamble,
            temperature: req.temperature,
            model: self.model.as_deref(),
        }
    }
}

#[async_trait]
impl ChatModel for CohereClient {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Cohere
    }

    async fn chat(&self, req: ChatRequest) -> Result<ChatReply> {
        let resp = self
            .http
            .post(self.chat_url())
            .bearer_auth(&self.api_key)
            .json(&self.body(&req))
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("cohere request error: {e}")))?;

        let status = resp.status();
        let raw = resp
            .text()
            .await
            .map_err(|e| Error::Upstream(format!("cohere read error: {e}")))?;

        if !status.is_success() {
            tracing::debug!(%status, "cohere returned an error status");
            return Err(Error::Upstream(format!(
                "cohere chat failed: {status} {}",
                error_detail(&raw)
            )));
        }

        parse_reply(&raw)
    }
}

fn error_detail(raw: &str) -> String {
    serde_json::from_str::<CohereErrorBody>(raw)
        .ok()
        .and_then(|b| b.message)
        .unwrap_or_else(|| raw.chars().take(200).collect())
}

fn parse_reply(raw: &str) -> Result<ChatReply> {
    let parsed: CohereChatResponse = serde_json::from_str(raw)
        .map_err(|e| Error::Upstream(format!("cohere json error: {e}")))?;

    let text = parsed
        .text
        .ok_or_else(|| Error::Upstream("cohere response has no text".to_string()))?;

    Ok(ChatReply { text })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(model: Option<&str>) -> CohereClient {
        CohereClient::new(
            "key",
            "http://127.0.0.1:1/",
            model.map(str::to_string),
            Duration::from_secs(2),
        )
        .unwrap()
    }

    fn request() -> ChatRequest {
        ChatRequest {
            message: "USER: hi\nUSER: hi".to_string(),
            preamble: "be nice".to_string(),
            temperature: 0.7,
        }
    }

    #[test]
    fn body_carries_context_preamble_and_temperature() {
        let c = client(None);
        let req = request();
        let v = serde_json::to_value(c.body(&req)).unwrap();
        assert_eq!(
            v,
            serde_json::json!({
                "message": "USER: hi\nUSER: hi",
                "preamble": "be nice",
                "temperature": 0.7,
            })
        );

        let c = client(Some("command-r"));
        let v = serde_json::to_value(c.body(&req)).unwrap();
        assert_eq!(v["model"], "command-r");
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        assert_eq!(client(None).chat_url(), "http://127.0.0.1:1/v1/chat");
    }

    #[test]
    fn parses_text_and_rejects_malformed_replies() {
        let ok = parse_reply(r#"{"text":"  hello ","generation_id":"x"}"#).unwrap();
        assert_eq!(ok.text, "  hello ");

        assert!(matches!(parse_reply("not json"), Err(Error::Upstream(_))));
        assert!(matches!(parse_reply(r#"{"meta":{}}"#), Err(Error::Upstream(_))));
    }

    #[test]
    fn error_detail_prefers_provider_message() {
        assert_eq!(error_detail(r#"{"message":"invalid api token"}"#), "invalid api token");
        assert_eq!(error_detail("gateway timeout"), "gateway timeout");
    }

    #[tokio::test]
    async fn unreachable_provider_is_an_upstream_error() {
        let err = client(None).chat(request()).await.unwrap_err();
        assert!(matches!(err, Error::Upstream(_)));
    }

    #[test]
    fn debug_hides_api_key() {
        let shown = format!("{:?}", client(None));
        assert!(!shown.contains("\"key\""));
    }
}
