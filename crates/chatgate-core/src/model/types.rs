use serde::{Deserialize, Serialize};

/// The provider backend behind the gateway.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Cohere,
    Local,
}

/// Normalized request for a single completion.
#[derive(Clone, Debug, PartialEq)]
pub struct ChatRequest {
    /// Rendered conversation context ending with the new user query.
    pub message: String,
    /// Fixed persona / system instruction.
    pub preamble: String,
    pub temperature: f64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatReply {
    pub text: String,
}
