use async_trait::async_trait;

use crate::Result;

use super::types::*;

/// Model client interface used by the conversation orchestrator.
///
/// Implementations map transport and provider failures to
/// [`Error::Upstream`](crate::Error::Upstream).
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn provider(&self) -> ProviderKind;

    async fn chat(&self, req: ChatRequest) -> Result<ChatReply>;
}
