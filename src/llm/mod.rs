//! LLM integration.

mod openai_compatible_chat;
pub mod provider;

pub use self::openai_compatible_chat::OpenAiCompatibleChatProvider;
pub use self::provider::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmProvider, Role,
    ToolCall, ToolCompletionRequest, ToolCompletionResponse, ToolDefinition,
};

use std::sync::Arc;

use crate::config::LlmConfig;
use crate::error::LlmError;

/// Create the configured LLM provider.
pub fn create_llm_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    tracing::debug!(model = %config.model, base_url = %config.base_url, "Creating LLM provider");
    Ok(Arc::new(OpenAiCompatibleChatProvider::new(config.clone())?))
}
