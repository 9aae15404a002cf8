//! OpenAI-compatible Chat Completions provider.
//!
//! Works against OpenAI itself and any endpoint that speaks
//! `/v1/chat/completions` (vLLM, LiteLLM, local proxies).
//!
//! Each request is attempted once. Retrying is left to the operator so the
//! step budget of a conversation stays a hard bound.

use std::collections::HashSet;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::error::LlmError;
use crate::llm::provider::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmProvider, Role,
    ToolCall, ToolCompletionRequest, ToolCompletionResponse, sanitize_tool_messages,
};

const PROVIDER: &str = "openai_compatible_chat";
const MAX_RESPONSE_BYTES: usize = 10 * 1024 * 1024;
const DEBUG_BODY_LIMIT: usize = 2000;

/// OpenAI-compatible provider implementation over `/v1/chat/completions`.
pub struct OpenAiCompatibleChatProvider {
    client: Client,
    config: LlmConfig,
}

impl OpenAiCompatibleChatProvider {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: format!("Failed to build HTTP client: {e}"),
            })?;

        Ok(Self { client, config })
    }

    fn api_url(&self, path: &str) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');

        if base.ends_with("/v1") {
            format!("{}/{}", base, path)
        } else {
            format!("{}/v1/{}", base, path)
        }
    }

    fn api_key(&self) -> String {
        self.config
            .api_key
            .as_ref()
            .map(|k| k.expose_secret().to_string())
            .unwrap_or_else(|| "no-key".to_string())
    }

    async fn send_request<T: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        body: &T,
    ) -> Result<R, LlmError> {
        let url = self.api_url("chat/completions");
        tracing::debug!(url = %url, "Sending chat completion request");

        if tracing::enabled!(tracing::Level::DEBUG)
            && let Ok(json) = serde_json::to_string(body)
        {
            tracing::debug!("Chat request body: {}", truncate_for_log(&json));
        }

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key()))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout {
                        provider: PROVIDER.to_string(),
                        after: self.config.request_timeout,
                    }
                } else {
                    LlmError::RequestFailed {
                        provider: PROVIDER.to_string(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if response.content_length().unwrap_or(0) as usize > MAX_RESPONSE_BYTES {
            return Err(LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: format!("Response too large (max {} bytes)", MAX_RESPONSE_BYTES),
            });
        }
        let response_text = response.text().await.map_err(|e| LlmError::RequestFailed {
            provider: PROVIDER.to_string(),
            reason: format!("Failed to read response body: {e}"),
        })?;
        if response_text.len() > MAX_RESPONSE_BYTES {
            return Err(LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: format!(
                    "Response too large: {} bytes (max {})",
                    response_text.len(),
                    MAX_RESPONSE_BYTES
                ),
            });
        }

        tracing::debug!(status = %status, "Chat response received");
        if tracing::enabled!(tracing::Level::DEBUG) {
            tracing::debug!("Chat response body: {}", truncate_for_log(&response_text));
        }

        if !status.is_success() {
            return Err(match status.as_u16() {
                401 | 403 => LlmError::AuthFailed {
                    provider: PROVIDER.to_string(),
                },
                429 => LlmError::RateLimited {
                    provider: PROVIDER.to_string(),
                    retry_after: None,
                },
                _ => LlmError::RequestFailed {
                    provider: PROVIDER.to_string(),
                    reason: format!("HTTP {}: {}", status, truncate_for_log(&response_text)),
                },
            });
        }

        serde_json::from_str(&response_text).map_err(|e| LlmError::InvalidResponse {
            provider: PROVIDER.to_string(),
            reason: format!("JSON parse error: {e}"),
        })
    }

    fn first_choice(response: ChatCompletionResponse) -> Result<(ChatCompletionChoice, Option<ChatCompletionUsage>), LlmError> {
        let usage = response.usage;
        response
            .choices
            .into_iter()
            .next()
            .map(|choice| (choice, usage))
            .ok_or_else(|| LlmError::InvalidResponse {
                provider: PROVIDER.to_string(),
                reason: "No choices in response".to_string(),
            })
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleChatProvider {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, req: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let mut raw_messages = req.messages;
        sanitize_tool_messages(&mut raw_messages);

        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: raw_messages.into_iter().map(ChatCompletionMessage::from).collect(),
            temperature: req.temperature.or(Some(self.config.temperature)),
            max_tokens: req.max_tokens,
            tools: None,
            tool_choice: None,
        };

        let response: ChatCompletionResponse = self.send_request(&request).await?;
        let (choice, usage) = Self::first_choice(response)?;
        let (input_tokens, output_tokens) = parse_usage(usage.as_ref());

        Ok(CompletionResponse {
            content: choice.message.content.unwrap_or_default(),
            finish_reason: parse_finish_reason(choice.finish_reason.as_deref(), false),
            input_tokens,
            output_tokens,
        })
    }

    async fn complete_with_tools(
        &self,
        req: ToolCompletionRequest,
    ) -> Result<ToolCompletionResponse, LlmError> {
        let known_tool_names: HashSet<String> = req.tools.iter().map(|t| t.name.clone()).collect();

        let mut raw_messages = req.messages;
        sanitize_tool_messages(&mut raw_messages);

        let tools: Vec<ChatCompletionTool> = req
            .tools
            .into_iter()
            .map(|t| ChatCompletionTool {
                tool_type: "function".to_string(),
                function: ChatCompletionFunction {
                    name: t.name,
                    description: Some(t.description),
                    parameters: Some(t.parameters),
                },
            })
            .collect();

        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: raw_messages.into_iter().map(ChatCompletionMessage::from).collect(),
            temperature: req.temperature.or(Some(self.config.temperature)),
            max_tokens: req.max_tokens,
            tools: if tools.is_empty() { None } else { Some(tools) },
            tool_choice: req.tool_choice,
        };

        let response: ChatCompletionResponse = self.send_request(&request).await?;
        let (choice, usage) = Self::first_choice(response)?;

        let tool_calls: Vec<ToolCall> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| {
                let arguments = serde_json::from_str(&tc.function.arguments)
                    .unwrap_or(serde_json::Value::Object(Default::default()));
                let name = normalize_tool_name(&tc.function.name, &known_tool_names);
                if name != tc.function.name {
                    tracing::debug!(
                        original = %tc.function.name,
                        normalized = %name,
                        "Normalized tool call name from provider",
                    );
                }
                ToolCall {
                    id: tc.id,
                    name,
                    arguments,
                }
            })
            .collect();

        let finish_reason =
            parse_finish_reason(choice.finish_reason.as_deref(), !tool_calls.is_empty());
        let (input_tokens, output_tokens) = parse_usage(usage.as_ref());

        Ok(ToolCompletionResponse {
            content: choice.message.content,
            tool_calls,
            finish_reason,
            input_tokens,
            output_tokens,
        })
    }
}

fn truncate_for_log(s: &str) -> String {
    if s.len() <= DEBUG_BODY_LIMIT {
        return s.to_string();
    }
    let mut cut = DEBUG_BODY_LIMIT;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}... [truncated, {} bytes total]", &s[..cut], s.len())
}

fn parse_finish_reason(reason: Option<&str>, has_tool_calls: bool) -> FinishReason {
    match reason {
        Some("stop") => FinishReason::Stop,
        Some("length") => FinishReason::Length,
        Some("tool_calls") => FinishReason::ToolUse,
        Some("content_filter") => FinishReason::ContentFilter,
        _ if has_tool_calls => FinishReason::ToolUse,
        _ => FinishReason::Unknown,
    }
}

/// Some proxies prefix function names; map them back to registered tools.
fn normalize_tool_name(name: &str, known_tools: &HashSet<String>) -> String {
    if known_tools.contains(name) {
        return name.to_string();
    }

    if let Some(stripped) = name
        .strip_prefix("proxy_")
        .or_else(|| name.strip_prefix("functions."))
        && known_tools.contains(stripped)
    {
        return stripped.to_string();
    }

    name.to_string()
}

fn saturate_u32(val: u64) -> u32 {
    val.min(u32::MAX as u64) as u32
}

fn parse_usage(usage: Option<&ChatCompletionUsage>) -> (u32, u32) {
    let Some(usage) = usage else {
        return (0, 0);
    };

    match (usage.prompt_tokens, usage.completion_tokens, usage.total_tokens) {
        (prompt, Some(completion), _) => (prompt.map(saturate_u32).unwrap_or(0), saturate_u32(completion)),
        (Some(prompt), None, Some(total)) => (saturate_u32(prompt), saturate_u32(total.saturating_sub(prompt))),
        (None, None, Some(total)) => (0, saturate_u32(total)),
        (Some(prompt), None, None) => (saturate_u32(prompt), 0),
        (None, None, None) => (0, 0),
    }
}

// Chat Completions wire types

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatCompletionMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ChatCompletionTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatCompletionMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ChatCompletionToolCall>>,
}

impl From<ChatMessage> for ChatCompletionMessage {
    fn from(msg: ChatMessage) -> Self {
        let role = match msg.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };

        let tool_calls = msg.tool_calls.map(|calls| {
            calls
                .into_iter()
                .map(|tc| ChatCompletionToolCall {
                    id: tc.id,
                    call_type: "function".to_string(),
                    function: ChatCompletionToolCallFunction {
                        name: tc.name,
                        arguments: tc.arguments.to_string(),
                    },
                })
                .collect()
        });

        let content = if role == "assistant" && tool_calls.is_some() && msg.content.is_empty() {
            None
        } else {
            Some(msg.content)
        };

        Self {
            role: role.to_string(),
            content,
            tool_call_id: msg.tool_call_id,
            name: msg.name,
            tool_calls,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionTool {
    #[serde(rename = "type")]
    tool_type: String,
    function: ChatCompletionFunction,
}

#[derive(Debug, Serialize)]
struct ChatCompletionFunction {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatCompletionChoice>,
    #[serde(default)]
    usage: Option<ChatCompletionUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    message: ChatCompletionResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ChatCompletionToolCall>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatCompletionToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    call_type: String,
    function: ChatCompletionToolCallFunction,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatCompletionToolCallFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize, Default)]
struct ChatCompletionUsage {
    #[serde(default)]
    prompt_tokens: Option<u64>,
    #[serde(default)]
    completion_tokens: Option<u64>,
    #[serde(default)]
    total_tokens: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(base_url: &str) -> OpenAiCompatibleChatProvider {
        OpenAiCompatibleChatProvider::new(LlmConfig {
            base_url: base_url.to_string(),
            ..Default::default()
        })
        .expect("provider")
    }

    #[test]
    fn test_api_url_without_v1_suffix() {
        assert_eq!(
            provider("http://127.0.0.1:8318").api_url("chat/completions"),
            "http://127.0.0.1:8318/v1/chat/completions"
        );
    }

    #[test]
    fn test_api_url_with_v1_suffix() {
        assert_eq!(
            provider("http://127.0.0.1:8318/v1/").api_url("/chat/completions"),
            "http://127.0.0.1:8318/v1/chat/completions"
        );
    }

    #[test]
    fn test_normalize_tool_name() {
        let known = HashSet::from(["safe_search".to_string(), "open_safe_url".to_string()]);
        assert_eq!(normalize_tool_name("safe_search", &known), "safe_search");
        assert_eq!(normalize_tool_name("proxy_safe_search", &known), "safe_search");
        assert_eq!(normalize_tool_name("functions.open_safe_url", &known), "open_safe_url");
        assert_eq!(normalize_tool_name("proxy_unknown", &known), "proxy_unknown");
    }

    #[test]
    fn test_parse_usage_branches() {
        let usage = |p, c, t| ChatCompletionUsage {
            prompt_tokens: p,
            completion_tokens: c,
            total_tokens: t,
        };
        assert_eq!(parse_usage(Some(&usage(Some(10), Some(7), Some(12)))), (10, 7));
        assert_eq!(parse_usage(Some(&usage(Some(500), None, Some(120)))), (500, 0));
        assert_eq!(parse_usage(Some(&usage(None, None, Some(42)))), (0, 42));
        assert_eq!(parse_usage(Some(&usage(Some(17), None, None))), (17, 0));
        assert_eq!(parse_usage(None), (0, 0));
    }

    #[test]
    fn test_parse_finish_reason() {
        assert_eq!(parse_finish_reason(Some("stop"), false), FinishReason::Stop);
        assert_eq!(parse_finish_reason(Some("tool_calls"), false), FinishReason::ToolUse);
        assert_eq!(parse_finish_reason(None, true), FinishReason::ToolUse);
        assert_eq!(parse_finish_reason(Some("weird"), false), FinishReason::Unknown);
    }

    #[test]
    fn test_assistant_tool_call_message_omits_empty_content() {
        let msg = ChatMessage::assistant_with_tool_calls(
            None,
            vec![ToolCall {
                id: "c1".to_string(),
                name: "safe_search".to_string(),
                arguments: serde_json::json!({"query": "rain"}),
            }],
        );
        let wire = ChatCompletionMessage::from(msg);
        assert!(wire.content.is_none());
        let calls = wire.tool_calls.unwrap();
        assert_eq!(calls[0].function.arguments, r#"{"query":"rain"}"#);
    }

    #[test]
    fn test_truncate_for_log_respects_char_boundaries() {
        let long = "é".repeat(DEBUG_BODY_LIMIT);
        let out = truncate_for_log(&long);
        assert!(out.contains("truncated"));
    }
}
