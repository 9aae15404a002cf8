//! Tool trait and types.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm::{LlmProvider, ToolDefinition};
use crate::policy::Policy;
use crate::prompts::PromptOverrides;
use crate::providers::ProviderClients;
use crate::safety::ContentSafetyReviewer;
use crate::tools::builtin::AllowedVideo;

/// Error type for tool execution.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Tool timed out after {0:?}")]
    Timeout(Duration),
}

/// Output from a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    /// The result data.
    pub result: serde_json::Value,
    /// Time taken.
    pub duration: Duration,
}

impl ToolOutput {
    /// Create a successful output with a JSON result.
    pub fn success(result: serde_json::Value, duration: Duration) -> Self {
        Self { result, duration }
    }

    /// Whether the result is an approved (`"safe": true`) payload.
    pub fn is_safe(&self) -> bool {
        self.result
            .get("safe")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

/// Read-only context shared by every tool invocation.
#[derive(Clone)]
pub struct ToolContext {
    pub policy: Policy,
    /// Model name used for curator, writer and caption prompts.
    pub model: String,
    pub prompt_overrides: PromptOverrides,
    pub providers: ProviderClients,
    pub llm: Arc<dyn LlmProvider>,
    pub reviewer: ContentSafetyReviewer,
    /// Operator video allowlist.
    pub video_allowlist: Arc<Vec<AllowedVideo>>,
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("policy", &self.policy)
            .field("model", &self.model)
            .field("prompt_overrides", &self.prompt_overrides)
            .field("reviewer", &self.reviewer)
            .field("video_allowlist", &self.video_allowlist.len())
            .finish_non_exhaustive()
    }
}

/// Definition of a tool's parameters using JSON Schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl From<ToolSchema> for ToolDefinition {
    fn from(schema: ToolSchema) -> Self {
        Self {
            name: schema.name,
            description: schema.description,
            parameters: schema.parameters,
        }
    }
}

/// Trait for tools that the agent can use.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool name.
    fn name(&self) -> &str;

    /// Get a description of what the tool does.
    fn description(&self) -> &str;

    /// Get the JSON Schema for the tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with validated parameters.
    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError>;

    /// Maximum time this tool is allowed to run before the caller abandons it.
    /// Default: 60 seconds.
    fn execution_timeout(&self) -> Duration {
        Duration::from_secs(60)
    }

    /// Get the tool schema for LLM function calling.
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Extract a required string parameter from a JSON object.
///
/// Returns `ToolError::InvalidParameters` if the key is missing or not a string.
pub fn require_str<'a>(params: &'a serde_json::Value, name: &str) -> Result<&'a str, ToolError> {
    params
        .get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::InvalidParameters(format!("missing '{}' parameter", name)))
}

/// Extract an optional unsigned integer parameter, clamped to `[1, max]`.
pub fn optional_count(params: &serde_json::Value, name: &str, default: usize, max: usize) -> usize {
    params
        .get(name)
        .and_then(|v| v.as_u64())
        .map(|n| n as usize)
        .unwrap_or(default)
        .clamp(1, max.max(1))
}

/// Extract an optional boolean parameter.
pub fn optional_bool(params: &serde_json::Value, name: &str, default: bool) -> bool {
    params
        .get(name)
        .and_then(|v| v.as_bool())
        .unwrap_or(default)
}

/// Lenient runtime validation of a tool's `parameters_schema()`.
///
/// Returns a list of validation errors. An empty list means the schema is valid.
///
/// # Rules enforced
///
/// 1. Top-level must have `"type": "object"`
/// 2. Top-level must have `"properties"` as an object
/// 3. Every key in `"required"` must exist in `"properties"`
/// 4. Nested objects follow the same rules recursively
/// 5. Array properties should have `"items"` defined
pub fn validate_tool_schema(schema: &serde_json::Value, path: &str) -> Vec<String> {
    let mut errors = Vec::new();

    match schema.get("type").and_then(|t| t.as_str()) {
        Some("object") => {}
        Some(other) => {
            errors.push(format!("{path}: expected type \"object\", got \"{other}\""));
            return errors;
        }
        None => {
            errors.push(format!("{path}: missing \"type\": \"object\""));
            return errors;
        }
    }

    let properties = match schema.get("properties").and_then(|p| p.as_object()) {
        Some(p) => p,
        None => {
            errors.push(format!("{path}: missing or non-object \"properties\""));
            return errors;
        }
    };

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for req in required {
            if let Some(key) = req.as_str()
                && !properties.contains_key(key)
            {
                errors.push(format!(
                    "{path}: required key \"{key}\" not found in properties"
                ));
            }
        }
    }

    for (key, prop) in properties {
        let prop_path = format!("{path}.{key}");
        if let Some(prop_type) = prop.get("type").and_then(|t| t.as_str()) {
            match prop_type {
                "object" => {
                    errors.extend(validate_tool_schema(prop, &prop_path));
                }
                "array" => {
                    if let Some(items) = prop.get("items") {
                        if items.get("type").and_then(|t| t.as_str()) == Some("object") {
                            errors
                                .extend(validate_tool_schema(items, &format!("{prop_path}.items")));
                        }
                    } else {
                        errors.push(format!("{prop_path}: array property missing \"items\""));
                    }
                }
                _ => {}
            }
        }
    }

    errors
}

/// Check call arguments against a tool's parameter schema.
///
/// Required keys must be present and every declared property with a simple
/// `"type"` must match it. Undeclared keys are ignored.
pub fn validate_arguments(
    schema: &serde_json::Value,
    args: &serde_json::Value,
) -> Result<(), ToolError> {
    let Some(obj) = args.as_object() else {
        return Err(ToolError::InvalidParameters(
            "arguments must be a JSON object".to_string(),
        ));
    };

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for key in required.iter().filter_map(|k| k.as_str()) {
            if obj.get(key).is_none_or(|v| v.is_null()) {
                return Err(ToolError::InvalidParameters(format!(
                    "missing '{key}' parameter"
                )));
            }
        }
    }

    let Some(properties) = schema.get("properties").and_then(|p| p.as_object()) else {
        return Ok(());
    };

    for (key, value) in obj {
        if value.is_null() {
            continue;
        }
        let Some(expected) = properties
            .get(key)
            .and_then(|p| p.get("type"))
            .and_then(|t| t.as_str())
        else {
            continue;
        };
        let ok = match expected {
            "string" => value.is_string(),
            "integer" => value.is_i64() || value.is_u64(),
            "number" => value.is_number(),
            "boolean" => value.is_boolean(),
            "array" => value.is_array(),
            "object" => value.is_object(),
            _ => true,
        };
        if !ok {
            return Err(ToolError::InvalidParameters(format!(
                "'{key}' must be of type {expected}"
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_context;

    /// A simple no-op tool for testing.
    #[derive(Debug)]
    pub struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echoes back the input message. Useful for testing."
        }

        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "message": {
                        "type": "string",
                        "description": "The message to echo back"
                    }
                },
                "required": ["message"]
            })
        }

        async fn execute(
            &self,
            params: serde_json::Value,
            _ctx: &ToolContext,
        ) -> Result<ToolOutput, ToolError> {
            let message = require_str(&params, "message")?;
            Ok(ToolOutput::success(
                serde_json::Value::String(message.to_string()),
                Duration::from_millis(1),
            ))
        }
    }

    #[tokio::test]
    async fn test_echo_tool() {
        let ctx = test_context(&["example.com"]);
        let result = EchoTool
            .execute(serde_json::json!({"message": "hello"}), &ctx)
            .await
            .unwrap();
        assert_eq!(result.result, serde_json::json!("hello"));
        assert!(!result.is_safe());
    }

    #[test]
    fn test_tool_schema_and_timeout() {
        let schema = EchoTool.schema();
        assert_eq!(schema.name, "echo");
        assert!(!schema.description.is_empty());
        assert_eq!(EchoTool.execution_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_require_str() {
        assert_eq!(require_str(&serde_json::json!({"q": "rain"}), "q").unwrap(), "rain");
        let err = require_str(&serde_json::json!({"q": 42}), "q").unwrap_err();
        assert!(err.to_string().contains("missing 'q'"));
    }

    #[test]
    fn test_optional_count_clamps() {
        let params = serde_json::json!({"max": 40, "zero": 0});
        assert_eq!(optional_count(&params, "max", 3, 12), 12);
        assert_eq!(optional_count(&params, "zero", 3, 12), 1);
        assert_eq!(optional_count(&params, "absent", 3, 12), 3);
    }

    #[test]
    fn test_validate_tool_schema_flags_orphan_required() {
        let schema = serde_json::json!({
            "type": "object",
            "properties": {"tags": {"type": "array"}},
            "required": ["query"]
        });
        let errors = validate_tool_schema(&schema, "t");
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_validate_arguments() {
        let schema = EchoTool.parameters_schema();
        assert!(validate_arguments(&schema, &serde_json::json!({"message": "hi"})).is_ok());
        assert!(validate_arguments(&schema, &serde_json::json!({})).is_err());
        assert!(validate_arguments(&schema, &serde_json::json!({"message": 3})).is_err());
        assert!(validate_arguments(&schema, &serde_json::json!("hi")).is_err());
        assert!(
            validate_arguments(&schema, &serde_json::json!({"message": "hi", "extra": 1})).is_ok()
        );
    }
}
