//! Executes one model-requested tool call.
//!
//! Failures never escape: an unknown tool, invalid arguments, a tool error or
//! a timeout all become an `{"error": ...}` object that is fed back to the
//! model like any other result.

use crate::llm::ToolCall;
use crate::tools::redaction::redact_for_log;
use crate::tools::{ResolvedTools, ToolContext, ToolError, validate_arguments};

fn error_result(message: impl Into<String>) -> serde_json::Value {
    serde_json::json!({ "error": message.into() })
}

/// Arguments as an object. Some providers send them as an encoded string.
pub(crate) fn normalize_arguments(args: &serde_json::Value) -> serde_json::Value {
    match args {
        serde_json::Value::String(raw) if raw.trim().is_empty() => serde_json::json!({}),
        serde_json::Value::String(raw) => {
            serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.clone()))
        }
        serde_json::Value::Null => serde_json::json!({}),
        other => other.clone(),
    }
}

/// Run `call` against the resolved tool set and return its JSON result.
pub async fn execute_tool_call(
    tools: &ResolvedTools,
    ctx: &ToolContext,
    call: &ToolCall,
) -> serde_json::Value {
    let Some(tool) = tools.get(&call.name) else {
        tracing::warn!(tool = %call.name, "Model requested an unavailable tool");
        return error_result(format!("Tool {} not implemented.", call.name));
    };

    let params = normalize_arguments(&call.arguments);
    if let Err(e) = validate_arguments(&tool.parameters_schema(), &params) {
        tracing::debug!(tool = %call.name, error = %e, "Rejected tool arguments");
        return error_result(e.to_string());
    }

    tracing::debug!(
        tool = %call.name,
        params = %redact_for_log(&params),
        "Tool call started"
    );

    let timeout = tool.execution_timeout();
    let start = std::time::Instant::now();
    let result = tokio::time::timeout(timeout, tool.execute(params, ctx)).await;
    let elapsed_ms = start.elapsed().as_millis() as u64;

    match result {
        Ok(Ok(output)) => {
            tracing::debug!(
                tool = %call.name,
                elapsed_ms,
                safe = output.is_safe(),
                result = %redact_for_log(&output.result),
                "Tool call succeeded"
            );
            output.result
        }
        Ok(Err(e)) => {
            tracing::debug!(tool = %call.name, elapsed_ms, error = %e, "Tool call failed");
            error_result(e.to_string())
        }
        Err(_) => {
            tracing::debug!(
                tool = %call.name,
                elapsed_ms,
                timeout_secs = timeout.as_secs(),
                "Tool call timed out"
            );
            error_result(ToolError::Timeout(timeout).to_string())
        }
    }
}
