//! Short creative writing for kids.

use std::time::Instant;

use async_trait::async_trait;

use crate::safety::ArtifactKind;
use crate::tools::builtin::{complete_text, finish, gate_query};
use crate::tools::outcome::{SafetyAction, ToolOutcome};
use crate::tools::tool::{Tool, ToolContext, ToolError, ToolOutput};

const DEFAULT_PROMPT: &str = "Write a short, cheerful 4-line poem about rainbows.";
const AGE_BANDS: &[&str] = &["child_4-6", "child_7-12", "teen_13-15"];
const DEFAULT_AGE: &str = "child_7-12";

pub struct CreativeHelperTool;

#[async_trait]
impl Tool for CreativeHelperTool {
    fn name(&self) -> &str {
        "creative_helper"
    }

    fn description(&self) -> &str {
        "Child-friendly creative helper for short poems, stories and rhymes."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "prompt": {
                    "type": "string",
                    "description": "What to write"
                },
                "age": {
                    "type": "string",
                    "enum": AGE_BANDS,
                    "description": "Audience age band (default child_7-12)"
                }
            }
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let started = Instant::now();
        let prompt = params
            .get("prompt")
            .and_then(|v| v.as_str())
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(DEFAULT_PROMPT);
        let age = match params.get("age").and_then(|v| v.as_str()) {
            None => DEFAULT_AGE,
            Some(age) if AGE_BANDS.contains(&age) => age,
            Some(other) => {
                return Err(ToolError::InvalidParameters(format!(
                    "'age' must be one of {}, got '{other}'",
                    AGE_BANDS.join(", ")
                )));
            }
        };

        if let Some(rejection) = gate_query(ctx, prompt).await {
            return Ok(finish(rejection, started));
        }

        let system = format!(
            "You are a friendly creative helper for kids ({age}). Keep it simple, kind, and safe. 3-6 short lines. Avoid scary or adult topics."
        );
        let text = complete_text(ctx, &system, prompt, 0.7)
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("creative helper failed: {e}")))?;
        if text.is_empty() {
            return Ok(finish(
                ToolOutcome::reject("No text could be written.", SafetyAction::AskAlternative),
                started,
            ));
        }

        let decision = ctx
            .reviewer
            .review(&text, ArtifactKind::GeneratedAnswer, Some(&ctx.policy))
            .await;
        if !decision.is_allowed() {
            return Ok(finish(
                ToolOutcome::reject("Text failed safety review", SafetyAction::Redirect),
                started,
            ));
        }

        Ok(finish(ToolOutcome::safe(serde_json::json!({ "text": text })), started))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::testing::{StubLlm, TestContextBuilder};

    #[tokio::test]
    async fn test_writes_with_default_prompt() {
        let llm = Arc::new(StubLlm::new("Red and blue,\nthe sky is new."));
        let ctx = TestContextBuilder::new(&["example.org"]).llm(llm.clone()).build();
        let out = CreativeHelperTool
            .execute(serde_json::json!({}), &ctx)
            .await
            .unwrap();
        assert!(out.is_safe());
        assert_eq!(out.result["text"], "Red and blue,\nthe sky is new.");
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_rejects_unknown_age_band() {
        let ctx = TestContextBuilder::new(&["example.org"]).build();
        let err = CreativeHelperTool
            .execute(serde_json::json!({"age": "adult"}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameters(_)));
    }

    #[tokio::test]
    async fn test_content_filtered_completion_is_rejected() {
        let llm = Arc::new(StubLlm::filtered("Once upon a"));
        let ctx = TestContextBuilder::new(&["example.org"]).llm(llm).build();
        let out = CreativeHelperTool
            .execute(serde_json::json!({"prompt": "a story"}), &ctx)
            .await
            .unwrap();
        assert!(!out.is_safe());
        assert_eq!(out.result["reason"], "No text could be written.");
        assert_eq!(out.result["action"], "ASK_ALTERNATIVE");
    }

    #[tokio::test]
    async fn test_fail_closed_without_allowlist() {
        let llm = Arc::new(StubLlm::new("poem"));
        let ctx = TestContextBuilder::new(&[]).llm(llm.clone()).build();
        let out = CreativeHelperTool
            .execute(serde_json::json!({"prompt": "a poem"}), &ctx)
            .await
            .unwrap();
        assert!(!out.is_safe());
        assert_eq!(llm.calls(), 0);
    }
}
