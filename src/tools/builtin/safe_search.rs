//! Child-safe web search with a curator summary.

use std::time::Instant;

use async_trait::async_trait;

use crate::policy::is_url_allowed;
use crate::safety::ArtifactKind;
use crate::tools::builtin::{
    PROMPT_PAYLOAD_BUDGET, clip_bytes, complete_text, finish, gate_query, provider_rejection,
};
use crate::tools::outcome::{SafetyAction, ToolOutcome};
use crate::tools::tool::{Tool, ToolContext, ToolError, ToolOutput, optional_count, require_str};

const CURATOR_PROMPT: &str = "You are a Safety Curator for children aged 7 to 12. Summarize the following search snippets in 3 to 5 short, calm, factual sentences. Leave out anything scary, violent, or adult. If the snippets are unsafe for children, reply exactly REJECT_UNSAFE_RESULTS.";
const CURATOR_REJECT: &str = "REJECT_UNSAFE_RESULTS";

pub struct SafeSearchTool;

#[async_trait]
impl Tool for SafeSearchTool {
    fn name(&self) -> &str {
        "safe_search"
    }

    fn description(&self) -> &str {
        "Child-safe web search. Returns a short curated summary of results from allowlisted sites."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "What the child wants to know"
                },
                "limit": {
                    "type": "integer",
                    "description": "Number of results to consider (default 5, max 10)"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let started = Instant::now();
        let query = require_str(&params, "query")?;
        let limit = optional_count(&params, "limit", 5, 10);

        if let Some(rejection) = gate_query(ctx, query).await {
            return Ok(finish(rejection, started));
        }

        let hits = match ctx.providers.search.search(query, limit).await {
            Ok(hits) => hits,
            Err(e) => return Ok(finish(provider_rejection(&e), started)),
        };
        let docs: Vec<serde_json::Value> = hits
            .iter()
            .filter(|h| is_url_allowed(&h.url, Some(&ctx.policy)))
            .map(|h| serde_json::json!({"title": h.title, "snippet": h.snippet}))
            .collect();
        tracing::debug!(total = hits.len(), kept = docs.len(), "Filtered search results");

        if docs.is_empty() {
            return Ok(finish(
                ToolOutcome::reject("No allowlisted results found.", SafetyAction::AskAlternative),
                started,
            ));
        }

        let payload = serde_json::to_string(&docs)
            .map_err(|e| ToolError::ExecutionFailed(format!("failed to encode results: {e}")))?;
        let system = ctx.prompt_overrides.curator().unwrap_or(CURATOR_PROMPT);
        let summary = complete_text(ctx, system, clip_bytes(&payload, PROMPT_PAYLOAD_BUDGET), 0.2)
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("curator failed: {e}")))?;

        if summary == CURATOR_REJECT {
            return Ok(finish(
                ToolOutcome::reject("Curator rejected as unsafe", SafetyAction::Redirect),
                started,
            ));
        }

        let decision = ctx
            .reviewer
            .review(&summary, ArtifactKind::GeneratedAnswer, Some(&ctx.policy))
            .await;
        if !decision.is_allowed() {
            return Ok(finish(
                ToolOutcome::reject("Summary failed safety review", SafetyAction::Redirect),
                started,
            ));
        }

        Ok(finish(
            ToolOutcome::safe(serde_json::json!({ "summary": summary })),
            started,
        ))
    }
}
