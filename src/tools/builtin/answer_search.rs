//! Cited-answer search: fetch a few allowlisted pages and write a short
//! answer with numbered citations.

use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;

use crate::policy::{host_of, is_url_allowed};
use crate::safety::ArtifactKind;
use crate::tools::builtin::{
    PROMPT_PAYLOAD_BUDGET, clip_bytes, complete_text, finish, gate_query, provider_rejection,
};
use crate::tools::outcome::{SafetyAction, ToolOutcome};
use crate::tools::tool::{Tool, ToolContext, ToolError, ToolOutput, optional_count, require_str};
use crate::views::{strip_tags, trim_len};

const WRITER_PROMPT: &str = "You are a child-safe answer writer. Write 4 to 7 simple sentences for ages 7 to 12.
Use numbered citations like [1], [2] referring to the provided sources array (by index starting at 1).
Avoid URLs or brands in the text. Be factual, calm, and kind.";

const MAX_PAGES: usize = 6;
const MAX_SOURCES: usize = 3;
const EXCERPT_CHARS: usize = 500;
const TITLE_CHARS: usize = 120;

struct Page {
    host: String,
    title: String,
    url: String,
    text: String,
}

#[derive(Serialize)]
struct SourceExcerpt<'a> {
    id: usize,
    host: &'a str,
    title: &'a str,
    excerpt: String,
}

#[derive(Serialize)]
struct WriterPayload<'a> {
    query: &'a str,
    sources: Vec<SourceExcerpt<'a>>,
}

pub struct AnswerSearchTool;

#[async_trait]
impl Tool for AnswerSearchTool {
    fn name(&self) -> &str {
        "answer_search"
    }

    fn description(&self) -> &str {
        "Answer a child's question from a few allowlisted web pages, with numbered citations."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The question to answer"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Search results to consider (default 6)"
                },
                "max_chars_per_page": {
                    "type": "integer",
                    "description": "Characters of text kept per page (default 2000)"
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
        let max_results = optional_count(&params, "max_results", 6, 10);
        let max_chars = optional_count(&params, "max_chars_per_page", 2000, 20_000);

        if let Some(rejection) = gate_query(ctx, query).await {
            return Ok(finish(rejection, started));
        }

        let hits = match ctx.providers.search.search(query, max_results).await {
            Ok(hits) => hits,
            Err(e) => return Ok(finish(provider_rejection(&e), started)),
        };
        let allowed: Vec<_> = hits
            .into_iter()
            .filter(|h| is_url_allowed(&h.url, Some(&ctx.policy)))
            .collect();
        if allowed.is_empty() {
            return Ok(finish(
                ToolOutcome::reject("No allowlisted sources found.", SafetyAction::AskAlternative),
                started,
            ));
        }

        let mut pages = Vec::new();
        for hit in allowed.iter().take(MAX_PAGES.min(max_results)) {
            let fetched = match ctx.providers.fetcher.fetch(&hit.url).await {
                Ok(page) => page,
                Err(e) => {
                    tracing::debug!(url = %hit.url, error = %e, "Skipping unreadable page");
                    continue;
                }
            };
            let text = strip_tags(&fetched.text());
            if text.is_empty() {
                continue;
            }
            pages.push(Page {
                host: host_of(&hit.url).unwrap_or_default(),
                title: trim_len(&hit.title, TITLE_CHARS),
                url: hit.url.clone(),
                text: trim_len(&text, max_chars),
            });
        }
        if pages.is_empty() {
            return Ok(finish(
                ToolOutcome::reject("No readable pages available.", SafetyAction::AskAlternative),
                started,
            ));
        }
        pages.truncate(MAX_SOURCES);

        let payload = WriterPayload {
            query,
            sources: pages
                .iter()
                .enumerate()
                .map(|(i, p)| SourceExcerpt {
                    id: i + 1,
                    host: &p.host,
                    title: &p.title,
                    excerpt: p.text.chars().take(EXCERPT_CHARS).collect(),
                })
                .collect(),
        };
        let payload = serde_json::to_string(&payload)
            .map_err(|e| ToolError::ExecutionFailed(format!("failed to encode sources: {e}")))?;

        let system = ctx
            .prompt_overrides
            .answer_writer()
            .or_else(|| ctx.prompt_overrides.curator())
            .unwrap_or(WRITER_PROMPT);
        let answer = complete_text(ctx, system, clip_bytes(&payload, PROMPT_PAYLOAD_BUDGET), 0.2)
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("answer writer failed: {e}")))?;

        if answer.is_empty() {
            return Ok(finish(
                ToolOutcome::reject("No answer could be written.", SafetyAction::AskAlternative),
                started,
            ));
        }

        let decision = ctx
            .reviewer
            .review(&answer, ArtifactKind::GeneratedAnswer, Some(&ctx.policy))
            .await;
        if !decision.is_allowed() {
            return Ok(finish(
                ToolOutcome::reject("Answer failed safety review", SafetyAction::Redirect),
                started,
            ));
        }

        let sources: Vec<serde_json::Value> = pages
            .iter()
            .enumerate()
            .map(|(i, p)| {
                serde_json::json!({
                    "index": i + 1,
                    "domain": p.host,
                    "title": p.title,
                    "url": p.url,
                })
            })
            .collect();

        Ok(finish(
            ToolOutcome::safe(serde_json::json!({ "answer": answer, "sources": sources })),
            started,
        ))
    }
}
