//! Built-in safety-gated tools.
//!
//! Every tool goes through the same gates before touching a provider:
//! an empty domain allowlist rejects outright, then the query is reviewed.

mod answer_search;
mod creative_helper;
mod image_gallery;
mod open_safe_url;
mod safe_search;
mod video_search;

use std::path::Path;
use std::time::Instant;

use serde::Deserialize;

pub use answer_search::AnswerSearchTool;
pub use creative_helper::CreativeHelperTool;
pub use image_gallery::SafeImageGalleryTool;
pub use open_safe_url::OpenSafeUrlTool;
pub use safe_search::SafeSearchTool;
pub use video_search::SafeVideoSearchTool;

use crate::error::{LlmError, ProviderError};
use crate::llm::{ChatMessage, CompletionRequest, FinishReason};
use crate::policy::screen_text;
use crate::safety::ArtifactKind;
use crate::tools::outcome::{SafetyAction, ToolOutcome};
use crate::tools::tool::{ToolContext, ToolOutput};

/// Byte cap on JSON handed to curator and writer prompts.
pub(crate) const PROMPT_PAYLOAD_BUDGET: usize = 8000;

/// An operator-approved video.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AllowedVideo {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl AllowedVideo {
    /// The title contains the query, or the query contains one of the tags.
    pub fn matches(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        if query.trim().is_empty() {
            return false;
        }
        let title_hit = self
            .title
            .as_deref()
            .is_some_and(|t| t.to_lowercase().contains(&query));
        title_hit
            || self
                .tags
                .iter()
                .map(|t| t.trim().to_lowercase())
                .any(|t| !t.is_empty() && query.contains(&t))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum VideoAllowlistFile {
    List(Vec<AllowedVideo>),
    Wrapped { videos: Vec<AllowedVideo> },
}

/// Parse an operator video allowlist (`[...]` or `{"videos": [...]}`).
pub fn parse_video_allowlist(raw: &str) -> Result<Vec<AllowedVideo>, serde_json::Error> {
    Ok(match serde_json::from_str::<VideoAllowlistFile>(raw)? {
        VideoAllowlistFile::List(videos) | VideoAllowlistFile::Wrapped { videos } => videos,
    })
}

/// Load an operator video allowlist. Missing or malformed files give an
/// empty list.
pub fn load_video_allowlist(path: &Path) -> Vec<AllowedVideo> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Video allowlist unreadable, ignoring");
            return Vec::new();
        }
    };
    match parse_video_allowlist(&raw) {
        Ok(videos) => {
            tracing::debug!(path = %path.display(), count = videos.len(), "Loaded video allowlist");
            videos
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Video allowlist malformed, ignoring");
            Vec::new()
        }
    }
}

/// Allowlist and query gates shared by every built-in.
///
/// Returns the rejection to hand back, or `None` when the call may proceed.
pub(crate) async fn gate_query(ctx: &ToolContext, query: &str) -> Option<ToolOutcome> {
    if ctx.policy.is_fail_closed() {
        return Some(ToolOutcome::allowlist_required());
    }

    let screen = screen_text(query, Some(&ctx.policy));
    if screen.unsafe_ {
        let term = screen.matched_term.unwrap_or_default();
        return Some(ToolOutcome::reject(
            format!("Query flagged as unsafe (\"{term}\")"),
            SafetyAction::Redirect,
        ));
    }

    let decision = ctx
        .reviewer
        .review(query, ArtifactKind::Query, Some(&ctx.policy))
        .await;
    if !decision.is_allowed() {
        return Some(ToolOutcome::reject(
            "Query flagged as unsafe",
            SafetyAction::Redirect,
        ));
    }
    None
}

/// Map a provider failure onto the rejection a child sees.
pub(crate) fn provider_rejection(err: &ProviderError) -> ToolOutcome {
    tracing::warn!(error = %err, "Provider call failed");
    match err {
        ProviderError::NotConfigured { .. } => {
            ToolOutcome::reject("Search provider not configured.", SafetyAction::AskAlternative)
        }
        ProviderError::Http { status, .. } => {
            ToolOutcome::reject(format!("Provider error {status}"), SafetyAction::AskAlternative)
        }
        _ => ToolOutcome::reject("Provider unavailable.", SafetyAction::AskAlternative),
    }
}

/// One-shot completion for curator, writer and caption prompts.
pub(crate) async fn complete_text(
    ctx: &ToolContext,
    system: &str,
    user: &str,
    temperature: f32,
) -> Result<String, LlmError> {
    let request = CompletionRequest::new(vec![ChatMessage::system(system), ChatMessage::user(user)])
        .with_temperature(temperature);
    let response = ctx.llm.complete(request).await?;
    tracing::debug!(
        input_tokens = response.input_tokens,
        output_tokens = response.output_tokens,
        finish_reason = ?response.finish_reason,
        "Completion"
    );
    if response.finish_reason == FinishReason::ContentFilter {
        return Ok(String::new());
    }
    Ok(response.content.trim().to_string())
}

/// Cut serialized JSON to at most `max` bytes on a char boundary.
pub(crate) fn clip_bytes(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

pub(crate) fn finish(outcome: ToolOutcome, started: Instant) -> ToolOutput {
    ToolOutput::success(outcome.into_value(), started.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_context;

    #[test]
    fn test_allowed_video_matching() {
        let video = AllowedVideo {
            id: "abc".to_string(),
            title: Some("The Water Cycle Song".to_string()),
            channel: None,
            tags: vec!["rain".to_string(), "clouds".to_string()],
        };
        assert!(video.matches("water cycle"));
        assert!(video.matches("why does it rain"));
        assert!(!video.matches("dinosaurs"));
        assert!(!video.matches("  "));
    }

    #[test]
    fn test_parse_video_allowlist_shapes() {
        let bare = parse_video_allowlist(r#"[{"id": "a"}]"#).unwrap();
        assert_eq!(bare.len(), 1);
        let wrapped =
            parse_video_allowlist(r#"{"videos": [{"id": "a", "tags": ["x"]}, {"id": "b"}]}"#)
                .unwrap();
        assert_eq!(wrapped[0].tags, vec!["x"]);
        assert_eq!(wrapped.len(), 2);
    }

    #[test]
    fn test_load_missing_video_allowlist_is_empty() {
        assert!(load_video_allowlist(Path::new("/nonexistent/videos.json")).is_empty());
    }

    #[tokio::test]
    async fn test_gate_rejects_empty_allowlist_first() {
        let ctx = test_context(&[]);
        let outcome = gate_query(&ctx, "kill").await.unwrap().into_value();
        assert_eq!(outcome["reason"], "Allowlist required (provide --domains)");
    }

    #[tokio::test]
    async fn test_gate_flags_banned_term() {
        let ctx = test_context(&["example.com"]);
        let outcome = gate_query(&ctx, "How to KILL weeds").await.unwrap().into_value();
        assert_eq!(outcome["reason"], "Query flagged as unsafe (\"kill\")");
        assert_eq!(outcome["action"], "REDIRECT");
        assert!(gate_query(&ctx, "why does it rain").await.is_none());
    }

    #[test]
    fn test_clip_bytes_respects_char_boundaries() {
        assert_eq!(clip_bytes("héllo", 2), "h");
        assert_eq!(clip_bytes("abc", 10), "abc");
    }

    #[test]
    fn test_provider_rejection_messages() {
        let not_configured = ProviderError::NotConfigured {
            provider: "google".to_string(),
            hint: "set GOOGLE_API_KEY".to_string(),
        };
        assert_eq!(
            provider_rejection(&not_configured).reason(),
            Some("Search provider not configured.")
        );
        let http = ProviderError::Http {
            provider: "google".to_string(),
            status: 500,
        };
        assert_eq!(provider_rejection(&http).reason(), Some("Provider error 500"));
    }
}
