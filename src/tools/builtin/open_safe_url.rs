//! Open an allowlisted YouTube link through the sandboxed embed.

use std::time::Instant;

use async_trait::async_trait;
use url::Url;

use crate::policy::{DomainEntry, is_domain_allowed};
use crate::tools::builtin::{finish, gate_query};
use crate::tools::outcome::{SafetyAction, ToolOutcome};
use crate::tools::tool::{Tool, ToolContext, ToolError, ToolOutput, require_str};
use crate::views::{embed_html, is_valid_video_id};

const DEFAULT_TITLE: &str = "Safe Content";

/// Extract the video id from a YouTube watch or short link.
pub(crate) fn youtube_video_id(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_ascii_lowercase();
    let id = if host == "youtu.be" {
        url.path_segments()?.next().map(str::to_string)
    } else if DomainEntry::new("youtube.com").is_some_and(|e| e.matches(&host))
        && url.path() == "/watch"
    {
        url.query_pairs()
            .find(|(k, _)| k == "v")
            .map(|(_, v)| v.into_owned())
    } else {
        None
    }?;
    is_valid_video_id(&id).then_some(id)
}

pub struct OpenSafeUrlTool;

#[async_trait]
impl Tool for OpenSafeUrlTool {
    fn name(&self) -> &str {
        "open_safe_url"
    }

    fn description(&self) -> &str {
        "Open an allowlisted YouTube link in the sandboxed player."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "YouTube watch or youtu.be link"
                },
                "title": {
                    "type": "string",
                    "description": "Title shown above the player"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let started = Instant::now();
        let raw = require_str(&params, "url")?;
        let title = params
            .get("title")
            .and_then(|v| v.as_str())
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(DEFAULT_TITLE);

        if let Some(rejection) = gate_query(ctx, title).await {
            return Ok(finish(rejection, started));
        }

        let parsed = Url::parse(raw).ok();
        let host = parsed
            .as_ref()
            .and_then(|u| u.host_str())
            .map(|h| h.to_ascii_lowercase())
            .unwrap_or_default();
        let web = parsed
            .as_ref()
            .is_some_and(|u| matches!(u.scheme(), "http" | "https"));
        if !web || !is_domain_allowed(&host, Some(&ctx.policy)) {
            tracing::info!(host = %host, "Refused to open URL outside the allowlist");
            return Ok(finish(
                ToolOutcome::reject_plain(format!("Domain not allowed: {host}")),
                started,
            ));
        }

        let Some(video_id) = parsed.as_ref().and_then(youtube_video_id) else {
            return Ok(finish(
                ToolOutcome::reject(
                    "Only YouTube links supported here.",
                    SafetyAction::UseSafeVideoSearch,
                ),
                started,
            ));
        };

        let html = embed_html(&video_id, title, false);
        Ok(finish(
            ToolOutcome::safe(serde_json::json!({ "video_id": video_id, "embed_html": html })),
            started,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_context;
    use pretty_assertions::assert_eq;

    fn id_of(raw: &str) -> Option<String> {
        youtube_video_id(&Url::parse(raw).unwrap())
    }

    #[test]
    fn test_video_id_extraction() {
        assert_eq!(id_of("https://youtu.be/abc123").as_deref(), Some("abc123"));
        assert_eq!(
            id_of("https://www.youtube.com/watch?v=abc123&t=4").as_deref(),
            Some("abc123")
        );
        assert_eq!(id_of("https://www.youtube.com/channel/xyz"), None);
        assert_eq!(id_of("https://example.org/watch?v=abc123"), None);
    }

    #[tokio::test]
    async fn test_embeds_allowlisted_link() {
        let ctx = test_context(&["youtube.com"]);
        let out = OpenSafeUrlTool
            .execute(
                serde_json::json!({"url": "https://www.youtube.com/watch?v=abc123", "title": "Rain"}),
                &ctx,
            )
            .await
            .unwrap();
        assert!(out.is_safe());
        assert_eq!(out.result["video_id"], "abc123");
    }

    #[tokio::test]
    async fn test_rejects_host_outside_allowlist() {
        let ctx = test_context(&["youtube.com"]);
        let out = OpenSafeUrlTool
            .execute(serde_json::json!({"url": "https://evil-youtube.com/watch?v=x"}), &ctx)
            .await
            .unwrap();
        assert_eq!(out.result["reason"], "Domain not allowed: evil-youtube.com");
        assert!(out.result.get("action").is_none());
    }

    #[tokio::test]
    async fn test_non_video_link_suggests_video_search() {
        let ctx = test_context(&["example.org"]);
        let out = OpenSafeUrlTool
            .execute(serde_json::json!({"url": "https://example.org/page"}), &ctx)
            .await
            .unwrap();
        assert_eq!(out.result["action"], "USE_SAFE_VIDEO_SEARCH");
    }
}
