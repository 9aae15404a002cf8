//! Kid-safe video search with comment sampling and a sandboxed embed.

use std::sync::LazyLock;
use std::time::Instant;

use async_trait::async_trait;
use regex::Regex;

use crate::policy::is_domain_allowed;
use crate::safety::{ArtifactKind, SafetyDecision};
use crate::selector::{Candidate, CandidateReviewer, CandidateSelector, Selection};
use crate::tools::builtin::{AllowedVideo, finish, gate_query, load_video_allowlist, provider_rejection};
use crate::tools::outcome::{SafetyAction, ToolOutcome};
use crate::tools::tool::{
    Tool, ToolContext, ToolError, ToolOutput, optional_bool, optional_count, require_str,
};
use crate::views::{embed_html, is_valid_video_id};

const VIDEO_HOST: &str = "www.youtube.com";
const COMMENT_SAMPLE: usize = 20;

static LIVE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?i)\blive\b").ok());
static SCARY: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)prank|scare|horror").ok());

/// Titles that are never worth a classifier call.
fn is_obviously_unsuitable(title: &str, channel: &str) -> bool {
    let live = LIVE.as_ref().is_some_and(|re| re.is_match(title));
    let scary = SCARY
        .as_ref()
        .is_some_and(|re| re.is_match(&format!("{title} {channel}")));
    live || scary
}

/// Reviews a video's metadata, then a sample of its comments.
struct CommentsAwareReviewer<'a> {
    ctx: &'a ToolContext,
}

#[async_trait]
impl CandidateReviewer for CommentsAwareReviewer<'_> {
    async fn review(&self, candidate: &Candidate) -> SafetyDecision {
        let channel = candidate.metadata["channel"].as_str().unwrap_or_default();
        let description = candidate.metadata["description"].as_str().unwrap_or_default();
        let text = format!("{}\n{}\n{}", candidate.title, channel, description);

        let policy = Some(&self.ctx.policy);
        let metadata = self
            .ctx
            .reviewer
            .review(&text, ArtifactKind::Candidate, policy)
            .await;
        if !metadata.is_allowed() {
            return metadata;
        }

        let comments = match self
            .ctx
            .providers
            .video
            .sample_comments(&candidate.id, COMMENT_SAMPLE)
            .await
        {
            Ok(comments) => comments,
            Err(e) => {
                tracing::debug!(id = %candidate.id, error = %e, "Comment sampling failed");
                Vec::new()
            }
        };
        if comments.is_empty() {
            return metadata;
        }

        self.ctx
            .reviewer
            .review_with_instruction(
                &comments.join("\n"),
                ArtifactKind::ResurfacedData,
                policy,
                self.ctx.prompt_overrides.comments_moderation(),
            )
            .await
    }
}

fn allowlist_from_params(params: &serde_json::Value) -> Result<Option<Vec<AllowedVideo>>, ToolError> {
    match params.get("allowlist") {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| ToolError::InvalidParameters(format!("invalid 'allowlist': {e}"))),
    }
}

pub struct SafeVideoSearchTool;

#[async_trait]
impl Tool for SafeVideoSearchTool {
    fn name(&self) -> &str {
        "safe_video_search"
    }

    fn description(&self) -> &str {
        "Find one kid-safe video. Checks titles and sampled comments, then returns a sandboxed embed."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "What kind of video to look for"
                },
                "max": {
                    "type": "integer",
                    "description": "Candidates wanted (default 3); up to twice as many are reviewed"
                },
                "allowlist": {
                    "type": "array",
                    "description": "Operator-approved videos",
                    "items": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "string" },
                            "title": { "type": "string" },
                            "channel": { "type": "string" },
                            "tags": { "type": "array", "items": { "type": "string" } }
                        },
                        "required": ["id"]
                    }
                },
                "allowlist_path": {
                    "type": "string",
                    "description": "JSON file with operator-approved videos"
                },
                "require_allowlist": {
                    "type": "boolean",
                    "description": "Only return operator-approved videos (default false)"
                },
                "autoplay": {
                    "type": "boolean",
                    "description": "Start playback automatically (default false)"
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
        let max = optional_count(&params, "max", 3, 10);
        let require_allowlist = optional_bool(&params, "require_allowlist", false);
        let autoplay = optional_bool(&params, "autoplay", false);
        let inline_allowlist = allowlist_from_params(&params)?;

        if let Some(rejection) = gate_query(ctx, query).await {
            return Ok(finish(rejection, started));
        }
        if !is_domain_allowed(VIDEO_HOST, Some(&ctx.policy)) {
            tracing::info!(host = VIDEO_HOST, "Video host outside the allowlist");
            return Ok(finish(
                ToolOutcome::reject(
                    format!("Domain not allowed: {VIDEO_HOST}"),
                    SafetyAction::AskAlternative,
                ),
                started,
            ));
        }

        let allowlist: Vec<AllowedVideo> = match inline_allowlist {
            Some(list) if !list.is_empty() => list,
            _ => match params.get("allowlist_path").and_then(|v| v.as_str()) {
                Some(path) => load_video_allowlist(std::path::Path::new(path)),
                None => ctx.video_allowlist.as_ref().clone(),
            },
        };

        let mut candidates: Vec<Candidate> = allowlist
            .iter()
            .filter(|v| v.matches(query))
            .map(|v| {
                Candidate::new(
                    v.id.clone(),
                    v.title.clone().unwrap_or_else(|| "Safe Video".to_string()),
                    VIDEO_HOST,
                )
                .with_metadata(serde_json::json!({
                    "channel": v.channel.clone().unwrap_or_default(),
                    "allowlisted": true,
                }))
            })
            .collect();

        if require_allowlist && candidates.is_empty() {
            return Ok(finish(
                ToolOutcome::reject("No allowlisted videos matched.", SafetyAction::AskAlternative),
                started,
            ));
        }

        if !require_allowlist {
            match ctx.providers.video.search_videos(query, max).await {
                Ok(hits) => candidates.extend(
                    hits.into_iter()
                        .filter(|v| !is_obviously_unsuitable(&v.title, &v.channel))
                        .map(|v| {
                            Candidate::new(v.id, v.title, VIDEO_HOST).with_metadata(serde_json::json!({
                                "channel": v.channel,
                                "description": v.description,
                            }))
                        }),
                ),
                Err(e) if candidates.is_empty() => {
                    return Ok(finish(provider_rejection(&e), started));
                }
                Err(e) => tracing::warn!(error = %e, "Video search failed, using allowlist only"),
            }
        }

        candidates.retain(|c| is_valid_video_id(&c.id));
        if candidates.is_empty() {
            return Ok(finish(
                ToolOutcome::reject("No safe videos found.", SafetyAction::AskAlternative),
                started,
            ));
        }

        let selector = CandidateSelector::new(max).with_operator_allowlist(
            allowlist.iter().map(|v| v.id.clone()),
            require_allowlist,
        );
        let reviewer = CommentsAwareReviewer { ctx };
        let chosen = match selector.select(candidates, &reviewer).await {
            Selection::Selected { candidate, .. } => candidate,
            rejected => {
                let outcome = rejected.rejection().unwrap_or_else(|| {
                    ToolOutcome::reject("No safe videos found.", SafetyAction::AskAlternative)
                });
                return Ok(finish(outcome, started));
            }
        };

        let channel = chosen.metadata["channel"].as_str().unwrap_or_default().to_string();
        let html = embed_html(&chosen.id, &chosen.title, autoplay);
        Ok(finish(
            ToolOutcome::safe(serde_json::json!({
                "video": {
                    "id": chosen.id,
                    "title": chosen.title,
                    "channel": channel,
                    "url": format!("https://{VIDEO_HOST}/watch?v={}", chosen.id),
                },
                "embed_html": html,
            })),
            started,
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::providers::VideoHit;
    use crate::testing::{StubClassifier, StubVideo, TestContextBuilder};

    fn video(id: &str, title: &str) -> VideoHit {
        VideoHit {
            id: id.to_string(),
            title: title.to_string(),
            channel: "Kids Science".to_string(),
            description: String::new(),
        }
    }

    #[tokio::test]
    async fn test_picks_first_safe_video() {
        let ctx = TestContextBuilder::new(&["youtube.com"])
            .video(StubVideo::new(vec![
                video("live1", "Rain LIVE now"),
                video("abc123", "Why does it rain?"),
                video("def456", "Clouds for kids"),
            ]))
            .build();

        let out = SafeVideoSearchTool
            .execute(serde_json::json!({"query": "rain"}), &ctx)
            .await
            .unwrap();
        assert!(out.is_safe());
        assert_eq!(out.result["video"]["id"], "abc123");
        assert!(out.result["embed_html"].as_str().unwrap().contains("embed/abc123"));
    }

    #[tokio::test]
    async fn test_refuses_when_video_host_not_allowlisted() {
        let ctx = TestContextBuilder::new(&["kids.example.org"])
            .video(StubVideo::new(vec![video("abc123XYZ_-", "Rain song")]))
            .build();

        let out = SafeVideoSearchTool
            .execute(serde_json::json!({"query": "rain"}), &ctx)
            .await
            .unwrap();
        assert!(!out.is_safe());
        assert_eq!(out.result["reason"], "Domain not allowed: www.youtube.com");
        assert_eq!(out.result["action"], "ASK_ALTERNATIVE");
        assert!(out.result.get("embed_html").is_none());
    }

    #[tokio::test]
    async fn test_mean_comments_skip_candidate() {
        let classifier = Arc::new(StubClassifier::blocking_containing("mean"));
        let ctx = TestContextBuilder::new(&["youtube.com"])
            .video(
                StubVideo::new(vec![video("abc123", "Rain song"), video("def456", "Rain dance")])
                    .with_comments("abc123", &["you are mean"]),
            )
            .classifier(classifier.clone())
            .build();

        let out = SafeVideoSearchTool
            .execute(serde_json::json!({"query": "rain"}), &ctx)
            .await
            .unwrap();
        assert_eq!(out.result["video"]["id"], "def456");
    }

    #[tokio::test]
    async fn test_required_allowlist_without_match() {
        let ctx = TestContextBuilder::new(&["youtube.com"]).build();
        let out = SafeVideoSearchTool
            .execute(
                serde_json::json!({
                    "query": "dinosaurs",
                    "allowlist": [{"id": "abc123", "title": "Rain song", "tags": ["rain"]}],
                    "require_allowlist": true
                }),
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(out.result["reason"], "No allowlisted videos matched.");
    }

    #[tokio::test]
    async fn test_required_allowlist_match_skips_provider() {
        let ctx = TestContextBuilder::new(&["youtube.com"])
            .video(StubVideo::new(vec![video("zzz999", "Rain")]))
            .build();
        let out = SafeVideoSearchTool
            .execute(
                serde_json::json!({
                    "query": "why does it rain",
                    "allowlist": [{"id": "abc123", "title": "Water cycle", "tags": ["rain"]}],
                    "require_allowlist": true
                }),
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(out.result["video"]["id"], "abc123");
        assert_eq!(out.result["video"]["title"], "Water cycle");
    }

    #[test]
    fn test_unsuitable_titles() {
        assert!(is_obviously_unsuitable("Minecraft LIVE", ""));
        assert!(is_obviously_unsuitable("Best pranks", ""));
        assert!(is_obviously_unsuitable("Cute cats", "Horror Channel"));
        assert!(!is_obviously_unsuitable("Olive trees", "Garden"));
    }
}
