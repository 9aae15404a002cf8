//! Kid-safe image search rendered as a gallery page.

use std::time::Instant;

use async_trait::async_trait;
use base64::Engine as _;

use crate::policy::{host_of, is_url_allowed};
use crate::safety::ArtifactKind;
use crate::selector::{Candidate, CandidateReviewer, MetadataReviewer};
use crate::tools::builtin::{complete_text, finish, gate_query, provider_rejection};
use crate::tools::outcome::{SafetyAction, ToolOutcome};
use crate::tools::tool::{Tool, ToolContext, ToolError, ToolOutput, optional_count, require_str};
use crate::views::{GalleryImage, gallery_html};

const CAPTION_PROMPT: &str =
    "You are a kid-safe image curator. Write 1 to 2 simple sentences describing the gallery.";
const MAX_IMAGES: usize = 12;
const CAPTION_TITLES: usize = 8;
const UNFRIENDLY_TITLE_WORDS: &[&str] = &[
    "blood", "kill", "scare", "horror", "weapon", "gun", "adult", "violence", "injury", "gore",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    DataUri,
    Url,
}

impl Mode {
    fn from_params(params: &serde_json::Value) -> Result<Self, ToolError> {
        match params.get("mode").and_then(|v| v.as_str()) {
            None | Some("data_uri") | Some("dataURI") => Ok(Self::DataUri),
            Some("url") => Ok(Self::Url),
            Some(other) => Err(ToolError::InvalidParameters(format!(
                "'mode' must be data_uri or url, got '{other}'"
            ))),
        }
    }
}

fn is_friendly_title(title: &str) -> bool {
    let lower = title.to_lowercase();
    !UNFRIENDLY_TITLE_WORDS.iter().any(|w| lower.contains(w))
}

struct Picked {
    src: String,
    title: String,
    host: String,
}

pub struct SafeImageGalleryTool;

#[async_trait]
impl Tool for SafeImageGalleryTool {
    fn name(&self) -> &str {
        "safe_image_gallery"
    }

    fn description(&self) -> &str {
        "Kid-safe image search. Returns a captioned gallery of images from allowlisted sites."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "What to show pictures of"
                },
                "max": {
                    "type": "integer",
                    "description": "Maximum images (default 12, max 12)"
                },
                "mode": {
                    "type": "string",
                    "enum": ["data_uri", "url"],
                    "description": "Inline images as data URIs (default) or link them"
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
        let max = optional_count(&params, "max", MAX_IMAGES, MAX_IMAGES);
        let mode = Mode::from_params(&params)?;

        if let Some(rejection) = gate_query(ctx, query).await {
            return Ok(finish(rejection, started));
        }

        let hits = match ctx.providers.search.search_images(query, max).await {
            Ok(hits) => hits,
            Err(e) => return Ok(finish(provider_rejection(&e), started)),
        };

        let reviewer = MetadataReviewer::new(&ctx.reviewer, &ctx.policy);
        let mut approved = Vec::new();
        for hit in hits {
            if approved.len() >= max {
                break;
            }
            if !is_url_allowed(&hit.url, Some(&ctx.policy)) || !is_friendly_title(&hit.title) {
                continue;
            }
            let host = host_of(&hit.url).unwrap_or_default();
            let candidate = Candidate::new(hit.url.clone(), hit.title.clone(), host.clone());
            if reviewer.review(&candidate).await.is_allowed() {
                approved.push((hit, host));
            }
        }
        if approved.is_empty() {
            return Ok(finish(
                ToolOutcome::reject("No safe images found.", SafetyAction::AskAlternative),
                started,
            ));
        }

        let mut picked = Vec::new();
        for (hit, host) in approved {
            let src = match mode {
                Mode::Url => hit.url.clone(),
                Mode::DataUri => match ctx.providers.fetcher.fetch(&hit.url).await {
                    Ok(page) => {
                        let mime = page
                            .content_type
                            .clone()
                            .or_else(|| hit.mime.clone())
                            .unwrap_or_else(|| "image/jpeg".to_string());
                        if !mime.starts_with("image/") {
                            tracing::debug!(url = %hit.url, mime = %mime, "Skipping non-image response");
                            continue;
                        }
                        let encoded = base64::engine::general_purpose::STANDARD.encode(&page.body);
                        format!("data:{mime};base64,{encoded}")
                    }
                    Err(e) => {
                        tracing::debug!(url = %hit.url, error = %e, "Skipping unfetchable image");
                        continue;
                    }
                },
            };
            picked.push(Picked {
                src,
                title: hit.title,
                host,
            });
        }
        if picked.is_empty() {
            return Ok(finish(
                ToolOutcome::reject("No safe images found.", SafetyAction::AskAlternative),
                started,
            ));
        }

        let caption = caption_for(ctx, query, &picked).await;
        let images: Vec<GalleryImage> = picked
            .iter()
            .map(|p| GalleryImage {
                src: p.src.clone(),
                title: p.title.clone(),
            })
            .collect();
        let summary: Vec<serde_json::Value> = picked
            .iter()
            .enumerate()
            .map(|(i, p)| serde_json::json!({"index": i + 1, "domain": p.host, "title": p.title}))
            .collect();

        Ok(finish(
            ToolOutcome::safe(serde_json::json!({
                "images": summary,
                "gallery_html": gallery_html(&images, &caption),
            })),
            started,
        ))
    }
}

/// Caption for the gallery. Empty when the model fails or the caption is
/// blocked.
async fn caption_for(ctx: &ToolContext, query: &str, picked: &[Picked]) -> String {
    let titles: Vec<&str> = picked
        .iter()
        .take(CAPTION_TITLES)
        .map(|p| p.title.as_str())
        .collect();
    let user = format!("Query: {query}\nTitles: {}", titles.join("; "));
    let system = ctx.prompt_overrides.gallery_caption().unwrap_or(CAPTION_PROMPT);

    let caption = match complete_text(ctx, system, &user, 0.2).await {
        Ok(caption) => caption,
        Err(e) => {
            tracing::debug!(error = %e, "Gallery caption failed");
            return String::new();
        }
    };
    let decision = ctx
        .reviewer
        .review(&caption, ArtifactKind::GeneratedAnswer, Some(&ctx.policy))
        .await;
    if decision.is_allowed() { caption } else { String::new() }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::providers::ImageHit;
    use crate::testing::{StubFetcher, StubLlm, StubSearch, TestContextBuilder};

    fn image(url: &str, title: &str) -> ImageHit {
        ImageHit {
            url: url.to_string(),
            title: title.to_string(),
            mime: Some("image/png".to_string()),
        }
    }

    fn hits() -> Vec<ImageHit> {
        vec![
            image("https://img.example.org/cat.png", "Sleepy cat"),
            image("https://img.example.org/scary.png", "Horror mask"),
            image("https://other.example.com/dog.png", "Happy dog"),
        ]
    }

    #[tokio::test]
    async fn test_url_mode_keeps_friendly_allowlisted_images() {
        let ctx = TestContextBuilder::new(&["example.org"])
            .search(StubSearch::new(Vec::new()).with_images(hits()))
            .llm(Arc::new(StubLlm::new("Cute animals.")))
            .build();

        let out = SafeImageGalleryTool
            .execute(serde_json::json!({"query": "cats", "mode": "url"}), &ctx)
            .await
            .unwrap();
        assert!(out.is_safe());
        let images = out.result["images"].as_array().unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0]["title"], "Sleepy cat");
        assert_eq!(images[0]["domain"], "img.example.org");
        let html = out.result["gallery_html"].as_str().unwrap();
        assert!(html.contains("https://img.example.org/cat.png"));
        assert!(html.contains("Cute animals."));
    }

    #[tokio::test]
    async fn test_data_uri_mode_inlines_bytes() {
        let ctx = TestContextBuilder::new(&["example.org"])
            .search(StubSearch::new(Vec::new()).with_images(hits()))
            .fetcher(StubFetcher::new().with_bytes(
                "https://img.example.org/cat.png",
                "image/png",
                vec![1, 2, 3],
            ))
            .build();

        let out = SafeImageGalleryTool
            .execute(serde_json::json!({"query": "cats"}), &ctx)
            .await
            .unwrap();
        let html = out.result["gallery_html"].as_str().unwrap();
        assert!(html.contains("data:image/png;base64,AQID"));
    }

    #[tokio::test]
    async fn test_caption_failure_leaves_caption_empty() {
        let ctx = TestContextBuilder::new(&["example.org"])
            .search(StubSearch::new(Vec::new()).with_images(hits()))
            .llm(Arc::new(StubLlm::failing("stub")))
            .build();
        let out = SafeImageGalleryTool
            .execute(serde_json::json!({"query": "cats", "mode": "url"}), &ctx)
            .await
            .unwrap();
        assert!(out.is_safe());
    }

    #[tokio::test]
    async fn test_invalid_mode() {
        let ctx = TestContextBuilder::new(&["example.org"]).build();
        let err = SafeImageGalleryTool
            .execute(serde_json::json!({"query": "cats", "mode": "video"}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameters(_)));
    }
}
