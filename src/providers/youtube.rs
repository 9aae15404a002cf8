use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::{VideoHit, VideoProvider, build_client, get_json};
use crate::config::SearchConfig;
use crate::error::ProviderError;

const PROVIDER: &str = "youtube";
const MAX_PAGE_SIZE: usize = 50;

/// YouTube Data API v3 client.
pub struct YouTubeProvider {
    client: reqwest::Client,
    base: String,
    api_key: Option<SecretString>,
}

impl YouTubeProvider {
    pub fn new(config: &SearchConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(config, PROVIDER)?,
            base: format!("{}/youtube/v3", config.api_base_url.trim_end_matches('/')),
            api_key: config.youtube_api_key.clone(),
        })
    }

    fn key(&self) -> Result<String, ProviderError> {
        self.api_key
            .as_ref()
            .map(|k| k.expose_secret().to_string())
            .ok_or_else(|| ProviderError::NotConfigured {
                provider: PROVIDER.to_string(),
                hint: "set YOUTUBE_API_KEY (or GOOGLE_API_KEY)".to_string(),
            })
    }
}

#[async_trait]
impl VideoProvider for YouTubeProvider {
    async fn search_videos(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<VideoHit>, ProviderError> {
        let params = [
            ("key", self.key()?),
            ("part", "snippet".to_string()),
            ("type", "video".to_string()),
            ("safeSearch", "strict".to_string()),
            ("videoEmbeddable", "true".to_string()),
            ("maxResults", limit.clamp(1, MAX_PAGE_SIZE).to_string()),
            ("q", query.to_string()),
        ];

        tracing::debug!(query = %query, limit, "Searching videos");
        let response: SearchResponse =
            get_json(&self.client, PROVIDER, &format!("{}/search", self.base), &params).await?;

        Ok(response
            .items
            .into_iter()
            .filter_map(|item| {
                let id = item.id.video_id?;
                Some(VideoHit {
                    id,
                    title: item.snippet.title,
                    channel: item.snippet.channel_title,
                    description: item.snippet.description,
                })
            })
            .collect())
    }

    async fn sample_comments(
        &self,
        video_id: &str,
        limit: usize,
    ) -> Result<Vec<String>, ProviderError> {
        let params = [
            ("key", self.key()?),
            ("part", "snippet".to_string()),
            ("videoId", video_id.to_string()),
            ("maxResults", limit.clamp(1, 100).to_string()),
            ("order", "relevance".to_string()),
            ("textFormat", "plainText".to_string()),
        ];

        let response: CommentThreadsResponse = match get_json(
            &self.client,
            PROVIDER,
            &format!("{}/commentThreads", self.base),
            &params,
        )
        .await
        {
            Ok(r) => r,
            // Comments disabled on the video.
            Err(ProviderError::Http { status: 403, .. }) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        Ok(response
            .items
            .into_iter()
            .map(|t| t.snippet.top_level_comment.snippet.text_display)
            .filter(|t| !t.trim().is_empty())
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
    snippet: VideoSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchItemId {
    #[serde(default)]
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoSnippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    channel_title: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct CommentThreadsResponse {
    #[serde(default)]
    items: Vec<CommentThread>,
}

#[derive(Debug, Deserialize)]
struct CommentThread {
    snippet: CommentThreadSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentThreadSnippet {
    top_level_comment: TopLevelComment,
}

#[derive(Debug, Deserialize)]
struct TopLevelComment {
    snippet: CommentSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentSnippet {
    #[serde(default)]
    text_display: String,
}
