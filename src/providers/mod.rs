//! External data providers used by the built-in tools.
//!
//! Each provider sits behind a trait so tools can be exercised against
//! in-memory doubles. The concrete clients talk to Google Programmable Search
//! and the YouTube Data API over `reqwest`.

mod fetch;
mod google;
mod youtube;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use self::fetch::HttpPageFetcher;
pub use self::google::GoogleSearchProvider;
pub use self::youtube::YouTubeProvider;

use crate::config::SearchConfig;
use crate::error::ProviderError;

/// A web search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// An image search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageHit {
    pub url: String,
    pub title: String,
    pub mime: Option<String>,
}

/// A video search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoHit {
    pub id: String,
    pub title: String,
    pub channel: String,
    pub description: String,
}

/// A fetched document.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl FetchedPage {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, ProviderError>;

    /// Image search with the provider's strictest safe-search setting.
    async fn search_images(&self, query: &str, limit: usize)
    -> Result<Vec<ImageHit>, ProviderError>;
}

#[async_trait]
pub trait VideoProvider: Send + Sync {
    async fn search_videos(&self, query: &str, limit: usize)
    -> Result<Vec<VideoHit>, ProviderError>;

    /// Sample top-level comments for a video. An empty list is valid.
    async fn sample_comments(&self, video_id: &str, limit: usize)
    -> Result<Vec<String>, ProviderError>;
}

/// Fetches documents. Callers check the URL against the policy first.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, ProviderError>;
}

/// The provider set handed to tools.
#[derive(Clone)]
pub struct ProviderClients {
    pub search: Arc<dyn SearchProvider>,
    pub video: Arc<dyn VideoProvider>,
    pub fetcher: Arc<dyn PageFetcher>,
}

impl std::fmt::Debug for ProviderClients {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderClients").finish_non_exhaustive()
    }
}

impl ProviderClients {
    /// Build the HTTP-backed clients. Missing credentials surface as
    /// `ProviderError::NotConfigured` on first use, not here.
    pub fn from_config(config: &SearchConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            search: Arc::new(GoogleSearchProvider::new(config)?),
            video: Arc::new(YouTubeProvider::new(config)?),
            fetcher: Arc::new(HttpPageFetcher::new(config)?),
        })
    }
}

pub(crate) fn build_client(
    config: &SearchConfig,
    provider: &str,
) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(config.request_timeout)
        .redirect(reqwest::redirect::Policy::none())
        .user_agent(concat!("kidguard/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ProviderError::Request {
            provider: provider.to_string(),
            reason: format!("Failed to build HTTP client: {e}"),
        })
}

/// Send a GET request and decode a JSON body, mapping failures onto
/// `ProviderError`.
pub(crate) async fn get_json<T: for<'de> Deserialize<'de>>(
    client: &reqwest::Client,
    provider: &str,
    url: &str,
    query: &[(&str, String)],
) -> Result<T, ProviderError> {
    let response = client
        .get(url)
        .query(query)
        .send()
        .await
        .map_err(|e| ProviderError::Request {
            provider: provider.to_string(),
            reason: e.without_url().to_string(),
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(ProviderError::Http {
            provider: provider.to_string(),
            status: status.as_u16(),
        });
    }

    response
        .json::<T>()
        .await
        .map_err(|e| ProviderError::InvalidResponse {
            provider: provider.to_string(),
            reason: e.without_url().to_string(),
        })
}
