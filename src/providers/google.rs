use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::{ImageHit, SearchHit, SearchProvider, build_client, get_json};
use crate::config::SearchConfig;
use crate::error::ProviderError;

const PROVIDER: &str = "google_cse";
/// The Custom Search API caps `num` at 10.
const MAX_PAGE_SIZE: usize = 10;

/// Google Programmable Search (Custom Search JSON API) client.
pub struct GoogleSearchProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<SecretString>,
    cse_id: Option<String>,
}

impl GoogleSearchProvider {
    pub fn new(config: &SearchConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(config, PROVIDER)?,
            endpoint: format!(
                "{}/customsearch/v1",
                config.api_base_url.trim_end_matches('/')
            ),
            api_key: config.google_api_key.clone(),
            cse_id: config.google_cse_id.clone(),
        })
    }

    fn credentials(&self) -> Result<(String, String), ProviderError> {
        match (&self.api_key, &self.cse_id) {
            (Some(key), Some(cx)) => Ok((key.expose_secret().to_string(), cx.clone())),
            _ => Err(ProviderError::NotConfigured {
                provider: PROVIDER.to_string(),
                hint: "set GOOGLE_API_KEY and GOOGLE_CSE_ID".to_string(),
            }),
        }
    }

    async fn query(
        &self,
        query: &str,
        limit: usize,
        image: bool,
    ) -> Result<Vec<CseItem>, ProviderError> {
        let (key, cx) = self.credentials()?;
        let mut params = vec![
            ("key", key),
            ("cx", cx),
            ("q", query.to_string()),
            ("num", limit.clamp(1, MAX_PAGE_SIZE).to_string()),
            ("safe", "active".to_string()),
        ];
        if image {
            params.push(("searchType", "image".to_string()));
        }

        tracing::debug!(query = %query, image, "Querying custom search");
        let response: CseResponse = get_json(&self.client, PROVIDER, &self.endpoint, &params).await?;
        Ok(response.items)
    }
}

#[async_trait]
impl SearchProvider for GoogleSearchProvider {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, ProviderError> {
        let items = self.query(query, limit, false).await?;
        Ok(items
            .into_iter()
            .filter(|it| !it.link.is_empty())
            .map(|it| SearchHit {
                title: it.title,
                url: it.link,
                snippet: it.snippet,
            })
            .collect())
    }

    async fn search_images(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<ImageHit>, ProviderError> {
        let items = self.query(query, limit, true).await?;
        Ok(items
            .into_iter()
            .filter(|it| !it.link.is_empty())
            .map(|it| ImageHit {
                url: it.link,
                title: if it.title.is_empty() {
                    "Image".to_string()
                } else {
                    it.title
                },
                mime: it.mime,
            })
            .collect())
    }
}

#[derive(Debug, Deserialize, Default)]
struct CseResponse {
    #[serde(default)]
    items: Vec<CseItem>,
}

#[derive(Debug, Deserialize)]
struct CseItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    mime: Option<String>,
}
