use async_trait::async_trait;
use futures::StreamExt;

use super::{FetchedPage, PageFetcher, build_client};
use crate::config::SearchConfig;
use crate::error::ProviderError;

const PROVIDER: &str = "page_fetch";

/// Plain HTTP fetcher with a hard body cap. Redirects are refused so the
/// caller's allowlist check on the URL stays authoritative.
pub struct HttpPageFetcher {
    client: reqwest::Client,
    max_bytes: usize,
}

impl HttpPageFetcher {
    pub fn new(config: &SearchConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(config, PROVIDER)?,
            max_bytes: config.max_fetch_bytes,
        })
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, ProviderError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError::Request {
                provider: PROVIDER.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Http {
                provider: PROVIDER.to_string(),
                status: status.as_u16(),
            });
        }

        if let Some(len) = response.content_length()
            && len as usize > self.max_bytes
        {
            tracing::warn!(url = %url, content_length = len, max = self.max_bytes, "Rejected oversized page");
            return Err(ProviderError::InvalidResponse {
                provider: PROVIDER.to_string(),
                reason: format!("body of {len} bytes exceeds {} bytes", self.max_bytes),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ProviderError::Request {
                provider: PROVIDER.to_string(),
                reason: format!("failed to read body: {e}"),
            })?;
            if body.len() + chunk.len() > self.max_bytes {
                return Err(ProviderError::InvalidResponse {
                    provider: PROVIDER.to_string(),
                    reason: format!("body exceeds {} bytes", self.max_bytes),
                });
            }
            body.extend_from_slice(&chunk);
        }

        Ok(FetchedPage {
            url: url.to_string(),
            content_type,
            body,
        })
    }
}
