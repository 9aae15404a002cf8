use std::time::Duration;

use secrecy::SecretString;

use crate::config::helpers::{optional_env, parse_optional_env};
use crate::error::ConfigError;

const DEFAULT_GOOGLE_API_BASE: &str = "https://www.googleapis.com";

/// Credentials and endpoints for the search and video providers.
#[derive(Clone)]
pub struct SearchConfig {
    /// Google API base, overridable for local mocks.
    pub api_base_url: String,
    pub google_api_key: Option<SecretString>,
    /// Programmable Search Engine id (`cx`).
    pub google_cse_id: Option<String>,
    /// YouTube Data API key. Falls back to the Google API key.
    pub youtube_api_key: Option<SecretString>,
    pub request_timeout: Duration,
    /// Upper bound on bytes read from a fetched page or image.
    pub max_fetch_bytes: usize,
}

impl std::fmt::Debug for SearchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchConfig")
            .field("api_base_url", &self.api_base_url)
            .field(
                "google_api_key",
                &self.google_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("google_cse_id", &self.google_cse_id)
            .field(
                "youtube_api_key",
                &self.youtube_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("request_timeout", &self.request_timeout)
            .field("max_fetch_bytes", &self.max_fetch_bytes)
            .finish()
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_GOOGLE_API_BASE.to_string(),
            google_api_key: None,
            google_cse_id: None,
            youtube_api_key: None,
            request_timeout: Duration::from_secs(20),
            max_fetch_bytes: 2 * 1024 * 1024,
        }
    }
}

impl SearchConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let google_api_key = optional_env("GOOGLE_API_KEY")?;
        let youtube_api_key = optional_env("YOUTUBE_API_KEY")?.or_else(|| google_api_key.clone());

        Ok(Self {
            api_base_url: optional_env("GOOGLE_API_BASE_URL")?.unwrap_or(defaults.api_base_url),
            google_api_key: google_api_key.map(SecretString::from),
            google_cse_id: optional_env("GOOGLE_CSE_ID")?,
            youtube_api_key: youtube_api_key.map(SecretString::from),
            request_timeout: Duration::from_secs(parse_optional_env(
                "SEARCH_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )?),
            max_fetch_bytes: parse_optional_env("SEARCH_MAX_FETCH_BYTES", defaults.max_fetch_bytes)?,
        })
    }

    /// Whether web and image search can be used.
    pub fn has_search(&self) -> bool {
        self.google_api_key.is_some() && self.google_cse_id.is_some()
    }
}
