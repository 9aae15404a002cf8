use std::time::Duration;

use secrecy::SecretString;

use crate::config::helpers::{optional_env, parse_optional_env};
use crate::error::ConfigError;

pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";
const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// OpenAI-compatible chat endpoint configuration.
#[derive(Clone)]
pub struct LlmConfig {
    /// Base URL of the endpoint; `/v1` is appended when missing.
    pub base_url: String,
    pub api_key: Option<SecretString>,
    pub model: String,
    pub temperature: f32,
    pub request_timeout: Duration,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.2,
            request_timeout: Duration::from_secs(120),
        }
    }
}

impl LlmConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let api_key = match optional_env("LLM_API_KEY")? {
            Some(key) => Some(key),
            None => optional_env("OPENAI_API_KEY")?,
        }
        .map(SecretString::from);

        Ok(Self {
            base_url: optional_env("LLM_BASE_URL")?.unwrap_or(defaults.base_url),
            api_key,
            model: optional_env("LLM_MODEL")?.unwrap_or(defaults.model),
            temperature: parse_optional_env("LLM_TEMPERATURE", defaults.temperature)?,
            request_timeout: Duration::from_secs(parse_optional_env(
                "LLM_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )?),
        })
    }

    /// Whether an API key is available for the endpoint.
    pub fn has_credentials(&self) -> bool {
        self.api_key.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_api_key() {
        let cfg = LlmConfig {
            api_key: Some(SecretString::from("sk-very-secret".to_string())),
            ..Default::default()
        };
        let debug = format!("{cfg:?}");
        assert!(!debug.contains("sk-very-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_defaults() {
        let cfg = LlmConfig::default();
        assert_eq!(cfg.model, "gpt-4.1-mini");
        assert!(!cfg.has_credentials());
    }
}
