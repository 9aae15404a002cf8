use std::time::Duration;

use crate::config::helpers::{optional_env, parse_bool_env, parse_optional_env};
use crate::error::ConfigError;
use crate::safety::ClassifierFailurePolicy;

/// Content-safety reviewer configuration.
#[derive(Debug, Clone)]
pub struct SafetyConfig {
    /// Run the LLM classifier stage after the keyword screen.
    pub classifier_enabled: bool,
    pub classifier_timeout: Duration,
    /// What to do with user-facing artifacts when the classifier fails.
    pub failure_policy: ClassifierFailurePolicy,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            classifier_enabled: true,
            classifier_timeout: Duration::from_secs(15),
            failure_policy: ClassifierFailurePolicy::FailClosed,
        }
    }
}

impl SafetyConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let failure_policy = match optional_env("SAFETY_CLASSIFIER_FAILURE")? {
            Some(raw) => raw.parse().map_err(|e| ConfigError::InvalidValue {
                key: "SAFETY_CLASSIFIER_FAILURE".to_string(),
                message: e,
            })?,
            None => defaults.failure_policy,
        };

        Ok(Self {
            classifier_enabled: parse_bool_env(
                "SAFETY_CLASSIFIER_ENABLED",
                defaults.classifier_enabled,
            )?,
            classifier_timeout: Duration::from_secs(parse_optional_env(
                "SAFETY_CLASSIFIER_TIMEOUT_SECS",
                defaults.classifier_timeout.as_secs(),
            )?),
            failure_policy,
        })
    }
}
