use std::path::PathBuf;

use crate::config::helpers::optional_env;
use crate::error::ConfigError;

/// Where the operator policy files live. CLI flags take precedence.
#[derive(Debug, Clone, Default)]
pub struct PolicyConfig {
    pub domains_path: Option<PathBuf>,
    pub banned_path: Option<PathBuf>,
    /// Operator video allowlist (`[{id, title, channel, tags}]`).
    pub video_allowlist_path: Option<PathBuf>,
}

impl PolicyConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        Ok(Self {
            domains_path: optional_env("KIDGUARD_DOMAINS_FILE")?.map(PathBuf::from),
            banned_path: optional_env("KIDGUARD_BANNED_FILE")?.map(PathBuf::from),
            video_allowlist_path: optional_env("KIDGUARD_VIDEO_ALLOWLIST_FILE")?
                .map(PathBuf::from),
        })
    }
}
