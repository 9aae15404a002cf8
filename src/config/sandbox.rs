use std::time::Duration;

use crate::config::helpers::{optional_env, parse_bool_env, parse_optional_env};
use crate::error::ConfigError;

/// Render sandbox configuration.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// External viewer program honoring the handoff contract. When unset the
    /// current executable is re-invoked as the native sandbox host.
    pub viewer_bin: Option<String>,
    /// Extra arguments for the external viewer.
    pub viewer_args: Vec<String>,
    /// How long to wait for the readiness marker.
    pub ready_timeout: Duration,
    /// How often the launcher polls for the readiness marker.
    pub ready_poll_interval: Duration,
    /// How often the sandbox checks that its parent is still alive.
    pub liveness_interval: Duration,
    /// Whether the native host opens the system browser on its loopback URL.
    pub open_browser: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            viewer_bin: None,
            viewer_args: Vec::new(),
            ready_timeout: Duration::from_millis(8000),
            ready_poll_interval: Duration::from_millis(100),
            liveness_interval: Duration::from_millis(2000),
            open_browser: true,
        }
    }
}

impl SandboxConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let ready_poll_ms: u64 = parse_optional_env(
            "SANDBOX_READY_POLL_MS",
            defaults.ready_poll_interval.as_millis() as u64,
        )?;
        if ready_poll_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "SANDBOX_READY_POLL_MS".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        Ok(Self {
            viewer_bin: optional_env("SANDBOX_VIEWER_BIN")?,
            viewer_args: optional_env("SANDBOX_VIEWER_ARGS")?
                .map(|s| s.split_whitespace().map(String::from).collect())
                .unwrap_or_default(),
            ready_timeout: Duration::from_millis(parse_optional_env(
                "SANDBOX_READY_TIMEOUT_MS",
                defaults.ready_timeout.as_millis() as u64,
            )?),
            ready_poll_interval: Duration::from_millis(ready_poll_ms),
            liveness_interval: Duration::from_millis(parse_optional_env(
                "SANDBOX_LIVENESS_INTERVAL_MS",
                defaults.liveness_interval.as_millis() as u64,
            )?),
            open_browser: parse_bool_env("SANDBOX_OPEN_BROWSER", defaults.open_browser)?,
        })
    }
}
