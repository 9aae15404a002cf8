//! Configuration for kidguard.
//!
//! Settings are resolved once at startup from the process environment (after
//! `.env` has been loaded by `dotenvy`). Components receive the resolved
//! structs and never read the environment themselves.

mod agent;
pub(crate) mod helpers;
mod llm;
mod policy;
mod safety;
mod sandbox;
mod search;

pub use self::agent::AgentConfig;
pub use self::llm::LlmConfig;
pub use self::policy::PolicyConfig;
pub use self::safety::SafetyConfig;
pub use self::sandbox::SandboxConfig;
pub use self::search::SearchConfig;

use crate::error::ConfigError;

/// Main configuration for the engine.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub safety: SafetyConfig,
    pub agent: AgentConfig,
    pub sandbox: SandboxConfig,
    pub policy: PolicyConfig,
}

impl Config {
    /// Resolve the full configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            llm: LlmConfig::resolve()?,
            search: SearchConfig::resolve()?,
            safety: SafetyConfig::resolve()?,
            agent: AgentConfig::resolve()?,
            sandbox: SandboxConfig::resolve()?,
            policy: PolicyConfig::resolve()?,
        })
    }
}
