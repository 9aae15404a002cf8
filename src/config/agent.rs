use crate::config::helpers::parse_optional_env;
use crate::error::ConfigError;

/// Bounds for the agent loop.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Hard upper bound on model turns per conversation.
    pub max_steps: usize,
    /// Byte budget for each serialized tool result fed back to the model.
    pub tool_result_budget: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: 16,
            tool_result_budget: crate::agent::DEFAULT_TOOL_RESULT_BUDGET,
        }
    }
}

impl AgentConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let max_steps = parse_optional_env("AGENT_MAX_STEPS", defaults.max_steps)?;
        if max_steps == 0 {
            return Err(ConfigError::InvalidValue {
                key: "AGENT_MAX_STEPS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            max_steps,
            tool_result_budget: parse_optional_env(
                "AGENT_TOOL_RESULT_BUDGET",
                defaults.tool_result_budget,
            )?,
        })
    }
}
