//! Startup wiring shared by every command.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::error::ConfigError;
use crate::llm::{LlmProvider, create_llm_provider};
use crate::policy::load_policy;
use crate::prompts::PromptOverrides;
use crate::providers::ProviderClients;
use crate::safety::{ContentSafetyReviewer, LlmSafetyClassifier, SafetyClassifier};
use crate::sandbox::SandboxRenderer;
use crate::tools::{ToolContext, ToolRegistry, load_video_allowlist};

/// Command-line overrides applied on top of the environment.
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    pub domains: Option<PathBuf>,
    pub banned: Option<PathBuf>,
    pub model: Option<String>,
}

/// Everything a command needs, built once.
pub struct Engine {
    pub config: Config,
    pub ctx: ToolContext,
    pub registry: ToolRegistry,
    pub renderer: SandboxRenderer,
}

impl Engine {
    /// Load the policy, then build providers, the reviewer and the registry.
    ///
    /// An empty allowlist is a configuration error here, before any tool or
    /// provider is touched.
    pub fn build(mut config: Config, options: EngineOptions) -> Result<Self, ConfigError> {
        if let Some(model) = options.model {
            config.llm.model = model;
        }

        let domains = options.domains.or_else(|| config.policy.domains_path.clone());
        let banned = options.banned.or_else(|| config.policy.banned_path.clone());
        let policy = load_policy(domains.as_deref(), banned.as_deref());
        if policy.is_fail_closed() {
            return Err(ConfigError::MissingAllowlist);
        }

        let llm = create_llm_provider(&config.llm).map_err(|e| ConfigError::InvalidValue {
            key: "LLM_BASE_URL".to_string(),
            message: e.to_string(),
        })?;
        let providers =
            ProviderClients::from_config(&config.search).map_err(|e| ConfigError::InvalidValue {
                key: "GOOGLE_API_BASE_URL".to_string(),
                message: e.to_string(),
            })?;

        let classifier: Option<Arc<dyn SafetyClassifier>> = if config.llm.has_credentials() {
            Some(Arc::new(LlmSafetyClassifier::new(Arc::clone(&llm))))
        } else {
            tracing::warn!("No LLM credentials, safety review runs the keyword stage only");
            None
        };
        let reviewer = ContentSafetyReviewer::new(&config.safety, classifier);

        let video_allowlist = config
            .policy
            .video_allowlist_path
            .as_deref()
            .map(load_video_allowlist)
            .unwrap_or_default();

        let registry = ToolRegistry::new();
        registry.register_builtin_tools();

        let renderer = SandboxRenderer::detect(config.sandbox.clone());

        tracing::info!(
            domains = policy.allow_domains().len(),
            banned_terms = policy.banned_terms().len(),
            model = %config.llm.model,
            classifier = reviewer.has_classifier(),
            sandbox = renderer.backend().as_str(),
            "Engine ready"
        );

        let ctx = ToolContext {
            policy,
            model: config.llm.model.clone(),
            prompt_overrides: PromptOverrides::default(),
            providers,
            llm,
            reviewer,
            video_allowlist: Arc::new(video_allowlist),
        };

        Ok(Self {
            config,
            ctx,
            registry,
            renderer,
        })
    }

    pub fn llm(&self) -> Arc<dyn LlmProvider> {
        Arc::clone(&self.ctx.llm)
    }

    /// A tool context carrying prompt overrides from a loaded system prompt.
    pub fn context_with_overrides(&self, overrides: PromptOverrides) -> ToolContext {
        ToolContext {
            prompt_overrides: overrides,
            ..self.ctx.clone()
        }
    }

    /// Fail with exit code 2 when no LLM key is configured.
    pub fn require_llm_credentials(&self) -> Result<(), ConfigError> {
        if self.config.llm.has_credentials() {
            Ok(())
        } else {
            Err(ConfigError::MissingRequired {
                key: "LLM_API_KEY".to_string(),
                hint: "Set LLM_API_KEY or OPENAI_API_KEY.".to_string(),
            })
        }
    }

    /// Fail with exit code 2 when web search is not configured.
    pub fn require_search_credentials(&self) -> Result<(), ConfigError> {
        if self.config.search.has_search() {
            Ok(())
        } else {
            Err(ConfigError::MissingRequired {
                key: "GOOGLE_API_KEY".to_string(),
                hint: "Set GOOGLE_API_KEY and GOOGLE_CSE_ID for web search.".to_string(),
            })
        }
    }
}
