//! Tool registry.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::llm::ToolDefinition;
use crate::tools::builtin::{
    AnswerSearchTool, CreativeHelperTool, OpenSafeUrlTool, SafeImageGalleryTool,
    SafeSearchTool, SafeVideoSearchTool,
};
use crate::tools::tool::{Tool, validate_tool_schema};

/// Registry of available tools, in registration order.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<Vec<Arc<dyn Tool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. A tool with an invalid schema, or whose name is
    /// already taken, is skipped with a warning.
    pub async fn register(&self, tool: Arc<dyn Tool>) {
        let mut tools = self.tools.write().await;
        Self::insert(&mut tools, tool);
    }

    /// Register a tool from a synchronous context (startup, tests).
    pub fn register_sync(&self, tool: Arc<dyn Tool>) {
        match self.tools.try_write() {
            Ok(mut tools) => Self::insert(&mut tools, tool),
            Err(_) => tracing::warn!(tool = tool.name(), "Registry busy, tool not registered"),
        }
    }

    fn insert(tools: &mut Vec<Arc<dyn Tool>>, tool: Arc<dyn Tool>) {
        let errors = validate_tool_schema(&tool.parameters_schema(), tool.name());
        if !errors.is_empty() {
            tracing::warn!(tool = tool.name(), errors = ?errors, "Rejected tool with invalid schema");
            return;
        }
        if tools.iter().any(|t| t.name() == tool.name()) {
            tracing::warn!(tool = tool.name(), "Tool already registered, keeping the first");
            return;
        }
        tracing::debug!(tool = tool.name(), "Registered tool");
        tools.push(tool);
    }

    /// Register the built-in safety-gated tools.
    pub fn register_builtin_tools(&self) {
        self.register_sync(Arc::new(SafeSearchTool));
        self.register_sync(Arc::new(AnswerSearchTool));
        self.register_sync(Arc::new(SafeVideoSearchTool));
        self.register_sync(Arc::new(SafeImageGalleryTool));
        self.register_sync(Arc::new(OpenSafeUrlTool));
        self.register_sync(Arc::new(CreativeHelperTool));
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools
            .read()
            .await
            .iter()
            .find(|t| t.name() == name)
            .cloned()
    }

    pub async fn list(&self) -> Vec<String> {
        self.tools
            .read()
            .await
            .iter()
            .map(|t| t.name().to_string())
            .collect()
    }

    /// Restrict the registry to a requested subset.
    ///
    /// Names are kept in request order and deduplicated. Unknown names are
    /// dropped with a warning. `None` or an empty request selects every tool.
    pub async fn resolve(&self, requested: Option<&[String]>) -> ResolvedTools {
        let tools = self.tools.read().await;

        let selected: Vec<Arc<dyn Tool>> = match requested {
            Some(names) if !names.is_empty() => {
                let mut out: Vec<Arc<dyn Tool>> = Vec::new();
                for name in names {
                    let name = name.trim();
                    if out.iter().any(|t| t.name() == name) {
                        continue;
                    }
                    match tools.iter().find(|t| t.name() == name) {
                        Some(tool) => out.push(Arc::clone(tool)),
                        None => tracing::warn!(tool = %name, "Unknown tool requested, ignoring"),
                    }
                }
                out
            }
            _ => tools.clone(),
        };

        ResolvedTools { tools: selected }
    }
}

/// The tool subset available to one conversation.
#[derive(Clone, Default)]
pub struct ResolvedTools {
    tools: Vec<Arc<dyn Tool>>,
}

impl ResolvedTools {
    /// Function-calling definitions advertised to the model.
    pub fn specs(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.schema().into()).collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_resolve_subset_in_request_order() {
        let registry = ToolRegistry::new();
        registry.register_builtin_tools();

        let resolved = registry
            .resolve(Some(names(&["open_safe_url", "safe_search", "open_safe_url"]).as_slice()))
            .await;
        assert_eq!(resolved.names(), names(&["open_safe_url", "safe_search"]));
        assert_eq!(resolved.specs().len(), 2);
    }

    #[tokio::test]
    async fn test_resolve_drops_unknown_names() {
        let registry = ToolRegistry::new();
        registry.register_builtin_tools();

        let resolved = registry
            .resolve(Some(names(&["launch_rockets", "answer_search"]).as_slice()))
            .await;
        assert_eq!(resolved.names(), names(&["answer_search"]));
        assert!(resolved.get("launch_rockets").is_none());
    }

    #[tokio::test]
    async fn test_resolve_all_when_unspecified() {
        let registry = ToolRegistry::new();
        registry.register_builtin_tools();

        assert_eq!(registry.resolve(None).await.len(), 6);
        assert_eq!(registry.resolve(Some(Vec::new().as_slice())).await.len(), 6);
    }

    #[tokio::test]
    async fn test_duplicate_registration_keeps_first() {
        let registry = ToolRegistry::new();
        registry.register_sync(Arc::new(SafeSearchTool));
        registry.register(Arc::new(SafeSearchTool)).await;
        assert_eq!(registry.list().await, names(&["safe_search"]));
    }
}
