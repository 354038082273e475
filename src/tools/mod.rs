//! Executable tools and the tool registry.
//!
//! Tools are session-stateless and expose one uniform async contract.
//! The registry is a name→tool map populated at process start and
//! never mutated afterwards; team executors look tools up by the names
//! the planner selected.

pub mod contract_template;
pub mod legal_search;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::core::record::ToolStatus;
use crate::error::EngineError;

pub use contract_template::ContractTemplateTool;
pub use legal_search::LegalSearchTool;

/// Uniform output of one tool invocation.
#[derive(Debug, Clone, Serialize)]
pub struct ToolOutput {
    /// Invocation status. Zero records is still `success`.
    pub status: ToolStatus,
    /// Result records as JSON values.
    pub data: Vec<serde_json::Value>,
    /// `data.len()`.
    pub count: usize,
    /// Name of the producing tool.
    pub tool_name: String,
    /// Strategy or source identifier (`direct`, `semantic`, ...).
    pub data_source: String,
}

impl ToolOutput {
    /// Builds a successful output from serialized records.
    #[must_use]
    pub fn success(tool_name: &str, data: Vec<serde_json::Value>, data_source: &str) -> Self {
        Self {
            status: ToolStatus::Success,
            count: data.len(),
            data,
            tool_name: tool_name.to_string(),
            data_source: data_source.to_string(),
        }
    }
}

/// Capability trait for executable tools.
///
/// Tools hold no session state; `params` carries the planner-chosen
/// structured parameters for this invocation.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Registry name.
    fn name(&self) -> &'static str;

    /// One-line description shown to the tool planner.
    fn description(&self) -> &'static str;

    /// Executes the tool against a query.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ToolExecution`] (or a more specific kind)
    /// on failure; the team executor records it without aborting other
    /// tools.
    async fn execute(
        &self,
        query: &str,
        params: &serde_json::Value,
    ) -> Result<ToolOutput, EngineError>;
}

/// Immutable name→tool map.
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Builds the registry from the tools available at process start.
    #[must_use]
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        let tools = tools
            .into_iter()
            .map(|t| (t.name().to_string(), t))
            .collect();
        Self { tools }
    }

    /// Looks up a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Registered tool names in deterministic order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// `(name, description)` pairs for prompt construction.
    #[must_use]
    pub fn descriptions(&self) -> Vec<(&str, &str)> {
        self.tools
            .values()
            .map(|t| (t.name(), t.description()))
            .collect()
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns `true` when no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn description(&self) -> &'static str {
            "echoes the query back"
        }

        async fn execute(
            &self,
            query: &str,
            _params: &serde_json::Value,
        ) -> Result<ToolOutput, EngineError> {
            Ok(ToolOutput::success(
                "echo",
                vec![serde_json::json!({ "query": query })],
                "echo",
            ))
        }
    }

    #[test]
    fn test_registry_lookup() {
        let registry = ToolRegistry::new(vec![Arc::new(EchoTool)]);
        assert!(registry.get("echo").is_some());
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.names(), vec!["echo"]);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_tool_contract() {
        let registry = ToolRegistry::new(vec![Arc::new(EchoTool)]);
        let tool = registry.get("echo").unwrap_or_else(|| unreachable!());
        let output = tool
            .execute("질의", &serde_json::Value::Null)
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(output.count, 1);
        assert_eq!(output.tool_name, "echo");
        assert_eq!(output.status, ToolStatus::Success);
    }
}
