//! Tool registry - holds an agent's tools and runs the calls the model makes

use std::collections::BTreeMap;

use tracing::debug;

use super::Tool;
use crate::llm::{ToolCall, ToolDefinition, ToolResult};

/// Named set of tools available to one agent
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool, replacing any tool registered under the same name
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Builder form of [`register`](Self::register)
    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.register(Box::new(tool));
        self
    }

    /// Tool definitions for the LLM, in name order
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition()).collect()
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a tool call. Failures become error results for the model
    /// rather than errors for the caller.
    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        debug!(tool = %call.name, id = %call.id, "executing tool call");
        match self.tools.get(&call.name) {
            Some(tool) => match tool.execute(call.input.clone()).await {
                Ok(output) if output.is_error => ToolResult::error(&call.id, output.content),
                Ok(output) => ToolResult::success(&call.id, output.content),
                Err(e) => ToolResult::error(&call.id, format!("Tool error: {}", e)),
            },
            None => ToolResult::error(&call.id, format!("Unknown tool: {}", call.name)),
        }
    }

    /// Execute several calls in order
    pub async fn execute_all(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            results.push(self.execute(call).await);
        }
        results
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tool_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{ToolOutput, ValidateQueryTool};
    use async_trait::async_trait;
    use serde_json::{Value, json};

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &'static str {
            "fail"
        }

        fn description(&self) -> &'static str {
            "Always fails"
        }

        fn input_schema(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }

        async fn execute(&self, _input: Value) -> Result<ToolOutput, eyre::Error> {
            Err(eyre::eyre!("boom"))
        }
    }

    #[test]
    fn test_definitions_sorted_by_name() {
        let registry = ToolRegistry::new().with_tool(ValidateQueryTool).with_tool(FailingTool);
        let names: Vec<String> = registry.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["fail", "parse_and_validate_kusto_query"]);
        assert!(registry.has_tool("fail"));
        assert!(!registry.has_tool("missing"));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_error_result() {
        let registry = ToolRegistry::new();
        let result = registry.execute(&ToolCall::new("t1", "nope", json!({}))).await;
        assert!(result.is_error);
        assert_eq!(result.tool_use_id, "t1");
        assert!(result.content.contains("Unknown tool: nope"));
    }

    #[tokio::test]
    async fn test_tool_failure_is_error_result() {
        let registry = ToolRegistry::new().with_tool(FailingTool);
        let result = registry.execute(&ToolCall::new("t2", "fail", json!({}))).await;
        assert!(result.is_error);
        assert!(result.content.contains("boom"));
    }

    #[tokio::test]
    async fn test_execute_all_keeps_order() {
        let registry = ToolRegistry::new().with_tool(ValidateQueryTool);
        let calls = vec![
            ToolCall::new("a", "parse_and_validate_kusto_query", json!({"kusto_query": "T | take 1"})),
            ToolCall::new("b", "parse_and_validate_kusto_query", json!({"kusto_query": "T | wher x"})),
        ];
        let results = registry.execute_all(&calls).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].tool_use_id, "a");
        assert_eq!(results[0].content, "The query is valid.");
        assert_eq!(results[1].tool_use_id, "b");
        assert!(!results[1].is_error);
        assert!(results[1].content.starts_with("The query is invalid"));
    }
}
