//! Tools the agents may call during a turn
//!
//! A tool takes the JSON input the model produced and returns text that is
//! fed back to the model as a tool result.

mod registry;
mod validate_query;

pub use registry::ToolRegistry;
pub use validate_query::{VALIDATE_QUERY_TOOL, ValidateQueryTool};

use async_trait::async_trait;
use serde_json::Value;

use crate::llm::ToolDefinition;

/// A tool that can be called by the LLM
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (matches LLM tool_use name)
    fn name(&self) -> &'static str;

    /// Human-readable description
    fn description(&self) -> &'static str;

    /// JSON Schema for input parameters
    fn input_schema(&self) -> Value;

    /// Execute the tool
    async fn execute(&self, input: Value) -> Result<ToolOutput, eyre::Error>;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description(), self.input_schema())
    }
}

/// Output of a tool run, before it is tied to a tool_use id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}
