//! Query validation agent - checks the latest query with the validator tool

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::llm_agent::LlmAgent;
use crate::chat::{Agent, CancelSignal, ChatMessage, ConversationHistory};
use crate::error::Result;
use crate::llm::LlmClient;
use crate::tools::{ToolRegistry, ValidateQueryTool};

pub const QUERY_VALIDATION_AGENT: &str = "KustoQueryValidationAgent";
pub const QUERY_VALIDATION_DESCRIPTION: &str = "Parses and validates Kusto queries.";
pub const QUERY_VALIDATION_INSTRUCTIONS: &str = include_str!("../prompts/query_validation.md");

/// Reviews queries and answers "approve" when the parser finds nothing
#[derive(Debug)]
pub struct QueryValidationAgent {
    inner: LlmAgent,
}

impl QueryValidationAgent {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self {
            inner: LlmAgent::new(QUERY_VALIDATION_AGENT, client)
                .with_description(QUERY_VALIDATION_DESCRIPTION)
                .with_instructions(QUERY_VALIDATION_INSTRUCTIONS)
                .with_tools(ToolRegistry::new().with_tool(ValidateQueryTool)),
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.inner = self.inner.with_instructions(instructions);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.inner = self.inner.with_max_tokens(max_tokens);
        self
    }

    pub fn with_max_tool_rounds(mut self, rounds: u32) -> Self {
        self.inner = self.inner.with_max_tool_rounds(rounds);
        self
    }

    pub fn inner(&self) -> &LlmAgent {
        &self.inner
    }
}

#[async_trait]
impl Agent for QueryValidationAgent {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    async fn reply(&self, history: &ConversationHistory, cancel: &CancelSignal) -> Result<ChatMessage> {
        self.inner.reply(history, cancel).await
    }

    async fn reply_streaming(
        &self,
        history: &ConversationHistory,
        chunk_tx: mpsc::Sender<String>,
        cancel: &CancelSignal,
    ) -> Result<ChatMessage> {
        self.inner.reply_streaming(history, chunk_tx, cancel).await
    }
}
