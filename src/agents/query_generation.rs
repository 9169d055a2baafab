//! Query generation agent - writes KQL from a natural-language request

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::llm_agent::LlmAgent;
use crate::chat::{Agent, CancelSignal, ChatMessage, ConversationHistory};
use crate::error::Result;
use crate::llm::LlmClient;

pub const QUERY_GENERATION_AGENT: &str = "KustoQueryAgent";
pub const QUERY_GENERATION_DESCRIPTION: &str = "Generates Kusto queries.";
pub const QUERY_GENERATION_INSTRUCTIONS: &str = include_str!("../prompts/query_generation.md");

/// Writes and revises queries. Has no tools.
#[derive(Debug)]
pub struct QueryGenerationAgent {
    inner: LlmAgent,
}

impl QueryGenerationAgent {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self {
            inner: LlmAgent::new(QUERY_GENERATION_AGENT, client)
                .with_description(QUERY_GENERATION_DESCRIPTION)
                .with_instructions(QUERY_GENERATION_INSTRUCTIONS),
        }
    }

    /// Replace the built-in instructions
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.inner = self.inner.with_instructions(instructions);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.inner = self.inner.with_max_tokens(max_tokens);
        self
    }

    pub fn inner(&self) -> &LlmAgent {
        &self.inner
    }
}

#[async_trait]
impl Agent for QueryGenerationAgent {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{CompletionResponse, MockLlmClient};

    #[test]
    fn test_identity() {
        let agent = QueryGenerationAgent::new(Arc::new(MockLlmClient::default()));
        assert_eq!(agent.name(), "KustoQueryAgent");
        assert_eq!(agent.description(), "Generates Kusto queries.");
        assert!(agent.inner().tools().is_empty());
        assert!(agent.inner().instructions().contains("RawSysLogs"));
    }

    #[tokio::test]
    async fn test_override_instructions() {
        let client = Arc::new(MockLlmClient::new(vec![CompletionResponse::text("RawSysLogs")]));
        let agent = QueryGenerationAgent::new(client.clone()).with_instructions("custom");

        let history = ConversationHistory::seeded("all events");
        let message = agent.reply(&history, &CancelSignal::never()).await.unwrap();

        assert!(message.is_from("KustoQueryAgent"));
        assert_eq!(client.requests()[0].system, "custom");
        assert!(client.requests()[0].tools.is_empty());
    }
}
