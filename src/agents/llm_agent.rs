//! Generic chat-completion agent
//!
//! Turns the shared conversation into a backend request, runs any tool calls
//! the model asks for, and replies with the text of every round. Tool traffic
//! itself never reaches the history.

use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use tokio::sync::mpsc;

use crate::chat::{Agent, AuthorRole, CancelSignal, ChatMessage, ConversationHistory};
use crate::error::{KqlPairError, Result};
use crate::llm::{CompletionRequest, CompletionResponse, LlmClient, Message, Role, StreamChunk};
use crate::tools::ToolRegistry;

pub const DEFAULT_MAX_TOKENS: u32 = 4096;
pub const DEFAULT_MAX_TOOL_ROUNDS: u32 = 5;

/// Agent backed by an [`LlmClient`] with an optional tool registry
pub struct LlmAgent {
    name: String,
    description: String,
    instructions: String,
    client: Arc<dyn LlmClient>,
    tools: Arc<ToolRegistry>,
    max_tokens: u32,
    max_tool_rounds: u32,
}

impl LlmAgent {
    pub fn new(name: impl Into<String>, client: Arc<dyn LlmClient>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            instructions: String::new(),
            client,
            tools: Arc::new(ToolRegistry::new()),
            max_tokens: DEFAULT_MAX_TOKENS,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// System prompt sent with every request
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = Arc::new(tools);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_max_tool_rounds(mut self, rounds: u32) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Backend messages for the history, from this agent's point of view.
    ///
    /// Its own replies become assistant turns. Everything else is a user
    /// turn, with other agents' replies prefixed by `[name]`. Empty messages
    /// are dropped and adjacent turns with the same role are merged.
    pub fn build_messages(&self, history: &ConversationHistory) -> Vec<Message> {
        let mut turns: Vec<(Role, String)> = Vec::new();

        for message in history.all() {
            let text = message.text();
            if text.trim().is_empty() {
                continue;
            }

            let (role, text) = match (message.role, message.author_name.as_deref()) {
                (AuthorRole::Agent, Some(author)) if author == self.name => (Role::Assistant, text.to_string()),
                (AuthorRole::Agent, Some(author)) => (Role::User, format!("[{}] {}", author, text)),
                _ => (Role::User, text.to_string()),
            };

            match turns.last_mut() {
                Some((last_role, last_text)) if *last_role == role => {
                    last_text.push_str("\n\n");
                    last_text.push_str(&text);
                }
                _ => turns.push((role, text)),
            }
        }

        turns
            .into_iter()
            .map(|(role, text)| match role {
                Role::User => Message::user(text),
                Role::Assistant => Message::assistant(text),
            })
            .collect()
    }

    fn request(&self, messages: Vec<Message>) -> CompletionRequest {
        CompletionRequest {
            system: self.instructions.clone(),
            messages,
            tools: self.tools.definitions(),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }

    /// One backend call, forwarding text chunks when a sink is given.
    ///
    /// With `separate` set, a paragraph break is forwarded ahead of the first
    /// non-empty text chunk so the forwarded text matches [`join_round`].
    async fn call(
        &self,
        request: CompletionRequest,
        chunk_out: Option<&mpsc::Sender<String>>,
        separate: bool,
    ) -> Result<CompletionResponse> {
        let Some(out) = chunk_out else {
            return self.client.complete(request).await;
        };

        let (tx, mut rx) = mpsc::channel::<StreamChunk>(64);
        let forward = async {
            let mut pending_break = separate;
            while let Some(chunk) = rx.recv().await {
                if let StreamChunk::Text(text) = chunk {
                    if text.is_empty() {
                        continue;
                    }
                    if pending_break {
                        pending_break = false;
                        let _ = out.send(ROUND_SEPARATOR.to_string()).await;
                    }
                    let _ = out.send(text).await;
                }
            }
        };

        let (response, ()) = tokio::join!(self.client.stream(request, tx), forward);
        response
    }

    /// Run the completion and tool loop until the model produces a final answer.
    ///
    /// Text the model writes alongside tool calls is kept, so the reply holds
    /// every round's text in order. Streamed chunks concatenate to the same string.
    async fn respond(
        &self,
        history: &ConversationHistory,
        chunk_out: Option<&mpsc::Sender<String>>,
        cancel: &CancelSignal,
    ) -> Result<String> {
        let mut messages = self.build_messages(history);
        let mut reply = String::new();

        for round in 0..=self.max_tool_rounds {
            let request = self.request(messages.clone());

            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(KqlPairError::Cancelled),
                response = self.call(request, chunk_out, !reply.is_empty()) => response?,
            };
            join_round(&mut reply, &response.content);

            if response.tool_calls.is_empty() {
                return Ok(reply);
            }
            if round == self.max_tool_rounds {
                break;
            }

            debug!(
                "{} requested {} tool call(s) in round {}",
                self.name,
                response.tool_calls.len(),
                round + 1
            );
            let results = self.tools.execute_all(&response.tool_calls).await;
            messages.push(Message::assistant_tool_use(&response.content, &response.tool_calls));
            messages.push(Message::tool_results(&results));
        }

        Err(KqlPairError::Generation(format!(
            "{} exceeded {} tool rounds without a final answer",
            self.name, self.max_tool_rounds
        )))
    }
}

const ROUND_SEPARATOR: &str = "\n\n";

fn join_round(reply: &mut String, text: &str) {
    if text.is_empty() {
        return;
    }
    if !reply.is_empty() {
        reply.push_str(ROUND_SEPARATOR);
    }
    reply.push_str(text);
}

#[async_trait]
impl Agent for LlmAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn reply(&self, history: &ConversationHistory, cancel: &CancelSignal) -> Result<ChatMessage> {
        let content = self.respond(history, None, cancel).await?;
        Ok(ChatMessage::agent(&self.name, content))
    }

    async fn reply_streaming(
        &self,
        history: &ConversationHistory,
        chunk_tx: mpsc::Sender<String>,
        cancel: &CancelSignal,
    ) -> Result<ChatMessage> {
        let content = self.respond(history, Some(&chunk_tx), cancel).await?;
        Ok(ChatMessage::agent(&self.name, content))
    }
}

impl std::fmt::Debug for LlmAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmAgent")
            .field("name", &self.name)
            .field("model", &self.client.model())
            .field("tools", &self.tools)
            .field("max_tokens", &self.max_tokens)
            .field("max_tool_rounds", &self.max_tool_rounds)
            .finish()
    }
}
