//! Core LLM client trait and a scripted client for tests

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{KqlPairError, Result};
use crate::llm::streaming::StreamChunk;
use crate::llm::types::{CompletionRequest, CompletionResponse};

/// Stateless LLM client - each call carries the whole conversation
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Single completion request (blocking until complete)
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Streaming completion. Chunks are sent as they arrive and the assembled
    /// response is returned at the end. A dropped receiver is not an error.
    async fn stream(
        &self,
        request: CompletionRequest,
        chunk_tx: mpsc::Sender<StreamChunk>,
    ) -> Result<CompletionResponse> {
        let response = self.complete(request).await?;
        if !response.content.is_empty() {
            let _ = chunk_tx.send(StreamChunk::Text(response.content.clone())).await;
        }
        let _ = chunk_tx.send(StreamChunk::Done).await;
        Ok(response)
    }

    /// Model identifier used by default
    fn model(&self) -> &str;
}

/// LLM client that replays a fixed queue of responses and records every request
#[derive(Debug, Default)]
pub struct MockLlmClient {
    responses: Mutex<VecDeque<std::result::Result<CompletionResponse, String>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockLlmClient {
    pub fn new(responses: Vec<CompletionResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Ok).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a backend failure after the already scripted responses
    pub fn then_fail(self, message: impl Into<String>) -> Self {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Err(message.into()));
        self
    }

    /// Requests received so far, oldest first
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);

        let next = self
            .responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();

        match next {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(KqlPairError::Generation(message)),
            None => Err(KqlPairError::Generation("mock client has no scripted responses left".into())),
        }
    }

    fn model(&self) -> &str {
        "mock-model"
    }
}
