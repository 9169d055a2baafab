//! Anthropic API client implementation
//!
//! This module implements the LlmClient trait for the Anthropic Messages API,
//! both as a single request and as a Server-Sent Events stream.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder};
use reqwest_eventsource::{Event, EventSource, retry};
use serde_json::{Value, json};
use tokio::sync::mpsc;

use crate::error::{KqlPairError, Result};
use crate::llm::client::LlmClient;
use crate::llm::streaming::{StreamChunk, StreamEvent, StreamParser, parse_sse_event};
use crate::llm::types::{CompletionRequest, CompletionResponse, StopReason, ToolCall, Usage};

/// Anthropic Messages endpoint
pub const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";

/// Anthropic API version
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Default model to use
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Default max tokens
const DEFAULT_MAX_TOKENS: u32 = 8192;

/// Configuration for the Anthropic client
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub model: String,
    pub max_tokens: u32,
    pub timeout: Duration,
    pub base_url: String,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: Duration::from_secs(300),
            base_url: ANTHROPIC_API_URL.to_string(),
        }
    }
}

impl AnthropicConfig {
    /// Create a new config with a specific model
    pub fn with_model(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }
}

/// Anthropic API client
pub struct AnthropicClient {
    client: Client,
    api_key: String,
    config: AnthropicConfig,
    usage: Arc<Mutex<Usage>>,
}

impl AnthropicClient {
    /// Create a client. The key is passed in explicitly; nothing is read from the environment.
    pub fn new(api_key: impl Into<String>, config: AnthropicConfig) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(KqlPairError::Config("Anthropic API key is empty".to_string()));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| KqlPairError::Generation(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            config,
            usage: Arc::new(Mutex::new(Usage::default())),
        })
    }

    /// Build the request body for the Anthropic API
    fn build_request(&self, request: &CompletionRequest) -> Result<Value> {
        let model = request.model.as_ref().unwrap_or(&self.config.model).clone();
        let max_tokens = request.max_tokens.unwrap_or(self.config.max_tokens);

        let mut body = json!({
            "model": model,
            "max_tokens": max_tokens,
            "messages": serde_json::to_value(&request.messages)?
        });

        if !request.system.is_empty() {
            body["system"] = json!(request.system);
        }

        if !request.tools.is_empty() {
            let tools: Vec<Value> = request.tools.iter().map(|t| t.to_anthropic_schema()).collect();
            body["tools"] = json!(tools);
        }

        Ok(body)
    }

    fn post(&self, body: &Value) -> RequestBuilder {
        self.client
            .post(&self.config.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(body)
    }

    /// Parse the API response into a CompletionResponse
    fn parse_response(&self, body: Value) -> Result<CompletionResponse> {
        let stop_reason = StopReason::from_api(body["stop_reason"].as_str());

        let usage = if let Some(u) = body.get("usage") {
            Usage::new(
                u["input_tokens"].as_u64().unwrap_or(0),
                u["output_tokens"].as_u64().unwrap_or(0),
            )
        } else {
            Usage::default()
        };
        self.record_usage(&usage);

        let mut content = String::new();
        let mut tool_calls = Vec::new();

        let blocks = body["content"]
            .as_array()
            .ok_or_else(|| KqlPairError::Generation("Response has no content array".to_string()))?;

        for block in blocks {
            match block["type"].as_str() {
                Some("text") => {
                    if let Some(text) = block["text"].as_str() {
                        if !content.is_empty() {
                            content.push('\n');
                        }
                        content.push_str(text);
                    }
                }
                Some("tool_use") => {
                    let id = block["id"].as_str().unwrap_or("").to_string();
                    let name = block["name"].as_str().unwrap_or("").to_string();
                    tool_calls.push(ToolCall::new(id, name, block["input"].clone()));
                }
                _ => {}
            }
        }

        Ok(CompletionResponse {
            content,
            tool_calls,
            stop_reason,
            usage,
        })
    }

    /// Send a request to the Anthropic API
    async fn send_request(&self, body: Value) -> Result<Value> {
        let response = self
            .post(&body)
            .send()
            .await
            .map_err(|e| KqlPairError::Generation(format!("Request failed: {}", e)))?;

        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(KqlPairError::Generation(format!(
                "Rate limited, retry after {} seconds",
                retry_after
            )));
        }

        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(KqlPairError::Generation(format!("API error {}: {}", status, error_body)));
        }

        response
            .json()
            .await
            .map_err(|e| KqlPairError::Generation(format!("Failed to parse response: {}", e)))
    }

    fn record_usage(&self, usage: &Usage) {
        let mut total = self.usage.lock().unwrap_or_else(|e| e.into_inner());
        total.add(usage);
    }

    /// Get cumulative token usage
    pub fn total_usage(&self) -> Usage {
        self.usage.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let body = self.build_request(&request)?;
        log::debug!("Sending completion request with {} messages", request.messages.len());
        let response = self.send_request(body).await?;
        self.parse_response(response)
    }

    async fn stream(
        &self,
        request: CompletionRequest,
        chunk_tx: mpsc::Sender<StreamChunk>,
    ) -> Result<CompletionResponse> {
        let mut body = self.build_request(&request)?;
        body["stream"] = json!(true);

        let mut source = EventSource::new(self.post(&body))
            .map_err(|e| KqlPairError::Generation(format!("Failed to open event stream: {}", e)))?;
        // Retries belong to the caller, not this layer
        source.set_retry_policy(Box::new(retry::Never));

        let mut parser = StreamParser::new();

        while let Some(event) = source.next().await {
            match event {
                Ok(Event::Open) => log::debug!("Event stream opened"),
                Ok(Event::Message(message)) => {
                    let Some(stream_event) = parse_sse_event(&message.data) else {
                        continue;
                    };
                    let is_stop = stream_event == StreamEvent::MessageStop;

                    let chunks = match parser.process_event(stream_event) {
                        Ok(chunks) => chunks,
                        Err(e) => {
                            source.close();
                            return Err(e);
                        }
                    };
                    for chunk in chunks {
                        if let StreamChunk::Error(message) = &chunk {
                            source.close();
                            return Err(KqlPairError::Generation(format!("Stream error: {}", message)));
                        }
                        // Consumer may have gone away; the response is still assembled
                        let _ = chunk_tx.send(chunk).await;
                    }

                    if is_stop {
                        source.close();
                        break;
                    }
                }
                Err(reqwest_eventsource::Error::StreamEnded) => break,
                Err(e) => {
                    source.close();
                    return Err(KqlPairError::Generation(format!("Stream failed: {}", e)));
                }
            }
        }

        let response = parser.finish()?;
        self.record_usage(&response.usage);
        Ok(response)
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

impl std::fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicClient")
            .field("model", &self.config.model)
            .field("max_tokens", &self.config.max_tokens)
            .field("base_url", &self.config.base_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::{Message, ToolDefinition, ToolResult};

    fn client() -> AnthropicClient {
        AnthropicClient::new("test-key", AnthropicConfig::default()).unwrap()
    }

    #[test]
    fn test_config_default() {
        let config = AnthropicConfig::default();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(config.timeout, Duration::from_secs(300));
        assert_eq!(config.base_url, ANTHROPIC_API_URL);
    }

    #[test]
    fn test_config_with_model() {
        let config = AnthropicConfig::with_model("claude-3-haiku-20240307");
        assert_eq!(config.model, "claude-3-haiku-20240307");
        assert_eq!(config.max_tokens, DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn test_empty_api_key_rejected() {
        let result = AnthropicClient::new("  ", AnthropicConfig::default());
        assert!(matches!(result, Err(KqlPairError::Config(_))));
    }

    #[test]
    fn test_build_request_basic() {
        let request = CompletionRequest::new("You are helpful").with_user_message("Hello");
        let body = client().build_request(&request).unwrap();

        assert_eq!(body["model"], DEFAULT_MODEL);
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
        assert_eq!(body["system"], "You are helpful");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "Hello");
        assert!(body.get("tools").is_none());
        assert!(body.get("stream").is_none());
    }

    #[test]
    fn test_build_request_without_system() {
        let request = CompletionRequest::default().with_user_message("Hello");
        let body = client().build_request(&request).unwrap();
        assert!(body.get("system").is_none());
    }

    #[test]
    fn test_build_request_with_tools() {
        let tool = ToolDefinition::new(
            "parse_and_validate_kusto_query",
            "Parses and validates the kusto query.",
            json!({
                "type": "object",
                "properties": { "kusto_query": { "type": "string" } },
                "required": ["kusto_query"]
            }),
        );
        let request = CompletionRequest::new("test")
            .with_user_message("Validate this")
            .with_tools(vec![tool]);

        let body = client().build_request(&request).unwrap();
        assert_eq!(body["tools"][0]["name"], "parse_and_validate_kusto_query");
    }

    #[test]
    fn test_build_request_with_tool_traffic() {
        let call = ToolCall::new("toolu_1", "parse_and_validate_kusto_query", json!({"kusto_query": "T"}));
        let request = CompletionRequest::new("sys")
            .with_user_message("Validate T")
            .with_message(Message::assistant_tool_use("", std::slice::from_ref(&call)))
            .with_message(Message::tool_results(&[ToolResult::success("toolu_1", "The query is valid.")]));

        let body = client().build_request(&request).unwrap();
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1]["content"][0]["type"], "tool_use");
        assert_eq!(messages[2]["content"][0]["type"], "tool_result");
        assert_eq!(messages[2]["content"][0]["tool_use_id"], "toolu_1");
    }

    #[test]
    fn test_build_request_custom_model() {
        let mut request = CompletionRequest::new("test").with_user_message("Hello");
        request.model = Some("claude-opus-4-5-20250514".to_string());

        let body = client().build_request(&request).unwrap();
        assert_eq!(body["model"], "claude-opus-4-5-20250514");
    }

    #[test]
    fn test_parse_response_text_only() {
        let response = client()
            .parse_response(json!({
                "content": [{ "type": "text", "text": "approve" }],
                "stop_reason": "end_turn",
                "usage": { "input_tokens": 10, "output_tokens": 1 }
            }))
            .unwrap();

        assert_eq!(response.content, "approve");
        assert!(response.tool_calls.is_empty());
        assert_eq!(response.stop_reason, StopReason::EndTurn);
        assert_eq!(response.usage, Usage::new(10, 1));
    }

    #[test]
    fn test_parse_response_with_tool_use() {
        let response = client()
            .parse_response(json!({
                "content": [
                    { "type": "text", "text": "Let me check the query" },
                    {
                        "type": "tool_use",
                        "id": "toolu_123",
                        "name": "parse_and_validate_kusto_query",
                        "input": { "kusto_query": "RawSysLogs | take 10" }
                    }
                ],
                "stop_reason": "tool_use",
                "usage": { "input_tokens": 50, "output_tokens": 30 }
            }))
            .unwrap();

        assert_eq!(response.content, "Let me check the query");
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].id, "toolu_123");
        assert_eq!(response.tool_calls[0].input["kusto_query"], "RawSysLogs | take 10");
        assert_eq!(response.stop_reason, StopReason::ToolUse);
    }

    #[test]
    fn test_parse_response_joins_text_blocks() {
        let response = client()
            .parse_response(json!({
                "content": [
                    { "type": "text", "text": "line one" },
                    { "type": "text", "text": "line two" }
                ],
                "stop_reason": "end_turn"
            }))
            .unwrap();
        assert_eq!(response.content, "line one\nline two");
    }

    #[test]
    fn test_parse_response_without_content_is_error() {
        let result = client().parse_response(json!({ "stop_reason": "end_turn" }));
        assert!(matches!(result, Err(KqlPairError::Generation(_))));
    }

    #[test]
    fn test_total_usage_accumulation() {
        let client = client();
        let _ = client.parse_response(json!({
            "content": [],
            "stop_reason": "end_turn",
            "usage": { "input_tokens": 100, "output_tokens": 50 }
        }));
        let _ = client.parse_response(json!({
            "content": [],
            "stop_reason": "end_turn",
            "usage": { "input_tokens": 200, "output_tokens": 100 }
        }));

        let total = client.total_usage();
        assert_eq!(total.input_tokens, 300);
        assert_eq!(total.output_tokens, 150);
    }

    #[test]
    fn test_debug_hides_api_key() {
        let debug_str = format!("{:?}", client());
        assert!(debug_str.contains("AnthropicClient"));
        assert!(debug_str.contains(DEFAULT_MODEL));
        assert!(!debug_str.contains("test-key"));
    }

    #[test]
    fn test_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AnthropicClient>();
    }

    #[test]
    fn test_model() {
        assert_eq!(client().model(), DEFAULT_MODEL);
    }
}
