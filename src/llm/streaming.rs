//! Streaming support for LLM responses.
//!
//! Maps Anthropic Server-Sent Events onto [`StreamEvent`]s, and folds those
//! events into consumer-facing [`StreamChunk`]s plus the final
//! [`CompletionResponse`].

use serde_json::Value;

use crate::error::{KqlPairError, Result};
use crate::llm::types::{CompletionResponse, StopReason, ToolCall, Usage};

/// Events received during streaming from the Anthropic API.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Start of message
    MessageStart {
        message_id: Option<String>,
        input_tokens: u64,
    },
    /// Start of a content block (text or tool_use)
    ContentBlockStart {
        index: u32,
        content_type: String,
        tool_id: Option<String>,
        tool_name: Option<String>,
    },
    /// Delta within a content block
    ContentBlockDelta {
        index: u32,
        text: Option<String>,
        partial_json: Option<String>,
    },
    /// End of a content block
    ContentBlockStop { index: u32 },
    /// Message delta (stop reason, usage)
    MessageDelta {
        stop_reason: Option<String>,
        output_tokens: Option<u64>,
    },
    /// Message complete
    MessageStop,
    /// Keep-alive
    Ping,
    /// Error event
    Error { message: String, code: Option<String> },
}

/// Chunk types emitted to consumers during streaming.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    /// Text content delta
    Text(String),
    /// Tool call started
    ToolCall { id: String, name: String },
    /// Tool input JSON delta
    ToolInput { id: String, input_delta: String },
    /// Stream completed successfully
    Done,
    /// Stream error
    Error(String),
}

/// Parse the `data:` payload of one SSE event.
///
/// ```text
/// event: content_block_delta
/// data: {"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Hi"}}
/// ```
pub fn parse_sse_event(data: &str) -> Option<StreamEvent> {
    if data.is_empty() || data == "[DONE]" {
        return None;
    }

    let value: Value = serde_json::from_str(data).ok()?;
    let index = value["index"].as_u64().unwrap_or(0) as u32;

    let event = match value["type"].as_str()? {
        "message_start" => StreamEvent::MessageStart {
            message_id: value["message"]["id"].as_str().map(String::from),
            input_tokens: value["message"]["usage"]["input_tokens"].as_u64().unwrap_or(0),
        },
        "content_block_start" => {
            let block = &value["content_block"];
            StreamEvent::ContentBlockStart {
                index,
                content_type: block["type"].as_str().unwrap_or("text").to_string(),
                tool_id: block["id"].as_str().map(String::from),
                tool_name: block["name"].as_str().map(String::from),
            }
        }
        "content_block_delta" => {
            let delta = &value["delta"];
            StreamEvent::ContentBlockDelta {
                index,
                text: delta["text"].as_str().map(String::from),
                partial_json: delta["partial_json"].as_str().map(String::from),
            }
        }
        "content_block_stop" => StreamEvent::ContentBlockStop { index },
        "message_delta" => StreamEvent::MessageDelta {
            stop_reason: value["delta"]["stop_reason"].as_str().map(String::from),
            output_tokens: value["usage"]["output_tokens"].as_u64(),
        },
        "message_stop" => StreamEvent::MessageStop,
        "ping" => StreamEvent::Ping,
        "error" => StreamEvent::Error {
            message: value["error"]["message"]
                .as_str()
                .unwrap_or("unknown stream error")
                .to_string(),
            code: value["error"]["type"].as_str().map(String::from),
        },
        _ => return None,
    };

    Some(event)
}

/// State tracker for parsing streaming responses.
#[derive(Debug, Default)]
pub struct StreamParser {
    /// Currently active tool call ID
    pub current_tool_id: Option<String>,
    /// Currently active tool name
    pub current_tool_name: Option<String>,
    /// Accumulated text content
    pub text_content: String,
    /// Accumulated input JSON of the active tool call
    pub tool_input: String,
    tool_calls: Vec<ToolCall>,
    stop_reason: Option<String>,
    usage: Usage,
    finished: bool,
}

impl StreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process a stream event and emit chunks.
    pub fn process_event(&mut self, event: StreamEvent) -> Result<Vec<StreamChunk>> {
        let mut chunks = Vec::new();

        match event {
            StreamEvent::MessageStart { input_tokens, .. } => {
                self.usage.input_tokens = input_tokens;
            }
            StreamEvent::ContentBlockStart {
                content_type,
                tool_id,
                tool_name,
                ..
            } => {
                if content_type == "tool_use"
                    && let (Some(id), Some(name)) = (tool_id, tool_name)
                {
                    self.current_tool_id = Some(id.clone());
                    self.current_tool_name = Some(name.clone());
                    self.tool_input.clear();
                    chunks.push(StreamChunk::ToolCall { id, name });
                } else if content_type == "text" && !self.text_content.is_empty() {
                    // Text blocks are newline-joined, same as a non-streamed response
                    self.text_content.push('\n');
                    chunks.push(StreamChunk::Text("\n".to_string()));
                }
            }
            StreamEvent::ContentBlockDelta { text, partial_json, .. } => {
                if let Some(t) = text {
                    self.text_content.push_str(&t);
                    chunks.push(StreamChunk::Text(t));
                }
                if let Some(json) = partial_json {
                    self.tool_input.push_str(&json);
                    if let Some(id) = &self.current_tool_id {
                        chunks.push(StreamChunk::ToolInput {
                            id: id.clone(),
                            input_delta: json,
                        });
                    }
                }
            }
            StreamEvent::ContentBlockStop { .. } => {
                if let (Some(id), Some(name)) = (self.current_tool_id.take(), self.current_tool_name.take()) {
                    let input = if self.tool_input.trim().is_empty() {
                        Value::Object(Default::default())
                    } else {
                        serde_json::from_str(&self.tool_input)
                            .map_err(|e| KqlPairError::Generation(format!("Malformed tool input: {}", e)))?
                    };
                    self.tool_calls.push(ToolCall::new(id, name, input));
                    self.tool_input.clear();
                }
            }
            StreamEvent::MessageDelta {
                stop_reason,
                output_tokens,
            } => {
                if stop_reason.is_some() {
                    self.stop_reason = stop_reason;
                }
                if let Some(tokens) = output_tokens {
                    self.usage.output_tokens = tokens;
                }
            }
            StreamEvent::MessageStop => {
                self.finished = true;
                chunks.push(StreamChunk::Done);
            }
            StreamEvent::Error { message, .. } => {
                chunks.push(StreamChunk::Error(message));
            }
            StreamEvent::Ping => {}
        }

        Ok(chunks)
    }

    /// Whether `message_stop` has been seen
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Assemble the final response
    pub fn finish(self) -> Result<CompletionResponse> {
        if !self.finished {
            return Err(KqlPairError::Generation(
                "stream ended before message_stop".to_string(),
            ));
        }

        Ok(CompletionResponse {
            content: self.text_content,
            tool_calls: self.tool_calls,
            stop_reason: StopReason::from_api(self.stop_reason.as_deref()),
            usage: self.usage,
        })
    }
}
