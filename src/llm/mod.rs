//! LLM Client Layer - model backend abstraction with streaming and tool calls
//!
//! This module provides:
//! - Message types for LLM communication
//! - LlmClient trait for backend abstraction
//! - AnthropicClient implementation
//! - Streaming support

pub mod anthropic;
pub mod client;
pub mod streaming;
pub mod types;

pub use anthropic::{AnthropicClient, AnthropicConfig};
pub use client::{LlmClient, MockLlmClient};
pub use streaming::{StreamChunk, StreamEvent, StreamParser, parse_sse_event};
pub use types::{
    CompletionRequest, CompletionResponse, ContentBlock, Message, MessageContent, Role, StopReason, ToolCall,
    ToolDefinition, ToolResult, Usage,
};
