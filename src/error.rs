//! Error types for kqlpair
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur in kqlpair
#[derive(Debug, Error)]
pub enum KqlPairError {
    /// The model backend call failed or timed out
    #[error("Generation error: {0}")]
    Generation(String),

    /// Operation not allowed in the current conversation state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// An operation needed at least one message in the history
    #[error("Conversation history is empty")]
    EmptyHistory,

    /// The run was cancelled by the caller. Not a failure.
    #[error("Cancelled")]
    Cancelled,

    /// Invalid configuration
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl KqlPairError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, KqlPairError::Cancelled)
    }
}

/// Result type alias for kqlpair operations
pub type Result<T> = std::result::Result<T, KqlPairError>;
