//! Conversation history - the append-only message log shared by a run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{KqlPairError, Result};

/// Who produced a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorRole {
    User,
    Agent,
}

/// One entry in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Position in the history, assigned on append
    pub ordinal: u64,
    pub role: AuthorRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// A message typed by the caller
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            ordinal: 0,
            role: AuthorRole::User,
            author_name: None,
            content: Some(content.into()),
            created_at: Utc::now(),
        }
    }

    /// A reply produced by the named agent
    pub fn agent(author_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            ordinal: 0,
            role: AuthorRole::Agent,
            author_name: Some(author_name.into()),
            content: Some(content.into()),
            created_at: Utc::now(),
        }
    }

    /// Content as text, empty when absent
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }

    pub fn is_from(&self, name: &str) -> bool {
        self.author_name.as_deref() == Some(name)
    }
}

/// Ordered, append-only message log
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationHistory {
    messages: Vec<ChatMessage>,
    #[serde(skip)]
    terminated: bool,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// History holding only the seed user message
    pub fn seeded(content: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::user(content)],
            terminated: false,
        }
    }

    /// Rebuild a history from stored messages, renumbering ordinals in order
    pub fn from_messages(messages: impl IntoIterator<Item = ChatMessage>) -> Self {
        let messages = messages
            .into_iter()
            .enumerate()
            .map(|(i, mut m)| {
                m.ordinal = i as u64;
                m
            })
            .collect();
        Self {
            messages,
            terminated: false,
        }
    }

    /// Append a message and assign its ordinal. Returns the ordinal.
    pub fn append(&mut self, mut message: ChatMessage) -> Result<u64> {
        if self.terminated {
            return Err(KqlPairError::InvalidState(
                "cannot append to a terminated conversation".into(),
            ));
        }
        let ordinal = self.messages.len() as u64;
        message.ordinal = ordinal;
        self.messages.push(message);
        Ok(ordinal)
    }

    pub fn last(&self) -> Result<&ChatMessage> {
        self.messages.last().ok_or(KqlPairError::EmptyHistory)
    }

    pub fn all(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn mark_terminated(&mut self) {
        self.terminated = true;
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Number of messages written by agents
    pub fn agent_turns(&self) -> usize {
        self.messages.iter().filter(|m| m.role == AuthorRole::Agent).count()
    }

    pub fn into_messages(self) -> Vec<ChatMessage> {
        self.messages
    }
}
