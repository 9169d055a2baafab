//! Multi-agent conversation: history, agents, termination and the loop

pub mod agent;
pub mod cancel;
pub mod group;
pub mod history;
pub mod termination;
pub mod transcript;

pub use agent::Agent;
pub use cancel::{CancelSignal, CancelSource};
pub use group::{ChatEvent, ChatResult, ChatState, GroupChat, RunFailure, RunOutcome, RunResult, TerminationReason};
pub use history::{AuthorRole, ChatMessage, ConversationHistory};
pub use termination::{ApprovalStrategy, DEFAULT_APPROVAL_TOKEN, TerminationPolicy, TerminationStrategy};
