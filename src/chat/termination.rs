//! Termination policy - decides when a conversation is done

use std::collections::HashSet;

use super::history::ConversationHistory;

pub const DEFAULT_APPROVAL_TOKEN: &str = "approve";

/// Content test applied to the most recent message
pub trait TerminationStrategy: Send + Sync {
    fn should_agent_terminate(&self, history: &ConversationHistory) -> bool;
}

/// Terminates when the last message contains the approval token,
/// case-insensitively and anywhere in the text
#[derive(Debug, Clone)]
pub struct ApprovalStrategy {
    token: String,
}

impl ApprovalStrategy {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into().to_lowercase(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl Default for ApprovalStrategy {
    fn default() -> Self {
        Self::new(DEFAULT_APPROVAL_TOKEN)
    }
}

impl TerminationStrategy for ApprovalStrategy {
    fn should_agent_terminate(&self, history: &ConversationHistory) -> bool {
        let Ok(last) = history.last() else {
            return false;
        };
        match last.content.as_deref() {
            Some(content) if !content.is_empty() => content.to_lowercase().contains(&self.token),
            _ => false,
        }
    }
}

/// Who may end the conversation, how, and the turn budget
pub struct TerminationPolicy {
    approvers: HashSet<String>,
    strategy: Box<dyn TerminationStrategy>,
    max_iterations: u32,
}

impl TerminationPolicy {
    pub fn new(
        approvers: impl IntoIterator<Item = impl Into<String>>,
        strategy: Box<dyn TerminationStrategy>,
        max_iterations: u32,
    ) -> Self {
        Self {
            approvers: approvers.into_iter().map(Into::into).collect(),
            strategy,
            max_iterations,
        }
    }

    /// Approval-token policy with the given approvers
    pub fn approval(approvers: impl IntoIterator<Item = impl Into<String>>, max_iterations: u32) -> Self {
        Self::new(approvers, Box::new(ApprovalStrategy::default()), max_iterations)
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.strategy = Box::new(ApprovalStrategy::new(token));
        self
    }

    pub fn is_authorized(&self, agent_name: &str) -> bool {
        self.approvers.contains(agent_name)
    }

    pub fn approvers(&self) -> impl Iterator<Item = &str> {
        self.approvers.iter().map(|s| s.as_str())
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// Whether the turn that `just_spoke` just took ends the conversation.
    /// Content is only inspected for authorized agents.
    pub fn should_terminate(&self, history: &ConversationHistory, just_spoke: &str) -> bool {
        if !self.is_authorized(just_spoke) {
            return false;
        }
        self.strategy.should_agent_terminate(history)
    }
}

impl std::fmt::Debug for TerminationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminationPolicy")
            .field("approvers", &self.approvers)
            .field("max_iterations", &self.max_iterations)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::history::ChatMessage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn history_ending_with(author: &str, content: &str) -> ConversationHistory {
        let mut history = ConversationHistory::seeded("ping");
        history.append(ChatMessage::agent(author, content)).unwrap();
        history
    }

    #[test]
    fn test_token_matches_case_insensitively() {
        let policy = TerminationPolicy::approval(["B"], 10);
        assert!(policy.should_terminate(&history_ending_with("B", "I Approve this query"), "B"));
        assert!(policy.should_terminate(&history_ending_with("B", "APPROVED"), "B"));
    }

    #[test]
    fn test_substring_match_includes_disapprove() {
        let policy = TerminationPolicy::approval(["B"], 10);
        assert!(policy.should_terminate(&history_ending_with("B", "I disapprove"), "B"));
    }

    #[test]
    fn test_unauthorized_agent_never_terminates() {
        let policy = TerminationPolicy::approval(["B"], 10);
        assert!(!policy.should_terminate(&history_ending_with("A", "approve"), "A"));
    }

    #[test]
    fn test_missing_or_empty_content() {
        let policy = TerminationPolicy::approval(["B"], 10);
        assert!(!policy.should_terminate(&history_ending_with("B", ""), "B"));

        let mut history = ConversationHistory::seeded("ping");
        let mut message = ChatMessage::agent("B", "x");
        message.content = None;
        history.append(message).unwrap();
        assert!(!policy.should_terminate(&history, "B"));
    }

    #[test]
    fn test_empty_history_is_false() {
        let policy = TerminationPolicy::approval(["B"], 10);
        assert!(!policy.should_terminate(&ConversationHistory::new(), "B"));
    }

    #[test]
    fn test_only_last_message_is_checked() {
        let policy = TerminationPolicy::approval(["B"], 10);
        let mut history = history_ending_with("B", "approve");
        history.append(ChatMessage::agent("B", "wait, one more change")).unwrap();
        assert!(!policy.should_terminate(&history, "B"));
    }

    #[test]
    fn test_custom_token() {
        let policy = TerminationPolicy::approval(["B"], 10).with_token("LGTM");
        assert!(policy.should_terminate(&history_ending_with("B", "lgtm, ship it"), "B"));
        assert!(!policy.should_terminate(&history_ending_with("B", "approve"), "B"));
    }

    struct CountingStrategy(Arc<AtomicUsize>);

    impl TerminationStrategy for CountingStrategy {
        fn should_agent_terminate(&self, _history: &ConversationHistory) -> bool {
            self.0.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    #[test]
    fn test_membership_checked_before_content() {
        let calls = Arc::new(AtomicUsize::new(0));
        let policy = TerminationPolicy::new(["B"], Box::new(CountingStrategy(calls.clone())), 10);

        assert!(!policy.should_terminate(&history_ending_with("A", "approve"), "A"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert!(policy.should_terminate(&history_ending_with("B", "anything"), "B"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
