//! Group chat - round-robin conversation loop with approval termination
//!
//! Agents take turns in a fixed order against one shared history. After
//! each turn the termination policy looks at the newest message; the run
//! ends on approval from an authorized agent or when the turn budget is
//! spent.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::agent::Agent;
use super::cancel::CancelSignal;
use super::history::{AuthorRole, ChatMessage, ConversationHistory};
use super::termination::TerminationPolicy;
use crate::error::{KqlPairError, Result};

/// Why a run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    Approved,
    IterationLimit,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::Approved => write!(f, "approved"),
            TerminationReason::IterationLimit => write!(f, "limit reached, not approved"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatState {
    Running,
    Terminated(TerminationReason),
}

/// Something the caller can observe while a run is in progress
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// Partial content from the agent currently speaking
    Delta { author: String, text: String },
    /// A message that was just appended to the history
    Message(ChatMessage),
}

/// A run that reached a terminal state
#[derive(Debug, Clone)]
pub struct RunResult {
    pub history: ConversationHistory,
    pub reason: TerminationReason,
    /// Agent turns taken in this run
    pub iterations: u32,
}

impl RunResult {
    pub fn approved(&self) -> bool {
        self.reason == TerminationReason::Approved
    }
}

#[derive(Debug, Clone)]
pub enum RunOutcome {
    Terminated(RunResult),
    /// Stopped by the caller; not a terminal state
    Cancelled {
        history: ConversationHistory,
        iterations: u32,
    },
}

impl RunOutcome {
    pub fn history(&self) -> &ConversationHistory {
        match self {
            RunOutcome::Terminated(result) => &result.history,
            RunOutcome::Cancelled { history, .. } => history,
        }
    }

    pub fn iterations(&self) -> u32 {
        match self {
            RunOutcome::Terminated(result) => result.iterations,
            RunOutcome::Cancelled { iterations, .. } => *iterations,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RunOutcome::Cancelled { .. })
    }

    pub fn into_result(self) -> Option<RunResult> {
        match self {
            RunOutcome::Terminated(result) => Some(result),
            RunOutcome::Cancelled { .. } => None,
        }
    }
}

/// A run that stopped on an error, with everything appended before it
#[derive(Debug, thiserror::Error)]
#[error("conversation failed after {iterations} turns: {error}")]
pub struct RunFailure {
    #[source]
    pub error: KqlPairError,
    pub history: ConversationHistory,
    pub iterations: u32,
}

pub type ChatResult = std::result::Result<RunOutcome, RunFailure>;

/// Fixed, ordered set of agents plus the policy that ends their conversation
pub struct GroupChat {
    agents: Vec<Arc<dyn Agent>>,
    policy: TerminationPolicy,
    streaming: bool,
}

impl GroupChat {
    pub fn new(agents: Vec<Arc<dyn Agent>>, policy: TerminationPolicy) -> Result<Self> {
        if agents.is_empty() {
            return Err(KqlPairError::Config("group chat needs at least one agent".into()));
        }

        for approver in policy.approvers() {
            if !agents.iter().any(|a| a.name() == approver) {
                warn!(approver, "approver is not a member of the group chat");
            }
        }

        Ok(Self {
            agents,
            policy,
            streaming: false,
        })
    }

    /// Forward partial agent output as [`ChatEvent::Delta`] events
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn agent_names(&self) -> Vec<&str> {
        self.agents.iter().map(|a| a.name()).collect()
    }

    pub fn policy(&self) -> &TerminationPolicy {
        &self.policy
    }

    /// Run a conversation seeded with one user message
    pub async fn run(&self, seed: impl Into<String>, cancel: &CancelSignal) -> ChatResult {
        self.run_history(ConversationHistory::seeded(seed), None, cancel).await
    }

    /// Like [`run`](Self::run), emitting each message on `events` as it is
    /// appended. A dropped receiver does not stop the run.
    pub async fn run_streaming(
        &self,
        seed: impl Into<String>,
        events: mpsc::Sender<ChatEvent>,
        cancel: &CancelSignal,
    ) -> ChatResult {
        self.run_history(ConversationHistory::seeded(seed), Some(&events), cancel)
            .await
    }

    /// Continue from an existing history, e.g. one loaded from a transcript
    pub async fn run_history(
        &self,
        mut history: ConversationHistory,
        events: Option<&mpsc::Sender<ChatEvent>>,
        cancel: &CancelSignal,
    ) -> ChatResult {
        let mut iterations = 0u32;

        if let Err(error) = self.check_start(&history) {
            return Err(RunFailure {
                error,
                history,
                iterations,
            });
        }

        let mut state = self.next_state(&history, None, iterations);

        let reason = loop {
            if let ChatState::Terminated(reason) = state {
                break reason;
            }

            if cancel.is_cancelled() {
                info!(iterations, "conversation cancelled between turns");
                return Ok(RunOutcome::Cancelled { history, iterations });
            }

            let agent = Arc::clone(&self.agents[iterations as usize % self.agents.len()]);
            debug!(agent = agent.name(), iteration = iterations + 1, "starting turn");

            let reply = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                reply = self.take_turn(agent.as_ref(), &history, events, cancel) => Some(reply),
            };

            let mut message = match reply {
                Some(Ok(message)) => message,
                None | Some(Err(KqlPairError::Cancelled)) => {
                    info!(agent = agent.name(), iterations, "conversation cancelled during turn");
                    return Ok(RunOutcome::Cancelled { history, iterations });
                }
                Some(Err(error)) => {
                    error!(agent = agent.name(), %error, "agent turn failed");
                    return Err(RunFailure {
                        error,
                        history,
                        iterations,
                    });
                }
            };

            message.role = AuthorRole::Agent;
            message.author_name = Some(agent.name().to_string());

            if let Err(error) = history.append(message) {
                return Err(RunFailure {
                    error,
                    history,
                    iterations,
                });
            }
            iterations += 1;

            if let Some(appended) = history.all().last() {
                debug!(
                    agent = agent.name(),
                    iteration = iterations,
                    len = appended.text().len(),
                    "turn complete"
                );
                if let Some(events) = events
                    && !emit(events, ChatEvent::Message(appended.clone()), cancel).await
                {
                    info!(iterations, "conversation cancelled while delivering events");
                    return Ok(RunOutcome::Cancelled { history, iterations });
                }
            }

            state = self.next_state(&history, Some(agent.name()), iterations);
        };

        history.mark_terminated();
        info!(%reason, iterations, "conversation terminated");

        Ok(RunOutcome::Terminated(RunResult {
            history,
            reason,
            iterations,
        }))
    }

    fn check_start(&self, history: &ConversationHistory) -> Result<()> {
        if history.is_terminated() {
            return Err(KqlPairError::InvalidState(
                "conversation has already terminated".into(),
            ));
        }
        history.last().map(|_| ())
    }

    /// Approval is checked before the budget, so an approving final turn
    /// reports `Approved`
    fn next_state(&self, history: &ConversationHistory, just_spoke: Option<&str>, iterations: u32) -> ChatState {
        if let Some(name) = just_spoke
            && self.policy.should_terminate(history, name)
        {
            return ChatState::Terminated(TerminationReason::Approved);
        }
        if iterations >= self.policy.max_iterations() {
            return ChatState::Terminated(TerminationReason::IterationLimit);
        }
        ChatState::Running
    }

    async fn take_turn(
        &self,
        agent: &dyn Agent,
        history: &ConversationHistory,
        events: Option<&mpsc::Sender<ChatEvent>>,
        cancel: &CancelSignal,
    ) -> Result<ChatMessage> {
        let Some(events) = events.filter(|_| self.streaming) else {
            return agent.reply(history, cancel).await;
        };

        let (chunk_tx, mut chunk_rx) = mpsc::channel::<String>(64);
        let author = agent.name().to_string();

        let forward = async {
            while let Some(text) = chunk_rx.recv().await {
                let delta = ChatEvent::Delta {
                    author: author.clone(),
                    text,
                };
                if !emit(events, delta, cancel).await {
                    break;
                }
            }
        };

        let (reply, ()) = tokio::join!(agent.reply_streaming(history, chunk_tx, cancel), forward);
        reply
    }
}

/// Send an event unless cancellation comes first. Returns false when cancelled.
async fn emit(events: &mpsc::Sender<ChatEvent>, event: ChatEvent, cancel: &CancelSignal) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = events.send(event) => true,
    }
}

impl fmt::Debug for GroupChat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupChat")
            .field("agents", &self.agent_names())
            .field("policy", &self.policy)
            .field("streaming", &self.streaming)
            .finish()
    }
}
