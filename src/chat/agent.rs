//! Agent capability - anything that can produce one reply from the history

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::cancel::CancelSignal;
use super::history::{ChatMessage, ConversationHistory};
use crate::error::Result;

/// A conversation participant
///
/// Implementations hold no per-run mutable state so one agent can serve
/// several concurrent runs.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Stable name, used for authorization and attribution
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Produce exactly one message from the full history. A cancelled call
    /// returns `KqlPairError::Cancelled`.
    async fn reply(&self, history: &ConversationHistory, cancel: &CancelSignal) -> Result<ChatMessage>;

    /// Streaming variant: send partial content as it is produced and return
    /// the assembled message. A dropped receiver is not an error.
    async fn reply_streaming(
        &self,
        history: &ConversationHistory,
        chunk_tx: mpsc::Sender<String>,
        cancel: &CancelSignal,
    ) -> Result<ChatMessage> {
        let message = self.reply(history, cancel).await?;
        if let Some(content) = &message.content
            && !content.is_empty()
        {
            let _ = chunk_tx.send(content.clone()).await;
        }
        Ok(message)
    }
}
