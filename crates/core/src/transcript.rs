//! TranscriptStore trait — ordered per-session message history.
//!
//! The transcript is the durable record of a conversation: read once at turn
//! start, appended to exactly once at turn end. Mid-turn tool exchanges never
//! reach the store — only the final human/assistant pair does.

use crate::error::TranscriptError;
use crate::message::Message;
use async_trait::async_trait;

/// The session transcript store.
///
/// Implementations: in-memory (tests, ephemeral sessions), SQLite (durable).
///
/// ## Concurrency contract
///
/// `append` must be atomic for the whole batch: either every message in the
/// batch becomes visible to subsequent `read`s, or none does. The store itself
/// does not serialize turns — callers must guarantee a single logical writer
/// per session id (the agent loop holds a per-session lock for the duration
/// of a turn).
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    /// The store name (e.g., "in_memory", "sqlite").
    fn name(&self) -> &str;

    /// Read the full ordered message history for a session.
    ///
    /// An unknown session id is an empty transcript, not an error.
    async fn read(&self, session_id: &str)
        -> std::result::Result<Vec<Message>, TranscriptError>;

    /// Atomically append a batch of messages to a session.
    async fn append(
        &self,
        session_id: &str,
        messages: Vec<Message>,
    ) -> std::result::Result<(), TranscriptError>;
}
