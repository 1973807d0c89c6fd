//! In-memory transcript store — useful for testing and ephemeral sessions.

use async_trait::async_trait;
use raita_core::error::TranscriptError;
use raita_core::message::Message;
use raita_core::transcript::TranscriptStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A transcript store that keeps every session in a process-local map.
/// Nothing survives a restart.
pub struct InMemoryTranscriptStore {
    sessions: Arc<RwLock<HashMap<String, Vec<Message>>>>,
}

impl InMemoryTranscriptStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of sessions with at least one committed message.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for InMemoryTranscriptStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TranscriptStore for InMemoryTranscriptStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn read(&self, session_id: &str) -> Result<Vec<Message>, TranscriptError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(session_id).cloned().unwrap_or_default())
    }

    async fn append(
        &self,
        session_id: &str,
        messages: Vec<Message>,
    ) -> Result<(), TranscriptError> {
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id.to_string())
            .or_default()
            .extend(messages);
        Ok(())
    }
}
