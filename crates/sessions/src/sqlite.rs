//! SQLite transcript store.
//!
//! One table, `transcripts`, with a per-session sequence number so replay
//! order never depends on timestamps. Messages are stored as JSON; the
//! schema only needs to order them, not query inside them.

use async_trait::async_trait;
use raita_core::error::TranscriptError;
use raita_core::message::Message;
use raita_core::transcript::TranscriptStore;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

/// A persistent transcript store backed by a SQLite database file.
pub struct SqliteTranscriptStore {
    pool: SqlitePool,
}

impl SqliteTranscriptStore {
    /// Open (or create) a transcript database at `path`.
    ///
    /// Pass `":memory:"` for an in-process ephemeral database (useful for
    /// tests).
    pub async fn new(path: &str) -> Result<Self, TranscriptError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| TranscriptError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| TranscriptError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite transcript store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, TranscriptError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), TranscriptError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS transcripts (
                session_id  TEXT NOT NULL,
                seq         INTEGER NOT NULL,
                message     TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                PRIMARY KEY (session_id, seq)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| TranscriptError::MigrationFailed(format!("transcripts table: {e}")))?;

        debug!("SQLite transcript migrations complete");
        Ok(())
    }

    async fn next_seq(&self, session_id: &str) -> Result<i64, TranscriptError> {
        let row = sqlx::query(
            "SELECT COALESCE(MAX(seq), -1) AS max_seq FROM transcripts WHERE session_id = ?",
        )
        .bind(session_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| TranscriptError::Storage(format!("seq lookup: {e}")))?;

        let max_seq: i64 = row
            .try_get("max_seq")
            .map_err(|e| TranscriptError::Storage(format!("seq column: {e}")))?;
        Ok(max_seq + 1)
    }
}

#[async_trait]
impl TranscriptStore for SqliteTranscriptStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn read(&self, session_id: &str) -> Result<Vec<Message>, TranscriptError> {
        let rows = sqlx::query(
            "SELECT message FROM transcripts WHERE session_id = ? ORDER BY seq ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| TranscriptError::Storage(format!("read: {e}")))?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in rows {
            let raw: String = row
                .try_get("message")
                .map_err(|e| TranscriptError::Storage(format!("message column: {e}")))?;
            let message: Message = serde_json::from_str(&raw)
                .map_err(|e| TranscriptError::Serialization(e.to_string()))?;
            messages.push(message);
        }
        Ok(messages)
    }

    /// Append a batch atomically: either every message lands or none does.
    async fn append(
        &self,
        session_id: &str,
        messages: Vec<Message>,
    ) -> Result<(), TranscriptError> {
        if messages.is_empty() {
            return Ok(());
        }

        let mut seq = self.next_seq(session_id).await?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| TranscriptError::Storage(format!("begin: {e}")))?;

        for message in &messages {
            let raw = serde_json::to_string(message)
                .map_err(|e| TranscriptError::Serialization(e.to_string()))?;
            sqlx::query(
                "INSERT INTO transcripts (session_id, seq, message, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(session_id)
            .bind(seq)
            .bind(raw)
            .bind(message.timestamp.to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(|e| TranscriptError::Storage(format!("insert: {e}")))?;
            seq += 1;
        }

        tx.commit()
            .await
            .map_err(|e| TranscriptError::Storage(format!("commit: {e}")))?;

        debug!(session_id, count = messages.len(), "Committed transcript batch");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raita_core::message::Role;

    async fn memory_store() -> SqliteTranscriptStore {
        SqliteTranscriptStore::new(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn unknown_session_reads_empty() {
        let store = memory_store().await;
        assert!(store.read("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn append_and_read_roundtrip() {
        let store = memory_store().await;
        store
            .append(
                "s1",
                vec![
                    Message::user("what is rust?"),
                    Message::assistant("A systems programming language."),
                ],
            )
            .await
            .unwrap();

        let messages = store.read("s1").await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].content, "A systems programming language.");
    }

    #[tokio::test]
    async fn sequence_continues_across_batches() {
        let store = memory_store().await;
        store
            .append("s1", vec![Message::user("q1"), Message::assistant("a1")])
            .await
            .unwrap();
        store
            .append("s1", vec![Message::user("q2"), Message::assistant("a2")])
            .await
            .unwrap();

        let messages = store.read("s1").await.unwrap();
        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["q1", "a1", "q2", "a2"]);
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let store = memory_store().await;
        store.append("a", vec![Message::user("for a")]).await.unwrap();
        store.append("b", vec![Message::user("for b")]).await.unwrap();

        assert_eq!(store.read("a").await.unwrap().len(), 1);
        assert_eq!(store.read("b").await.unwrap()[0].content, "for b");
    }

    #[tokio::test]
    async fn empty_batch_is_a_noop() {
        let store = memory_store().await;
        store.append("s1", vec![]).await.unwrap();
        assert!(store.read("s1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transcripts.db");
        let path_str = path.to_str().unwrap();

        {
            let store = SqliteTranscriptStore::new(path_str).await.unwrap();
            store
                .append("s1", vec![Message::user("remember me")])
                .await
                .unwrap();
        }

        let store = SqliteTranscriptStore::new(path_str).await.unwrap();
        let messages = store.read("s1").await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "remember me");
    }
}
