//! Retriever trait — the boundary to the long-term document store.
//!
//! The vector index, parent-document store, and everything behind them are
//! external collaborators. The agent side only needs "give me documents for
//! this query", so that is the whole contract.

use crate::error::RetrievalError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A document returned by a retrieval query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedDocument {
    /// The document content (already assembled to parent-document size)
    pub content: String,

    /// Where the document came from, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,

    /// Relevance score assigned by the backend
    #[serde(default)]
    pub score: f32,
}

/// The document retriever contract.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// The backend name (e.g., "chroma", "static").
    fn name(&self) -> &str;

    /// Retrieve up to `top_k` documents relevant to `query`,
    /// ordered by decreasing relevance.
    async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
    ) -> std::result::Result<Vec<RetrievedDocument>, RetrievalError>;
}
