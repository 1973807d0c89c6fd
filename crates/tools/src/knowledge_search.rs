//! Knowledge search tool — the agent's bridge to the retrieval backend.
//!
//! Results come back as plain formatted text, not structured JSON: the only
//! consumer is the model, which reads a content/source block per document
//! and is expected to cite the source URLs in its answer.

use async_trait::async_trait;
use raita_core::error::ToolError;
use raita_core::retrieval::{RetrievedDocument, Retriever};
use raita_core::tool::{Tool, ToolResult};
use std::sync::Arc;
use tracing::debug;

const DEFAULT_TOP_K: usize = 5;

/// A tool that searches the knowledge base for documents relevant to a query.
pub struct KnowledgeSearchTool {
    retriever: Arc<dyn Retriever>,
    top_k: usize,
}

impl KnowledgeSearchTool {
    pub fn new(retriever: Arc<dyn Retriever>) -> Self {
        Self {
            retriever,
            top_k: DEFAULT_TOP_K,
        }
    }

    /// Override how many documents a search returns.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    fn format_documents(documents: &[RetrievedDocument]) -> String {
        documents
            .iter()
            .map(|doc| {
                let content = doc.content.replace('\n', " ");
                let source = doc.source_url.as_deref().unwrap_or("Unknown Source");
                format!("Content: {content}\nSource: {source}")
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[async_trait]
impl Tool for KnowledgeSearchTool {
    fn name(&self) -> &str {
        "knowledge_search"
    }

    fn description(&self) -> &str {
        "Search the knowledge base for documents relevant to a query. \
         Use this to ground your answer in stored documentation before responding. \
         Each result includes the source URL to cite."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query to run against the knowledge base"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
    ) -> std::result::Result<ToolResult, ToolError> {
        let query = arguments["query"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;

        debug!(query, top_k = self.top_k, "Knowledge search");

        let documents = self
            .retriever
            .retrieve(query, self.top_k)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "knowledge_search".into(),
                reason: e.to_string(),
            })?;

        let output = if documents.is_empty() {
            format!(
                "No results found for query: '{query}'. Try rephrasing or broadening the search."
            )
        } else {
            Self::format_documents(&documents)
        };

        Ok(ToolResult {
            // The registry stamps the call id; the handler never sees it.
            call_id: String::new(),
            success: true,
            output,
        })
    }
}
