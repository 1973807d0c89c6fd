//! Built-in tool implementations for raita.
//!
//! The registry is closed: the model only ever sees the tools registered
//! here, and a call naming anything else is rejected by the registry.

pub mod knowledge_search;

pub use knowledge_search::KnowledgeSearchTool;

use raita_core::retrieval::Retriever;
use raita_core::tool::ToolRegistry;
use std::sync::Arc;

/// Create the default tool registry backed by the given retriever.
pub fn default_registry(retriever: Arc<dyn Retriever>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(KnowledgeSearchTool::new(retriever)));
    registry
}
