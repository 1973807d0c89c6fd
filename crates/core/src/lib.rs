//! # raita Core
//!
//! Domain types, traits, and error definitions for the raita conversational
//! retrieval-augmented assistant backend. This crate has **zero framework
//! dependencies** — it defines the domain model that all other crates
//! implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is defined as a trait here: the model provider,
//! the tool contract, the session transcript store, and the document
//! retriever. Implementations live in their respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod message;
pub mod provider;
pub mod retrieval;
pub mod tool;
pub mod transcript;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use message::{Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk};
pub use retrieval::{RetrievedDocument, Retriever};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};
pub use transcript::TranscriptStore;
