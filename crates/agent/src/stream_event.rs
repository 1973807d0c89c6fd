//! Turn-level streaming events.
//!
//! `StreamEvent` is what a turn emits to its caller: classified text deltas,
//! progress notices around tool dispatch, and a terminal error when the turn
//! fails. The wire shape is a tagged JSON object, one event per line when
//! serialized for NDJSON transports.

use serde::{Deserialize, Serialize};

/// Events emitted while a turn runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// User-visible text delta from the model.
    TextChunk { content: String },

    /// Hidden reasoning delta (between thinking markers). Callers that
    /// don't surface reasoning just drop these.
    ThoughtChunk { content: String },

    /// Progress notice, e.g. announcing a tool invocation.
    Status { content: String },

    /// The turn failed. Always the last event of a failed turn, and the
    /// only error event that turn emits.
    Error { content: String },
}

impl StreamEvent {
    /// Event name as used in the wire `type` field.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::TextChunk { .. } => "text_chunk",
            Self::ThoughtChunk { .. } => "thought_chunk",
            Self::Status { .. } => "status",
            Self::Error { .. } => "error",
        }
    }
}
