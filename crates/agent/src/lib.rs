//! Core agent loop for raita.
//!
//! One turn: stream a model response, split it into visible and hidden text,
//! emit events to the caller as deltas arrive, dispatch any tool calls, and
//! repeat until the model answers without tools. On success exactly one
//! human/assistant pair is committed to the session transcript; on any
//! failure, nothing is.

pub mod bootstrap;
pub mod classifier;
pub mod prompt;
pub mod stream_event;
pub mod turn;

pub use bootstrap::build_agent;
pub use classifier::{ChunkClassifier, ClassifiedSegment, SegmentKind};
pub use prompt::DEFAULT_SYSTEM_PROMPT;
pub use stream_event::StreamEvent;
pub use turn::{ChatAgent, TurnError};
