//! Session transcript storage backends for raita.
//!
//! A transcript is an ordered list of committed messages per session. The
//! agent loop commits exactly one human/assistant pair per successful turn,
//! so a transcript only ever grows in pairs; these backends just store and
//! replay the list in order.

pub mod in_memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryTranscriptStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteTranscriptStore;
