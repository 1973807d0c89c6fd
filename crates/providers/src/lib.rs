//! Model provider implementations for raita.
//!
//! All providers implement the `raita_core::Provider` trait. The rotation
//! client wraps the HTTP adapter behind the same trait, so the agent loop
//! never knows whether it is talking to one credential or a pool.

pub mod openai_compat;
pub mod rotation;

pub use openai_compat::OpenAiCompatProvider;
pub use rotation::{CredentialPool, RotatingProvider};
