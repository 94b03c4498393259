//! chatgate Core
//!
//! Types and utilities shared across the chatgate crates.
//!
//! This crate provides:
//! - The workspace error type and result alias
//! - Role-tagged chat messages sent to the upstream model
//! - Line buffering and parsing for OpenAI-style SSE completion streams

pub mod adapters;
pub mod error;
pub mod stream_adapter;
pub mod types;

pub use adapters::OpenAiAdapter;
pub use error::{Error, Result};
pub use stream_adapter::{ParsedChunk, SseLineBuffer, StreamAdapter};
pub use types::{ChatMessage, Role};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::adapters::OpenAiAdapter;
    pub use crate::error::{Error, Result};
    pub use crate::stream_adapter::{ParsedChunk, SseLineBuffer, StreamAdapter};
    pub use crate::types::{ChatMessage, Role};
}
