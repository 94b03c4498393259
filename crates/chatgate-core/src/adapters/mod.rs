//! Stream Adapters
//!
//! Adapters for parsing streaming formats of chat completion providers.

mod openai;

pub use openai::OpenAiAdapter;
