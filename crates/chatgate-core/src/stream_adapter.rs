//! Stream Adapter System
//!
//! Splits a raw completion byte stream into SSE lines and parses each line
//! into content fragments and completion signals.

use std::fmt::Debug;

/// Represents a parsed event from a streaming completion
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedChunk {
    /// Content fragment extracted from the stream
    Content(String),

    /// Stream completion signal
    Done {
        /// Reason for completion (stop, length, content_filter, ...)
        finish_reason: Option<String>,
    },

    /// Event without content (role preamble, keep-alive, tool deltas)
    Empty,

    /// Unparseable event
    Error(String),
}

impl ParsedChunk {
    /// Create a done chunk
    pub fn done(finish_reason: Option<String>) -> Self {
        Self::Done { finish_reason }
    }

    /// Check if this is a done signal
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done { .. })
    }

    /// Get the text content if this is a content chunk
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Content(text) => Some(text),
            _ => None,
        }
    }
}

/// Trait for parsing provider-specific streaming formats
pub trait StreamAdapter: Send + Sync + Debug {
    /// Name of this adapter (for logging/debugging)
    fn name(&self) -> &str;

    /// Parse one or more complete lines into chunks
    fn parse(&self, data: &str) -> Vec<ParsedChunk>;

    /// Check if this data represents end of stream
    fn is_done_marker(&self, data: &str) -> bool;
}

/// Reassembles complete lines from arbitrarily split network reads.
///
/// Bytes are only decoded once a full line is available, so a multi-byte
/// UTF-8 sequence split across two reads is never mangled.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes and drain every complete, non-blank line
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\r', '\n']);
            if !line.trim().is_empty() {
                lines.push(line.to_string());
            }
        }
        lines
    }

    /// Take whatever trailing text remains once the source is exhausted
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        let rest = String::from_utf8_lossy(&rest).trim().to_string();
        (!rest.is_empty()).then_some(rest)
    }

    /// Number of buffered bytes not yet terminated by a newline
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
