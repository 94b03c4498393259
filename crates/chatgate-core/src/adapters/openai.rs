//! OpenAI SSE Stream Adapter
//!
//! Parses the OpenAI-compatible chat completions streaming format:
//! ```text
//! data: {"id":"chatcmpl-xxx","object":"chat.completion.chunk","created":1234567890,"model":"gpt-4o-mini","choices":[{"index":0,"delta":{"content":"token"},"finish_reason":null}]}
//!
//! data: [DONE]
//! ```

use crate::stream_adapter::{ParsedChunk, StreamAdapter};
use serde::Deserialize;

/// OpenAI SSE stream adapter
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiAdapter;

impl OpenAiAdapter {
    pub fn new() -> Self {
        Self
    }

    /// Parse a single SSE data payload into `chunks`
    fn parse_data_line(&self, json_str: &str, chunks: &mut Vec<ParsedChunk>) {
        let chunk = match serde_json::from_str::<OpenAiChunk>(json_str) {
            Ok(chunk) => chunk,
            Err(e) => {
                chunks.push(ParsedChunk::Error(format!("Failed to parse OpenAI chunk: {}", e)));
                return;
            }
        };

        let Some(choice) = chunk.choices.into_iter().next() else {
            // Usage-only trailers carry no choices
            chunks.push(ParsedChunk::Empty);
            return;
        };

        // A final delta may carry content alongside the finish reason: the
        // content is emitted first, then the finish.
        let content = choice.delta.content.filter(|c| !c.is_empty());
        let has_content = content.is_some();
        if let Some(content) = content {
            chunks.push(ParsedChunk::Content(content));
        }
        match choice.finish_reason {
            Some(reason) => chunks.push(ParsedChunk::done(Some(reason))),
            None if !has_content => chunks.push(ParsedChunk::Empty),
            None => {}
        }
    }
}

impl StreamAdapter for OpenAiAdapter {
    fn name(&self) -> &str {
        "openai"
    }

    fn parse(&self, data: &str) -> Vec<ParsedChunk> {
        let mut chunks = Vec::new();

        for line in data.lines() {
            let line = line.trim();

            if line.is_empty() || line.starts_with(':') {
                // blank separator or SSE comment
                continue;
            }

            if self.is_done_marker(line) {
                chunks.push(ParsedChunk::done(None));
                continue;
            }

            if let Some(json_str) = line.strip_prefix("data:") {
                let json_str = json_str.trim();
                if json_str.is_empty() {
                    continue;
                }
                self.parse_data_line(json_str, &mut chunks);
            }
            // event:, id:, retry: fields are not used by this format
        }

        chunks
    }

    fn is_done_marker(&self, data: &str) -> bool {
        let trimmed = data.trim();
        trimmed == "data: [DONE]" || trimmed == "data:[DONE]" || trimmed == "[DONE]"
    }
}

// =============================================================================
// OpenAI Response Structures
// =============================================================================

#[derive(Debug, Deserialize)]
struct OpenAiChunk {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    #[serde(default)]
    delta: OpenAiDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct OpenAiDelta {
    content: Option<String>,
}
