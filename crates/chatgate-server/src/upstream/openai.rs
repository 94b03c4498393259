//! OpenAI-compatible streaming client

use super::{FragmentStream, UpstreamClient, UpstreamFactory};
use async_trait::async_trait;
use chatgate_core::{ChatMessage, Error, OpenAiAdapter, ParsedChunk, Result, SseLineBuffer, StreamAdapter};
use futures::stream::{self, Stream, StreamExt};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::UpstreamConfig;

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

/// Streams chat completions from `{base_url}/chat/completions`
#[derive(Debug, Clone)]
pub struct OpenAiStreamingClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiStreamingClient {
    pub fn new(http: reqwest::Client, base_url: &str, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl UpstreamClient for OpenAiStreamingClient {
    async fn stream(&self, query: Vec<ChatMessage>) -> Result<FragmentStream> {
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: &query,
            stream: true,
        };

        debug!(endpoint = %self.endpoint, model = %self.model, messages = query.len(), "Submitting query");

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::upstream(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(%status, "Upstream rejected query");
            return Err(Error::upstream(format!("status {}: {}", status, detail)));
        }

        Ok(Box::pin(sse_fragments(response.bytes_stream())))
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// Reassembles SSE lines from a byte stream and yields content fragments.
///
/// The stream ends cleanly at `[DONE]`, or at end of body once a finish
/// reason has been seen. Any other end of body is reported as truncation.
pub fn sse_fragments<S, B, E>(body: S) -> impl Stream<Item = Result<String>> + Send + 'static
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = SseState {
        body: Box::pin(body),
        lines: SseLineBuffer::new(),
        adapter: OpenAiAdapter::new(),
        pending: VecDeque::new(),
        finish_seen: false,
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }

            match state.body.next().await {
                Some(Ok(bytes)) => {
                    for line in state.lines.push(bytes.as_ref()) {
                        state.absorb(&line);
                    }
                }
                Some(Err(e)) => state.fail(format!("stream read failed: {}", e)),
                None => {
                    if let Some(line) = state.lines.finish() {
                        state.absorb(&line);
                    }
                    if !state.finished {
                        if state.finish_seen {
                            state.finished = true;
                        } else {
                            state.fail("stream ended before [DONE]".to_string());
                        }
                    }
                }
            }
        }
    })
}

struct SseState<S> {
    body: Pin<Box<S>>,
    lines: SseLineBuffer,
    adapter: OpenAiAdapter,
    pending: VecDeque<Result<String>>,
    finish_seen: bool,
    finished: bool,
}

impl<S> SseState<S> {
    fn absorb(&mut self, line: &str) {
        for chunk in self.adapter.parse(line) {
            if self.finished {
                return;
            }
            match chunk {
                ParsedChunk::Content(text) => self.pending.push_back(Ok(text)),
                ParsedChunk::Done { finish_reason: None } => self.finished = true,
                ParsedChunk::Done { finish_reason: Some(reason) } => {
                    debug!(%reason, "Upstream finished");
                    self.finish_seen = true;
                }
                ParsedChunk::Empty => {}
                ParsedChunk::Error(msg) => self.fail(msg),
            }
        }
    }

    fn fail(&mut self, msg: String) {
        self.pending.push_back(Err(Error::stream(msg)));
        self.finished = true;
    }
}

/// One [`OpenAiStreamingClient`] per connection, sharing a connection pool
#[derive(Debug, Clone)]
pub struct OpenAiFactory {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiFactory {
    pub fn from_config(config: &UpstreamConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| Error::config("an API key is required for the openai upstream"))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            api_key,
            model: config.model_name.clone(),
        })
    }
}

impl UpstreamFactory for OpenAiFactory {
    fn create(&self) -> Arc<dyn UpstreamClient> {
        Arc::new(OpenAiStreamingClient::new(
            self.http.clone(),
            &self.base_url,
            self.api_key.clone(),
            self.model.clone(),
        ))
    }
}
