//! Canned upstream for local runs and tests

use super::{FragmentStream, UpstreamClient, UpstreamFactory};
use async_trait::async_trait;
use chatgate_core::{ChatMessage, Error, Result, Role};
use futures::stream;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_REPLY: &str = "Great question! For a relaxed look, pair a white cotton t-shirt \
    with straight-leg jeans and clean sneakers. Add a light jacket when it gets cooler.";

/// Replays a fixed reply as word-sized fragments
#[derive(Debug, Clone)]
pub struct CannedUpstreamClient {
    fragments: Vec<String>,
    fail_after: Option<usize>,
    delay: Duration,
}

impl CannedUpstreamClient {
    /// Split `reply` into words, each after the first carrying its leading space
    pub fn new(reply: &str) -> Self {
        let fragments: Vec<String> = reply
            .split_whitespace()
            .enumerate()
            .map(|(i, word)| if i == 0 { word.to_string() } else { format!(" {}", word) })
            .collect();
        Self::from_fragments(fragments)
    }

    /// Replay exactly these fragments
    pub fn from_fragments<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fragments: fragments.into_iter().map(Into::into).collect(),
            fail_after: None,
            delay: Duration::ZERO,
        }
    }

    /// End the reply with an upstream error after `n` fragments
    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Pause before every fragment
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Default for CannedUpstreamClient {
    fn default() -> Self {
        Self::new(DEFAULT_REPLY)
    }
}

#[async_trait]
impl UpstreamClient for CannedUpstreamClient {
    async fn stream(&self, query: Vec<ChatMessage>) -> Result<FragmentStream> {
        if !query.iter().any(|m| m.role == Role::User) {
            return Err(Error::upstream("query has no user message"));
        }

        let mut items: Vec<Result<String>> = self.fragments.iter().cloned().map(Ok).collect();
        if let Some(n) = self.fail_after {
            items.truncate(n);
            items.push(Err(Error::upstream("canned upstream failure")));
        }

        let delay = self.delay;
        let fragments = stream::unfold(items.into_iter(), move |mut items| async move {
            let item = items.next()?;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Some((item, items))
        });

        Ok(Box::pin(fragments))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Hands each connection its own copy of a template client
#[derive(Debug, Clone, Default)]
pub struct CannedFactory {
    template: CannedUpstreamClient,
}

impl CannedFactory {
    pub fn new(template: CannedUpstreamClient) -> Self {
        Self { template }
    }
}

impl UpstreamFactory for CannedFactory {
    fn create(&self) -> Arc<dyn UpstreamClient> {
        Arc::new(self.template.clone())
    }
}
