//! Upstream streaming model clients
//!
//! One client instance is created per connection by an [`UpstreamFactory`]
//! and lives for as long as that connection's binding.

mod mock;
mod openai;

pub use mock::{CannedFactory, CannedUpstreamClient};
pub use openai::{OpenAiFactory, OpenAiStreamingClient};

use async_trait::async_trait;
use chatgate_core::{ChatMessage, Result};
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;

/// Reply fragments in upstream order; an `Err` item ends the reply
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A streaming chat model
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Submit a query and stream the reply.
    ///
    /// Dropping the returned stream abandons the reply.
    async fn stream(&self, query: Vec<ChatMessage>) -> Result<FragmentStream>;

    fn name(&self) -> &str;
}

/// Produces one upstream client per connection
pub trait UpstreamFactory: Send + Sync {
    fn create(&self) -> Arc<dyn UpstreamClient>;
}

impl<F> UpstreamFactory for F
where
    F: Fn() -> Arc<dyn UpstreamClient> + Send + Sync,
{
    fn create(&self) -> Arc<dyn UpstreamClient> {
        self()
    }
}
