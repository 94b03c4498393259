//! Per-connection relay loop
//!
//! One `RelaySession` drives one connection through
//! `Idle -> Registered -> (Receiving -> Validating -> Classifying -> Streaming)* -> Closing`.
//! Frames are handled strictly one at a time; the registry binding is
//! released exactly once whichever way the loop ends.

use futures::{Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::error::RelayError;
use crate::pipeline::RelayPipeline;
use crate::registry::{ConnectionId, SessionRegistry};
use crate::upstream::UpstreamClient;
use chatgate_core::ChatMessage;

/// Sent when a turn fails on our side
pub const APOLOGY: &str = "Sorry! There's a problem from our side.";

/// One inbound transport event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// A user turn
    Text(String),
    /// The client closed the channel
    Close,
    /// Binary, ping and pong frames
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Registered,
    Receiving,
    Validating,
    Classifying,
    Streaming,
    Closing,
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Close frame or end of the inbound stream
    ClientClosed,
    /// The transport cancelled the session
    Cancelled,
    /// The outbound side went away mid-turn
    Disconnected,
    /// Registry lost the binding of a live connection
    Fault,
}

/// How a streamed reply ended
enum Streamed {
    Complete(usize),
    Cancelled,
}

/// Releases the registry binding on every exit path
struct Registration {
    registry: Arc<SessionRegistry>,
    id: ConnectionId,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
    }
}

pub struct RelaySession {
    id: ConnectionId,
    pipeline: Arc<RelayPipeline>,
    registry: Arc<SessionRegistry>,
    state: SessionState,
}

impl RelaySession {
    pub fn new(id: ConnectionId, pipeline: Arc<RelayPipeline>, registry: Arc<SessionRegistry>) -> Self {
        Self {
            id,
            pipeline,
            registry,
            state: SessionState::Idle,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Serve the connection until it closes.
    ///
    /// `outbound` is bound in the registry for the lifetime of the call.
    /// Cancelling `cancel` abandons any pending receive or upstream stream.
    pub async fn run<S>(
        mut self,
        outbound: mpsc::Sender<String>,
        mut inbound: S,
        cancel: CancellationToken,
    ) -> CloseReason
    where
        S: Stream<Item = InboundFrame> + Unpin + Send,
    {
        let client = match self.registry.register(self.id, outbound) {
            Ok(client) => client,
            Err(e) => {
                error!(connection = %self.id, error = %e, "Failed to register connection");
                return CloseReason::Fault;
            }
        };
        let registration = Registration {
            registry: Arc::clone(&self.registry),
            id: self.id,
        };
        self.transition(SessionState::Registered);
        info!(connection = %self.id, upstream = client.name(), "Session opened");
        drop(client);

        let reason = loop {
            self.transition(SessionState::Receiving);

            let frame = tokio::select! {
                biased;
                _ = cancel.cancelled() => break CloseReason::Cancelled,
                frame = inbound.next() => frame,
            };

            let text = match frame {
                Some(InboundFrame::Text(text)) => text,
                Some(InboundFrame::Ignored) => continue,
                Some(InboundFrame::Close) | None => break CloseReason::ClientClosed,
            };

            if let Err(reason) = self.handle_turn(&text, &cancel).await {
                break reason;
            }
        };

        self.transition(SessionState::Closing);
        drop(registration);
        info!(connection = %self.id, ?reason, "Session closed");
        reason
    }

    /// Validate, classify and answer one message.
    ///
    /// Rejections and upstream failures are reported to the client and the
    /// session continues; only closing conditions are returned as errors.
    async fn handle_turn(&mut self, text: &str, cancel: &CancellationToken) -> Result<(), CloseReason> {
        self.transition(SessionState::Validating);
        let verdict = self.pipeline.validator.validate(text);
        if !verdict.passed {
            record_turn("rejected");
            return self.reply(verdict.reason).await;
        }

        self.transition(SessionState::Classifying);
        let pertinence = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CloseReason::Cancelled),
            result = self.pipeline.gate.is_pertinent(text, &self.pipeline.reference_weights) => result,
        };

        match pertinence {
            Ok(p) if p.passed => {
                debug!(connection = %self.id, score = p.weighted_average, "Message on topic");
            }
            Ok(p) => {
                debug!(connection = %self.id, score = p.weighted_average, "Message off topic");
                record_turn("off_topic");
                return self.reply(self.pipeline.off_topic_notice.clone()).await;
            }
            Err(e) => {
                warn!(connection = %self.id, error = %e, "Classification failed");
                record_turn("upstream_error");
                return self.reply(APOLOGY.to_string()).await;
            }
        }

        self.transition(SessionState::Streaming);
        let client = self.registry.lookup(self.id).map_err(|e| {
            error!(connection = %self.id, error = %e, "Registry lost a live connection");
            CloseReason::Fault
        })?;
        let query = self.pipeline.query_builder.build(text);

        match self.stream_reply(client, query, cancel).await {
            Ok(Streamed::Complete(fragments)) => {
                debug!(connection = %self.id, fragments, "Reply streamed");
                record_turn("streamed");
                Ok(())
            }
            Ok(Streamed::Cancelled) => Err(CloseReason::Cancelled),
            Err(RelayError::Upstream(e)) => {
                warn!(connection = %self.id, error = %e, "Upstream stream failed");
                record_turn("upstream_error");
                self.reply(APOLOGY.to_string()).await
            }
            Err(RelayError::Disconnected(_)) => Err(CloseReason::Disconnected),
            Err(e) => {
                error!(connection = %self.id, error = %e, "Relay fault");
                Err(CloseReason::Fault)
            }
        }
    }

    /// Forward every non-empty fragment in upstream order
    async fn stream_reply(
        &self,
        client: Arc<dyn UpstreamClient>,
        query: Vec<ChatMessage>,
        cancel: &CancellationToken,
    ) -> Result<Streamed, RelayError> {
        let mut fragments = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(Streamed::Cancelled),
            stream = client.stream(query) => stream?,
        };

        let mut sent = 0;
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(Streamed::Cancelled),
                next = fragments.next() => next,
            };

            let fragment = match next {
                Some(Ok(fragment)) => fragment,
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(Streamed::Complete(sent)),
            };
            if fragment.is_empty() {
                continue;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(Streamed::Cancelled),
                result = self.registry.send(self.id, fragment) => result?,
            }
            sent += 1;
            metrics::counter!("chatgate_fragments_total").increment(1);
        }
    }

    async fn reply(&self, text: String) -> Result<(), CloseReason> {
        self.registry
            .send(self.id, text)
            .await
            .map_err(|_| CloseReason::Disconnected)
    }

    fn transition(&mut self, next: SessionState) {
        trace!(connection = %self.id, from = ?self.state, to = ?next, "Session transition");
        self.state = next;
    }
}

fn record_turn(outcome: &'static str) {
    metrics::counter!("chatgate_turns_total", "outcome" => outcome).increment(1);
}
