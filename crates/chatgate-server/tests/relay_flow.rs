//! End-to-end relay tests
//!
//! Drive `RelaySession` with scripted topic models and upstream clients,
//! and the HTTP router through `tower::ServiceExt::oneshot`.

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use chatgate_core::{ChatMessage, Error, Result, Role};
use chatgate_guard::{
    RelevanceGate, TopicModel, TopicScores, ValidatorChain, DEFAULT_ALLOWED_PATTERN,
};
use chatgate_server::config::UpstreamMode;
use chatgate_server::upstream::CannedFactory;
use chatgate_server::{
    create_router, AppConfig, AppState, CloseReason, ConnectionId, FragmentStream, InboundFrame,
    QueryBuilder, RelayPipeline, RelaySession, SessionRegistry, UpstreamClient, UpstreamFactory,
    APOLOGY,
};
use futures::channel::mpsc as frames;
use futures::{stream, SinkExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

/// Returns the same scores for every message
struct ScriptedModel {
    scores: TopicScores,
}

impl ScriptedModel {
    fn new(scores: &[(&str, f32)]) -> Self {
        Self {
            scores: scores.iter().map(|(l, s)| (l.to_string(), *s)).collect(),
        }
    }
}

impl TopicModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    fn score(&self, _text: &str, _labels: &[String]) -> Result<TopicScores> {
        Ok(self.scores.clone())
    }
}

/// One scripted reply per turn; records every query it receives
struct ScriptedUpstream {
    replies: Mutex<Vec<Vec<Result<String>>>>,
    queries: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
}

impl ScriptedUpstream {
    fn new(replies: Vec<Vec<Result<String>>>) -> Self {
        Self {
            replies: Mutex::new(replies),
            queries: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl UpstreamClient for ScriptedUpstream {
    async fn stream(&self, query: Vec<ChatMessage>) -> Result<FragmentStream> {
        self.queries.lock().push(query);
        let mut replies = self.replies.lock();
        if replies.is_empty() {
            return Err(Error::upstream("no scripted reply left"));
        }
        let reply = replies.remove(0);
        Ok(Box::pin(stream::iter(reply)))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Never produces a fragment; counts live streams
struct HangingUpstream {
    live: Arc<AtomicUsize>,
}

struct LiveGuard(Arc<AtomicUsize>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl UpstreamClient for HangingUpstream {
    async fn stream(&self, _query: Vec<ChatMessage>) -> Result<FragmentStream> {
        self.live.fetch_add(1, Ordering::SeqCst);
        let guard = LiveGuard(Arc::clone(&self.live));
        let pending = stream::pending::<Result<String>>();
        Ok(Box::pin(stream::unfold(
            (guard, pending),
            |(guard, mut pending)| async move {
                use futures::StreamExt;
                let item = pending.next().await?;
                Some((item, (guard, pending)))
            },
        )))
    }

    fn name(&self) -> &str {
        "hanging"
    }
}

fn fashion_pipeline(scores: &[(&str, f32)]) -> Arc<RelayPipeline> {
    Arc::new(RelayPipeline {
        validator: ValidatorChain::standard(500, DEFAULT_ALLOWED_PATTERN).unwrap(),
        gate: RelevanceGate::new(Arc::new(ScriptedModel::new(scores)), ["fashion"], 0.55),
        reference_weights: HashMap::from([("fashion".to_string(), 1.0)]),
        query_builder: QueryBuilder::new(Some("You are a fashion assistant.".to_string())),
        off_topic_notice: "It looks like the topic you are talking about is irrelevant to fashion!"
            .to_string(),
    })
}

fn registry_for(client: Arc<dyn UpstreamClient>) -> Arc<SessionRegistry> {
    let factory = move || Arc::clone(&client);
    Arc::new(SessionRegistry::new(Arc::new(factory)))
}

fn texts(messages: &[&str]) -> impl futures::Stream<Item = InboundFrame> + Unpin + Send {
    let frames: Vec<_> = messages
        .iter()
        .map(|m| InboundFrame::Text(m.to_string()))
        .collect();
    stream::iter(frames)
}

async fn drain(mut rx: mpsc::Receiver<String>) -> Vec<String> {
    let mut out = Vec::new();
    while let Some(frame) = rx.recv().await {
        out.push(frame);
    }
    out
}

fn ok(fragments: &[&str]) -> Vec<Result<String>> {
    fragments.iter().map(|f| Ok(f.to_string())).collect()
}

#[tokio::test]
async fn test_red_tshirts_streams_three_frames_in_order() {
    let upstream = Arc::new(ScriptedUpstream::new(vec![ok(&[
        "Red",
        "",
        " t-shirts",
        "",
        " are trendy.",
    ])]));
    let queries = Arc::clone(&upstream.queries);
    let registry = registry_for(upstream);
    let session = RelaySession::new(
        ConnectionId::new(),
        fashion_pipeline(&[("fashion", 0.9)]),
        Arc::clone(&registry),
    );
    let (tx, rx) = mpsc::channel(16);

    let reason = session
        .run(tx, texts(&["Tell me about red t-shirts"]), CancellationToken::new())
        .await;

    assert_eq!(reason, CloseReason::ClientClosed);
    assert_eq!(drain(rx).await, vec!["Red", " t-shirts", " are trendy."]);
    assert!(registry.is_empty());

    let queries = queries.lock();
    assert_eq!(queries.len(), 1);
    let last = queries[0].last().unwrap();
    assert_eq!(last.role, Role::User);
    assert_eq!(last.content, "Tell me about red t-shirts");
}

#[tokio::test]
async fn test_rejected_input_never_reaches_upstream() {
    let upstream = Arc::new(ScriptedUpstream::new(vec![ok(&["Sure", "!"])]));
    let queries = Arc::clone(&upstream.queries);
    let session = RelaySession::new(
        ConnectionId::new(),
        fashion_pipeline(&[("fashion", 0.9)]),
        registry_for(upstream),
    );
    let (tx, rx) = mpsc::channel(16);

    session
        .run(
            tx,
            texts(&["<script>alert(1)</script>", "Which shoes match a navy suit?"]),
            CancellationToken::new(),
        )
        .await;

    assert_eq!(drain(rx).await, vec!["Invalid message format", "Sure", "!"]);
    assert_eq!(queries.lock().len(), 1);
}

#[tokio::test]
async fn test_off_topic_message_gets_notice() {
    let upstream = Arc::new(ScriptedUpstream::new(vec![]));
    let queries = Arc::clone(&upstream.queries);
    let session = RelaySession::new(
        ConnectionId::new(),
        fashion_pipeline(&[("fashion", 0.2)]),
        registry_for(upstream),
    );
    let (tx, rx) = mpsc::channel(16);

    session
        .run(tx, texts(&["Who won the match?"]), CancellationToken::new())
        .await;

    assert_eq!(
        drain(rx).await,
        vec!["It looks like the topic you are talking about is irrelevant to fashion!"]
    );
    assert!(queries.lock().is_empty());
}

#[tokio::test]
async fn test_upstream_failure_apologises_and_session_continues() {
    let upstream = Arc::new(ScriptedUpstream::new(vec![
        vec![Ok("Half".to_string()), Err(Error::upstream("connection reset"))],
        ok(&["Second", " answer"]),
    ]));
    let registry = registry_for(upstream);
    let session = RelaySession::new(
        ConnectionId::new(),
        fashion_pipeline(&[("fashion", 0.9)]),
        Arc::clone(&registry),
    );
    let (tx, rx) = mpsc::channel(16);

    let reason = session
        .run(tx, texts(&["First question", "Second question"]), CancellationToken::new())
        .await;

    assert_eq!(reason, CloseReason::ClientClosed);
    assert_eq!(drain(rx).await, vec!["Half", APOLOGY, "Second", " answer"]);
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_upstream_refusing_query_apologises() {
    let upstream = Arc::new(ScriptedUpstream::new(vec![]));
    let session = RelaySession::new(
        ConnectionId::new(),
        fashion_pipeline(&[("fashion", 0.9)]),
        registry_for(upstream),
    );
    let (tx, rx) = mpsc::channel(16);

    session
        .run(tx, texts(&["Any scarf tips?"]), CancellationToken::new())
        .await;

    assert_eq!(drain(rx).await, vec![APOLOGY]);
}

#[tokio::test]
async fn test_cancel_abandons_pending_stream_and_unregisters() {
    let live = Arc::new(AtomicUsize::new(0));
    let upstream: Arc<dyn UpstreamClient> = Arc::new(HangingUpstream {
        live: Arc::clone(&live),
    });
    let registry = registry_for(upstream);
    let session = RelaySession::new(
        ConnectionId::new(),
        fashion_pipeline(&[("fashion", 0.9)]),
        Arc::clone(&registry),
    );
    let (tx, _rx) = mpsc::channel(16);
    let (mut frames_tx, frames_rx) = frames::channel(4);
    let cancel = CancellationToken::new();

    let handle = tokio::spawn(session.run(tx, frames_rx, cancel.clone()));
    frames_tx
        .send(InboundFrame::Text("Any coat ideas?".to_string()))
        .await
        .unwrap();

    // wait until the upstream stream is open
    for _ in 0..100 {
        if live.load(Ordering::SeqCst) == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(live.load(Ordering::SeqCst), 1);

    cancel.cancel();
    let reason = tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("session did not stop on cancel")
        .unwrap();

    assert_eq!(reason, CloseReason::Cancelled);
    assert_eq!(live.load(Ordering::SeqCst), 0);
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_closed_writer_ends_session_quietly() {
    let upstream = Arc::new(ScriptedUpstream::new(vec![ok(&["never", " seen"])]));
    let registry = registry_for(upstream);
    let session = RelaySession::new(
        ConnectionId::new(),
        fashion_pipeline(&[("fashion", 0.9)]),
        Arc::clone(&registry),
    );
    let (tx, rx) = mpsc::channel(16);
    drop(rx);

    let reason = session
        .run(tx, texts(&["Nice boots", "More boots"]), CancellationToken::new())
        .await;

    assert_eq!(reason, CloseReason::Disconnected);
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_concurrent_connections_get_distinct_clients() {
    let created = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&created);
    let factory = move || -> Arc<dyn UpstreamClient> {
        counter.fetch_add(1, Ordering::SeqCst);
        Arc::new(ScriptedUpstream::new(vec![ok(&["hi"])]))
    };
    let registry = Arc::new(SessionRegistry::new(Arc::new(factory)));
    let pipeline = fashion_pipeline(&[("fashion", 0.9)]);

    let (a, b) = (ConnectionId::new(), ConnectionId::new());
    let (tx_a, rx_a) = mpsc::channel(4);
    let (tx_b, rx_b) = mpsc::channel(4);

    let session_a = RelaySession::new(a, Arc::clone(&pipeline), Arc::clone(&registry));
    let session_b = RelaySession::new(b, Arc::clone(&pipeline), Arc::clone(&registry));

    let (reason_a, reason_b) = tokio::join!(
        session_a.run(tx_a, texts(&["Denim jacket?"]), CancellationToken::new()),
        session_b.run(tx_b, texts(&["Linen shirt?"]), CancellationToken::new()),
    );

    assert_eq!(reason_a, CloseReason::ClientClosed);
    assert_eq!(reason_b, CloseReason::ClientClosed);
    assert_eq!(created.load(Ordering::SeqCst), 2);
    assert_eq!(drain(rx_a).await, vec!["hi"]);
    assert_eq!(drain(rx_b).await, vec!["hi"]);
    assert!(registry.is_empty());
}

fn test_state(prefix: &str) -> AppState {
    let mut config = AppConfig::default();
    config.upstream.mode = UpstreamMode::Mock;
    config.server.api_path_prefix = prefix.to_string();
    config.server.environment = Some("test".to_string());
    config.server.commit_sha = Some("abc123".to_string());

    let pipeline = RelayPipeline::from_config(&config).unwrap();
    let factory: Arc<dyn UpstreamFactory> = Arc::new(CannedFactory::default());
    AppState::new(config, pipeline, factory, None)
}

async fn get_json(state: AppState, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = create_router(state)
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_health_reports_build_info() {
    let (status, body) = get_json(test_state("/"), "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OK");
    assert_eq!(body["environment"], "test");
    assert_eq!(body["commit_sha"], "abc123");
}

#[tokio::test]
async fn test_intent_score_uses_relevance_gate() {
    let (status, body) = get_json(
        test_state("/"),
        "/intent/score?text=What%20dress%20should%20I%20wear",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_pertinent"], true);
    assert!(body["topics"]["fashion"].as_f64().unwrap() > 0.55);

    let (_, body) = get_json(test_state("/"), "/intent/score?text=Who%20won%20the%20election").await;
    assert_eq!(body["is_pertinent"], false);
}

#[tokio::test]
async fn test_routes_nest_under_prefix() {
    let (status, _) = get_json(test_state("/api/v1"), "/api/v1/health").await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = get_json(test_state("/api/v1"), "/health").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_metrics_without_exporter_is_unavailable() {
    let (status, _) = get_json(test_state("/"), "/metrics").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}
