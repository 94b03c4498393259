//! HTTP routes and handlers

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::warn;

use chatgate_guard::TopicScores;

use crate::state::AppState;
use crate::websocket::websocket_handler;

pub fn create_router(state: AppState) -> Router {
    let prefix = state.config.server.api_path_prefix.trim_end_matches('/').to_string();

    let routes = Router::new()
        .route("/health", get(health_check))
        .route("/intent/score", get(intent_score))
        .route("/metrics", get(metrics))
        .route("/ws", get(websocket_handler));

    let router = if prefix.is_empty() {
        routes
    } else {
        Router::new().nest(&prefix, routes)
    };

    router
        .fallback(fallback)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub environment: Option<String>,
    pub commit_sha: Option<String>,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let server = &state.config.server;
    Json(HealthResponse {
        status: "OK".to_string(),
        environment: server.environment.clone(),
        commit_sha: server.commit_sha.clone(),
    })
}

#[derive(Debug, Deserialize)]
struct IntentQuery {
    text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IntentScore {
    pub is_pertinent: bool,
    pub topics: TopicScores,
}

/// Run the relevance gate on `text` without opening a session
async fn intent_score(
    State(state): State<AppState>,
    Query(query): Query<IntentQuery>,
) -> Result<Json<IntentScore>, AppError> {
    let pipeline = &state.pipeline;
    let pertinence = pipeline
        .gate
        .is_pertinent(&query.text, &pipeline.reference_weights)
        .await?;

    Ok(Json(IntentScore {
        is_pertinent: pertinence.passed,
        topics: pertinence.scores,
    }))
}

async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics_handle {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics exporter not installed").into_response(),
    }
}

async fn fallback() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not found")
}

/// Error handling
#[derive(Debug)]
enum AppError {
    Classifier(String),
}

impl From<chatgate_core::Error> for AppError {
    fn from(err: chatgate_core::Error) -> Self {
        AppError::Classifier(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Classifier(msg) => {
                warn!("Intent scoring failed: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = json!({
            "error": {
                "message": message,
            }
        });

        (status, Json(body)).into_response()
    }
}
