//! chatgate
//!
//! Guarded WebSocket relay in front of a streaming chat model.

use anyhow::Result;
use chatgate_server::cli::{Cli, LogFormat};
use chatgate_server::{create_router, AppConfig, AppState};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.log_format);

    info!("Starting chatgate relay v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::load(&cli.config, &cli)?;
    config.validate()?;
    info!("Configuration loaded successfully");
    info!("Upstream: {:?} ({})", config.upstream.mode, config.upstream.model_name);
    info!(
        "Relevance: {} labels, threshold {}",
        config.relevance.candidate_labels.len(),
        config.relevance.threshold
    );

    // Initialize metrics
    let metrics_handle = init_metrics()?;

    let addr: SocketAddr = format!("{}:{}", config.server.listen, config.server.port).parse()?;
    let prefix = config.server.api_path_prefix.clone();

    let state = AppState::from_config(config, Some(metrics_handle))?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Relay listening on http://{} (prefix {})", addr, prefix);

    let shutdown = async {
        shutdown_signal().await;
        warn!("Shutdown signal received, stopping server...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool, format: LogFormat) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("chatgate=debug,tower_http=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chatgate=info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Initialize metrics exporter and return handle for rendering
fn init_metrics() -> Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    metrics::describe_counter!("chatgate_connections_total", "Total number of WebSocket sessions opened");
    metrics::describe_gauge!("chatgate_active_sessions", "Sessions currently registered");
    metrics::describe_counter!(
        "chatgate_turns_total",
        "Completed turns by outcome (rejected, off_topic, streamed, upstream_error)"
    );
    metrics::describe_counter!("chatgate_fragments_total", "Reply fragments forwarded to clients");
    metrics::describe_histogram!(
        "chatgate_classification_latency_us",
        metrics::Unit::Microseconds,
        "Topic classification latency in microseconds"
    );

    info!("Metrics exporter initialized");
    Ok(handle)
}
