use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tracing::info;

use crate::config::{AppConfig, UpstreamMode};
use crate::pipeline::RelayPipeline;
use crate::registry::SessionRegistry;
use crate::upstream::{CannedFactory, OpenAiFactory, UpstreamFactory};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub pipeline: Arc<RelayPipeline>,
    pub registry: Arc<SessionRegistry>,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    /// Build the pipeline and the upstream factory selected by `upstream.mode`
    pub fn from_config(config: AppConfig, metrics_handle: Option<PrometheusHandle>) -> chatgate_core::Result<Self> {
        let pipeline = RelayPipeline::from_config(&config)?;

        let factory: Arc<dyn UpstreamFactory> = match config.upstream.mode {
            UpstreamMode::OpenAi => {
                info!(
                    base_url = %config.upstream.base_url,
                    model = %config.upstream.model_name,
                    "Using OpenAI-compatible upstream"
                );
                Arc::new(OpenAiFactory::from_config(&config.upstream)?)
            }
            UpstreamMode::Mock => {
                info!("Using canned mock upstream");
                Arc::new(CannedFactory::default())
            }
        };

        Ok(Self::new(config, pipeline, factory, metrics_handle))
    }

    pub fn new(
        config: AppConfig,
        pipeline: RelayPipeline,
        factory: Arc<dyn UpstreamFactory>,
        metrics_handle: Option<PrometheusHandle>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
            registry: Arc::new(SessionRegistry::new(factory)),
            metrics_handle,
        }
    }
}
