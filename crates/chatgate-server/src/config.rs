//! Relay configuration
//!
//! Loaded once at startup from YAML plus CLI/env overrides, validated, and
//! then shared read-only behind an `Arc`.

use chatgate_guard::{PatternRule, ReferenceWeights, DEFAULT_ALLOWED_PATTERN};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use crate::cli::Cli;
use crate::security::{validate_upstream_url, UrlPolicy};

/// Complete relay configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub validation: ValidationConfig,

    #[serde(default)]
    pub relevance: RelevanceConfig,

    #[serde(default)]
    pub upstream: UpstreamConfig,
}

impl AppConfig {
    /// Load configuration from file and CLI overrides
    pub fn load(config_path: &str, cli: &Cli) -> anyhow::Result<Self> {
        // Try to load from file, or use defaults
        let mut config = if Path::new(config_path).exists() {
            let content = std::fs::read_to_string(config_path)?;
            Self::from_yaml(&content)?
        } else {
            tracing::info!("Config file {} not found, using defaults", config_path);
            Self::default()
        };

        config.apply_overrides(cli);
        Ok(config)
    }

    /// Parse a YAML document; missing sections and fields take defaults
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Apply CLI flags (and their environment fallbacks) on top of the file
    pub fn apply_overrides(&mut self, cli: &Cli) {
        if let Some(listen) = &cli.listen {
            self.server.listen = listen.clone();
        }
        if let Some(port) = cli.port {
            self.server.port = port;
        }
        if let Some(environment) = &cli.environment {
            self.server.environment = Some(environment.clone());
        }
        if let Some(commit_sha) = &cli.commit_sha {
            self.server.commit_sha = Some(commit_sha.clone());
        }
        if let Some(mode) = cli.mode {
            self.upstream.mode = mode;
        }
        if let Some(model) = &cli.model {
            self.upstream.model_name = model.clone();
        }
        if let Some(base_url) = &cli.base_url {
            self.upstream.base_url = base_url.clone();
        }
        if let Some(api_key) = &cli.api_key {
            self.upstream.api_key = Some(api_key.clone());
        }
    }

    /// Reject values that would otherwise fail on the first request
    pub fn validate(&self) -> anyhow::Result<()> {
        let prefix = &self.server.api_path_prefix;
        if !prefix.starts_with('/') {
            anyhow::bail!("server.api_path_prefix must start with '/', got {:?}", prefix);
        }

        if self.validation.max_length == 0 {
            anyhow::bail!("validation.max_length must be greater than zero");
        }
        PatternRule::new(&self.validation.regex_pattern)?;

        let threshold = self.relevance.threshold;
        if !(0.0..=1.0).contains(&threshold) {
            anyhow::bail!("relevance.threshold must be within [0, 1], got {}", threshold);
        }
        if self.relevance.candidate_labels.is_empty() {
            anyhow::bail!("relevance.candidate_labels must name at least one topic");
        }
        for (label, weight) in &self.relevance.candidate_labels {
            if !weight.is_finite() || *weight < 0.0 {
                anyhow::bail!(
                    "relevance.candidate_labels.{} must be a non-negative number, got {}",
                    label,
                    weight
                );
            }
        }

        if self.upstream.outbound_buffer == 0 {
            anyhow::bail!("upstream.outbound_buffer must be greater than zero");
        }
        if self.upstream.mode == UpstreamMode::OpenAi {
            if self.upstream.api_key.as_deref().map_or(true, str::is_empty) {
                anyhow::bail!("upstream.api_key (or OPENAI_API_KEY) is required in openai mode");
            }
            let policy = if self.upstream.allow_insecure {
                UrlPolicy::development()
            } else {
                UrlPolicy::default()
            };
            validate_upstream_url(&self.upstream.base_url, &policy)?;
        }

        Ok(())
    }
}

/// HTTP listener and service identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Prefix under which every route is mounted
    #[serde(default = "default_prefix")]
    pub api_path_prefix: String,

    /// Deployment environment reported by the health probe
    #[serde(default)]
    pub environment: Option<String>,

    /// Build commit reported by the health probe
    #[serde(default)]
    pub commit_sha: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            port: default_port(),
            api_path_prefix: default_prefix(),
            environment: None,
            commit_sha: None,
        }
    }
}

/// Input validation chain settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Maximum message length in characters
    #[serde(default = "default_max_length")]
    pub max_length: usize,

    /// Allow-list pattern the whole message must match
    #[serde(default = "default_pattern")]
    pub regex_pattern: String,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_length: default_max_length(),
            regex_pattern: default_pattern(),
        }
    }
}

/// Relevance gate settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelevanceConfig {
    /// Candidate topics and their reference weights
    #[serde(default = "default_candidate_labels")]
    pub candidate_labels: HashMap<String, f32>,

    /// Weighted average must be strictly above this
    #[serde(default = "default_threshold")]
    pub threshold: f32,

    /// Extra keywords per topic for the built-in keyword model
    #[serde(default = "default_topic_keywords")]
    pub topic_keywords: HashMap<String, Vec<String>>,

    /// Message sent when a message is off topic
    #[serde(default = "default_off_topic_notice")]
    pub off_topic_notice: String,
}

impl RelevanceConfig {
    /// Reference weights for the gate, one per candidate label
    pub fn reference_weights(&self) -> ReferenceWeights {
        self.candidate_labels.clone()
    }
}

impl Default for RelevanceConfig {
    fn default() -> Self {
        Self {
            candidate_labels: default_candidate_labels(),
            threshold: default_threshold(),
            topic_keywords: default_topic_keywords(),
            off_topic_notice: default_off_topic_notice(),
        }
    }
}

/// Which upstream implementation serves completions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamMode {
    /// OpenAI-compatible streaming chat completions
    #[default]
    #[serde(rename = "openai")]
    OpenAi,
    /// Canned replies, no network access
    Mock,
}

impl FromStr for UpstreamMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "mock" => Ok(Self::Mock),
            other => Err(format!("unknown upstream mode '{}', expected openai or mock", other)),
        }
    }
}

/// Upstream model settings
#[derive(Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default)]
    pub mode: UpstreamMode,

    /// Base URL of the chat completions API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token; never serialized back out
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Model identifier sent with every query
    #[serde(default = "default_model_name")]
    pub model_name: String,

    /// System message prepended to every query
    #[serde(default = "default_system_prompt")]
    pub system_prompt: Option<String>,

    /// Whole-request timeout, including the streamed body
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Capacity of each connection's outbound fragment queue
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,

    /// Permit plain-HTTP and loopback base URLs (local model servers)
    #[serde(default)]
    pub allow_insecure: bool,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            mode: UpstreamMode::default(),
            base_url: default_base_url(),
            api_key: None,
            model_name: default_model_name(),
            system_prompt: default_system_prompt(),
            request_timeout_secs: default_request_timeout(),
            outbound_buffer: default_outbound_buffer(),
            allow_insecure: false,
        }
    }
}

impl std::fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("mode", &self.mode)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model_name", &self.model_name)
            .field("system_prompt", &self.system_prompt)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("outbound_buffer", &self.outbound_buffer)
            .field("allow_insecure", &self.allow_insecure)
            .finish()
    }
}

fn default_listen() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_prefix() -> String {
    "/".to_string()
}

fn default_max_length() -> usize {
    500
}

fn default_pattern() -> String {
    DEFAULT_ALLOWED_PATTERN.to_string()
}

fn default_candidate_labels() -> HashMap<String, f32> {
    HashMap::from([("fashion".to_string(), 1.0)])
}

fn default_threshold() -> f32 {
    0.55
}

fn default_topic_keywords() -> HashMap<String, Vec<String>> {
    let fashion = [
        "fashion", "style", "stylish", "outfit", "clothing", "clothes", "wear", "wearing",
        "wardrobe", "dress", "shirt", "t-shirt", "blouse", "jeans", "trouser", "pants", "skirt",
        "jacket", "coat", "sweater", "hoodie", "suit", "shoe", "sneaker", "boot", "heel",
        "sandal", "hat", "scarf", "accessory", "accessories", "jewelry", "jewellery", "handbag",
        "bag", "fabric", "cotton", "linen", "denim", "silk", "wool", "colour", "color", "trend",
        "trendy", "designer", "runway", "tailor", "tailored", "fit", "size",
    ];
    HashMap::from([(
        "fashion".to_string(),
        fashion.iter().map(|s| s.to_string()).collect(),
    )])
}

fn default_off_topic_notice() -> String {
    "It looks like the topic you are talking about is irrelevant to fashion!".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model_name() -> String {
    "gpt-4o-mini".to_string()
}

fn default_system_prompt() -> Option<String> {
    Some(
        "You are a friendly fashion assistant. Answer questions about clothing, \
         style and outfits concisely."
            .to_string(),
    )
}

fn default_request_timeout() -> u64 {
    120
}

fn default_outbound_buffer() -> usize {
    64
}
