use crate::config::UpstreamMode;
use clap::{Parser, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "chatgate")]
#[command(author, version, about = "Guarded WebSocket relay for streaming chat models")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "chatgate.yaml", env = "CHATGATE_CONFIG")]
    pub config: String,

    /// Listen address
    #[arg(short, long)]
    pub listen: Option<String>,

    /// Listen port
    #[arg(short = 'P', long, env = "PORT")]
    pub port: Option<u16>,

    /// Upstream mode: openai or mock
    #[arg(short, long, value_parser = parse_mode)]
    pub mode: Option<UpstreamMode>,

    /// Upstream model name
    #[arg(long, env = "OPENAI_MODEL")]
    pub model: Option<String>,

    /// Upstream API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Upstream base URL
    #[arg(long, env = "OPENAI_BASE_URL")]
    pub base_url: Option<String>,

    /// Deployment environment reported by /health
    #[arg(long, env = "ENVIRONMENT")]
    pub environment: Option<String>,

    /// Build commit reported by /health
    #[arg(long, env = "COMMIT_SHA")]
    pub commit_sha: Option<String>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

fn parse_mode(s: &str) -> Result<UpstreamMode, String> {
    s.parse()
}
