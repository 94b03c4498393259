//! Error types for chatgate

/// Result type alias using chatgate's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for chatgate operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Upstream model request or transport errors
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Topic classification errors
    #[error("classifier error: {0}")]
    Classifier(String),

    /// Malformed or truncated completion stream
    #[error("stream error: {0}")]
    Stream(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Network/IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a new upstream error
    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::Upstream(msg.into())
    }

    /// Create a new classifier error
    pub fn classifier(msg: impl Into<String>) -> Self {
        Self::Classifier(msg.into())
    }

    /// Create a new stream error
    pub fn stream(msg: impl Into<String>) -> Self {
        Self::Stream(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
