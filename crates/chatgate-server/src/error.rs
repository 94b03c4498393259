//! Relay error types

use crate::registry::ConnectionId;
use thiserror::Error;

/// Failures raised while relaying a turn
#[derive(Debug, Error)]
pub enum RelayError {
    /// No binding exists for the connection
    #[error("Connection {0} is not registered")]
    NotRegistered(ConnectionId),

    /// A binding already exists for the connection
    #[error("Connection {0} is already registered")]
    AlreadyRegistered(ConnectionId),

    /// The connection's outbound side has gone away
    #[error("Connection {0} is disconnected")]
    Disconnected(ConnectionId),

    /// The upstream model failed before or during streaming
    #[error("Upstream failure: {0}")]
    Upstream(#[from] chatgate_core::Error),
}

impl RelayError {
    /// Whether the session can keep serving after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Upstream(_))
    }
}
