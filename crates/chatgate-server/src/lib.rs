//! chatgate relay server
//!
//! A WebSocket relay that validates each inbound message, gates it on
//! topical relevance and streams the upstream model's reply back to the
//! client fragment by fragment.

pub mod cli;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod query;
pub mod registry;
pub mod routes;
pub mod security;
pub mod session;
pub mod state;
pub mod upstream;
pub mod websocket;

pub use config::AppConfig;
pub use error::RelayError;
pub use pipeline::RelayPipeline;
pub use query::QueryBuilder;
pub use registry::{ConnectionId, SessionRegistry};
pub use routes::create_router;
pub use session::{CloseReason, InboundFrame, RelaySession, SessionState, APOLOGY};
pub use state::AppState;
pub use upstream::{FragmentStream, UpstreamClient, UpstreamFactory};
