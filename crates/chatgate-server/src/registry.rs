//! Session registry
//!
//! Maps each live connection to its outbound queue and its own upstream
//! client. Guards are never held across an await point.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::error::RelayError;
use crate::upstream::{UpstreamClient, UpstreamFactory};

/// Opaque identity of one client connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Binding {
    client: Arc<dyn UpstreamClient>,
    outbound: mpsc::Sender<String>,
}

/// Live connection bindings
pub struct SessionRegistry {
    factory: Arc<dyn UpstreamFactory>,
    sessions: RwLock<HashMap<ConnectionId, Binding>>,
}

impl SessionRegistry {
    pub fn new(factory: Arc<dyn UpstreamFactory>) -> Self {
        Self {
            factory,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Bind a connection to its outbound queue and a fresh upstream client
    pub fn register(
        &self,
        id: ConnectionId,
        outbound: mpsc::Sender<String>,
    ) -> Result<Arc<dyn UpstreamClient>, RelayError> {
        // Built outside the lock; discarded if the id turns out to be taken
        let client = self.factory.create();

        let mut sessions = self.sessions.write();
        if sessions.contains_key(&id) {
            return Err(RelayError::AlreadyRegistered(id));
        }
        sessions.insert(
            id,
            Binding {
                client: client.clone(),
                outbound,
            },
        );
        let active = sessions.len();
        drop(sessions);

        metrics::counter!("chatgate_connections_total").increment(1);
        metrics::gauge!("chatgate_active_sessions").set(active as f64);
        debug!(connection = %id, upstream = client.name(), active, "Connection registered");

        Ok(client)
    }

    /// Remove a binding. Returns whether one existed.
    pub fn unregister(&self, id: ConnectionId) -> bool {
        let mut sessions = self.sessions.write();
        let removed = sessions.remove(&id).is_some();
        let active = sessions.len();
        drop(sessions);

        if removed {
            metrics::gauge!("chatgate_active_sessions").set(active as f64);
            debug!(connection = %id, active, "Connection unregistered");
        }
        removed
    }

    /// Upstream client bound to a connection
    pub fn lookup(&self, id: ConnectionId) -> Result<Arc<dyn UpstreamClient>, RelayError> {
        self.sessions
            .read()
            .get(&id)
            .map(|binding| binding.client.clone())
            .ok_or(RelayError::NotRegistered(id))
    }

    /// Queue one text frame for a connection.
    ///
    /// A connection that is no longer registered is skipped silently; a
    /// registered connection whose writer has gone away is `Disconnected`.
    pub async fn send(&self, id: ConnectionId, text: String) -> Result<(), RelayError> {
        let outbound = match self.sessions.read().get(&id) {
            Some(binding) => binding.outbound.clone(),
            None => {
                debug!(connection = %id, "Dropping frame for unregistered connection");
                return Ok(());
            }
        };

        outbound
            .send(text)
            .await
            .map_err(|_| RelayError::Disconnected(id))
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.sessions.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

impl fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.len())
            .finish()
    }
}
