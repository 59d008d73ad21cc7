//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! holds the document store, the live connection registry, the control
//! registry, and the server-wide live-motion flag.
//!
//! The connection registry maps each client id to the sender half of that
//! connection's outbound push channel plus its diagram subscription. The
//! control registry maps `(diagramId, id)` to the connection driving that
//! entity; at most one entry exists per entity, which is what makes control
//! exclusive.

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use frames::Push;
use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use crate::config::Config;
use crate::store::{DocumentStore, MemoryStore};

/// Opaque per-connection identifier, also used as `controllerId`.
pub type ClientId = String;

/// Fresh client id.
#[must_use]
pub fn new_client_id() -> ClientId {
    Uuid::new_v4().to_string()
}

// =============================================================================
// CONNECTIONS
// =============================================================================

/// One live connection as seen by broadcasters.
#[derive(Debug, Clone)]
pub struct ConnectedClient {
    pub tx: mpsc::Sender<Push>,
    /// Diagram this connection subscribed to, if any.
    pub diagram_id: Option<String>,
    /// Peer IP, used to pair tracker feeds with claimants.
    pub remote_addr: Option<String>,
}

impl ConnectedClient {
    #[must_use]
    pub fn new(tx: mpsc::Sender<Push>, remote_addr: Option<String>) -> Self {
        Self { tx, diagram_id: None, remote_addr }
    }
}

// =============================================================================
// CONTROL
// =============================================================================

/// Entity address inside the control registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityKey {
    pub diagram_id: String,
    pub id: String,
}

impl EntityKey {
    #[must_use]
    pub fn new(diagram_id: impl Into<String>, id: impl Into<String>) -> Self {
        Self { diagram_id: diagram_id.into(), id: id.into() }
    }
}

/// Who drives a controlled entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Controller {
    pub client_id: ClientId,
    pub remote_addr: Option<String>,
}

// =============================================================================
// APP STATE
// =============================================================================

/// Shared application state. Clone is required by Axum; every field is an
/// `Arc` or cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn DocumentStore>,
    pub clients: Arc<RwLock<HashMap<ClientId, ConnectedClient>>>,
    pub controllers: Arc<RwLock<HashMap<EntityKey, Controller>>>,
    live: Arc<AtomicBool>,
}

impl AppState {
    #[must_use]
    pub fn new(config: Config, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            config: Arc::new(config),
            store,
            clients: Arc::new(RwLock::new(HashMap::new())),
            controllers: Arc::new(RwLock::new(HashMap::new())),
            live: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Whether tracker samples are currently applied.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Relaxed)
    }

    /// Set the live-motion flag. Returns the previous value.
    pub fn set_live(&self, live: bool) -> bool {
        self.live.swap(live, Ordering::Relaxed)
    }

    /// Register a connection.
    pub async fn connect(&self, client_id: &str, client: ConnectedClient) {
        self.clients.write().await.insert(client_id.to_owned(), client);
    }

    /// Drop a connection from the registry.
    pub async fn disconnect(&self, client_id: &str) -> Option<ConnectedClient> {
        self.clients.write().await.remove(client_id)
    }

    /// Record the diagram a connection subscribed to.
    pub async fn subscribe(&self, client_id: &str, diagram_id: &str) -> bool {
        let mut clients = self.clients.write().await;
        let Some(client) = clients.get_mut(client_id) else {
            return false;
        };
        client.diagram_id = Some(diagram_id.to_owned());
        true
    }

    /// Peer IP of a connection.
    pub async fn remote_addr(&self, client_id: &str) -> Option<String> {
        self.clients
            .read()
            .await
            .get(client_id)
            .and_then(|c| c.remote_addr.clone())
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(Config::default(), Arc::new(MemoryStore::new()))
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
pub mod test_helpers {
    use frames::{Collection, Data, EntityRecord};
    use tokio::time::{Duration, timeout};

    use super::*;

    /// State over an empty in-memory store.
    #[must_use]
    pub fn test_app_state() -> AppState {
        AppState::default()
    }

    /// State whose store holds `records` in the entities collection.
    #[must_use]
    pub fn test_app_state_with_entities(records: &[EntityRecord]) -> AppState {
        let docs: Vec<Data> = records
            .iter()
            .map(|r| r.to_data().expect("record should encode"))
            .collect();
        AppState::new(
            Config::default(),
            Arc::new(MemoryStore::with_documents(Collection::Entities, docs)),
        )
    }

    /// Actor record in diagram `1`.
    #[must_use]
    pub fn actor(id: &str) -> EntityRecord {
        EntityRecord::new(id, "1", "actor")
    }

    /// Register a client, optionally subscribed, and return its push receiver.
    pub async fn seed_client(state: &AppState, client_id: &str, diagram_id: Option<&str>) -> mpsc::Receiver<Push> {
        let (tx, rx) = mpsc::channel(16);
        let mut client = ConnectedClient::new(tx, Some("127.0.0.1".into()));
        client.diagram_id = diagram_id.map(str::to_owned);
        state.connect(client_id, client).await;
        rx
    }

    pub async fn recv_push(rx: &mut mpsc::Receiver<Push>) -> Push {
        timeout(Duration::from_millis(500), rx.recv())
            .await
            .expect("push receive timed out")
            .expect("push channel closed unexpectedly")
    }

    pub async fn assert_no_push(rx: &mut mpsc::Receiver<Push>) {
        assert!(
            timeout(Duration::from_millis(80), rx.recv()).await.is_err(),
            "expected no push"
        );
    }
}
