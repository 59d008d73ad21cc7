//! Push fan-out over the connection registry.
//!
//! DESIGN
//! ======
//! Every connection owns a bounded `mpsc` channel drained by its socket task.
//! Fan-out uses `try_send`: a full channel drops that one push for that one
//! peer, and a closed channel marks the peer for pruning. Pruning happens
//! after the read lock is released so broadcasts never hold the write lock
//! while iterating.

#[cfg(test)]
#[path = "broadcast_test.rs"]
mod tests;

use frames::Push;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::state::{AppState, ClientId};

/// Who receives a broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    /// Connections subscribed to this diagram.
    Diagram(String),
    /// Every open connection.
    All,
}

impl Audience {
    fn includes(&self, subscription: Option<&str>) -> bool {
        match self {
            Self::All => true,
            Self::Diagram(diagram_id) => subscription == Some(diagram_id.as_str()),
        }
    }
}

/// Send `push` to every connection in `audience` except `exclude`.
///
/// Returns the number of connections the push was queued for.
pub async fn broadcast(state: &AppState, audience: &Audience, push: &Push, exclude: Option<&str>) -> usize {
    let mut delivered = 0;
    let mut closed: Vec<ClientId> = Vec::new();
    {
        let clients = state.clients.read().await;
        for (client_id, client) in clients.iter() {
            if exclude == Some(client_id.as_str()) || !audience.includes(client.diagram_id.as_deref()) {
                continue;
            }
            match client.tx.try_send(push.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(%client_id, kind = push.kind(), "client channel full; dropping push");
                }
                Err(TrySendError::Closed(_)) => closed.push(client_id.clone()),
            }
        }
    }

    if !closed.is_empty() {
        let mut clients = state.clients.write().await;
        for client_id in &closed {
            clients.remove(client_id);
        }
        info!(pruned = closed.len(), "pruned closed connections");
    }

    debug!(kind = push.kind(), ?audience, delivered, "broadcast");
    delivered
}

/// Queue `push` for one connection. Returns `false` if it is gone or full.
pub async fn send_to(state: &AppState, client_id: &str, push: Push) -> bool {
    let clients = state.clients.read().await;
    let Some(client) = clients.get(client_id) else {
        return false;
    };
    match client.tx.try_send(push) {
        Ok(()) => true,
        Err(e) => {
            warn!(%client_id, error = %e, "direct push not queued");
            false
        }
    }
}
