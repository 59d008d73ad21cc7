//! Entity control registry: `newPlayer`/`connectPlayer` claims and
//! `quitPlayer` releases.
//!
//! DESIGN
//! ======
//! The in-memory registry in [`AppState::controllers`] is the single source of
//! truth for who drives an entity. Claims are resolved under the registry's
//! write lock, so two racing claims on one entity serialize and the first one
//! wins. A connection drives at most one entity: an accepted claim releases
//! whatever else the claimant held, under the same lock. The store copy of
//! `hasController`/`controllerId` is written after the registry changes; a
//! failed write is logged and does not undo the claim.

#[cfg(test)]
#[path = "control_test.rs"]
mod tests;

use frames::{Collection, ControlClaim, ControlRelease, Data, EntityPatch};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::state::{AppState, ClientId, Controller, EntityKey};
use crate::store::DocKey;

/// Result of a control claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The requester now holds control. `released` lists the entities it
    /// gave up to take this one.
    Accepted { key: EntityKey, controller_id: ClientId, released: Vec<EntityKey> },
    /// Another connection already holds control.
    Rejected { key: EntityKey, holder: ClientId },
}

impl ClaimOutcome {
    #[must_use]
    pub fn key(&self) -> &EntityKey {
        match self {
            Self::Accepted { key, .. } | Self::Rejected { key, .. } => key,
        }
    }

    /// Authoritative control fields for the entity after this claim.
    #[must_use]
    pub fn patch(&self) -> EntityPatch {
        let (key, holder) = match self {
            Self::Accepted { key, controller_id, .. } => (key, controller_id),
            Self::Rejected { key, holder } => (key, holder),
        };
        EntityPatch::new(key.id.clone())
            .with_diagram(key.diagram_id.clone())
            .with_controller(Some(holder.clone()))
    }
}

/// Claim control of an entity for `client_id`. A claim without `diagramId`
/// targets the configured default diagram. Re-claiming an entity the client
/// already holds is accepted. An accepted claim releases every other entity
/// the client held.
pub async fn claim(state: &AppState, client_id: &str, claim: &ControlClaim) -> ClaimOutcome {
    let diagram_id = claim
        .diagram_id
        .clone()
        .unwrap_or_else(|| state.config.default_diagram_id.clone());
    let key = EntityKey::new(diagram_id, claim.id.clone());
    let remote_addr = state.remote_addr(client_id).await;

    let released: Vec<EntityKey> = {
        let mut controllers = state.controllers.write().await;
        if let Some(holder) = controllers.get(&key) {
            if holder.client_id != client_id {
                info!(%client_id, holder = %holder.client_id, id = %key.id, "control claim rejected");
                return ClaimOutcome::Rejected { key, holder: holder.client_id.clone() };
            }
        }
        let held: Vec<EntityKey> = controllers
            .iter()
            .filter(|(k, c)| c.client_id == client_id && **k != key)
            .map(|(k, _)| k.clone())
            .collect();
        for other in &held {
            controllers.remove(other);
        }
        controllers.insert(key.clone(), Controller { client_id: client_id.to_owned(), remote_addr });
        held
    };

    for other in &released {
        info!(%client_id, id = %other.id, "control handed over to new claim");
        persist(state, other, None).await;
    }
    info!(%client_id, id = %key.id, diagram_id = %key.diagram_id, "control claimed");
    persist(state, &key, Some(client_id)).await;
    ClaimOutcome::Accepted { key, controller_id: client_id.to_owned(), released }
}

/// Release control held by `client_id`. Returns the released key, or `None`
/// if the requester was not the holder.
pub async fn release(state: &AppState, client_id: &str, release: &ControlRelease) -> Option<EntityKey> {
    let diagram_id = release
        .diagram_id
        .clone()
        .unwrap_or_else(|| state.config.default_diagram_id.clone());
    let key = EntityKey::new(diagram_id, release.id.clone());

    {
        let mut controllers = state.controllers.write().await;
        match controllers.get(&key) {
            Some(holder) if holder.client_id == client_id => {
                controllers.remove(&key);
            }
            _ => {
                debug!(%client_id, id = %key.id, "release ignored; not the holder");
                return None;
            }
        }
    }

    info!(%client_id, id = %key.id, diagram_id = %key.diagram_id, "control released");
    persist(state, &key, None).await;
    Some(key)
}

/// Release everything `client_id` controls. Used when a connection closes.
pub async fn release_all(state: &AppState, client_id: &str) -> Vec<EntityKey> {
    let released: Vec<EntityKey> = {
        let mut controllers = state.controllers.write().await;
        let keys: Vec<EntityKey> = controllers
            .iter()
            .filter(|(_, c)| c.client_id == client_id)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &keys {
            controllers.remove(key);
        }
        keys
    };

    for key in &released {
        persist(state, key, None).await;
    }
    if !released.is_empty() {
        info!(%client_id, count = released.len(), "released control on disconnect");
    }
    released
}

/// Patch broadcast when control over `key` ends.
#[must_use]
pub fn released_patch(key: &EntityKey) -> EntityPatch {
    EntityPatch::new(key.id.clone())
        .with_diagram(key.diagram_id.clone())
        .with_controller(None)
}

/// Write the control fields to the stored entity.
async fn persist(state: &AppState, key: &EntityKey, controller_id: Option<&str>) {
    let mut fields = Data::new();
    fields.insert("hasController".into(), Value::Bool(controller_id.is_some()));
    fields.insert(
        "controllerId".into(),
        controller_id.map_or(Value::Null, |id| Value::String(id.to_owned())),
    );

    let doc_key = DocKey::new(key.id.clone(), Some(key.diagram_id.clone()));
    match state.store.update_one(Collection::Entities, &doc_key, &fields).await {
        Ok(Some(_)) => {}
        Ok(None) => debug!(id = %key.id, "control target has no stored document"),
        Err(e) => warn!(id = %key.id, error = %e, "failed to persist control fields"),
    }
}
