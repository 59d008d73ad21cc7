//! Document verbs: `getOne`, `getAll`, `update`, `remove`, `createInstance`,
//! and the subscription snapshot.
//!
//! DESIGN
//! ======
//! Non-entity collections are passed through to the store as-is. Entities get
//! typed handling:
//! - `createInstance` must parse as an [`EntityRecord`]; control fields are
//!   reset so a new entity starts uncontrolled.
//! - `update` must parse as an [`EntityPatch`] (field whitelist). Control
//!   fields are stripped; only the control verbs change them.
//! - `remove` also drops any control registry entry for the entity.
//!
//! Results carry the typed record or patch so the route layer can build the
//! matching push without re-reading the store.

#[cfg(test)]
#[path = "document_test.rs"]
mod tests;

use frames::{Collection, Data, EntityPatch, EntityRecord, EntityRef, ProtocolError};
use serde_json::Value;
use tracing::{info, warn};

use super::RequestError;
use crate::state::{AppState, EntityKey};
use crate::store::{DocKey, diagram_of};

/// Result of a successful `update`.
#[derive(Debug, Clone, PartialEq)]
pub struct Updated {
    pub document: Data,
    /// Entity patch to broadcast, with `diagramId` filled from the document.
    /// `None` for non-entity collections and for no-op entity patches.
    pub patch: Option<EntityPatch>,
}

/// Result of a successful `createInstance`.
#[derive(Debug, Clone, PartialEq)]
pub struct Created {
    pub document: Data,
    pub entity: Option<EntityRecord>,
}

// =============================================================================
// READS
// =============================================================================

/// First document matching `query`.
///
/// # Errors
///
/// Returns [`RequestError::Store`] if the store call fails.
pub async fn get_one(state: &AppState, collection: Collection, query: Data) -> Result<Option<Data>, RequestError> {
    Ok(state.store.find_one(collection, &normalize(query)).await?)
}

/// Every document matching `query`.
///
/// # Errors
///
/// Returns [`RequestError::Store`] if the store call fails.
pub async fn get_all(state: &AppState, collection: Collection, query: Data) -> Result<Vec<Data>, RequestError> {
    Ok(state.store.find_all(collection, &normalize(query)).await?)
}

/// Entity records of one diagram. Documents that do not parse as entities are
/// logged and skipped.
///
/// # Errors
///
/// Returns [`RequestError::Store`] if the store call fails.
pub async fn entities_in(state: &AppState, diagram_id: &str) -> Result<Vec<EntityRecord>, RequestError> {
    let mut query = Data::new();
    query.insert("diagramId".into(), Value::String(diagram_id.to_owned()));
    let docs = state.store.find_all(Collection::Entities, &query).await?;

    Ok(docs
        .iter()
        .filter_map(|doc| match EntityRecord::from_data(doc) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(%diagram_id, error = %e, "skipping malformed entity document");
                None
            }
        })
        .collect())
}

// =============================================================================
// WRITES
// =============================================================================

/// Merge `data` into the document it names by `id`.
///
/// Returns `None` when no document matched. An entity patch left with nothing
/// to change after control stripping writes nothing and carries no patch.
///
/// # Errors
///
/// Returns [`RequestError::InvalidField`] for an entity patch outside the
/// whitelist, a missing-`id` protocol error, or a store failure.
pub async fn update(state: &AppState, collection: Collection, data: Data) -> Result<Option<Updated>, RequestError> {
    if collection != Collection::Entities {
        let id = data
            .get("id")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingField("id"))?;
        let key = DocKey::new(id, diagram_of(&data).map(str::to_owned));
        let document = state.store.update_one(collection, &key, &data).await?;
        return Ok(document.map(|document| Updated { document, patch: None }));
    }

    let mut patch = EntityPatch::from_data(&data).map_err(|e| RequestError::InvalidField(e.to_string()))?;
    if patch.has_controller.is_some() || patch.controller_id.is_some() {
        warn!(id = %patch.id, "stripping control fields from client update");
        patch.strip_control();
    }

    let key = DocKey::new(patch.id.clone(), patch.diagram_id.clone());
    if !patch.has_changes() {
        let mut query = Data::new();
        query.insert("id".into(), Value::String(key.id.clone()));
        if let Some(diagram_id) = &key.diagram_id {
            query.insert("diagramId".into(), Value::String(diagram_id.clone()));
        }
        let document = state.store.find_one(collection, &query).await?;
        return Ok(document.map(|document| Updated { document, patch: None }));
    }

    let fields = patch.to_data()?;
    let Some(document) = state.store.update_one(collection, &key, &fields).await? else {
        return Ok(None);
    };

    if patch.diagram_id.is_none() {
        patch.diagram_id = diagram_of(&document).map(str::to_owned);
    }
    Ok(Some(Updated { document, patch: Some(patch) }))
}

/// Delete the addressed document. Returns what was removed, or `None` if
/// nothing matched; removing twice is not an error.
///
/// # Errors
///
/// Returns [`RequestError::Store`] if the store call fails.
pub async fn remove(
    state: &AppState,
    collection: Collection,
    id: &str,
    diagram_id: Option<String>,
) -> Result<Option<EntityRef>, RequestError> {
    let key = DocKey::new(id, diagram_id);
    let Some(document) = state.store.delete_one(collection, &key).await? else {
        return Ok(None);
    };

    let diagram_id = diagram_of(&document).map(str::to_owned);
    if collection == Collection::Entities {
        if let Some(diagram_id) = &diagram_id {
            let released = state
                .controllers
                .write()
                .await
                .remove(&EntityKey::new(diagram_id.clone(), id));
            if let Some(controller) = released {
                info!(%id, client_id = %controller.client_id, "control dropped with removed entity");
            }
        }
    }
    Ok(Some(EntityRef { id: id.to_owned(), diagram_id }))
}

/// Insert a new document.
///
/// # Errors
///
/// Returns [`RequestError::InvalidField`] when an entity record does not
/// parse, or [`RequestError::Store`] for a duplicate id or store failure.
pub async fn create(state: &AppState, collection: Collection, data: Data) -> Result<Created, RequestError> {
    if collection != Collection::Entities {
        let document = state.store.create(collection, data).await?;
        return Ok(Created { document, entity: None });
    }

    let mut record = EntityRecord::from_data(&data).map_err(|e| RequestError::InvalidField(e.to_string()))?;
    if record.id.is_empty() {
        record.id = frames::unique_id();
    }
    record.has_controller = false;
    record.controller_id = None;

    let document = state.store.create(collection, record.to_data()?).await?;
    Ok(Created { document, entity: Some(record) })
}

// =============================================================================
// HELPERS
// =============================================================================

/// Rewrite the legacy `diagramID` query key.
fn normalize(mut query: Data) -> Data {
    if let Some(diagram_id) = query.remove("diagramID") {
        query.entry("diagramId").or_insert(diagram_id);
    }
    query
}
