//! Server-initiated push messages.

use serde::{Deserialize, Serialize};

use crate::{EntityPatch, EntityRecord, EntityRef};

/// Push message: `{ type, data }` with no request id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Push {
    /// Replace the receiver's full entity list.
    #[serde(rename = "entities_set")]
    EntitiesSet(Vec<EntityRecord>),
    #[serde(rename = "entity_add")]
    EntityAdd(EntityRecord),
    #[serde(rename = "entity_update")]
    EntityUpdate(EntityPatch),
    #[serde(rename = "entity_remove")]
    EntityRemove(EntityRef),
    /// Batched position update fed by the motion tracker.
    #[serde(rename = "updateEntities")]
    UpdateEntities(Vec<EntityPatch>),
    #[serde(rename = "connected")]
    Connected(Welcome),
    #[serde(rename = "live_motion")]
    LiveMotion(LiveMotion),
}

impl Push {
    pub const KNOWN_TYPES: [&'static str; 7] = [
        "entities_set",
        "entity_add",
        "entity_update",
        "entity_remove",
        "updateEntities",
        "connected",
        "live_motion",
    ];

    /// Wire `type` of this push.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EntitiesSet(_) => "entities_set",
            Self::EntityAdd(_) => "entity_add",
            Self::EntityUpdate(_) => "entity_update",
            Self::EntityRemove(_) => "entity_remove",
            Self::UpdateEntities(_) => "updateEntities",
            Self::Connected(_) => "connected",
            Self::LiveMotion(_) => "live_motion",
        }
    }

    /// Diagram the push is scoped to, if any. Unscoped pushes go to every
    /// connection.
    #[must_use]
    pub fn diagram_id(&self) -> Option<&str> {
        match self {
            Self::EntityAdd(record) => Some(record.diagram_id.as_str()),
            Self::EntityUpdate(patch) => patch.diagram_id.as_deref(),
            Self::EntityRemove(target) => target.diagram_id.as_deref(),
            Self::EntitiesSet(records) => records.first().map(|r| r.diagram_id.as_str()),
            Self::UpdateEntities(patches) => patches.first().and_then(|p| p.diagram_id.as_deref()),
            Self::Connected(_) | Self::LiveMotion(_) => None,
        }
    }
}

/// First message on every connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Welcome {
    pub client_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveMotion {
    pub live: bool,
}
