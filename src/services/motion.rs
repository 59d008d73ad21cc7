//! Motion-tracker ingest.
//!
//! DESIGN
//! ======
//! A tracker feed sends periodic samples of rigid-body channels. Each channel
//! is paired with a controlled entity, first by matching the channel id to an
//! entity id, then by matching the feed's peer address to the address of the
//! connection holding control. The mapped pose is written to the store and
//! broadcast as an ordinary `entity_update`, so clients cannot tell tracker
//! motion from a peer's drag.
//!
//! Samples are dropped while live motion is paused.

#[cfg(test)]
#[path = "motion_test.rs"]
mod tests;

use frames::{Collection, EntityPatch, Push};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::broadcast::{Audience, broadcast};
use crate::state::{AppState, Controller, EntityKey};
use crate::store::DocKey;

/// One tracker message: `{time, channels: [{id, pos, rot}]}`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MotionSample {
    #[serde(default)]
    pub time: f64,
    #[serde(default)]
    pub channels: Vec<MotionChannel>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MotionChannel {
    /// Trackers send either strings or numbers here.
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub pos: Vector3,
    #[serde(default)]
    pub rot: Vector3,
}

impl MotionChannel {
    fn channel_id(&self) -> Option<String> {
        match &self.id {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct Vector3 {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

/// Map a channel pose onto entity fields: floor plane is `x`/`z`, heading is
/// rotation about `y`.
#[must_use]
pub fn pose_patch(key: &EntityKey, channel: &MotionChannel, scale: f64) -> EntityPatch {
    EntityPatch::new(key.id.clone())
        .with_diagram(key.diagram_id.clone())
        .with_position(channel.pos.x * scale, channel.pos.z * scale)
        .with_angle(channel.rot.y)
}

/// Apply one sample from the feed at `source_addr`. Returns the patches that
/// were stored and broadcast.
pub async fn ingest(state: &AppState, sample: &MotionSample, source_addr: Option<&str>) -> Vec<EntityPatch> {
    if !state.is_live() {
        debug!(time = sample.time, "live motion paused; sample dropped");
        return Vec::new();
    }

    let controlled: Vec<(EntityKey, Controller)> = {
        let controllers = state.controllers.read().await;
        let mut entries: Vec<_> = controllers.iter().map(|(k, c)| (k.clone(), c.clone())).collect();
        entries.sort_by(|(a, _), (b, _)| (&a.diagram_id, &a.id).cmp(&(&b.diagram_id, &b.id)));
        entries
    };

    let scale = state.config.motion_scale_factor;
    let mut applied = Vec::new();
    for channel in &sample.channels {
        let Some(key) = resolve(&controlled, channel, source_addr) else {
            debug!(channel = ?channel.id, ?source_addr, "no controlled entity for channel");
            continue;
        };

        let patch = pose_patch(key, channel, scale);
        let fields = match patch.to_data() {
            Ok(fields) => fields,
            Err(e) => {
                warn!(id = %key.id, error = %e, "unencodable tracker pose");
                continue;
            }
        };
        let doc_key = DocKey::new(key.id.clone(), Some(key.diagram_id.clone()));
        match state.store.update_one(Collection::Entities, &doc_key, &fields).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                debug!(id = %key.id, "tracked entity has no stored document");
                continue;
            }
            Err(e) => {
                warn!(id = %key.id, error = %e, "failed to store tracker pose");
                continue;
            }
        }

        let audience = Audience::Diagram(key.diagram_id.clone());
        broadcast(state, &audience, &Push::EntityUpdate(patch.clone()), None).await;
        applied.push(patch);
    }
    applied
}

fn resolve<'a>(
    controlled: &'a [(EntityKey, Controller)],
    channel: &MotionChannel,
    source_addr: Option<&str>,
) -> Option<&'a EntityKey> {
    if let Some(channel_id) = channel.channel_id() {
        if let Some((key, _)) = controlled.iter().find(|(key, _)| key.id == channel_id) {
            return Some(key);
        }
    }
    let source_addr = source_addr?;
    controlled
        .iter()
        .find(|(_, c)| c.remote_addr.as_deref() == Some(source_addr))
        .map(|(key, _)| key)
}
