//! Document model: diagram entities and the in-memory store that owns them.
//!
//! Each [`Entity`] wraps the plain [`EntityRecord`] that travels on the wire
//! and adds view-only state: the screen projection, the local `selected` flag,
//! and a `moved` dirty flag. Projections are recomputed lazily for moved
//! entities and in bulk whenever the viewport changes.
//!
//! Store order is insertion order and doubles as draw order; later entities
//! draw on top and win hit tests.

#[cfg(test)]
#[path = "doc_test.rs"]
mod doc_test;

use std::fmt;
use std::str::FromStr;

use frames::{EntityPatch, EntityRecord, unique_id};
use tracing::{debug, warn};

use crate::camera::{Projection, Viewport};

/// Errors raised by the entity store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("unknown entity class: {0}")]
    UnknownEntityClass(String),
}

/// Entity variant tag. Behaviour is identical across classes; the tag only
/// gates which records the store accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityClass {
    Actor,
    Prop,
    Scenery,
}

impl EntityClass {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Actor => "actor",
            Self::Prop => "prop",
            Self::Scenery => "scenery",
        }
    }
}

impl fmt::Display for EntityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityClass {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "actor" => Ok(Self::Actor),
            "prop" => Ok(Self::Prop),
            "scenery" => Ok(Self::Scenery),
            other => Err(StoreError::UnknownEntityClass(other.to_owned())),
        }
    }
}

/// A live entity: the wire record plus derived view state.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub record: EntityRecord,
    pub class: EntityClass,
    pub projection: Projection,
    /// Local-only selection highlight.
    pub selected: bool,
    /// Projection is stale.
    pub moved: bool,
}

impl Entity {
    /// Wrap a record, validating its class and computing its projection.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownEntityClass`] if `class` is not recognised.
    pub fn new(record: EntityRecord, viewport: &Viewport) -> Result<Self, StoreError> {
        let class = record.class.parse()?;
        let projection = viewport.project(record.pos_x, record.pos_y, record.size);
        Ok(Self { record, class, projection, selected: false, moved: false })
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.record.id
    }

    #[must_use]
    pub fn diagram_id(&self) -> &str {
        &self.record.diagram_id
    }

    /// Recompute the projection from the current record.
    pub fn reproject(&mut self, viewport: &Viewport) {
        self.projection = viewport.project(self.record.pos_x, self.record.pos_y, self.record.size);
        self.moved = false;
    }
}

/// What a partial update changed, so callers can react.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PatchEffect {
    /// A projected attribute changed.
    pub moved: bool,
    /// New `hasController` value, when the patch carried one that differs.
    pub control_changed: Option<bool>,
}

/// In-memory store of one diagram's entities.
#[derive(Debug, Default)]
pub struct EntityStore {
    entities: Vec<Entity>,
}

impl EntityStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add records, assigning ids to those that lack one.
    ///
    /// Records with an unknown class are logged and dropped; the rest of the
    /// batch still lands. A record whose id already exists replaces the old
    /// entity in place. Returns the ids that were stored.
    pub fn add_entities(&mut self, records: Vec<EntityRecord>, viewport: &Viewport) -> Vec<String> {
        let mut added = Vec::with_capacity(records.len());
        for mut record in records {
            if record.id.is_empty() {
                record.id = unique_id();
            }
            let entity = match Entity::new(record, viewport) {
                Ok(entity) => entity,
                Err(e) => {
                    warn!(error = %e, "dropping entity record");
                    continue;
                }
            };
            added.push(entity.id().to_owned());
            match self.position(entity.id()) {
                Some(i) => self.entities[i] = entity,
                None => self.entities.push(entity),
            }
        }
        added
    }

    /// Remove entities by id. Absent ids are ignored. Returns how many were
    /// removed.
    pub fn remove_entities<S: AsRef<str>>(&mut self, ids: &[S]) -> usize {
        let before = self.entities.len();
        self.entities.retain(|e| !ids.iter().any(|id| id.as_ref() == e.id()));
        before - self.entities.len()
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.id() == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Entity> {
        self.entities.iter_mut().find(|e| e.id() == id)
    }

    /// Merge `patch` into the named entity. Returns `None` for an unknown id.
    ///
    /// A change to a projected field marks the entity `moved`; the projection
    /// itself is refreshed by [`EntityStore::refresh_moved`].
    pub fn apply_partial(&mut self, patch: &EntityPatch) -> Option<PatchEffect> {
        let Some(entity) = self.get_mut(&patch.id) else {
            debug!(id = %patch.id, "partial update for unknown entity");
            return None;
        };
        let had_controller = entity.record.has_controller;
        let moved = entity.record.apply(patch);
        if let Some(class) = &patch.class {
            match class.parse() {
                Ok(parsed) => entity.class = parsed,
                Err(e) => warn!(id = %patch.id, error = %e, "keeping previous entity class"),
            }
        }
        entity.moved |= moved;
        let control_changed = (entity.record.has_controller != had_controller).then_some(entity.record.has_controller);
        Some(PatchEffect { moved, control_changed })
    }

    /// Replace the full entity list, as on `entities_set`.
    pub fn replace_all(&mut self, records: Vec<EntityRecord>, viewport: &Viewport) {
        self.entities.clear();
        self.add_entities(records, viewport);
    }

    /// Plain records with derived and local-only state stripped.
    #[must_use]
    pub fn export_all(&self) -> Vec<EntityRecord> {
        self.entities.iter().map(|e| e.record.clone()).collect()
    }

    /// Recompute projections of entities marked `moved`. Returns how many were
    /// refreshed.
    pub fn refresh_moved(&mut self, viewport: &Viewport) -> usize {
        let mut count = 0;
        for entity in self.entities.iter_mut().filter(|e| e.moved) {
            entity.reproject(viewport);
            count += 1;
        }
        count
    }

    /// Recompute every projection after a viewport change.
    pub fn reproject_all(&mut self, viewport: &Viewport) {
        for entity in &mut self.entities {
            entity.reproject(viewport);
        }
    }

    /// Entities in draw order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Entity> {
        self.entities.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.entities.iter_mut()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.entities.iter().position(|e| e.id() == id)
    }
}
