#[cfg(test)]
#[path = "hit_test.rs"]
mod hit_test;

use crate::camera::Point;
use crate::doc::{Entity, EntityStore};

/// Whether `screen_pt` lies strictly inside the entity's screen circle.
#[must_use]
pub fn contains(entity: &Entity, screen_pt: Point) -> bool {
    let p = &entity.projection;
    let dist = (p.screen_x - screen_pt.x).hypot(p.screen_y - screen_pt.y);
    dist < p.screen_size / 2.0
}

/// Ids of every entity under `screen_pt`, in draw order.
#[must_use]
pub fn hits_at(store: &EntityStore, screen_pt: Point) -> Vec<String> {
    store
        .iter()
        .filter(|e| contains(e, screen_pt))
        .map(|e| e.id().to_owned())
        .collect()
}

/// Topmost entity under `screen_pt`, if any.
#[must_use]
pub fn hit_test(store: &EntityStore, screen_pt: Point) -> Option<&Entity> {
    store.iter().rev().find(|e| contains(e, screen_pt))
}
