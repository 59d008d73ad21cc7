use std::time::{Duration, Instant};

use frames::{EntityPatch, EntityRecord};
use tracing::{debug, info};

use crate::animate::{Animator, Target, Timing};
use crate::camera::{Point, Viewport};
use crate::consts::{ROTATE_STEP, WHEEL_SPEED};
use crate::doc::{Entity, EntityStore, PatchEffect};
use crate::hit;
use crate::input::{Button, ControlState, EntityState, InputState, Modifiers, WheelDelta, entity_state};

#[cfg(test)]
#[path = "engine_test.rs"]
mod engine_test;

/// Actions returned from input handlers for the host to send.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Local optimistic mutation to push through the coalescing queue.
    Update(EntityPatch),
    /// Ask the server for exclusive control of an entity.
    ClaimControl { id: String, diagram_id: String },
    /// Give up control of an entity this client drives.
    ReleaseControl { id: String, diagram_id: String },
}

/// Core engine state: entity store, viewport, input gesture, and control.
///
/// All local mutation is synchronous. Every mutation sets the redraw flag;
/// the host consumes it once per frame with [`EngineCore::take_redraw`].
#[derive(Debug, Default)]
pub struct EngineCore {
    pub store: EntityStore,
    pub viewport: Viewport,
    pub input: InputState,
    pub control: ControlState,
    pub animator: Animator,
    needs_redraw: bool,
}

impl EngineCore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // --- Redraw contract ---

    #[must_use]
    pub fn needs_redraw(&self) -> bool {
        self.needs_redraw
    }

    /// Consume the redraw flag, refreshing stale projections first.
    pub fn take_redraw(&mut self) -> bool {
        if !self.needs_redraw {
            return false;
        }
        self.store.refresh_moved(&self.viewport);
        self.needs_redraw = false;
        true
    }

    fn mark_dirty(&mut self) {
        self.needs_redraw = true;
    }

    // --- Data inputs (server pushes) ---

    /// Record the id the server assigned this connection.
    pub fn set_client_id(&mut self, client_id: impl Into<String>) {
        self.control.client_id = Some(client_id.into());
        self.mark_dirty();
    }

    /// Replace every entity, as on `entities_set` or a subscribe reply.
    pub fn load_entities(&mut self, records: Vec<EntityRecord>) {
        self.store.replace_all(records, &self.viewport);
        self.input = InputState::Idle;
        self.reconcile_local_control();
        self.mark_dirty();
    }

    /// Apply `entity_add`.
    pub fn apply_add(&mut self, record: EntityRecord) {
        self.store.add_entities(vec![record], &self.viewport);
        self.reconcile_local_control();
        self.mark_dirty();
    }

    /// Apply `entity_update`, reconciling control against the broadcast.
    pub fn apply_update(&mut self, patch: &EntityPatch) -> Option<PatchEffect> {
        let effect = self.store.apply_partial(patch)?;
        let id = patch.id.as_str();

        if effect.control_changed.is_some() || patch.controller_id.is_some() {
            let state = self.state_of(id);
            match state {
                Some(EntityState::ControlledRemote) => {
                    if self.control.local.as_deref() == Some(id) {
                        info!(%id, "local control overridden by server");
                        self.control.local = None;
                    }
                    if self.control.pending_claim.as_deref() == Some(id) {
                        self.control.pending_claim = None;
                    }
                    self.animator.cancel(id);
                    if let Some(entity) = self.store.get_mut(id) {
                        entity.selected = false;
                    }
                }
                Some(EntityState::ControlledLocal) => {
                    self.hand_over_local_control(id);
                    self.control.local = Some(id.to_owned());
                    self.control.pending_claim = None;
                }
                Some(EntityState::Idle | EntityState::Selected) | None => {
                    if self.control.local.as_deref() == Some(id) {
                        debug!(%id, "local control released");
                        self.control.local = None;
                    }
                }
            }
        }
        self.mark_dirty();
        Some(effect)
    }

    /// Apply `entity_remove`.
    pub fn apply_remove(&mut self, id: &str) {
        self.store.remove_entities(&[id]);
        self.animator.cancel(id);
        if self.control.local.as_deref() == Some(id) {
            self.control.local = None;
        }
        if self.control.pending_claim.as_deref() == Some(id) {
            self.control.pending_claim = None;
        }
        self.mark_dirty();
    }

    /// Resolve an in-flight control claim from the server reply. An accepted
    /// claim replaces whatever this client drove before.
    pub fn confirm_claim(&mut self, id: &str, accepted: bool, controller_id: Option<String>) {
        if self.control.pending_claim.as_deref() == Some(id) {
            self.control.pending_claim = None;
        }
        if accepted && self.store.get(id).is_some() {
            self.hand_over_local_control(id);
        }
        let Some(entity) = self.store.get_mut(id) else {
            return;
        };
        if accepted {
            entity.record.has_controller = true;
            entity.record.controller_id = controller_id.or_else(|| self.control.client_id.clone());
            entity.selected = false;
            self.control.local = Some(id.to_owned());
        } else if controller_id.is_some() {
            entity.record.has_controller = true;
            entity.record.controller_id = controller_id;
            entity.selected = false;
        }
        self.mark_dirty();
    }

    /// Drop local control of the entity this client drove, unless it is
    /// `keep`. The server releases it when the new claim lands.
    fn hand_over_local_control(&mut self, keep: &str) {
        let Some(previous) = self.control.local.clone().filter(|prev| prev != keep) else {
            return;
        };
        if let Some(entity) = self.store.get_mut(&previous) {
            if entity.record.has_controller && self.control.owns(entity) {
                entity.record.has_controller = false;
                entity.record.controller_id = None;
            }
        }
        debug!(from = %previous, to = %keep, "local control handed over");
        self.control.local = None;
    }

    fn reconcile_local_control(&mut self) {
        let Some(local) = self.control.local.clone() else {
            return;
        };
        if self.state_of(&local) != Some(EntityState::ControlledLocal) {
            self.control.local = None;
        }
    }

    // --- Queries ---

    #[must_use]
    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.store.get(id)
    }

    /// Four-state local view of an entity.
    #[must_use]
    pub fn state_of(&self, id: &str) -> Option<EntityState> {
        self.store.get(id).map(|e| entity_state(e, &self.control))
    }

    /// Ids of selected entities in draw order.
    #[must_use]
    pub fn selection(&self) -> Vec<String> {
        self.store
            .iter()
            .filter(|e| e.selected)
            .map(|e| e.id().to_owned())
            .collect()
    }

    // --- Selection ---

    /// Clear the selection.
    pub fn deselect_all(&mut self) {
        for entity in self.store.iter_mut() {
            entity.selected = false;
        }
        self.mark_dirty();
    }

    /// Select one entity by id. Controlled entities are not selectable.
    pub fn select(&mut self, id: &str) -> bool {
        if self.state_of(id).is_none_or(EntityState::is_controlled) {
            return false;
        }
        if let Some(entity) = self.store.get_mut(id) {
            entity.selected = true;
        }
        self.mark_dirty();
        true
    }

    // --- Input events ---

    /// Pointer down: select hits, or clear the selection and start panning.
    ///
    /// Every uncontrolled entity under the pointer joins the selection.
    /// Controlled entities are never selected. A secondary button toggles
    /// control instead.
    pub fn on_pointer_down(&mut self, screen_pt: Point, button: Button, modifiers: Modifiers) -> Vec<Action> {
        if button == Button::Secondary {
            return self.toggle_control_at(screen_pt);
        }
        if button != Button::Primary {
            return Vec::new();
        }

        let selectable: Vec<String> = hit::hits_at(&self.store, screen_pt)
            .into_iter()
            .filter(|id| self.state_of(id).is_some_and(|s| !s.is_controlled()))
            .collect();

        if selectable.is_empty() {
            if !modifiers.shift {
                self.deselect_all();
            }
            self.input = InputState::Panning { last_screen: screen_pt };
        } else {
            for entity in self.store.iter_mut() {
                if selectable.iter().any(|id| id == entity.id()) {
                    entity.selected = true;
                }
            }
            self.input = InputState::DraggingSelection { last_screen: screen_pt };
        }
        self.mark_dirty();
        Vec::new()
    }

    /// Pointer move: drag the selection or pan the viewport.
    pub fn on_pointer_move(&mut self, screen_pt: Point) -> Vec<Action> {
        match self.input {
            InputState::Idle => Vec::new(),
            InputState::Panning { last_screen } => {
                self.viewport.pan(screen_pt.x - last_screen.x, screen_pt.y - last_screen.y);
                self.store.reproject_all(&self.viewport);
                self.input = InputState::Panning { last_screen: screen_pt };
                self.mark_dirty();
                Vec::new()
            }
            InputState::DraggingSelection { last_screen } => {
                self.input = InputState::DraggingSelection { last_screen: screen_pt };
                let dx = self.viewport.screen_dist_to_stage(screen_pt.x - last_screen.x);
                let dy = self.viewport.screen_dist_to_stage(screen_pt.y - last_screen.y);
                self.drag_selection(dx, dy)
            }
        }
    }

    /// Pointer up: end the gesture.
    pub fn on_pointer_up(&mut self) {
        self.input = InputState::Idle;
    }

    /// Move every selected, uncontrolled entity by a stage-space delta.
    pub fn drag_selection(&mut self, dx: f64, dy: f64) -> Vec<Action> {
        let control = &self.control;
        let mut actions = Vec::new();
        for entity in self.store.iter_mut() {
            if !entity.selected || entity_state(entity, control).is_controlled() {
                continue;
            }
            entity.record.pos_x += dx;
            entity.record.pos_y += dy;
            entity.moved = true;
            actions.push(Action::Update(
                EntityPatch::new(entity.id())
                    .with_diagram(entity.diagram_id())
                    .with_position(entity.record.pos_x, entity.record.pos_y),
            ));
        }
        if !actions.is_empty() {
            self.mark_dirty();
        }
        actions
    }

    /// Wheel: rotate the selection, else entities under the pointer, else
    /// zoom the viewport.
    pub fn on_wheel(&mut self, screen_pt: Point, delta: WheelDelta) -> Vec<Action> {
        let scaled = delta.dy * WHEEL_SPEED;
        let mut targets = self.selection();
        if targets.is_empty() {
            targets = hit::hits_at(&self.store, screen_pt)
                .into_iter()
                .filter(|id| self.state_of(id).is_some_and(|s| !s.is_controlled()))
                .collect();
        }

        if targets.is_empty() {
            if self.viewport.zoom(scaled) {
                self.store.reproject_all(&self.viewport);
                self.mark_dirty();
            }
            return Vec::new();
        }

        let step = (scaled * ROTATE_STEP) % std::f64::consts::TAU;
        let mut actions = Vec::with_capacity(targets.len());
        for id in &targets {
            if let Some(entity) = self.store.get_mut(id) {
                entity.record.angle += step;
                entity.moved = true;
                actions.push(Action::Update(
                    EntityPatch::new(entity.id())
                        .with_diagram(entity.diagram_id())
                        .with_angle(entity.record.angle),
                ));
            }
        }
        self.mark_dirty();
        actions
    }

    // --- Control ---

    /// Take or release control of the topmost entity under the pointer.
    pub fn toggle_control_at(&mut self, screen_pt: Point) -> Vec<Action> {
        let Some(id) = hit::hit_test(&self.store, screen_pt).map(|e| e.id().to_owned()) else {
            return Vec::new();
        };
        self.toggle_control(&id).into_iter().collect()
    }

    /// Take control of an idle or selected entity, or release one this client
    /// drives. Remotely controlled entities and a second claim while one is
    /// pending yield no action. Claiming while driving another entity moves
    /// control once the server accepts.
    pub fn toggle_control(&mut self, id: &str) -> Option<Action> {
        let state = self.state_of(id)?;
        let diagram_id = self.store.get(id)?.diagram_id().to_owned();
        match state {
            EntityState::ControlledRemote => None,
            EntityState::ControlledLocal => {
                self.control.local = None;
                if let Some(entity) = self.store.get_mut(id) {
                    entity.record.has_controller = false;
                    entity.record.controller_id = None;
                }
                self.mark_dirty();
                Some(Action::ReleaseControl { id: id.to_owned(), diagram_id })
            }
            EntityState::Idle | EntityState::Selected => {
                if self.control.pending_claim.is_some() {
                    return None;
                }
                self.control.pending_claim = Some(id.to_owned());
                Some(Action::ClaimControl { id: id.to_owned(), diagram_id })
            }
        }
    }

    // --- Animation ---

    /// Start an animation toward `target`. Returns `false` for unknown ids.
    pub fn animate_to_at(&mut self, id: &str, target: Target, duration: Duration, now: Instant) -> bool {
        self.animator.register_at(&self.store, id, target, Timing::linear(duration), now)
    }

    /// Advance animations, returning touched ids.
    pub fn step_animations_at(&mut self, now: Instant) -> Vec<String> {
        let touched = self.animator.step_at(&mut self.store, now);
        if !touched.is_empty() {
            self.mark_dirty();
        }
        touched
    }
}
