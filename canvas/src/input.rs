//! Input model: pointer buttons, the gesture state machine, and the local view
//! of who controls which entity.
//!
//! Selection is local-only and lives on each [`crate::doc::Entity`]. Control
//! is authoritative on the server and mirrored here: `ControlState` records
//! this client's id, the entity it drives, and any claim still awaiting a
//! reply. [`entity_state`] folds both into the four-state view the engine
//! enforces.

#[cfg(test)]
#[path = "input_test.rs"]
mod input_test;

use crate::camera::Point;
use crate::doc::Entity;

/// Mouse button identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    /// Left button: select, drag, pan.
    Primary,
    Middle,
    /// Right button: toggle control.
    Secondary,
}

/// Keyboard modifier keys held during an event.
#[derive(Debug, Clone, Copy, Default)]
pub struct Modifiers {
    /// Shift adds hits to the selection without clearing it first.
    pub shift: bool,
}

/// Wheel / trackpad scroll delta in pixels (positive = down).
#[derive(Debug, Clone, Copy)]
pub struct WheelDelta {
    pub dy: f64,
}

/// Gesture in progress between pointer-down and pointer-up.
#[derive(Debug, Clone, Default)]
pub enum InputState {
    /// No gesture in progress.
    #[default]
    Idle,
    /// Dragging empty canvas: pans the viewport.
    Panning {
        /// Screen position of the previous pointer event.
        last_screen: Point,
    },
    /// Dragging the current selection.
    DraggingSelection {
        /// Screen position of the previous pointer event.
        last_screen: Point,
    },
}

/// Local view of one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    Idle,
    /// Highlighted locally. Never broadcast.
    Selected,
    /// This client drives the entity.
    ControlledLocal,
    /// Another client drives the entity; it cannot be selected or dragged.
    ControlledRemote,
}

impl EntityState {
    #[must_use]
    pub fn is_controlled(self) -> bool {
        matches!(self, Self::ControlledLocal | Self::ControlledRemote)
    }
}

/// This client's side of control ownership.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlState {
    /// Id the server assigned this connection, once known.
    pub client_id: Option<String>,
    /// Entity this client currently drives.
    pub local: Option<String>,
    /// Entity whose claim is in flight.
    pub pending_claim: Option<String>,
}

impl ControlState {
    /// Whether a controlled entity is driven by this client.
    ///
    /// Uses the broadcast `controllerId` when both sides know their ids and
    /// falls back to the locally recorded claim otherwise.
    #[must_use]
    pub fn owns(&self, entity: &Entity) -> bool {
        match (&entity.record.controller_id, &self.client_id) {
            (Some(controller), Some(me)) => controller == me,
            _ => self.local.as_deref() == Some(entity.id()),
        }
    }
}

/// Fold record control flags, local claim, and selection into one state.
#[must_use]
pub fn entity_state(entity: &Entity, control: &ControlState) -> EntityState {
    if entity.record.has_controller {
        if control.owns(entity) {
            EntityState::ControlledLocal
        } else {
            EntityState::ControlledRemote
        }
    } else if entity.selected {
        EntityState::Selected
    } else {
        EntityState::Idle
    }
}
