//! Shared numeric constants for the canvas crate.

use std::f64::consts::PI;

// ── Viewport ────────────────────────────────────────────────────

/// Initial pixels per stage unit.
pub const DEFAULT_SCALE: f64 = 100.0;

/// Zoom never goes below one pixel per stage unit.
pub const MIN_SCALE: f64 = 1.0;

/// Multiplier applied to raw wheel deltas before zooming or rotating.
pub const WHEEL_SPEED: f64 = 0.05;

/// Radians of rotation per unit of scaled wheel delta.
pub const ROTATE_STEP: f64 = PI * 0.02;

// ── Outline colours ─────────────────────────────────────────────

/// Outline for locally selected entities.
pub const SELECT_COLOR: &str = "#3498db";

/// Outline for entities driven by any controller.
pub const CONTROLLED_COLOR: &str = "#e74c3c";

/// Label text colour.
pub const LABEL_COLOR: &str = "black";

// ── Shapes (fractions of screen size) ───────────────────────────

/// Distance from centre to the actor heading arrow tip.
pub const ACTOR_ARROW_LENGTH: f64 = 0.8;

/// Half-angle of the arrow base on the actor circle, in radians.
pub const ACTOR_ARROW_ARC: f64 = 0.55;

/// Outline width in pixels for the actor ring.
pub const ACTOR_OUTLINE_PX: f64 = 2.5;

/// Outline width in pixels for furniture shapes.
pub const FURNITURE_OUTLINE_PX: f64 = 2.0;

/// Chair back rest width as a fraction of the seat width.
pub const CHAIR_BACK_RATIO: f64 = 0.1;

/// Label font size as a fraction of screen size.
pub const LABEL_FONT_SCALE: f64 = 0.4;
