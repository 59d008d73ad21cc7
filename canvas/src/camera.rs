#[cfg(test)]
#[path = "camera_test.rs"]
mod camera_test;

use crate::consts::{DEFAULT_SCALE, MIN_SCALE};

/// A point in either screen or stage space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Screen-space projection of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Projection {
    pub screen_x: f64,
    pub screen_y: f64,
    pub screen_size: f64,
}

/// Project a stage-space position and size to screen pixels.
///
/// `screen = (pos + window) * scale`, `screen_size = size * scale`.
#[must_use]
pub fn to_screen(pos_x: f64, pos_y: f64, size: f64, window_x: f64, window_y: f64, scale: f64) -> Projection {
    Projection {
        screen_x: (pos_x + window_x) * scale,
        screen_y: (pos_y + window_y) * scale,
        screen_size: size * scale,
    }
}

/// Diagram viewport: pan offset in stage units and scale in pixels per unit.
///
/// Purely local view state. Never sent to the server.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub window_x: f64,
    pub window_y: f64,
    pub scale: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self { window_x: 0.0, window_y: 0.0, scale: DEFAULT_SCALE }
    }
}

impl Viewport {
    #[must_use]
    pub fn project(&self, pos_x: f64, pos_y: f64, size: f64) -> Projection {
        to_screen(pos_x, pos_y, size, self.window_x, self.window_y, self.scale)
    }

    /// Convert a stage-space point to screen pixels.
    #[must_use]
    pub fn stage_to_screen(&self, stage: Point) -> Point {
        Point {
            x: (stage.x + self.window_x) * self.scale,
            y: (stage.y + self.window_y) * self.scale,
        }
    }

    /// Convert a screen-space point back to stage coordinates.
    #[must_use]
    pub fn screen_to_stage(&self, screen: Point) -> Point {
        Point {
            x: screen.x / self.scale - self.window_x,
            y: screen.y / self.scale - self.window_y,
        }
    }

    /// Convert a screen-space distance (pixels) to stage units.
    #[must_use]
    pub fn screen_dist_to_stage(&self, screen_dist: f64) -> f64 {
        screen_dist / self.scale
    }

    /// Pan by a pointer movement given in screen pixels.
    pub fn pan(&mut self, dx: f64, dy: f64) {
        self.window_x += dx / self.scale;
        self.window_y += dy / self.scale;
    }

    /// Zoom by a scaled wheel delta; positive zooms out.
    ///
    /// The window offset is rescaled so the stage origin keeps its screen
    /// position. Returns `false` when the scale is already clamped.
    pub fn zoom(&mut self, delta: f64) -> bool {
        let new_scale = (self.scale - delta).max(MIN_SCALE);
        if (new_scale - self.scale).abs() < f64::EPSILON {
            return false;
        }
        let ratio = self.scale / new_scale;
        self.scale = new_scale;
        self.window_x *= ratio;
        self.window_y *= ratio;
        true
    }
}
