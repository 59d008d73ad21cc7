//! Rendering: renderer registry keyed by `drawType` over an abstract surface.
//!
//! Drawing goes through the [`Surface`] trait so hosts can back it with a 2D
//! canvas, an SVG writer, or a command recorder in tests. Renderers are plain
//! functions looked up by the entity's draw key; there is no per-type
//! subclassing. Renderers only read entity state.

#[cfg(test)]
#[path = "render_test.rs"]
mod render_test;

use std::collections::HashMap;
use std::f64::consts::{SQRT_2, TAU};

use tracing::warn;

use crate::consts::{
    ACTOR_ARROW_ARC, ACTOR_ARROW_LENGTH, ACTOR_OUTLINE_PX, CHAIR_BACK_RATIO, CONTROLLED_COLOR, FURNITURE_OUTLINE_PX,
    LABEL_COLOR, LABEL_FONT_SCALE, SELECT_COLOR,
};
use crate::doc::{Entity, EntityStore};
use crate::input::{ControlState, EntityState, entity_state};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("no renderer registered for draw type: {0}")]
    UnknownDrawType(String),
}

/// Minimal 2D drawing surface in screen pixels.
pub trait Surface {
    fn save(&mut self);
    fn restore(&mut self);
    fn translate(&mut self, x: f64, y: f64);
    fn rotate(&mut self, radians: f64);
    fn begin_path(&mut self);
    fn move_to(&mut self, x: f64, y: f64);
    fn line_to(&mut self, x: f64, y: f64);
    fn close_path(&mut self);
    fn arc(&mut self, x: f64, y: f64, radius: f64, start: f64, end: f64);
    fn rect(&mut self, x: f64, y: f64, w: f64, h: f64);
    fn fill(&mut self, color: &str);
    fn stroke(&mut self, color: &str, width: f64);
    fn fill_text(&mut self, text: &str, x: f64, y: f64, font_px: f64, color: &str);
}

/// Renderer signature: draw one entity in the given state.
pub type DrawFn = fn(&Entity, EntityState, &mut dyn Surface);

/// `drawType` to renderer lookup table.
pub struct Registry {
    renderers: HashMap<String, DrawFn>,
}

impl Default for Registry {
    /// Registry with the built-in `actor` and `furn_chair` renderers.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("actor", draw_actor);
        registry.register("furn_chair", draw_chair);
        registry
    }
}

impl Registry {
    #[must_use]
    pub fn empty() -> Self {
        Self { renderers: HashMap::new() }
    }

    /// Register or replace the renderer for `draw_type`.
    pub fn register(&mut self, draw_type: impl Into<String>, draw: DrawFn) {
        self.renderers.insert(draw_type.into(), draw);
    }

    #[must_use]
    pub fn contains(&self, draw_type: &str) -> bool {
        self.renderers.contains_key(draw_type)
    }

    /// Draw a single entity.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::UnknownDrawType`] if the entity's draw key has
    /// no registered renderer.
    pub fn draw(&self, entity: &Entity, state: EntityState, surface: &mut dyn Surface) -> Result<(), RenderError> {
        let key = entity.record.draw_key();
        let draw = self
            .renderers
            .get(key)
            .ok_or_else(|| RenderError::UnknownDrawType(key.to_owned()))?;
        draw(entity, state, surface);
        Ok(())
    }

    /// Draw every entity in store order. Entities without a renderer are
    /// logged and skipped; returns the failures.
    pub fn draw_scene(&self, store: &EntityStore, control: &ControlState, surface: &mut dyn Surface) -> Vec<RenderError> {
        let mut failures = Vec::new();
        for entity in store.iter() {
            if let Err(e) = self.draw(entity, entity_state(entity, control), surface) {
                warn!(id = %entity.id(), error = %e, "skipping entity");
                failures.push(e);
            }
        }
        failures
    }
}

/// Outline colour for a state, if the state is highlighted.
#[must_use]
pub fn outline_color(state: EntityState) -> Option<&'static str> {
    match state {
        EntityState::Idle => None,
        EntityState::Selected => Some(SELECT_COLOR),
        EntityState::ControlledLocal | EntityState::ControlledRemote => Some(CONTROLLED_COLOR),
    }
}

fn draw_label(entity: &Entity, surface: &mut dyn Surface) {
    let p = &entity.projection;
    let dist = p.screen_size / 2.0;
    surface.fill_text(
        &entity.record.name,
        p.screen_x + dist,
        p.screen_y - dist,
        p.screen_size * LABEL_FONT_SCALE,
        LABEL_COLOR,
    );
}

// =============================================================================
// BUILT-IN RENDERERS
// =============================================================================

/// Circle with a heading arrow pointing along `angle`.
fn draw_actor(entity: &Entity, state: EntityState, surface: &mut dyn Surface) {
    let p = &entity.projection;
    let angle = entity.record.angle;
    let radius = p.screen_size / 2.0;
    let length = ACTOR_ARROW_LENGTH * p.screen_size;

    surface.begin_path();
    surface.move_to(p.screen_x + length * angle.cos(), p.screen_y + length * angle.sin());
    for side in [ACTOR_ARROW_ARC, -ACTOR_ARROW_ARC] {
        surface.line_to(
            p.screen_x + radius * (angle + side).cos(),
            p.screen_y + radius * (angle + side).sin(),
        );
    }
    surface.close_path();
    surface.fill(entity.record.color2.as_deref().unwrap_or(&entity.record.color));

    surface.begin_path();
    surface.arc(p.screen_x, p.screen_y, radius, 0.0, TAU);
    surface.fill(&entity.record.color);

    if let Some(color) = outline_color(state) {
        surface.begin_path();
        surface.arc(p.screen_x, p.screen_y, radius, 0.0, TAU);
        surface.stroke(color, ACTOR_OUTLINE_PX);
    }

    draw_label(entity, surface);
}

/// Rotated square inscribed in the hit circle, with a back rest strip.
fn draw_chair(entity: &Entity, state: EntityState, surface: &mut dyn Surface) {
    let p = &entity.projection;
    let width = p.screen_size / SQRT_2;
    let stroke = outline_color(state)
        .or(entity.record.color2.as_deref())
        .unwrap_or(&entity.record.color);

    surface.save();
    surface.translate(p.screen_x, p.screen_y);
    surface.rotate(entity.record.angle);
    surface.begin_path();
    surface.rect(-width / 2.0, -width / 2.0, width, width);
    surface.fill(&entity.record.color);
    surface.stroke(stroke, FURNITURE_OUTLINE_PX);
    surface.begin_path();
    surface.rect(-width / 2.0, -width / 2.0, width * CHAIR_BACK_RATIO, width);
    surface.stroke(stroke, FURNITURE_OUTLINE_PX);
    surface.restore();

    draw_label(entity, surface);
}
