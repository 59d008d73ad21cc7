//! Time-based interpolation of entity position and angle.
//!
//! An animation captures the entity's start state when it is registered and
//! moves it toward a target over `duration`, optionally after a `delay`.
//! Progress is `easing((now - start) / duration)` clamped to `[0, 1]`; the
//! default easing is linear. Finished animations are dropped on the step that
//! completes them.

#[cfg(test)]
#[path = "animate_test.rs"]
mod animate_test;

use std::time::{Duration, Instant};

use crate::doc::EntityStore;

/// Timing curve mapping linear progress in `[0, 1]` to eased progress.
pub type Easing = fn(f64) -> f64;

#[must_use]
pub fn linear(t: f64) -> f64 {
    t
}

/// Destination of an animation. `angle: None` keeps the current angle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Target {
    pub pos_x: f64,
    pub pos_y: f64,
    pub angle: Option<f64>,
}

/// Duration, start delay, and easing curve of an animation.
#[derive(Debug, Clone, Copy)]
pub struct Timing {
    pub duration: Duration,
    pub delay: Duration,
    pub easing: Easing,
}

impl Timing {
    /// Linear timing with no delay.
    #[must_use]
    pub fn linear(duration: Duration) -> Self {
        Self { duration, delay: Duration::ZERO, easing: linear }
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    #[must_use]
    pub fn with_easing(mut self, easing: Easing) -> Self {
        self.easing = easing;
        self
    }
}

#[derive(Debug, Clone)]
struct Animation {
    id: String,
    start_x: f64,
    start_y: f64,
    start_angle: f64,
    target: Target,
    start: Instant,
    duration: Duration,
    easing: Easing,
}

impl Animation {
    fn progress(&self, now: Instant) -> f64 {
        if now < self.start {
            return 0.0;
        }
        if self.duration.is_zero() {
            return 1.0;
        }
        let t = (now - self.start).as_secs_f64() / self.duration.as_secs_f64();
        (self.easing)(t.min(1.0))
    }
}

/// Set of in-flight animations.
#[derive(Debug, Default)]
pub struct Animator {
    in_progress: Vec<Animation>,
}

impl Animator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_animating(&self) -> bool {
        !self.in_progress.is_empty()
    }

    /// Start animating entity `id` toward `target`.
    ///
    /// Returns `false` if the entity is unknown or `duration + delay` is zero.
    /// A new animation for an id replaces any running one.
    pub fn register_at(&mut self, store: &EntityStore, id: &str, target: Target, timing: Timing, now: Instant) -> bool {
        let Some(entity) = store.get(id) else {
            return false;
        };
        if (timing.duration + timing.delay).is_zero() {
            return false;
        }
        self.in_progress.retain(|a| a.id != id);
        self.in_progress.push(Animation {
            id: id.to_owned(),
            start_x: entity.record.pos_x,
            start_y: entity.record.pos_y,
            start_angle: entity.record.angle,
            target,
            start: now + timing.delay,
            duration: timing.duration,
            easing: timing.easing,
        });
        true
    }

    /// Advance every animation to `now`, writing interpolated values into the
    /// store and marking those entities moved. Returns the ids touched.
    pub fn step_at(&mut self, store: &mut EntityStore, now: Instant) -> Vec<String> {
        let mut touched = Vec::new();
        self.in_progress.retain(|anim| {
            let Some(entity) = store.get_mut(&anim.id) else {
                return false;
            };
            let progress = anim.progress(now);
            let lerp = |start: f64, end: f64| start + (end - start) * progress;
            entity.record.pos_x = lerp(anim.start_x, anim.target.pos_x);
            entity.record.pos_y = lerp(anim.start_y, anim.target.pos_y);
            entity.record.angle = lerp(anim.start_angle, anim.target.angle.unwrap_or(anim.start_angle));
            entity.moved = true;
            touched.push(anim.id.clone());
            progress < 1.0
        });
        touched
    }

    /// Drop any animation for `id`.
    pub fn cancel(&mut self, id: &str) {
        self.in_progress.retain(|a| a.id != id);
    }
}
