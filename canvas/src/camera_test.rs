#![allow(clippy::float_cmp)]

use super::*;

const EPSILON: f64 = 1e-9;

fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < EPSILON
}

fn point_approx_eq(a: Point, b: Point) -> bool {
    approx_eq(a.x, b.x) && approx_eq(a.y, b.y)
}

// --- to_screen ---

#[test]
fn to_screen_applies_window_then_scale() {
    let p = to_screen(1.5, -2.0, 0.5, 3.0, 4.0, 100.0);
    assert!(approx_eq(p.screen_x, 450.0));
    assert!(approx_eq(p.screen_y, 200.0));
    assert!(approx_eq(p.screen_size, 50.0));
}

#[test]
fn to_screen_at_origin_is_zero() {
    let p = to_screen(0.0, 0.0, 1.0, 0.0, 0.0, 100.0);
    assert_eq!(p.screen_x, 0.0);
    assert_eq!(p.screen_y, 0.0);
    assert_eq!(p.screen_size, 100.0);
}

// --- Viewport defaults ---

#[test]
fn default_viewport_is_unpanned_at_default_scale() {
    let v = Viewport::default();
    assert_eq!(v.window_x, 0.0);
    assert_eq!(v.window_y, 0.0);
    assert_eq!(v.scale, DEFAULT_SCALE);
}

// --- Round trip ---

#[test]
fn stage_screen_round_trip_over_grid() {
    for &scale in &[1.0, 7.5, 100.0, 333.3] {
        for &(wx, wy) in &[(0.0, 0.0), (-3.25, 8.0), (120.0, -0.5)] {
            let v = Viewport { window_x: wx, window_y: wy, scale };
            for &(x, y) in &[(0.0, 0.0), (1.5, -2.25), (-40.0, 12.125)] {
                let stage = Point::new(x, y);
                let back = v.screen_to_stage(v.stage_to_screen(stage));
                assert!(point_approx_eq(stage, back), "scale={scale} window=({wx},{wy}) p=({x},{y})");
            }
        }
    }
}

#[test]
fn project_matches_stage_to_screen() {
    let v = Viewport { window_x: 2.0, window_y: -1.0, scale: 40.0 };
    let p = v.project(3.0, 4.0, 0.5);
    let s = v.stage_to_screen(Point::new(3.0, 4.0));
    assert!(approx_eq(p.screen_x, s.x));
    assert!(approx_eq(p.screen_y, s.y));
    assert!(approx_eq(p.screen_size, 20.0));
}

// --- Pan ---

#[test]
fn pan_moves_window_by_stage_units() {
    let mut v = Viewport::default();
    v.pan(50.0, -100.0);
    assert!(approx_eq(v.window_x, 0.5));
    assert!(approx_eq(v.window_y, -1.0));
}

#[test]
fn pan_keeps_dragged_point_under_pointer() {
    let mut v = Viewport { window_x: 1.0, window_y: 1.0, scale: 80.0 };
    let stage = Point::new(2.0, 3.0);
    let before = v.stage_to_screen(stage);
    v.pan(16.0, -24.0);
    let after = v.stage_to_screen(stage);
    assert!(approx_eq(after.x - before.x, 16.0));
    assert!(approx_eq(after.y - before.y, -24.0));
}

// --- Zoom ---

#[test]
fn zoom_in_with_negative_delta_increases_scale() {
    let mut v = Viewport::default();
    assert!(v.zoom(-5.0));
    assert!(approx_eq(v.scale, 105.0));
}

#[test]
fn zoom_clamps_to_min_scale() {
    let mut v = Viewport { window_x: 0.0, window_y: 0.0, scale: 3.0 };
    assert!(v.zoom(10.0));
    assert_eq!(v.scale, MIN_SCALE);
    assert!(!v.zoom(10.0));
}

#[test]
fn zoom_keeps_stage_origin_fixed_on_screen() {
    let mut v = Viewport { window_x: 2.0, window_y: -3.0, scale: 50.0 };
    let origin = Point::new(0.0, 0.0);
    let before = v.stage_to_screen(origin);
    v.zoom(10.0);
    let after = v.stage_to_screen(origin);
    assert!(point_approx_eq(before, after));
}

#[test]
fn screen_dist_scales_inversely() {
    let v = Viewport { window_x: 0.0, window_y: 0.0, scale: 25.0 };
    assert!(approx_eq(v.screen_dist_to_stage(50.0), 2.0));
}
