#![allow(clippy::float_cmp)]

use super::*;

const EPSILON: f64 = 1e-10;

fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < EPSILON
}

fn point_approx_eq(a: Point, b: Point) -> bool {
    approx_eq(a.x, b.x) && approx_eq(a.y, b.y)
}

fn one_cell() -> Footprint {
    Footprint { width: 1.0, height: 1.0 }
}

// --- Camera ---

#[test]
fn camera_default_is_identity() {
    let cam = Camera::default();
    let p = Point::new(12.0, -7.0);
    assert!(point_approx_eq(cam.screen_to_world(p), p));
}

#[test]
fn camera_roundtrips_with_pan_and_zoom() {
    let cam = Camera { pan_x: 40.0, pan_y: -10.0, zoom: 2.5 };
    let world = Point::new(123.0, 456.0);
    let back = cam.screen_to_world(cam.world_to_screen(world));
    assert!(point_approx_eq(world, back));
}

// --- Grid snapping ---

#[test]
fn single_cell_snaps_to_cell_center() {
    let scene = GridScene::new(100.0);
    let snapped = scene.apply_grid_snap(Point::new(130.0, 270.0), one_cell());
    assert!(point_approx_eq(snapped, Point::new(150.0, 250.0)));
}

#[test]
fn two_cell_footprint_snaps_to_grid_line() {
    let scene = GridScene::new(100.0);
    let snapped = scene.apply_grid_snap(Point::new(130.0, 270.0), Footprint { width: 2.0, height: 2.0 });
    assert!(point_approx_eq(snapped, Point::new(100.0, 300.0)));
}

#[test]
fn half_cell_footprint_snaps_to_quarter_offsets() {
    let scene = GridScene::new(100.0);
    let snapped = scene.apply_grid_snap(Point::new(10.0, 60.0), Footprint { width: 0.5, height: 0.5 });
    assert!(point_approx_eq(snapped, Point::new(25.0, 75.0)));
}

#[test]
fn mixed_footprint_snaps_each_axis_independently() {
    let scene = GridScene::new(50.0);
    let snapped = scene.apply_grid_snap(Point::new(60.0, 60.0), Footprint { width: 1.0, height: 2.0 });
    assert!(point_approx_eq(snapped, Point::new(75.0, 50.0)));
}

#[test]
fn invalid_grid_size_falls_back() {
    let scene = GridScene::new(0.0);
    assert_eq!(scene.grid_size(), 100.0);
}

// --- Zoom ---

#[test]
fn zoom_at_cursor_keeps_anchor_fixed() {
    let scene = GridScene::new(100.0);
    let cursor = Point::new(200.0, 150.0);
    let before = scene.screen_to_world(cursor);
    scene.zoom_at_cursor(2.0, cursor);
    let after = scene.screen_to_world(cursor);
    assert_eq!(scene.scale(), 2.0);
    assert!(point_approx_eq(before.unwrap_or_default(), after.unwrap_or_default()));
}

#[test]
fn zoom_is_clamped_and_ignores_invalid_targets() {
    let scene = GridScene::new(100.0);
    scene.zoom_at_cursor(100.0, Point::default());
    assert_eq!(scene.scale(), 5.0);
    scene.zoom_at_cursor(f64::NAN, Point::default());
    assert_eq!(scene.scale(), 5.0);
    scene.zoom_at_cursor(-1.0, Point::default());
    assert_eq!(scene.scale(), 5.0);
}
