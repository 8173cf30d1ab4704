//! Scene seam: coordinate conversion, grid snapping, and zoom requests.
//!
//! The placement engine never owns the scene's coordinate system. It consumes
//! the `Scene` trait; `GridScene` is a pan/zoom camera over a square grid used
//! by the replay binary and tests.

#[cfg(test)]
#[path = "scene_test.rs"]
mod scene_test;

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// A point in either screen or world space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
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

/// Asset footprint in grid cells.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Footprint {
    pub width: f64,
    pub height: f64,
}

/// Scene collaborator consumed by the placement session.
pub trait Scene: Send + Sync {
    /// Convert a screen point to world coordinates. `None` when no scene is active.
    fn screen_to_world(&self, screen: Point) -> Option<Point>;

    /// Convert a world point back to screen coordinates for previews.
    fn world_to_screen(&self, world: Point) -> Option<Point>;

    /// Snap a world-space center point to the grid for the given footprint.
    fn apply_grid_snap(&self, world: Point, footprint: Footprint) -> Point;

    /// Current zoom scale.
    fn scale(&self) -> f64;

    /// Zoom to `target_scale`, keeping the world point under `screen` fixed.
    fn zoom_at_cursor(&self, target_scale: f64, screen: Point);
}

// =============================================================================
// GRID SCENE
// =============================================================================

/// Camera state for pan/zoom.
///
/// `pan_x` / `pan_y` are in screen pixels. `zoom` is a scale factor (1.0 = no zoom).
#[derive(Debug, Clone, Copy)]
pub struct Camera {
    pub pan_x: f64,
    pub pan_y: f64,
    pub zoom: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self { pan_x: 0.0, pan_y: 0.0, zoom: 1.0 }
    }
}

impl Camera {
    #[must_use]
    pub fn screen_to_world(&self, screen: Point) -> Point {
        Point { x: (screen.x - self.pan_x) / self.zoom, y: (screen.y - self.pan_y) / self.zoom }
    }

    #[must_use]
    pub fn world_to_screen(&self, world: Point) -> Point {
        Point { x: world.x * self.zoom + self.pan_x, y: world.y * self.zoom + self.pan_y }
    }
}

/// Square-grid scene with a pan/zoom camera.
pub struct GridScene {
    camera: Mutex<Camera>,
    grid_size: f64,
    min_zoom: f64,
    max_zoom: f64,
}

impl GridScene {
    /// Create a scene with `grid_size` world units per cell.
    #[must_use]
    pub fn new(grid_size: f64) -> Self {
        let grid_size = if grid_size.is_finite() && grid_size > 0.0 { grid_size } else { 100.0 };
        Self { camera: Mutex::new(Camera::default()), grid_size, min_zoom: 0.1, max_zoom: 5.0 }
    }

    #[must_use]
    pub fn grid_size(&self) -> f64 {
        self.grid_size
    }

    #[must_use]
    pub fn camera(&self) -> Camera {
        *self.camera.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn set_camera(&self, camera: Camera) {
        *self.camera.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = camera;
    }
}

impl Scene for GridScene {
    fn screen_to_world(&self, screen: Point) -> Option<Point> {
        Some(self.camera().screen_to_world(screen))
    }

    fn world_to_screen(&self, world: Point) -> Option<Point> {
        Some(self.camera().world_to_screen(world))
    }

    fn apply_grid_snap(&self, world: Point, footprint: Footprint) -> Point {
        Point {
            x: snap_axis(world.x, footprint.width, self.grid_size),
            y: snap_axis(world.y, footprint.height, self.grid_size),
        }
    }

    fn scale(&self) -> f64 {
        self.camera().zoom
    }

    fn zoom_at_cursor(&self, target_scale: f64, screen: Point) {
        if !target_scale.is_finite() || target_scale <= 0.0 {
            return;
        }
        let mut camera = self.camera.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let anchor = camera.screen_to_world(screen);
        camera.zoom = target_scale.clamp(self.min_zoom, self.max_zoom);
        camera.pan_x = screen.x - anchor.x * camera.zoom;
        camera.pan_y = screen.y - anchor.y * camera.zoom;
    }
}

/// Snap one axis of a center point.
///
/// Odd cell counts center on a cell, even counts on a grid line, and
/// sub-cell footprints snap to half cells.
fn snap_axis(value: f64, cells: f64, grid: f64) -> f64 {
    if cells < 1.0 {
        let step = grid / 2.0;
        let offset = step / 2.0;
        return ((value - offset) / step).round() * step + offset;
    }
    #[allow(clippy::cast_possible_truncation)]
    let odd = (cells.round() as i64) % 2 == 1;
    let offset = if odd { grid / 2.0 } else { 0.0 };
    ((value - offset) / grid).round() * grid + offset
}
