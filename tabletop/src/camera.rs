//! Viewport transform: pan/zoom camera and screen/world conversions.
//!
//! `world = (screen - pan) / scale`. Zoom is clamped to [`ZoomLimits`];
//! panning is unbounded. Every hit test converts through this module before
//! touching world-space entities.

#[cfg(test)]
#[path = "camera_test.rs"]
mod camera_test;

use serde::{Deserialize, Serialize};

use crate::consts::{MAX_SCALE, MIN_SCALE};

/// A point in either screen or world space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    #[must_use]
    pub fn distance(self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Both coordinates are finite numbers.
    #[must_use]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Convert a screen-space position to world space.
#[must_use]
pub fn screen_to_world(sx: f64, sy: f64, pan: Point, scale: f64) -> Point {
    Point { x: (sx - pan.x) / scale, y: (sy - pan.y) / scale }
}

/// Convert a world-space position to screen space.
#[must_use]
pub fn world_to_screen(wx: f64, wy: f64, pan: Point, scale: f64) -> Point {
    Point { x: wx * scale + pan.x, y: wy * scale + pan.y }
}

/// Inclusive zoom range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoomLimits {
    pub min: f64,
    pub max: f64,
}

impl Default for ZoomLimits {
    fn default() -> Self {
        Self { min: MIN_SCALE, max: MAX_SCALE }
    }
}

impl ZoomLimits {
    /// Clamp `scale` into the range. Non-finite input falls back to `1.0`
    /// before clamping.
    #[must_use]
    pub fn clamp(&self, scale: f64) -> f64 {
        let scale = if scale.is_finite() { scale } else { 1.0 };
        scale.clamp(self.min, self.max)
    }
}

/// Camera state for pan/zoom over the map.
///
/// `pan_x` / `pan_y` are in screen pixels.
/// `zoom` is a scale factor (1.0 = no zoom).
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
    /// Pan offset as a point.
    #[must_use]
    pub fn pan(&self) -> Point {
        Point::new(self.pan_x, self.pan_y)
    }

    /// Convert a screen-space point to world coordinates.
    #[must_use]
    pub fn screen_to_world(&self, screen: Point) -> Point {
        screen_to_world(screen.x, screen.y, self.pan(), self.zoom)
    }

    /// Convert a world-space point to screen coordinates.
    #[must_use]
    pub fn world_to_screen(&self, world: Point) -> Point {
        world_to_screen(world.x, world.y, self.pan(), self.zoom)
    }

    /// Convert a screen-space distance (pixels) to world-space distance.
    #[must_use]
    pub fn screen_dist_to_world(&self, screen_dist: f64) -> f64 {
        screen_dist / self.zoom
    }

    /// Shift the view by a screen-space delta.
    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.pan_x += dx;
        self.pan_y += dy;
    }

    /// Set the zoom factor, clamped to `limits`.
    pub fn set_zoom(&mut self, zoom: f64, limits: &ZoomLimits) {
        self.zoom = limits.clamp(zoom);
    }

    /// Change zoom by `delta` while keeping the world point under `anchor`
    /// (screen space) fixed on screen.
    pub fn zoom_at(&mut self, anchor: Point, delta: f64, limits: &ZoomLimits) {
        let world = self.screen_to_world(anchor);
        self.set_zoom(self.zoom + delta, limits);
        self.pan_x = anchor.x - world.x * self.zoom;
        self.pan_y = anchor.y - world.y * self.zoom;
    }
}
