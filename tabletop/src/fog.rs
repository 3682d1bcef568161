//! Fog-of-war engine.
//!
//! Fog is a set of additive reveal discs, never a bitmap. The overlay is
//! recomputed from that set on demand: an opaque fill with one soft-edged
//! hole erased per reveal area. `hide` does not record anything; it deletes
//! every reveal area it overlaps, so the rendered state is always a pure
//! function of the current reveal set.

#[cfg(test)]
#[path = "fog_test.rs"]
mod fog_test;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::camera::Point;
use crate::consts::{FOG_BRUSH_MAX, FOG_BRUSH_MIN, FOG_BRUSH_RADIUS, FOG_OPACITY, REVEAL_GRADIENT};
use crate::doc::EntityId;

/// What a fog record means. Only `Reveal` records are ever stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FogKind {
    #[default]
    Reveal,
    Hide,
}

/// A disc-shaped region cut out of the fog overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FogArea {
    pub id: EntityId,
    /// Center x in world coordinates.
    pub x: f64,
    /// Center y in world coordinates.
    pub y: f64,
    pub radius: f64,
    #[serde(rename = "type", default)]
    pub kind: FogKind,
}

impl FogArea {
    #[must_use]
    pub fn reveal(id: impl Into<EntityId>, center: Point, radius: f64) -> Self {
        Self { id: id.into(), x: center.x, y: center.y, radius, kind: FogKind::Reveal }
    }

    #[must_use]
    pub fn center(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Whether a hide brush at `point` with `radius` erases this area.
    #[must_use]
    pub fn overlaps(&self, point: Point, radius: f64) -> bool {
        self.center().distance(point) < self.radius + radius
    }

    fn is_well_formed(&self) -> bool {
        !self.id.is_empty()
            && self.kind == FogKind::Reveal
            && self.center().is_finite()
            && self.radius.is_finite()
            && self.radius > 0.0
    }
}

/// Serialized form of a fog layer: the enabled flag and the reveal set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FogState {
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub areas: Vec<FogArea>,
}

fn enabled_by_default() -> bool {
    true
}

/// The fog layer of one scene.
#[derive(Debug, Clone, PartialEq)]
pub struct FogOfWar {
    enabled: bool,
    areas: Vec<FogArea>,
}

impl Default for FogOfWar {
    fn default() -> Self {
        Self { enabled: true, areas: Vec::new() }
    }
}

impl FogOfWar {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Reveal areas in insertion order.
    #[must_use]
    pub fn areas(&self) -> &[FogArea] {
        &self.areas
    }

    #[must_use]
    pub fn area(&self, id: &str) -> Option<&FogArea> {
        self.areas.iter().find(|a| a.id == id)
    }

    /// Append a reveal area and return it.
    pub fn reveal(&mut self, id: impl Into<EntityId>, center: Point, radius: f64) -> FogArea {
        let area = FogArea::reveal(id, center, radius);
        self.insert(area.clone());
        area
    }

    /// Insert `area`, replacing any existing area with the same id in place.
    /// Returns the replaced area.
    pub fn insert(&mut self, mut area: FogArea) -> Option<FogArea> {
        area.kind = FogKind::Reveal;
        if let Some(existing) = self.areas.iter_mut().find(|a| a.id == area.id) {
            return Some(std::mem::replace(existing, area));
        }
        self.areas.push(area);
        None
    }

    /// Remove every reveal area whose center is closer to `point` than the
    /// sum of its radius and `radius`. Returns the removed areas in order.
    pub fn hide(&mut self, point: Point, radius: f64) -> Vec<FogArea> {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.areas)
            .into_iter()
            .partition(|a| a.overlaps(point, radius));
        self.areas = kept;
        debug!(x = point.x, y = point.y, radius, removed = removed.len(), "fog: hide");
        removed
    }

    /// Remove one area by id.
    pub fn remove(&mut self, id: &str) -> Option<FogArea> {
        let idx = self.areas.iter().position(|a| a.id == id)?;
        Some(self.areas.remove(idx))
    }

    /// Drop every reveal area. Returns what was removed.
    pub fn clear_all(&mut self) -> Vec<FogArea> {
        std::mem::take(&mut self.areas)
    }

    // --- Rendering ---

    /// Render the overlay onto `surface`: opaque fill, then one soft hole per
    /// reveal area. Disabled fog renders fully transparent.
    pub fn composite<S: AlphaSurface + ?Sized>(&self, surface: &mut S) {
        if !self.enabled {
            surface.fill(0);
            return;
        }
        surface.fill(opacity_to_alpha(FOG_OPACITY));

        let (width, height) = surface.size();
        for area in &self.areas {
            let Some((x0, y0, x1, y1)) = pixel_bounds(area, width, height) else {
                continue;
            };
            for py in y0..y1 {
                for px in x0..x1 {
                    let sample = Point::new(f64::from(px) + 0.5, f64::from(py) + 0.5);
                    let strength = erase_strength(sample.distance(area.center()) / area.radius);
                    if strength <= 0.0 {
                        continue;
                    }
                    let current = surface.alpha(px, py);
                    surface.set_alpha(px, py, scale_alpha(current, 1.0 - strength));
                }
            }
        }
    }

    /// Overlay opacity at a world point, in `[0, FOG_OPACITY]`, without
    /// quantization.
    #[must_use]
    pub fn opacity_at(&self, point: Point) -> f64 {
        if !self.enabled {
            return 0.0;
        }
        self.areas.iter().fold(FOG_OPACITY, |opacity, area| {
            opacity * (1.0 - erase_strength(point.distance(area.center()) / area.radius))
        })
    }

    // --- Persistence ---

    /// Serialize the enabled flag and the reveal set.
    #[must_use]
    pub fn export_state(&self) -> FogState {
        FogState { enabled: self.enabled, areas: self.areas.clone() }
    }

    /// Replace this layer from exported data. Absent or malformed data yields
    /// an empty, enabled layer; individual malformed areas are dropped.
    pub fn import_state(&mut self, data: Option<&serde_json::Value>) {
        *self = Self::from_state_value(data);
    }

    fn from_state_value(data: Option<&serde_json::Value>) -> Self {
        let Some(value) = data else {
            return Self::default();
        };
        match serde_json::from_value::<FogState>(value.clone()) {
            Ok(state) => Self::from_state(state),
            Err(e) => {
                warn!(error = %e, "fog: malformed state, starting empty");
                Self::default()
            }
        }
    }

    /// Build a layer from typed state, dropping malformed or hide-typed areas.
    #[must_use]
    pub fn from_state(state: FogState) -> Self {
        let total = state.areas.len();
        let areas: Vec<FogArea> = state.areas.into_iter().filter(FogArea::is_well_formed).collect();
        if areas.len() != total {
            warn!(dropped = total - areas.len(), "fog: dropped malformed areas on import");
        }
        Self { enabled: state.enabled, areas }
    }
}

/// Erase strength of a reveal hole at normalized distance `t` from its center.
fn erase_strength(t: f64) -> f64 {
    if !t.is_finite() || t >= 1.0 {
        return 0.0;
    }
    let t = t.max(0.0);
    for pair in REVEAL_GRADIENT.windows(2) {
        let (t0, s0) = pair[0];
        let (t1, s1) = pair[1];
        if t <= t1 {
            return s0 + (s1 - s0) * (t - t0) / (t1 - t0);
        }
    }
    0.0
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn opacity_to_alpha(opacity: f64) -> u8 {
    (opacity.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scale_alpha(alpha: u8, factor: f64) -> u8 {
    (f64::from(alpha) * factor.clamp(0.0, 1.0)).round() as u8
}

/// Pixel rectangle `[x0, x1) x [y0, y1)` covered by `area`, clipped to the
/// surface. `None` when the disc lies entirely outside.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn pixel_bounds(area: &FogArea, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    let w = f64::from(width);
    let h = f64::from(height);
    let x0 = (area.x - area.radius).floor().max(0.0);
    let y0 = (area.y - area.radius).floor().max(0.0);
    let x1 = (area.x + area.radius).ceil().min(w);
    let y1 = (area.y + area.radius).ceil().min(h);
    if x0 >= x1 || y0 >= y1 {
        return None;
    }
    Some((x0 as u32, y0 as u32, x1 as u32, y1 as u32))
}

// =============================================================================
// SURFACES
// =============================================================================

/// A single-channel alpha target the fog can be composited onto.
pub trait AlphaSurface {
    /// `(width, height)` in pixels.
    fn size(&self) -> (u32, u32);
    fn fill(&mut self, alpha: u8);
    fn alpha(&self, x: u32, y: u32) -> u8;
    fn set_alpha(&mut self, x: u32, y: u32, alpha: u8);
}

/// In-memory 8-bit alpha buffer, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FogMask {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl FogMask {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height, data: vec![0; width as usize * height as usize] }
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    fn index(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(y as usize * self.width as usize + x as usize)
    }
}

impl AlphaSurface for FogMask {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn fill(&mut self, alpha: u8) {
        self.data.fill(alpha);
    }

    fn alpha(&self, x: u32, y: u32) -> u8 {
        self.index(x, y).and_then(|i| self.data.get(i).copied()).unwrap_or(0)
    }

    fn set_alpha(&mut self, x: u32, y: u32, alpha: u8) {
        if let Some(px) = self.index(x, y).and_then(|i| self.data.get_mut(i)) {
            *px = alpha;
        }
    }
}

// =============================================================================
// BRUSH
// =============================================================================

/// Which way the fog brush paints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FogAction {
    #[default]
    Reveal,
    Hide,
}

/// Local fog brush settings. Not synchronized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FogBrush {
    pub action: FogAction,
    radius: f64,
}

impl Default for FogBrush {
    fn default() -> Self {
        Self { action: FogAction::Reveal, radius: FOG_BRUSH_RADIUS }
    }
}

impl FogBrush {
    #[must_use]
    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Set the brush radius, clamped to the allowed range.
    pub fn set_radius(&mut self, radius: f64) {
        let radius = if radius.is_finite() { radius } else { FOG_BRUSH_RADIUS };
        self.radius = radius.clamp(FOG_BRUSH_MIN, FOG_BRUSH_MAX);
    }
}
