//! Shared numeric constants for the tabletop crate.

// ── Viewport ────────────────────────────────────────────────────

/// Smallest allowed zoom factor.
pub const MIN_SCALE: f64 = 0.3;

/// Largest allowed zoom factor.
pub const MAX_SCALE: f64 = 3.0;

/// Zoom change applied per wheel notch.
pub const WHEEL_ZOOM_STEP: f64 = 0.1;

// ── History ─────────────────────────────────────────────────────

/// Maximum number of undoable entries kept per client.
pub const HISTORY_LIMIT: usize = 50;

// ── Fog of war ──────────────────────────────────────────────────

/// Opacity of the unrevealed overlay (0.0 = clear, 1.0 = black).
pub const FOG_OPACITY: f64 = 0.85;

/// Default fog brush radius in world units.
pub const FOG_BRUSH_RADIUS: f64 = 100.0;

/// Smallest fog brush radius.
pub const FOG_BRUSH_MIN: f64 = 50.0;

/// Largest fog brush radius.
pub const FOG_BRUSH_MAX: f64 = 300.0;

/// Radial gradient stops for a reveal hole: `(offset, erase strength)`.
/// Strength 1.0 fully clears the overlay, 0.0 leaves it untouched.
pub const REVEAL_GRADIENT: [(f64, f64); 3] = [(0.0, 1.0), (0.7, 0.8), (1.0, 0.0)];

// ── Entities ────────────────────────────────────────────────────

/// Radius of a newly placed token in world units.
pub const TOKEN_RADIUS: f64 = 35.0;

/// Default drawing stroke width in world units.
pub const STROKE_WIDTH: f64 = 3.0;

/// Eraser reach as a multiple of the stroke width.
pub const ERASE_RADIUS_FACTOR: f64 = 3.0;

/// Default grid cell size in world units.
pub const GRID_CELL_SIZE: f64 = 50.0;

/// Default grid line color.
pub const GRID_COLOR: &str = "rgba(155, 89, 182, 0.3)";
