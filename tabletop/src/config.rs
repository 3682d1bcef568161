//! Client engine configuration.
//!
//! Every field has a default, so a partial JSON object (or none at all) is a
//! valid configuration.

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

use serde::{Deserialize, Serialize};

use crate::camera::ZoomLimits;
use crate::consts::{ERASE_RADIUS_FACTOR, FOG_BRUSH_RADIUS, HISTORY_LIMIT, TOKEN_RADIUS};
use crate::doc::GridConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub zoom: ZoomLimits,
    /// Undo depth.
    pub history_limit: usize,
    /// Initial fog brush radius; clamped to the brush range.
    pub fog_brush_radius: f64,
    /// Distance between fog dabs while dragging, as a fraction of the brush
    /// radius.
    pub fog_dab_spacing: f64,
    /// Radius of newly placed tokens.
    pub token_radius: f64,
    /// Eraser reach as a multiple of the stroke width.
    pub erase_radius_factor: f64,
    /// Grid settings for scenes created by this client.
    pub grid: GridConfig,
    /// Capacity of the event loop's task queue.
    pub queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            zoom: ZoomLimits::default(),
            history_limit: HISTORY_LIMIT,
            fog_brush_radius: FOG_BRUSH_RADIUS,
            fog_dab_spacing: 0.25,
            token_radius: TOKEN_RADIUS,
            erase_radius_factor: ERASE_RADIUS_FACTOR,
            grid: GridConfig::default(),
            queue_capacity: 256,
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from JSON, falling back to defaults for
    /// missing fields.
    ///
    /// # Errors
    ///
    /// Returns the parse error if `json` is not a valid configuration object.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
