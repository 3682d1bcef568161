//! Input model: tools, pointer buttons, and the gesture state machine.
//!
//! `InputState` is the gesture being tracked between pointer-down and
//! pointer-up. Drags and strokes are local-only until release; eraser and fog
//! brush gestures commit one complete mutation per dab.

#[cfg(test)]
#[path = "input_test.rs"]
mod input_test;

use crate::camera::Point;
use crate::doc::EntityId;
use crate::fog::FogBrush;

/// Which tool is currently active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tool {
    /// Drag the view.
    #[default]
    Pan,
    /// Pick up and move tokens; empty space pans.
    Move,
    /// Freehand stroke.
    Draw,
    /// Remove strokes under the cursor.
    Erase,
    /// Reveal or hide fog with the fog brush.
    Fog,
}

impl Tool {
    /// Whether this tool edits drawings.
    #[must_use]
    pub fn is_drawing(self) -> bool {
        matches!(self, Self::Draw | Self::Erase)
    }
}

/// Mouse button identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    Primary,
    Middle,
    Secondary,
}

/// Keyboard modifiers held during an event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub meta: bool,
}

/// Wheel / trackpad scroll delta.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelDelta {
    pub dx: f64,
    /// Positive scrolls down, which zooms out.
    pub dy: f64,
}

/// Local tool settings. Nothing here is synchronized.
#[derive(Debug, Clone, PartialEq)]
pub struct UiState {
    pub tool: Tool,
    pub brush: FogBrush,
    pub stroke_color: String,
    pub stroke_width: f64,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            tool: Tool::default(),
            brush: FogBrush::default(),
            stroke_color: "#2c3e50".to_owned(),
            stroke_width: crate::consts::STROKE_WIDTH,
        }
    }
}

/// Gesture in progress.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum InputState {
    #[default]
    Idle,
    Panning {
        /// Screen position of the previous pointer event.
        last_screen: Point,
    },
    DraggingToken {
        id: EntityId,
        /// Pointer position minus token center at grab time, in world units.
        grab_offset: Point,
        /// Token center when the drag started.
        origin: Point,
        /// Where the token would land if released now.
        current: Point,
    },
    /// Collecting the path of a new stroke.
    Painting { points: Vec<Point> },
    /// Eraser held down.
    Erasing,
    /// Fog brush held down.
    FogPainting {
        /// World position of the last committed dab.
        last_dab: Point,
    },
}

impl InputState {
    #[must_use]
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}
