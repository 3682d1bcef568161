#![allow(clippy::float_cmp)]

use super::*;

#[test]
fn default_tool_is_pan() {
    assert_eq!(Tool::default(), Tool::Pan);
}

#[test]
fn drawing_tools() {
    assert!(Tool::Draw.is_drawing());
    assert!(Tool::Erase.is_drawing());
    assert!(!Tool::Move.is_drawing());
    assert!(!Tool::Fog.is_drawing());
}

#[test]
fn default_input_state_is_idle() {
    assert!(InputState::default().is_idle());
    assert!(!InputState::Erasing.is_idle());
}

#[test]
fn ui_state_defaults() {
    let ui = UiState::default();
    assert_eq!(ui.tool, Tool::Pan);
    assert_eq!(ui.stroke_width, 3.0);
    assert_eq!(ui.brush.radius(), 100.0);
}

#[test]
fn modifiers_default_to_none_held() {
    let m = Modifiers::default();
    assert!(!m.shift && !m.ctrl && !m.meta);
}
