//! Client core for a shared virtual tabletop.
//!
//! One [`engine::EngineCore`] per participant owns that participant's copy of
//! the session: scenes, tokens, freehand drawings, and the fog-of-war layer.
//! Local edits pass the permission gate, apply to the store, land in the undo
//! history, and go out as [`frames::SyncMessage`]s. Inbound messages apply
//! directly. The host layer wires UI and transport events into the engine
//! (usually through [`event_loop::EventLoop`]) and carries out the returned
//! [`engine::Action`]s.
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`engine`] | Single-writer facade and the [`engine::Action`]s it emits |
//! | [`event_loop`] | Bounded task queue drained one task at a time |
//! | [`doc`] | State store, records, and the mutation set |
//! | [`fog`] | Fog-of-war reveal set, compositing, and brush |
//! | [`history`] | Bounded undo/redo of local edits |
//! | [`permission`] | Roles, capabilities, and the permission gate |
//! | [`sync`] | Sequencing, duplicate suppression, and resync |
//! | [`camera`] | Pan/zoom viewport and coordinate conversions |
//! | [`input`] | Tools and the gesture state machine |
//! | [`hit`] | Hit-testing tokens and strokes |
//! | [`persist`] | Snapshot and session files |
//! | [`ids`] | Collision-free entity ids |
//! | [`config`] | Engine configuration |
//! | [`error`] | Error taxonomy and codes |
//! | [`consts`] | Shared numeric defaults |

pub mod camera;
pub mod config;
pub mod consts;
pub mod doc;
pub mod engine;
pub mod error;
pub mod event_loop;
pub mod fog;
pub mod hit;
pub mod history;
pub mod ids;
pub mod input;
pub mod permission;
pub mod persist;
pub mod sync;
