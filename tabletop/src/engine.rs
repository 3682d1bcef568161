//! Engine facade: the single writer for one client's tabletop state.
//!
//! Every local edit goes gate → store → history → sync. Every inbound
//! message goes dedup → decode → store, without the gate. Each entry point
//! returns the [`Action`]s the host layer must carry out: messages to put on
//! the wire, denial feedback, and repaint requests.

#[cfg(test)]
#[path = "engine_test.rs"]
mod engine_test;

use frames::{MessageType, SyncMessage};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::camera::{Camera, Point};
use crate::config::EngineConfig;
use crate::consts::WHEEL_ZOOM_STEP;
use crate::doc::{Drawing, EntityId, Mutation, ParticipantId, Scene, SessionId, Snapshot, StateStore, Token};
use crate::error::{ErrorCode, SyncError};
use crate::fog::{AlphaSurface, FogAction, FogArea, FogOfWar, FogState};
use crate::hit;
use crate::history::History;
use crate::ids::IdGen;
use crate::input::{Button, InputState, Modifiers, Tool, UiState, WheelDelta};
use crate::permission::{Capabilities, Denial, Participant, PermissionGate, PermissionUpdate, Roster};
use crate::sync::{Reconnect, SyncClient};

/// Side effects for the host layer to process.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Put this message on the channel.
    Send(SyncMessage),
    /// A local request was refused by the permission gate. Nothing changed.
    Denied(Denial),
    /// A local request was malformed. Nothing changed.
    Rejected { code: &'static str, message: String },
    RenderNeeded,
    RosterChanged,
    /// The host ended the session.
    SessionEnded,
}

impl Action {
    fn rejected<E: ErrorCode>(error: &E) -> Self {
        Self::Rejected { code: error.error_code(), message: error.to_string() }
    }
}

/// `session:welcome` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Welcome {
    pub participants: Vec<Participant>,
}

/// `participant:leave` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Departure {
    pub id: ParticipantId,
}

pub struct EngineCore {
    pub config: EngineConfig,
    pub store: StateStore,
    pub history: History,
    pub roster: Roster,
    pub sync: SyncClient,
    pub camera: Camera,
    pub ui: UiState,
    pub input: InputState,
    me: Participant,
    ids: IdGen,
}

impl EngineCore {
    #[must_use]
    pub fn new(config: EngineConfig, session_id: impl Into<SessionId>, me: Participant) -> Self {
        let scene = Scene { grid: config.grid.clone(), ..Scene::new("main", "Main") };
        let mut ui = UiState::default();
        ui.brush.set_radius(config.fog_brush_radius);
        let mut roster = Roster::new();
        roster.join(me.clone());
        Self {
            store: StateStore::new(scene),
            history: History::new(config.history_limit),
            roster,
            sync: SyncClient::new(session_id, me.id.clone()),
            camera: Camera::default(),
            ui,
            input: InputState::default(),
            ids: IdGen::new(me.id.clone()),
            me,
            config,
        }
    }

    // --- Queries ---

    #[must_use]
    pub fn participant_id(&self) -> &str {
        &self.me.id
    }

    /// Whether the local participant is currently the host.
    #[must_use]
    pub fn is_host(&self) -> bool {
        self.roster.get(&self.me.id).is_some_and(Participant::is_host)
    }

    /// Token being dragged and where it would land, for preview rendering.
    #[must_use]
    pub fn token_preview(&self) -> Option<(&str, Point)> {
        match &self.input {
            InputState::DraggingToken { id, current, .. } => Some((id.as_str(), *current)),
            _ => None,
        }
    }

    /// Path of the stroke being drawn, for preview rendering.
    #[must_use]
    pub fn current_path(&self) -> Option<&[Point]> {
        match &self.input {
            InputState::Painting { points } => Some(points),
            _ => None,
        }
    }

    /// Render the active scene's fog overlay.
    pub fn composite_fog<S: AlphaSurface + ?Sized>(&self, surface: &mut S) {
        self.store.fog().composite(surface);
    }

    #[must_use]
    pub fn export_fog(&self) -> FogState {
        self.store.fog().export_state()
    }

    // --- Local edits ---

    /// Gate, apply, record, and broadcast one local edit.
    pub fn submit(&mut self, mutation: Mutation) -> Vec<Action> {
        if let Err(denial) = PermissionGate::check(&self.roster, &self.me.id, &mutation) {
            debug!(%denial, kind = %mutation.message_type(), "engine: denied");
            return vec![Action::Denied(denial)];
        }
        let entry = match self.store.apply(mutation) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, code = e.error_code(), "engine: rejected local edit");
                return vec![Action::rejected(&e)];
            }
        };
        if entry.is_noop() {
            return Vec::new();
        }

        let mut actions = self.broadcast(entry.forward.clone());
        let sequence = actions
            .iter()
            .find_map(|a| match a {
                Action::Send(msg) => Some(msg.sequence),
                _ => None,
            })
            .unwrap_or(0);
        self.history.push(entry.with_sequence(sequence));
        actions.push(Action::RenderNeeded);
        actions
    }

    /// Place a new token at a world position on the active scene.
    pub fn place_token(&mut self, world: Point, label: impl Into<String>) -> Vec<Action> {
        let token = Token {
            id: self.ids.next("token"),
            scene_id: self.store.active_scene().id.clone(),
            x: world.x,
            y: world.y,
            radius: self.config.token_radius,
            label: label.into(),
            color: None,
            owner: Some(self.me.id.clone()),
        };
        self.submit(Mutation::AddToken { token })
    }

    /// Create a scene with the configured grid. Does not switch to it.
    pub fn add_scene(&mut self, name: impl Into<String>) -> Vec<Action> {
        let scene = Scene { grid: self.config.grid.clone(), ..Scene::new(self.ids.next("scene"), name) };
        self.submit(Mutation::AddScene { scene })
    }

    pub fn switch_scene(&mut self, scene_id: impl Into<EntityId>) -> Vec<Action> {
        self.input = InputState::Idle;
        self.submit(Mutation::SwitchScene { scene_id: scene_id.into() })
    }

    pub fn clear_drawings(&mut self) -> Vec<Action> {
        self.submit(Mutation::ClearDrawings {})
    }

    pub fn clear_fog(&mut self) -> Vec<Action> {
        self.submit(Mutation::ClearFog {})
    }

    pub fn set_fog_enabled(&mut self, enabled: bool) -> Vec<Action> {
        self.submit(Mutation::SetFogEnabled { enabled })
    }

    /// Replace the active scene's fog with exported data. Absent or
    /// malformed data yields an empty, enabled layer.
    pub fn import_fog(&mut self, data: Option<&Value>) -> Vec<Action> {
        let mut imported = FogOfWar::new();
        imported.import_state(data);

        let mut actions = self.submit(Mutation::ClearFog {});
        if actions.iter().any(|a| matches!(a, Action::Denied(_))) {
            return actions;
        }
        for area in imported.areas() {
            actions.extend(self.submit(Mutation::RevealFog { area: area.clone() }));
        }
        actions.extend(self.submit(Mutation::SetFogEnabled { enabled: imported.enabled() }));
        actions
    }

    /// Host assigns a player's capabilities and announces the change.
    pub fn set_capabilities(&mut self, participant: impl Into<ParticipantId>, capabilities: Capabilities) -> Vec<Action> {
        let update = PermissionUpdate { participant_id: participant.into(), capabilities };
        if let Err(denial) = self.roster.set_capabilities(&self.me.id, update.clone()) {
            return vec![Action::Denied(denial)];
        }
        let mut actions = Vec::new();
        if self.sync.is_connected() {
            match serde_json::to_value(&update) {
                Ok(payload) => actions.push(Action::Send(self.sync.wrap(MessageType::PermissionUpdate, payload))),
                Err(e) => warn!(error = %e, "engine: permission update not encodable"),
            }
        }
        actions.push(Action::RosterChanged);
        actions
    }

    /// Host ends the session for everyone.
    pub fn end_session(&mut self) -> Vec<Action> {
        if !self.is_host() {
            return vec![Action::Denied(Denial::HostOnly(MessageType::SessionEnd.as_str()))];
        }
        let message = self.sync.wrap(MessageType::SessionEnd, Value::Object(serde_json::Map::new()));
        self.sync.on_disconnect();
        vec![Action::Send(message), Action::SessionEnded]
    }

    // --- Undo / redo ---

    pub fn undo(&mut self) -> Vec<Action> {
        if let Some(entry) = self.history.peek_undo() {
            for mutation in &entry.inverse {
                if let Err(denial) = PermissionGate::check(&self.roster, &self.me.id, mutation) {
                    return vec![Action::Denied(denial)];
                }
            }
        }
        match self.history.undo(&mut self.store) {
            Some(applied) => self.finish_replay(applied),
            None => Vec::new(),
        }
    }

    pub fn redo(&mut self) -> Vec<Action> {
        if let Some(entry) = self.history.peek_redo() {
            for mutation in &entry.forward {
                if let Err(denial) = PermissionGate::check(&self.roster, &self.me.id, mutation) {
                    return vec![Action::Denied(denial)];
                }
            }
        }
        match self.history.redo(&mut self.store) {
            Some(applied) => self.finish_replay(applied),
            None => Vec::new(),
        }
    }

    fn finish_replay(&mut self, applied: Vec<Mutation>) -> Vec<Action> {
        let mut actions = self.broadcast(applied);
        actions.push(Action::RenderNeeded);
        actions
    }

    // --- Inbound ---

    /// Apply a message from the channel.
    pub fn receive(&mut self, message: &SyncMessage) -> Vec<Action> {
        if let Err(e) = self.sync.accept(message) {
            match &e {
                SyncError::DuplicateMessage { .. } => debug!(error = %e, "engine: dropped duplicate"),
                _ => warn!(error = %e, code = e.error_code(), "engine: dropped inbound message"),
            }
            return Vec::new();
        }

        if message.kind.is_mutation() {
            return self.receive_mutation(message);
        }
        match message.kind {
            MessageType::SnapshotRequest => self.answer_snapshot_request(),
            MessageType::Snapshot => self.receive_snapshot(message),
            MessageType::PermissionUpdate => self.receive_permission_update(message),
            MessageType::SessionWelcome => self.receive_welcome(message),
            MessageType::ParticipantJoin => self.receive_join(message),
            MessageType::ParticipantLeave => self.receive_leave(message),
            MessageType::SessionEnd => {
                info!(session = %self.sync.session_id(), "engine: session ended by host");
                self.sync.on_disconnect();
                self.input = InputState::Idle;
                vec![Action::SessionEnded]
            }
            other => {
                warn!(kind = %other, "engine: unexpected message type");
                Vec::new()
            }
        }
    }

    fn receive_mutation(&mut self, message: &SyncMessage) -> Vec<Action> {
        let mutation = match SyncClient::decode_mutation(message) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, sender = %message.sender_id, "engine: undecodable mutation");
                return Vec::new();
            }
        };
        if let Some(id) = mutation.created_id() {
            self.ids.observe(id);
        }
        match self.store.apply(mutation) {
            Ok(entry) if entry.is_noop() => Vec::new(),
            Ok(_) => vec![Action::RenderNeeded],
            Err(e) => {
                warn!(error = %e, code = e.error_code(), sender = %message.sender_id, "engine: remote mutation failed integrity check");
                Vec::new()
            }
        }
    }

    fn answer_snapshot_request(&mut self) -> Vec<Action> {
        if !self.is_host() {
            return Vec::new();
        }
        match serde_json::to_value(self.store.snapshot()) {
            Ok(payload) => vec![Action::Send(self.sync.wrap(MessageType::Snapshot, payload))],
            Err(e) => {
                warn!(error = %e, "engine: snapshot not encodable");
                Vec::new()
            }
        }
    }

    fn receive_snapshot(&mut self, message: &SyncMessage) -> Vec<Action> {
        if self.is_host() {
            return Vec::new();
        }
        if !self.roster.get(&message.sender_id).is_some_and(Participant::is_host) {
            warn!(sender = %message.sender_id, "engine: snapshot from non-host ignored");
            return Vec::new();
        }
        let snapshot: Snapshot = match serde_json::from_value(message.payload.clone()) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "engine: malformed snapshot");
                return Vec::new();
            }
        };
        match self.sync.check_revision(self.store.revision(), snapshot.revision) {
            Ok(true) => self.load_snapshot(snapshot),
            Ok(false) => Vec::new(),
            Err(e) => {
                warn!(error = %e, code = e.error_code(), "engine: resyncing");
                vec![Action::Send(self.sync.request_resync())]
            }
        }
    }

    /// Replace the active scene from a snapshot, then re-apply and send any
    /// edits made while offline.
    pub fn load_snapshot(&mut self, snapshot: Snapshot) -> Vec<Action> {
        info!(revision = snapshot.revision, "engine: loading snapshot");
        self.store.load_snapshot(snapshot);
        self.advance_ids();
        self.history.clear();
        self.input = InputState::Idle;

        let mut actions = Vec::new();
        for mutation in self.sync.on_snapshot_loaded() {
            // Capabilities may have changed while offline.
            if let Err(denial) = PermissionGate::check(&self.roster, &self.me.id, &mutation) {
                debug!(%denial, kind = %mutation.message_type(), "engine: offline edit denied");
                actions.push(Action::Denied(denial));
                continue;
            }
            match self.store.apply(mutation) {
                Ok(entry) if !entry.is_noop() => {
                    actions.extend(self.broadcast(entry.forward.clone()));
                    self.history.push(entry);
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "engine: offline edit no longer applies"),
            }
        }
        actions.push(Action::RenderNeeded);
        actions
    }

    /// Adopt a store restored from a session file. History starts empty.
    pub fn restore_store(&mut self, store: StateStore) -> Vec<Action> {
        info!(revision = store.revision(), scenes = store.scenes().len(), "engine: restoring session");
        self.store = store;
        self.advance_ids();
        self.history.clear();
        self.input = InputState::Idle;
        vec![Action::RenderNeeded]
    }

    fn advance_ids(&mut self) {
        for id in self.store.entity_ids() {
            self.ids.observe(id);
        }
    }

    fn receive_permission_update(&mut self, message: &SyncMessage) -> Vec<Action> {
        let update: PermissionUpdate = match serde_json::from_value(message.payload.clone()) {
            Ok(u) => u,
            Err(e) => {
                warn!(error = %e, "engine: malformed permission update");
                return Vec::new();
            }
        };
        match self.roster.set_capabilities(&message.sender_id, update) {
            Ok(()) => vec![Action::RosterChanged],
            Err(denial) => {
                warn!(%denial, sender = %message.sender_id, "engine: ignored permission update");
                Vec::new()
            }
        }
    }

    fn receive_welcome(&mut self, message: &SyncMessage) -> Vec<Action> {
        let welcome: Welcome = match serde_json::from_value(message.payload.clone()) {
            Ok(w) => w,
            Err(e) => {
                warn!(error = %e, "engine: malformed welcome");
                return Vec::new();
            }
        };
        self.roster.replace(welcome.participants);
        if self.roster.get(&self.me.id).is_none() {
            self.roster.join(self.me.clone());
        }
        vec![Action::RosterChanged]
    }

    fn receive_join(&mut self, message: &SyncMessage) -> Vec<Action> {
        let participant: Participant = match serde_json::from_value(message.payload.clone()) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "engine: malformed join");
                return Vec::new();
            }
        };
        self.sync.forget(&participant.id);
        self.roster.join(participant);
        vec![Action::RosterChanged]
    }

    fn receive_leave(&mut self, message: &SyncMessage) -> Vec<Action> {
        let departure: Departure = match serde_json::from_value(message.payload.clone()) {
            Ok(d) => d,
            Err(e) => {
                warn!(error = %e, "engine: malformed leave");
                return Vec::new();
            }
        };
        self.roster.leave(&departure.id);
        vec![Action::RosterChanged]
    }

    // --- Connection ---

    /// The channel is (re)established.
    pub fn connection_opened(&mut self) -> Vec<Action> {
        match self.sync.on_connect(self.is_host()) {
            Reconnect::Flush(pending) => self.broadcast(pending),
            Reconnect::RequestSnapshot(request) => vec![Action::Send(request)],
        }
    }

    /// The channel dropped. Any gesture in progress is discarded.
    pub fn connection_lost(&mut self) -> Vec<Action> {
        self.sync.on_disconnect();
        self.cancel_gesture()
    }

    // --- Tools ---

    pub fn set_tool(&mut self, tool: Tool) {
        self.ui.tool = tool;
        self.input = InputState::Idle;
    }

    pub fn set_fog_action(&mut self, action: FogAction) {
        self.ui.brush.action = action;
    }

    pub fn set_brush_radius(&mut self, radius: f64) {
        self.ui.brush.set_radius(radius);
    }

    // --- Pointer input ---

    pub fn pointer_down(&mut self, screen: Point, button: Button) -> Vec<Action> {
        let world = self.camera.screen_to_world(screen);
        if button != Button::Primary || self.ui.tool == Tool::Pan {
            self.input = InputState::Panning { last_screen: screen };
            return Vec::new();
        }
        match self.ui.tool {
            Tool::Move => self.begin_drag(screen, world),
            Tool::Draw => {
                self.input = InputState::Painting { points: vec![world] };
                vec![Action::RenderNeeded]
            }
            Tool::Erase => {
                self.input = InputState::Erasing;
                self.erase_at(world)
            }
            Tool::Fog => {
                self.input = InputState::FogPainting { last_dab: world };
                self.fog_dab(world)
            }
            Tool::Pan => Vec::new(),
        }
    }

    pub fn pointer_move(&mut self, screen: Point) -> Vec<Action> {
        let world = self.camera.screen_to_world(screen);
        match &mut self.input {
            InputState::Idle => Vec::new(),
            InputState::Panning { last_screen } => {
                let (dx, dy) = (screen.x - last_screen.x, screen.y - last_screen.y);
                *last_screen = screen;
                self.camera.pan_by(dx, dy);
                vec![Action::RenderNeeded]
            }
            InputState::DraggingToken { grab_offset, current, .. } => {
                *current = Point::new(world.x - grab_offset.x, world.y - grab_offset.y);
                vec![Action::RenderNeeded]
            }
            InputState::Painting { points } => {
                if points.last() == Some(&world) {
                    return Vec::new();
                }
                points.push(world);
                vec![Action::RenderNeeded]
            }
            InputState::Erasing => self.erase_at(world),
            InputState::FogPainting { last_dab } => {
                let spacing = self.ui.brush.radius() * self.config.fog_dab_spacing;
                if world.distance(*last_dab) < spacing {
                    return Vec::new();
                }
                *last_dab = world;
                self.fog_dab(world)
            }
        }
    }

    /// Release commits the gesture.
    pub fn pointer_up(&mut self, screen: Point) -> Vec<Action> {
        let world = self.camera.screen_to_world(screen);
        match std::mem::take(&mut self.input) {
            InputState::DraggingToken { id, grab_offset, origin, .. } => {
                let landing = Point::new(world.x - grab_offset.x, world.y - grab_offset.y);
                if landing == origin {
                    return vec![Action::RenderNeeded];
                }
                self.submit(Mutation::MoveToken { id, x: landing.x, y: landing.y })
            }
            InputState::Painting { mut points } => {
                if points.last() != Some(&world) {
                    points.push(world);
                }
                if points.len() < 2 {
                    return vec![Action::RenderNeeded];
                }
                let drawing = Drawing {
                    id: self.ids.next("drawing"),
                    points,
                    color: self.ui.stroke_color.clone(),
                    width: self.ui.stroke_width,
                    author: Some(self.me.id.clone()),
                };
                self.submit(Mutation::AddDrawing { drawing })
            }
            _ => Vec::new(),
        }
    }

    /// The pointer left the surface: abandon the gesture uncommitted.
    pub fn pointer_leave(&mut self) -> Vec<Action> {
        self.cancel_gesture()
    }

    pub fn wheel(&mut self, screen: Point, delta: WheelDelta) -> Vec<Action> {
        let step = if delta.dy < 0.0 {
            WHEEL_ZOOM_STEP
        } else if delta.dy > 0.0 {
            -WHEEL_ZOOM_STEP
        } else {
            return Vec::new();
        };
        self.camera.zoom_at(screen, step, &self.config.zoom);
        vec![Action::RenderNeeded]
    }

    /// Keyboard shortcuts: Ctrl/Cmd+Z undo, Ctrl/Cmd+Shift+Z or Ctrl/Cmd+Y
    /// redo, Escape cancels the current gesture.
    pub fn key_down(&mut self, key: &str, modifiers: Modifiers) -> Vec<Action> {
        let command = modifiers.ctrl || modifiers.meta;
        match key {
            "Escape" => self.cancel_gesture(),
            "z" | "Z" if command && modifiers.shift => self.redo(),
            "z" | "Z" if command => self.undo(),
            "y" | "Y" if command => self.redo(),
            _ => Vec::new(),
        }
    }

    // --- Gesture helpers ---

    fn cancel_gesture(&mut self) -> Vec<Action> {
        if self.input.is_idle() {
            return Vec::new();
        }
        debug!("engine: gesture discarded");
        self.input = InputState::Idle;
        vec![Action::RenderNeeded]
    }

    fn begin_drag(&mut self, screen: Point, world: Point) -> Vec<Action> {
        let tokens = self.store.tokens();
        let Some((id, center)) = hit::token_at(&tokens, world).map(|t| (t.id.clone(), t.center())) else {
            self.input = InputState::Panning { last_screen: screen };
            return Vec::new();
        };
        let probe = Mutation::MoveToken { id: id.clone(), x: center.x, y: center.y };
        if let Err(denial) = PermissionGate::check(&self.roster, &self.me.id, &probe) {
            return vec![Action::Denied(denial)];
        }
        self.input = InputState::DraggingToken {
            id,
            grab_offset: Point::new(world.x - center.x, world.y - center.y),
            origin: center,
            current: center,
        };
        vec![Action::RenderNeeded]
    }

    fn erase_at(&mut self, world: Point) -> Vec<Action> {
        let reach = self.ui.stroke_width * self.config.erase_radius_factor;
        let hits = hit::drawings_near(&self.store.drawings(), world, reach);
        let mut actions = Vec::new();
        for id in hits {
            actions.extend(self.submit(Mutation::RemoveDrawing { id }));
        }
        actions
    }

    fn fog_dab(&mut self, world: Point) -> Vec<Action> {
        let radius = self.ui.brush.radius();
        let mutation = match self.ui.brush.action {
            FogAction::Reveal => Mutation::RevealFog { area: FogArea::reveal(self.ids.next("fog"), world, radius) },
            FogAction::Hide => Mutation::HideFog { x: world.x, y: world.y, radius },
        };
        self.submit(mutation)
    }

    fn broadcast(&mut self, mutations: Vec<Mutation>) -> Vec<Action> {
        let mut actions = Vec::with_capacity(mutations.len());
        for mutation in mutations {
            match self.sync.outbound(mutation) {
                Ok(Some(message)) => actions.push(Action::Send(message)),
                Ok(None) => {}
                Err(e) => actions.push(Action::rejected(&e)),
            }
        }
        actions
    }
}
