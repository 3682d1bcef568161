//! Document model: tabletop entities, the mutation vocabulary, and the
//! authoritative in-memory store.
//!
//! Entities (`Token`, `Drawing`, `FogArea`) live in a flat id-keyed store and
//! are grouped under `Scene`s. Exactly one scene is active; inactive scenes
//! keep their contents. Every change goes through a [`Mutation`], whether it
//! was produced locally or decoded from the network, and [`StateStore::apply`]
//! returns the [`HistoryEntry`] describing what changed and how to undo it.
//!
//! Mutations are idempotent: applying one whose effect is already present
//! changes nothing and does not bump the revision. Conflicting edits to the
//! same entity resolve last-write-wins in delivery order.

#[cfg(test)]
#[path = "doc_test.rs"]
mod doc_test;

use std::collections::HashMap;

use frames::MessageType;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::camera::Point;
use crate::consts::{GRID_CELL_SIZE, GRID_COLOR};
use crate::error::{MutationError, ValidationError};
use crate::fog::{FogArea, FogOfWar, FogState};
use crate::history::HistoryEntry;

/// Unique identifier for a token, drawing, fog area, or scene.
pub type EntityId = String;

/// Identifier of a session participant.
pub type ParticipantId = String;

/// Identifier of a shared session.
pub type SessionId = String;

// =============================================================================
// RECORDS
// =============================================================================

/// Background image reference for a scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapImage {
    pub url: String,
    pub width: f64,
    pub height: f64,
}

/// Square grid overlay settings for a scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridConfig {
    pub enabled: bool,
    /// Edge length of one cell in world units.
    pub cell_size: f64,
    pub color: String,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self { enabled: true, cell_size: GRID_CELL_SIZE, color: GRID_COLOR.to_owned() }
    }
}

/// A movable disc representing a character or object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub id: EntityId,
    /// Scene the token is placed on.
    pub scene_id: EntityId,
    /// Center x in world coordinates.
    pub x: f64,
    /// Center y in world coordinates.
    pub y: f64,
    pub radius: f64,
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Participant who placed the token, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<ParticipantId>,
}

impl Token {
    #[must_use]
    pub fn center(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// A freehand stroke. Immutable once added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Drawing {
    pub id: EntityId,
    /// Stroke path in world coordinates.
    pub points: Vec<Point>,
    pub color: String,
    pub width: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<ParticipantId>,
}

/// A named map layer. Token and drawing ids are kept in insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub id: EntityId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<MapImage>,
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub token_ids: Vec<EntityId>,
    #[serde(default)]
    pub drawing_ids: Vec<EntityId>,
}

impl Scene {
    #[must_use]
    pub fn new(id: impl Into<EntityId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            background: None,
            grid: GridConfig::default(),
            token_ids: Vec::new(),
            drawing_ids: Vec::new(),
        }
    }

    /// Same scene with its content lists emptied.
    fn metadata(&self) -> Self {
        Self { token_ids: Vec::new(), drawing_ids: Vec::new(), ..self.clone() }
    }
}

// =============================================================================
// MUTATIONS
// =============================================================================

/// A single state change. The wire form is the message type plus the
/// variant's fields as the payload object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all_fields = "camelCase")]
pub enum Mutation {
    #[serde(rename = "token:add")]
    AddToken { token: Token },
    #[serde(rename = "token:move")]
    MoveToken { id: EntityId, x: f64, y: f64 },
    #[serde(rename = "token:update")]
    UpdateToken { id: EntityId, label: String },
    #[serde(rename = "token:remove")]
    RemoveToken { id: EntityId },
    #[serde(rename = "drawing:add")]
    AddDrawing { drawing: Drawing },
    #[serde(rename = "drawing:remove")]
    RemoveDrawing { id: EntityId },
    #[serde(rename = "drawing:clear")]
    ClearDrawings {},
    #[serde(rename = "fog:reveal")]
    RevealFog { area: FogArea },
    #[serde(rename = "fog:hide")]
    HideFog { x: f64, y: f64, radius: f64 },
    #[serde(rename = "fog:remove")]
    RemoveFogArea { id: EntityId },
    #[serde(rename = "fog:clear")]
    ClearFog {},
    #[serde(rename = "fog:toggle")]
    SetFogEnabled { enabled: bool },
    #[serde(rename = "scene:add")]
    AddScene { scene: Scene },
    #[serde(rename = "scene:switch")]
    SwitchScene { scene_id: EntityId },
    #[serde(rename = "grid:update")]
    SetGrid { grid: GridConfig },
}

impl Mutation {
    /// Id of the entity this mutation creates, if it creates one.
    #[must_use]
    pub fn created_id(&self) -> Option<&str> {
        match self {
            Self::AddToken { token } => Some(&token.id),
            Self::AddDrawing { drawing } => Some(&drawing.id),
            Self::RevealFog { area } => Some(&area.id),
            Self::AddScene { scene } => Some(&scene.id),
            _ => None,
        }
    }

    #[must_use]
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::AddToken { .. } => MessageType::TokenAdd,
            Self::MoveToken { .. } => MessageType::TokenMove,
            Self::UpdateToken { .. } => MessageType::TokenUpdate,
            Self::RemoveToken { .. } => MessageType::TokenRemove,
            Self::AddDrawing { .. } => MessageType::DrawingAdd,
            Self::RemoveDrawing { .. } => MessageType::DrawingRemove,
            Self::ClearDrawings {} => MessageType::DrawingClear,
            Self::RevealFog { .. } => MessageType::FogReveal,
            Self::HideFog { .. } => MessageType::FogHide,
            Self::RemoveFogArea { .. } => MessageType::FogRemove,
            Self::ClearFog {} => MessageType::FogClear,
            Self::SetFogEnabled { .. } => MessageType::FogToggle,
            Self::AddScene { .. } => MessageType::SceneAdd,
            Self::SwitchScene { .. } => MessageType::SceneSwitch,
            Self::SetGrid { .. } => MessageType::GridUpdate,
        }
    }

    /// The payload object carried by a sync message for this mutation.
    ///
    /// # Errors
    ///
    /// Returns an error if a field cannot be represented as JSON.
    pub fn to_payload(&self) -> Result<Value, serde_json::Error> {
        let mut value = serde_json::to_value(self)?;
        Ok(value
            .get_mut("payload")
            .map_or_else(|| Value::Object(serde_json::Map::new()), Value::take))
    }

    /// Decode a mutation from a message type and payload. A null payload is
    /// treated as an empty object.
    ///
    /// # Errors
    ///
    /// Returns an error if `kind` is not a mutation type or the payload does
    /// not match its fields.
    pub fn from_message(kind: MessageType, payload: &Value) -> Result<Self, serde_json::Error> {
        let payload = if payload.is_null() { Value::Object(serde_json::Map::new()) } else { payload.clone() };
        serde_json::from_value(serde_json::json!({ "type": kind.as_str(), "payload": payload }))
    }

    /// Id of the token this mutation targets, if any.
    #[must_use]
    pub fn token_id(&self) -> Option<&str> {
        match self {
            Self::AddToken { token } => Some(&token.id),
            Self::MoveToken { id, .. } | Self::UpdateToken { id, .. } | Self::RemoveToken { id } => Some(id),
            _ => None,
        }
    }
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// Full state of the active scene, used for join and resync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub scene: Scene,
    #[serde(default)]
    pub tokens: Vec<Token>,
    #[serde(default)]
    pub drawings: Vec<Drawing>,
    #[serde(default)]
    pub fog_areas: Vec<FogArea>,
    #[serde(default = "fog_enabled_default")]
    pub fog_enabled: bool,
    #[serde(default)]
    pub revision: u64,
}

fn fog_enabled_default() -> bool {
    true
}

// =============================================================================
// STORE
// =============================================================================

/// A scene and its fog layer.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneSlot {
    pub scene: Scene,
    pub fog: FogOfWar,
}

/// Authoritative local copy of the session state.
#[derive(Debug, Clone)]
pub struct StateStore {
    scenes: Vec<SceneSlot>,
    /// Index into `scenes`. Scenes are never removed, so this stays valid.
    active: usize,
    tokens: HashMap<EntityId, Token>,
    drawings: HashMap<EntityId, Drawing>,
    revision: u64,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(Scene::new("main", "Main"))
    }
}

impl StateStore {
    /// Create a store whose only (and active) scene is `scene`.
    #[must_use]
    pub fn new(scene: Scene) -> Self {
        Self {
            scenes: vec![SceneSlot { scene: scene.metadata(), fog: FogOfWar::new() }],
            active: 0,
            tokens: HashMap::new(),
            drawings: HashMap::new(),
            revision: 0,
        }
    }

    /// Rebuild a store from saved parts. Tokens whose scene is missing and
    /// malformed records are dropped with a warning.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if `scenes` is empty or `active_scene` is not among
    /// them.
    pub fn restore(
        scenes: Vec<SceneSlot>,
        active_scene: &str,
        tokens: Vec<Token>,
        drawings: Vec<Drawing>,
        revision: u64,
    ) -> Result<Self, MutationError> {
        let Some(active) = scenes.iter().position(|s| s.scene.id == active_scene) else {
            return Err(MutationError::NotFound { kind: "scene", id: active_scene.to_owned() });
        };
        let mut store = Self { scenes, active, tokens: HashMap::new(), drawings: HashMap::new(), revision };

        let known_tokens: Vec<EntityId> = store.scenes.iter().flat_map(|s| s.scene.token_ids.clone()).collect();
        let known_drawings: Vec<EntityId> = store.scenes.iter().flat_map(|s| s.scene.drawing_ids.clone()).collect();
        for token in tokens {
            if validate_token(&token).is_err() || !known_tokens.contains(&token.id) {
                warn!(id = %token.id, "doc: dropping unplaceable token on restore");
                continue;
            }
            store.tokens.insert(token.id.clone(), token);
        }
        for drawing in drawings {
            if validate_drawing(&drawing).is_err() || !known_drawings.contains(&drawing.id) {
                warn!(id = %drawing.id, "doc: dropping unplaceable drawing on restore");
                continue;
            }
            store.drawings.insert(drawing.id.clone(), drawing);
        }
        for slot in &mut store.scenes {
            slot.scene.token_ids.retain(|id| store.tokens.contains_key(id));
            slot.scene.drawing_ids.retain(|id| store.drawings.contains_key(id));
        }
        Ok(store)
    }

    // --- Readers ---

    /// Incremented once per mutation that changed state.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    #[must_use]
    pub fn active_scene(&self) -> &Scene {
        &self.scenes[self.active].scene
    }

    /// All scenes with their fog layers, in creation order.
    #[must_use]
    pub fn scenes(&self) -> &[SceneSlot] {
        &self.scenes
    }

    #[must_use]
    pub fn scene(&self, id: &str) -> Option<&Scene> {
        self.scenes.iter().map(|s| &s.scene).find(|s| s.id == id)
    }

    #[must_use]
    pub fn token(&self, id: &str) -> Option<&Token> {
        self.tokens.get(id)
    }

    /// Tokens on the active scene, in placement order.
    #[must_use]
    pub fn tokens(&self) -> Vec<&Token> {
        self.active_scene().token_ids.iter().filter_map(|id| self.tokens.get(id)).collect()
    }

    /// Tokens across every scene.
    pub fn all_tokens(&self) -> impl Iterator<Item = &Token> {
        self.scenes
            .iter()
            .flat_map(|s| s.scene.token_ids.iter())
            .filter_map(|id| self.tokens.get(id))
    }

    #[must_use]
    pub fn drawing(&self, id: &str) -> Option<&Drawing> {
        self.drawings.get(id)
    }

    /// Drawings on the active scene, oldest first.
    #[must_use]
    pub fn drawings(&self) -> Vec<&Drawing> {
        self.active_scene().drawing_ids.iter().filter_map(|id| self.drawings.get(id)).collect()
    }

    /// Drawings across every scene.
    pub fn all_drawings(&self) -> impl Iterator<Item = &Drawing> {
        self.scenes
            .iter()
            .flat_map(|s| s.scene.drawing_ids.iter())
            .filter_map(|id| self.drawings.get(id))
    }

    /// Every scene, token, drawing, and fog area id in the store.
    pub fn entity_ids(&self) -> impl Iterator<Item = &str> {
        self.scenes.iter().flat_map(|slot| {
            std::iter::once(slot.scene.id.as_str())
                .chain(slot.scene.token_ids.iter().map(String::as_str))
                .chain(slot.scene.drawing_ids.iter().map(String::as_str))
                .chain(slot.fog.areas().iter().map(|a| a.id.as_str()))
        })
    }

    /// Fog layer of the active scene.
    #[must_use]
    pub fn fog(&self) -> &FogOfWar {
        &self.scenes[self.active].fog
    }

    // --- Apply ---

    /// Apply one mutation.
    ///
    /// # Errors
    ///
    /// Returns a validation error for malformed input, or `NotFound` when an
    /// edit targets a token or scene that does not exist. Removing something
    /// already absent is not an error.
    pub fn apply(&mut self, mutation: Mutation) -> Result<HistoryEntry, MutationError> {
        match mutation {
            Mutation::AddToken { token } => self.add_token(token),
            Mutation::MoveToken { id, x, y } => self.move_token(&id, x, y),
            Mutation::UpdateToken { id, label } => self.update_token(&id, label),
            Mutation::RemoveToken { id } => Ok(self.remove_token(&id)),
            Mutation::AddDrawing { drawing } => self.add_drawing(drawing),
            Mutation::RemoveDrawing { id } => Ok(self.remove_drawing(&id)),
            Mutation::ClearDrawings {} => Ok(self.clear_drawings()),
            Mutation::RevealFog { area } => self.reveal_fog(area),
            Mutation::HideFog { x, y, radius } => self.hide_fog(Point::new(x, y), radius),
            Mutation::RemoveFogArea { id } => Ok(self.remove_fog_area(&id)),
            Mutation::ClearFog {} => Ok(self.clear_fog()),
            Mutation::SetFogEnabled { enabled } => Ok(self.set_fog_enabled(enabled)),
            Mutation::AddScene { scene } => self.add_scene(scene),
            Mutation::SwitchScene { scene_id } => self.switch_scene(&scene_id),
            Mutation::SetGrid { grid } => self.set_grid(grid),
        }
    }

    /// Place a token, or replace the token with the same id.
    ///
    /// # Errors
    ///
    /// Validation failure, or `NotFound` if the token's scene does not exist.
    pub fn add_token(&mut self, token: Token) -> Result<HistoryEntry, MutationError> {
        validate_token(&token)?;
        let Some(target) = self.slot_index(&token.scene_id) else {
            return Err(MutationError::NotFound { kind: "scene", id: token.scene_id });
        };
        if self.tokens.get(&token.id) == Some(&token) {
            return Ok(HistoryEntry::noop(MessageType::TokenAdd));
        }

        let previous = self.tokens.insert(token.id.clone(), token.clone());
        let inverse = match previous {
            Some(old) => {
                if old.scene_id != token.scene_id {
                    self.detach_token(&token.id);
                }
                vec![Mutation::AddToken { token: old }]
            }
            None => vec![Mutation::RemoveToken { id: token.id.clone() }],
        };
        let ids = &mut self.scenes[target].scene.token_ids;
        if !ids.contains(&token.id) {
            ids.push(token.id.clone());
        }
        Ok(self.commit(Mutation::AddToken { token }, inverse))
    }

    /// Move a token to an absolute world position.
    ///
    /// # Errors
    ///
    /// Validation failure, or `NotFound` if the token does not exist.
    #[allow(clippy::float_cmp)]
    pub fn move_token(&mut self, id: &str, x: f64, y: f64) -> Result<HistoryEntry, MutationError> {
        finite("x", x)?;
        finite("y", y)?;
        let Some(token) = self.tokens.get_mut(id) else {
            return Err(MutationError::NotFound { kind: "token", id: id.to_owned() });
        };
        if token.x == x && token.y == y {
            return Ok(HistoryEntry::noop(MessageType::TokenMove));
        }
        let inverse = Mutation::MoveToken { id: id.to_owned(), x: token.x, y: token.y };
        token.x = x;
        token.y = y;
        Ok(self.commit(Mutation::MoveToken { id: id.to_owned(), x, y }, vec![inverse]))
    }

    /// Change a token's label.
    ///
    /// # Errors
    ///
    /// `NotFound` if the token does not exist.
    pub fn update_token(&mut self, id: &str, label: String) -> Result<HistoryEntry, MutationError> {
        let Some(token) = self.tokens.get_mut(id) else {
            return Err(MutationError::NotFound { kind: "token", id: id.to_owned() });
        };
        if token.label == label {
            return Ok(HistoryEntry::noop(MessageType::TokenUpdate));
        }
        let previous = std::mem::replace(&mut token.label, label.clone());
        let inverse = Mutation::UpdateToken { id: id.to_owned(), label: previous };
        Ok(self.commit(Mutation::UpdateToken { id: id.to_owned(), label }, vec![inverse]))
    }

    /// Remove a token. Removing an absent token is a no-op.
    pub fn remove_token(&mut self, id: &str) -> HistoryEntry {
        let Some(old) = self.tokens.remove(id) else {
            return HistoryEntry::noop(MessageType::TokenRemove);
        };
        self.detach_token(id);
        self.commit(Mutation::RemoveToken { id: id.to_owned() }, vec![Mutation::AddToken { token: old }])
    }

    /// Add a stroke to the active scene.
    ///
    /// # Errors
    ///
    /// Validation failure.
    pub fn add_drawing(&mut self, drawing: Drawing) -> Result<HistoryEntry, MutationError> {
        validate_drawing(&drawing)?;
        if self.drawings.get(&drawing.id) == Some(&drawing) {
            return Ok(HistoryEntry::noop(MessageType::DrawingAdd));
        }
        let inverse = match self.drawings.insert(drawing.id.clone(), drawing.clone()) {
            Some(old) => Mutation::AddDrawing { drawing: old },
            None => Mutation::RemoveDrawing { id: drawing.id.clone() },
        };
        self.detach_drawing(&drawing.id);
        self.scenes[self.active].scene.drawing_ids.push(drawing.id.clone());
        Ok(self.commit(Mutation::AddDrawing { drawing }, vec![inverse]))
    }

    /// Remove one stroke. Removing an absent stroke is a no-op.
    pub fn remove_drawing(&mut self, id: &str) -> HistoryEntry {
        let Some(old) = self.drawings.remove(id) else {
            return HistoryEntry::noop(MessageType::DrawingRemove);
        };
        self.detach_drawing(id);
        self.commit(Mutation::RemoveDrawing { id: id.to_owned() }, vec![Mutation::AddDrawing { drawing: old }])
    }

    /// Remove every stroke on the active scene.
    pub fn clear_drawings(&mut self) -> HistoryEntry {
        let ids = std::mem::take(&mut self.scenes[self.active].scene.drawing_ids);
        if ids.is_empty() {
            return HistoryEntry::noop(MessageType::DrawingClear);
        }
        let inverse = ids
            .iter()
            .filter_map(|id| self.drawings.remove(id))
            .map(|drawing| Mutation::AddDrawing { drawing })
            .collect();
        self.commit(Mutation::ClearDrawings {}, inverse)
    }

    /// Add a reveal area to the active scene's fog.
    ///
    /// # Errors
    ///
    /// Validation failure.
    #[allow(clippy::float_cmp)]
    pub fn reveal_fog(&mut self, area: FogArea) -> Result<HistoryEntry, MutationError> {
        validate_fog_area(&area)?;
        let fog = &mut self.scenes[self.active].fog;
        if let Some(existing) = fog.area(&area.id) {
            if existing.center() == area.center() && existing.radius == area.radius {
                return Ok(HistoryEntry::noop(MessageType::FogReveal));
            }
        }
        let inverse = match fog.insert(area.clone()) {
            Some(old) => Mutation::RevealFog { area: old },
            None => Mutation::RemoveFogArea { id: area.id.clone() },
        };
        let area = fog.area(&area.id).cloned().unwrap_or(area);
        Ok(self.commit(Mutation::RevealFog { area }, vec![inverse]))
    }

    /// Delete every reveal area overlapping the disc at `point`.
    ///
    /// # Errors
    ///
    /// Validation failure.
    pub fn hide_fog(&mut self, point: Point, radius: f64) -> Result<HistoryEntry, MutationError> {
        finite("x", point.x)?;
        finite("y", point.y)?;
        positive("radius", radius)?;
        let removed = self.scenes[self.active].fog.hide(point, radius);
        if removed.is_empty() {
            return Ok(HistoryEntry::noop(MessageType::FogHide));
        }
        let inverse = removed.into_iter().map(|area| Mutation::RevealFog { area }).collect();
        Ok(self.commit(Mutation::HideFog { x: point.x, y: point.y, radius }, inverse))
    }

    /// Remove one reveal area by id.
    pub fn remove_fog_area(&mut self, id: &str) -> HistoryEntry {
        let Some(old) = self.scenes[self.active].fog.remove(id) else {
            return HistoryEntry::noop(MessageType::FogRemove);
        };
        self.commit(Mutation::RemoveFogArea { id: id.to_owned() }, vec![Mutation::RevealFog { area: old }])
    }

    /// Drop every reveal area on the active scene.
    pub fn clear_fog(&mut self) -> HistoryEntry {
        let removed = self.scenes[self.active].fog.clear_all();
        if removed.is_empty() {
            return HistoryEntry::noop(MessageType::FogClear);
        }
        let inverse = removed.into_iter().map(|area| Mutation::RevealFog { area }).collect();
        self.commit(Mutation::ClearFog {}, inverse)
    }

    pub fn set_fog_enabled(&mut self, enabled: bool) -> HistoryEntry {
        let fog = &mut self.scenes[self.active].fog;
        if fog.enabled() == enabled {
            return HistoryEntry::noop(MessageType::FogToggle);
        }
        fog.set_enabled(enabled);
        self.commit(Mutation::SetFogEnabled { enabled }, vec![Mutation::SetFogEnabled { enabled: !enabled }])
    }

    /// Create a scene, or update the name, background, and grid of an
    /// existing one. Content lists in `scene` are ignored. Creating a scene
    /// cannot be undone.
    ///
    /// # Errors
    ///
    /// Validation failure.
    pub fn add_scene(&mut self, scene: Scene) -> Result<HistoryEntry, MutationError> {
        non_empty("scene.id", &scene.id)?;
        validate_grid(&scene.grid)?;
        let scene = scene.metadata();

        let Some(idx) = self.slot_index(&scene.id) else {
            self.scenes.push(SceneSlot { scene: scene.clone(), fog: FogOfWar::new() });
            return Ok(self.commit(Mutation::AddScene { scene }, Vec::new()));
        };
        let existing = &mut self.scenes[idx].scene;
        let old = existing.metadata();
        if old == scene {
            return Ok(HistoryEntry::noop(MessageType::SceneAdd));
        }
        existing.name.clone_from(&scene.name);
        existing.background.clone_from(&scene.background);
        existing.grid = scene.grid.clone();
        Ok(self.commit(Mutation::AddScene { scene }, vec![Mutation::AddScene { scene: old }]))
    }

    /// Make another scene active. Inactive scenes keep their contents.
    ///
    /// # Errors
    ///
    /// `NotFound` if the scene does not exist.
    pub fn switch_scene(&mut self, scene_id: &str) -> Result<HistoryEntry, MutationError> {
        let Some(idx) = self.slot_index(scene_id) else {
            return Err(MutationError::NotFound { kind: "scene", id: scene_id.to_owned() });
        };
        if idx == self.active {
            return Ok(HistoryEntry::noop(MessageType::SceneSwitch));
        }
        let previous = self.active_scene().id.clone();
        self.active = idx;
        Ok(self.commit(
            Mutation::SwitchScene { scene_id: scene_id.to_owned() },
            vec![Mutation::SwitchScene { scene_id: previous }],
        ))
    }

    /// Replace the active scene's grid settings.
    ///
    /// # Errors
    ///
    /// Validation failure.
    pub fn set_grid(&mut self, grid: GridConfig) -> Result<HistoryEntry, MutationError> {
        validate_grid(&grid)?;
        let current = &mut self.scenes[self.active].scene.grid;
        if *current == grid {
            return Ok(HistoryEntry::noop(MessageType::GridUpdate));
        }
        let previous = std::mem::replace(current, grid.clone());
        Ok(self.commit(Mutation::SetGrid { grid }, vec![Mutation::SetGrid { grid: previous }]))
    }

    // --- Snapshot ---

    /// Capture the active scene.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        let slot = &self.scenes[self.active];
        Snapshot {
            scene: slot.scene.clone(),
            tokens: self.tokens().into_iter().cloned().collect(),
            drawings: self.drawings().into_iter().cloned().collect(),
            fog_areas: slot.fog.areas().to_vec(),
            fog_enabled: slot.fog.enabled(),
            revision: self.revision,
        }
    }

    /// Replace the snapshot's scene wholesale and make it active. Other
    /// scenes are left alone. The store adopts the snapshot's revision.
    /// Malformed records are dropped with a warning.
    pub fn load_snapshot(&mut self, snapshot: Snapshot) {
        let Snapshot { scene, tokens, drawings, fog_areas, fog_enabled, revision } = snapshot;
        let mut scene = scene.metadata();

        if let Some(idx) = self.slot_index(&scene.id) {
            let old = &self.scenes[idx].scene;
            for id in &old.token_ids {
                self.tokens.remove(id);
            }
            for id in &old.drawing_ids {
                self.drawings.remove(id);
            }
        }

        for mut token in tokens {
            token.scene_id.clone_from(&scene.id);
            if let Err(e) = validate_token(&token) {
                warn!(id = %token.id, error = %e, "doc: dropping malformed snapshot token");
                continue;
            }
            if self.tokens.contains_key(&token.id) {
                self.detach_token(&token.id);
            }
            if !scene.token_ids.contains(&token.id) {
                scene.token_ids.push(token.id.clone());
            }
            self.tokens.insert(token.id.clone(), token);
        }
        for drawing in drawings {
            if let Err(e) = validate_drawing(&drawing) {
                warn!(id = %drawing.id, error = %e, "doc: dropping malformed snapshot drawing");
                continue;
            }
            if self.drawings.contains_key(&drawing.id) {
                self.detach_drawing(&drawing.id);
            }
            if !scene.drawing_ids.contains(&drawing.id) {
                scene.drawing_ids.push(drawing.id.clone());
            }
            self.drawings.insert(drawing.id.clone(), drawing);
        }

        let fog = FogOfWar::from_state(FogState { enabled: fog_enabled, areas: fog_areas });
        let slot = SceneSlot { scene, fog };
        match self.slot_index(&slot.scene.id) {
            Some(idx) => {
                self.scenes[idx] = slot;
                self.active = idx;
            }
            None => {
                self.scenes.push(slot);
                self.active = self.scenes.len() - 1;
            }
        }
        self.revision = revision;
    }

    // --- Internals ---

    fn commit(&mut self, forward: Mutation, inverse: Vec<Mutation>) -> HistoryEntry {
        self.revision += 1;
        HistoryEntry::new(forward, inverse)
    }

    fn slot_index(&self, scene_id: &str) -> Option<usize> {
        self.scenes.iter().position(|s| s.scene.id == scene_id)
    }

    fn detach_token(&mut self, id: &str) {
        for slot in &mut self.scenes {
            slot.scene.token_ids.retain(|t| t != id);
        }
    }

    fn detach_drawing(&mut self, id: &str) {
        for slot in &mut self.scenes {
            slot.scene.drawing_ids.retain(|d| d != id);
        }
    }
}

// =============================================================================
// VALIDATION
// =============================================================================

fn finite(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() { Ok(()) } else { Err(ValidationError::NonFinite { field }) }
}

fn positive(field: &'static str, value: f64) -> Result<(), ValidationError> {
    finite(field, value)?;
    if value > 0.0 { Ok(()) } else { Err(ValidationError::NonPositive { field, value }) }
}

fn non_empty(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.is_empty() { Err(ValidationError::Empty { field }) } else { Ok(()) }
}

fn validate_token(token: &Token) -> Result<(), ValidationError> {
    non_empty("token.id", &token.id)?;
    non_empty("token.sceneId", &token.scene_id)?;
    finite("token.x", token.x)?;
    finite("token.y", token.y)?;
    positive("token.radius", token.radius)
}

fn validate_drawing(drawing: &Drawing) -> Result<(), ValidationError> {
    non_empty("drawing.id", &drawing.id)?;
    non_empty("drawing.color", &drawing.color)?;
    positive("drawing.width", drawing.width)?;
    if drawing.points.is_empty() {
        return Err(ValidationError::Empty { field: "drawing.points" });
    }
    if drawing.points.iter().all(|p| p.is_finite()) {
        Ok(())
    } else {
        Err(ValidationError::NonFinite { field: "drawing.points" })
    }
}

fn validate_fog_area(area: &FogArea) -> Result<(), ValidationError> {
    non_empty("area.id", &area.id)?;
    finite("area.x", area.x)?;
    finite("area.y", area.y)?;
    positive("area.radius", area.radius)
}

fn validate_grid(grid: &GridConfig) -> Result<(), ValidationError> {
    positive("grid.cellSize", grid.cell_size)?;
    non_empty("grid.color", &grid.color)
}
