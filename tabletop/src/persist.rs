//! Save and load session state as JSON files.
//!
//! Two layouts are supported. A snapshot file holds exactly the
//! `state:snapshot` payload for the active scene, so an export can be fed
//! back through [`StateStore::load_snapshot`]. A session file holds every
//! scene with its fog layer and rebuilds a whole store.
//!
//! Both carry the store revision, and [`is_stale`] tells whether a saved
//! file is behind a live session.

#[cfg(test)]
#[path = "persist_test.rs"]
mod persist_test;

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::doc::{Drawing, EntityId, Scene, SceneSlot, Snapshot, StateStore, Token};
use crate::error::PersistError;
use crate::fog::{FogOfWar, FogState};

/// Session file layout version written by this build.
pub const SESSION_FILE_VERSION: u32 = 1;

/// Whether a file saved at `saved_revision` is behind a live session.
#[must_use]
pub fn is_stale(saved_revision: u64, live_revision: u64) -> bool {
    saved_revision < live_revision
}

/// One scene and its fog, as stored in a session file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedScene {
    pub scene: Scene,
    #[serde(default = "enabled_fog")]
    pub fog: FogState,
}

fn enabled_fog() -> FogState {
    FogOfWar::new().export_state()
}

/// Every scene of a store with its tokens and drawings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionFile {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub revision: u64,
    pub active_scene: EntityId,
    pub scenes: Vec<SavedScene>,
    #[serde(default)]
    pub tokens: Vec<Token>,
    #[serde(default)]
    pub drawings: Vec<Drawing>,
}

impl SessionFile {
    #[must_use]
    pub fn capture(store: &StateStore) -> Self {
        let mut tokens: Vec<Token> = store.all_tokens().cloned().collect();
        tokens.sort_by(|a, b| a.id.cmp(&b.id));
        let mut drawings: Vec<Drawing> = store.all_drawings().cloned().collect();
        drawings.sort_by(|a, b| a.id.cmp(&b.id));
        Self {
            version: SESSION_FILE_VERSION,
            revision: store.revision(),
            active_scene: store.active_scene().id.clone(),
            scenes: store
                .scenes()
                .iter()
                .map(|slot| SavedScene { scene: slot.scene.clone(), fog: slot.fog.export_state() })
                .collect(),
            tokens,
            drawings,
        }
    }

    /// Rebuild the store this file was captured from.
    ///
    /// # Errors
    ///
    /// Returns `Restore` if the file names no scenes or its active scene is
    /// missing.
    pub fn into_store(self) -> Result<StateStore, PersistError> {
        let scenes = self
            .scenes
            .into_iter()
            .map(|saved| SceneSlot { scene: saved.scene, fog: FogOfWar::from_state(saved.fog) })
            .collect();
        Ok(StateStore::restore(scenes, &self.active_scene, self.tokens, self.drawings, self.revision)?)
    }
}

/// Write the active scene's snapshot to `path`.
///
/// # Errors
///
/// Returns `Io` if the file cannot be written.
pub fn save_snapshot(path: &Path, snapshot: &Snapshot) -> Result<(), PersistError> {
    write_json(path, snapshot)?;
    info!(path = %path.display(), revision = snapshot.revision, "persist: snapshot saved");
    Ok(())
}

/// Read a snapshot file.
///
/// # Errors
///
/// Returns `Io` if the file cannot be read and `Json` if it is not a
/// snapshot.
pub fn load_snapshot(path: &Path) -> Result<Snapshot, PersistError> {
    read_json(path)
}

/// Write every scene of `store` to `path`.
///
/// # Errors
///
/// Returns `Io` if the file cannot be written.
pub fn save_session(path: &Path, store: &StateStore) -> Result<(), PersistError> {
    let file = SessionFile::capture(store);
    write_json(path, &file)?;
    info!(path = %path.display(), revision = file.revision, scenes = file.scenes.len(), "persist: session saved");
    Ok(())
}

/// Read a session file and rebuild its store.
///
/// # Errors
///
/// Returns `Io`, `Json`, or `Restore` depending on which step failed.
pub fn load_session(path: &Path) -> Result<StateStore, PersistError> {
    let file: SessionFile = read_json(path)?;
    file.into_store()
}

/// Saves a session file whenever the store revision has moved since the
/// last save.
#[derive(Debug, Clone)]
pub struct AutoSave {
    path: PathBuf,
    saved_revision: Option<u64>,
}

impl AutoSave {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), saved_revision: None }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn saved_revision(&self) -> Option<u64> {
        self.saved_revision
    }

    /// Save if `store` changed since the last save. Returns whether a file
    /// was written.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be written. The next call retries.
    pub fn save_if_changed(&mut self, store: &StateStore) -> Result<bool, PersistError> {
        if self.saved_revision == Some(store.revision()) {
            return Ok(false);
        }
        save_session(&self.path, store)?;
        self.saved_revision = Some(store.revision());
        Ok(true)
    }
}

/// Write through a sibling temp file so a crash never leaves a torn file.
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistError> {
    let body = serde_json::to_vec_pretty(value)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, body)?;
    fs::rename(&tmp, path)?;
    debug!(path = %path.display(), "persist: wrote file");
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, PersistError> {
    let body = fs::read(path)?;
    Ok(serde_json::from_slice(&body)?)
}
