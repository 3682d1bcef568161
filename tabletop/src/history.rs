//! Bounded undo/redo of the local participant's own edits.
//!
//! Each entry pairs the mutations that were applied with the mutations that
//! undo them. Undo and redo go back through [`StateStore::apply`], and the
//! caller broadcasts what was applied like any other edit.

#[cfg(test)]
#[path = "history_test.rs"]
mod history_test;

use frames::MessageType;
use tracing::{debug, warn};

use crate::consts::HISTORY_LIMIT;
use crate::doc::{Mutation, StateStore};
use crate::error::MutationError;

/// One reversible user action.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    /// Sequence number of the broadcast that carried the forward edit, or 0
    /// before it was sent.
    pub sequence: u64,
    pub kind: MessageType,
    pub forward: Vec<Mutation>,
    pub inverse: Vec<Mutation>,
}

impl HistoryEntry {
    /// An applied edit with its inverse.
    #[must_use]
    pub fn new(forward: Mutation, inverse: Vec<Mutation>) -> Self {
        Self { sequence: 0, kind: forward.message_type(), forward: vec![forward], inverse }
    }

    /// An edit that left the store unchanged.
    #[must_use]
    pub fn noop(kind: MessageType) -> Self {
        Self { sequence: 0, kind, forward: Vec::new(), inverse: Vec::new() }
    }

    /// Whether the forward edit left the store unchanged. Only changed
    /// edits are broadcast.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.forward.is_empty()
    }

    /// Whether undo has anything to apply.
    #[must_use]
    pub fn is_reversible(&self) -> bool {
        !self.forward.is_empty() && !self.inverse.is_empty()
    }

    #[must_use]
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }
}

/// Undo and redo depth, for toolbar state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HistoryStats {
    pub undo: usize,
    pub redo: usize,
}

#[derive(Debug, Clone)]
pub struct History {
    entries: Vec<HistoryEntry>,
    /// Number of entries currently applied; `entries[cursor..]` are redoable.
    cursor: usize,
    limit: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(HISTORY_LIMIT)
    }
}

impl History {
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self { entries: Vec::new(), cursor: 0, limit: limit.max(1) }
    }

    /// Record a new action. Discards the redo tail; evicts the oldest entry
    /// past the limit. Irreversible entries are ignored.
    pub fn push(&mut self, entry: HistoryEntry) {
        if !entry.is_reversible() {
            return;
        }
        self.entries.truncate(self.cursor);
        self.entries.push(entry);
        if self.entries.len() > self.limit {
            let excess = self.entries.len() - self.limit;
            self.entries.drain(..excess);
        }
        self.cursor = self.entries.len();
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.cursor < self.entries.len()
    }

    /// The entry `undo` would revert next.
    #[must_use]
    pub fn peek_undo(&self) -> Option<&HistoryEntry> {
        self.cursor.checked_sub(1).and_then(|i| self.entries.get(i))
    }

    /// The entry `redo` would re-apply next.
    #[must_use]
    pub fn peek_redo(&self) -> Option<&HistoryEntry> {
        self.entries.get(self.cursor)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> HistoryStats {
        HistoryStats { undo: self.cursor, redo: self.entries.len() - self.cursor }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = 0;
    }

    /// Undo the most recent action. Returns the mutations that were applied,
    /// or `None` when there is nothing to undo.
    ///
    /// If the inverse no longer applies (a remote edit removed the target),
    /// the entry is dropped and the history moves past it. Steps applied
    /// before the failure are still returned.
    pub fn undo(&mut self, store: &mut StateStore) -> Option<Vec<Mutation>> {
        if !self.can_undo() {
            return None;
        }
        self.cursor -= 1;
        let inverse = self.entries[self.cursor].inverse.clone();
        match apply_all(store, &inverse) {
            Ok(applied) => {
                debug!(kind = %self.entries[self.cursor].kind, "history: undo");
                Some(applied)
            }
            Err(Partial { applied, error }) => {
                warn!(error = %error, steps = applied.len(), "history: undo target gone, dropping entry");
                self.entries.remove(self.cursor);
                Some(applied)
            }
        }
    }

    /// Re-apply the most recently undone action.
    pub fn redo(&mut self, store: &mut StateStore) -> Option<Vec<Mutation>> {
        if !self.can_redo() {
            return None;
        }
        let forward = self.entries[self.cursor].forward.clone();
        match apply_all(store, &forward) {
            Ok(applied) => {
                debug!(kind = %self.entries[self.cursor].kind, "history: redo");
                self.cursor += 1;
                Some(applied)
            }
            Err(Partial { applied, error }) => {
                warn!(error = %error, steps = applied.len(), "history: redo target gone, dropping entry");
                self.entries.truncate(self.cursor);
                Some(applied)
            }
        }
    }
}

/// A replay that stopped at `error`. `applied` already changed the store
/// and still has to reach peers.
struct Partial {
    applied: Vec<Mutation>,
    error: MutationError,
}

/// Apply `mutations` in order, returning those that changed the store.
fn apply_all(store: &mut StateStore, mutations: &[Mutation]) -> Result<Vec<Mutation>, Partial> {
    let mut applied = Vec::with_capacity(mutations.len());
    for mutation in mutations {
        match store.apply(mutation.clone()) {
            Ok(entry) => applied.extend(entry.forward),
            Err(error) => return Err(Partial { applied, error }),
        }
    }
    Ok(applied)
}
