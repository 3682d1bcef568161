//! Permission gate: who may apply which mutation.
//!
//! Hosts are unrestricted. Players may move the tokens assigned to them and,
//! when granted, draw and erase strokes. A denial is an ordinary value that
//! the engine turns into local UI feedback; nothing is applied or sent.

#[cfg(test)]
#[path = "permission_test.rs"]
mod permission_test;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::doc::{EntityId, Mutation, ParticipantId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Host,
    Player,
}

/// What a player is allowed to do beyond viewing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    #[serde(default)]
    pub can_move_token_ids: BTreeSet<EntityId>,
    #[serde(default)]
    pub can_draw: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
    pub role: Role,
    #[serde(default)]
    pub capabilities: Capabilities,
}

impl Participant {
    #[must_use]
    pub fn host(id: impl Into<ParticipantId>, name: impl Into<String>) -> Self {
        Self { id: id.into(), name: name.into(), role: Role::Host, capabilities: Capabilities::default() }
    }

    #[must_use]
    pub fn player(id: impl Into<ParticipantId>, name: impl Into<String>) -> Self {
        Self { id: id.into(), name: name.into(), role: Role::Player, capabilities: Capabilities::default() }
    }

    #[must_use]
    pub fn is_host(&self) -> bool {
        self.role == Role::Host
    }
}

/// Payload of a `permission:update` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionUpdate {
    pub participant_id: ParticipantId,
    pub capabilities: Capabilities,
}

/// Why a request was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Denial {
    #[error("unknown participant {0}")]
    UnknownParticipant(ParticipantId),
    #[error("{0} is host-only")]
    HostOnly(&'static str),
    #[error("token {0} is not assigned to this player")]
    TokenNotAssigned(EntityId),
    #[error("drawing is not enabled for this player")]
    DrawingNotAllowed,
}

/// Participants of the current session, keyed by id.
///
/// Capabilities belong to the session, not the connection: they survive a
/// player leaving and rejoining, and a `session:welcome` (which carries no
/// capabilities) never clears them. Only the host changes them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Roster {
    participants: BTreeMap<ParticipantId, Participant>,
    /// Grants held by players who are currently away.
    departed: BTreeMap<ParticipantId, Capabilities>,
}

impl Roster {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a participant. Capabilities already granted to a
    /// returning player are kept.
    pub fn join(&mut self, participant: Participant) {
        let participant = self.carry_capabilities(participant);
        self.participants.insert(participant.id.clone(), participant);
    }

    /// Remove a participant, remembering any grants for their return.
    pub fn leave(&mut self, id: &str) -> Option<Participant> {
        let gone = self.participants.remove(id)?;
        if gone.capabilities != Capabilities::default() {
            self.departed.insert(gone.id.clone(), gone.capabilities.clone());
        }
        Some(gone)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Participant> {
        self.participants.get(id)
    }

    pub fn participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Replace the roster wholesale, e.g. from `session:welcome`.
    pub fn replace(&mut self, participants: Vec<Participant>) {
        let incoming: BTreeSet<ParticipantId> = participants.iter().map(|p| p.id.clone()).collect();
        let absent: Vec<ParticipantId> =
            self.participants.keys().filter(|id| !incoming.contains(*id)).cloned().collect();
        for id in absent {
            self.leave(&id);
        }
        for participant in participants {
            self.join(participant);
        }
    }

    /// Give an arriving participant with no explicit grants the ones they
    /// already hold, either on the roster or from before they left.
    fn carry_capabilities(&mut self, mut participant: Participant) -> Participant {
        let held = self.departed.remove(&participant.id);
        if participant.capabilities == Capabilities::default() {
            if let Some(existing) = self.participants.get(&participant.id) {
                participant.capabilities = existing.capabilities.clone();
            } else if let Some(held) = held {
                participant.capabilities = held;
            }
        }
        participant
    }

    /// Assign a player's capabilities. Only a host may do this.
    ///
    /// # Errors
    ///
    /// `HostOnly` if `by` is not a host, `UnknownParticipant` if either
    /// party is not on the roster.
    pub fn set_capabilities(&mut self, by: &str, update: PermissionUpdate) -> Result<(), Denial> {
        let Some(actor) = self.participants.get(by) else {
            return Err(Denial::UnknownParticipant(by.to_owned()));
        };
        if !actor.is_host() {
            return Err(Denial::HostOnly("permission:update"));
        }
        let Some(target) = self.participants.get_mut(&update.participant_id) else {
            return Err(Denial::UnknownParticipant(update.participant_id));
        };
        debug!(participant = %target.id, can_draw = update.capabilities.can_draw, "permission: capabilities updated");
        target.capabilities = update.capabilities;
        Ok(())
    }

    /// Let `player` move `token_id` in addition to what they already may.
    pub fn grant_token(&mut self, player: &str, token_id: impl Into<EntityId>) {
        if let Some(p) = self.participants.get_mut(player) {
            p.capabilities.can_move_token_ids.insert(token_id.into());
        }
    }
}

/// Stateless capability check.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissionGate;

impl PermissionGate {
    /// Decide whether `participant` may apply `mutation`.
    ///
    /// # Errors
    ///
    /// Returns the reason for refusal.
    pub fn check(roster: &Roster, participant: &str, mutation: &Mutation) -> Result<(), Denial> {
        let Some(who) = roster.get(participant) else {
            return Err(Denial::UnknownParticipant(participant.to_owned()));
        };
        if who.is_host() {
            return Ok(());
        }
        let caps = &who.capabilities;
        match mutation {
            Mutation::MoveToken { id, .. } => {
                if caps.can_move_token_ids.contains(id) {
                    Ok(())
                } else {
                    Err(Denial::TokenNotAssigned(id.clone()))
                }
            }
            Mutation::AddDrawing { .. } | Mutation::RemoveDrawing { .. } | Mutation::ClearDrawings {} => {
                if caps.can_draw { Ok(()) } else { Err(Denial::DrawingNotAllowed) }
            }
            other => Err(Denial::HostOnly(other.message_type().as_str())),
        }
    }
}
