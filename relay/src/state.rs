//! Shared relay state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! maps each live session id to the clients connected to it. The relay keeps
//! no game state: a session is only a roster, a fan-out list, and the
//! sequence counter for the presence notices the relay itself emits.

use std::collections::HashMap;
use std::sync::Arc;

use frames::SyncMessage;
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use crate::config::RelayConfig;

/// Sender id stamped on messages the relay originates.
pub const RELAY_SENDER: &str = "relay";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Host,
    Player,
}

/// Roster entry as announced in `session:welcome` and `participant:join`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub name: String,
    pub role: Role,
}

/// One websocket connection in a session.
pub struct ConnectedClient {
    pub participant: Participant,
    pub tx: mpsc::Sender<SyncMessage>,
}

/// Per-session live state.
pub struct SessionState {
    /// Connected clients keyed by connection id. One participant may hold
    /// more than one connection while a reconnect overlaps the old socket.
    pub clients: HashMap<Uuid, ConnectedClient>,
    /// Last sequence number used for relay-originated messages.
    pub sequence: u64,
}

impl SessionState {
    #[must_use]
    pub fn new() -> Self {
        Self { clients: HashMap::new(), sequence: 0 }
    }

    /// Next sequence number for a relay-originated message.
    pub fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    /// Distinct participants, first connection wins, sorted by id.
    #[must_use]
    pub fn roster(&self) -> Vec<Participant> {
        let mut seen: HashMap<&str, &Participant> = HashMap::new();
        for client in self.clients.values() {
            seen.entry(client.participant.id.as_str()).or_insert(&client.participant);
        }
        let mut roster: Vec<Participant> = seen.into_values().cloned().collect();
        roster.sort_by(|a, b| a.id.cmp(&b.id));
        roster
    }

    /// Whether `participant_id` has any connection in this session.
    #[must_use]
    pub fn is_connected(&self, participant_id: &str) -> bool {
        self.clients.values().any(|c| c.participant.id == participant_id)
    }

    /// The host participant, if one is connected.
    #[must_use]
    pub fn host(&self) -> Option<&Participant> {
        self.clients.values().map(|c| &c.participant).find(|p| p.role == Role::Host)
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared application state. Clone is required by Axum; inner fields are
/// Arc-wrapped.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RelayConfig>,
    pub sessions: Arc<RwLock<HashMap<String, SessionState>>>,
}

impl AppState {
    #[must_use]
    pub fn new(config: RelayConfig) -> Self {
        Self { config: Arc::new(config), sessions: Arc::new(RwLock::new(HashMap::new())) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(id: &str, role: Role) -> ConnectedClient {
        let (tx, _rx) = mpsc::channel(1);
        ConnectedClient { participant: Participant { id: id.into(), name: id.to_uppercase(), role }, tx }
    }

    #[test]
    fn sequence_starts_at_one() {
        let mut session = SessionState::new();
        assert_eq!(session.next_sequence(), 1);
        assert_eq!(session.next_sequence(), 2);
    }

    #[test]
    fn roster_collapses_duplicate_connections() {
        let mut session = SessionState::default();
        session.clients.insert(Uuid::new_v4(), client("p2", Role::Player));
        session.clients.insert(Uuid::new_v4(), client("gm", Role::Host));
        session.clients.insert(Uuid::new_v4(), client("p2", Role::Player));
        let ids: Vec<_> = session.roster().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["gm", "p2"]);
        assert_eq!(session.host().map(|h| h.id.as_str()), Some("gm"));
        assert!(session.is_connected("p2"));
        assert!(!session.is_connected("p3"));
    }

    #[test]
    fn participant_serializes_like_client_roster() {
        let p = Participant { id: "gm".into(), name: "Game Master".into(), role: Role::Host };
        assert_eq!(
            serde_json::to_value(&p).unwrap(),
            serde_json::json!({ "id": "gm", "name": "Game Master", "role": "host" })
        );
    }
}
