//! Client side of the synchronization protocol.
//!
//! Outbound edits get a per-sender monotonically increasing sequence number.
//! Inbound messages are dropped when their sequence is not greater than the
//! last one seen from the same sender. After a transport outage the client
//! does not replay the gap; it asks for a full snapshot, resets its
//! last-seen table, and re-sends whatever it edited while offline on top of
//! the fresh state.

#[cfg(test)]
#[path = "sync_test.rs"]
mod sync_test;

use std::collections::HashMap;

use frames::{MessageType, SyncMessage};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::doc::{Mutation, ParticipantId, SessionId};
use crate::error::SyncError;

/// Transport state as seen by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
    /// Reconnected and waiting for a snapshot.
    Resyncing,
}

#[derive(Debug, Clone)]
pub struct SyncClient {
    session_id: SessionId,
    participant_id: ParticipantId,
    next_sequence: u64,
    last_seen: HashMap<ParticipantId, u64>,
    state: ConnectionState,
    /// Local edits made while not connected, oldest first.
    pending: Vec<Mutation>,
}

impl SyncClient {
    /// A client that has not connected yet.
    #[must_use]
    pub fn new(session_id: impl Into<SessionId>, participant_id: impl Into<ParticipantId>) -> Self {
        Self {
            session_id: session_id.into(),
            participant_id: participant_id.into(),
            next_sequence: 1,
            last_seen: HashMap::new(),
            state: ConnectionState::Disconnected,
            pending: Vec::new(),
        }
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    #[must_use]
    pub fn participant_id(&self) -> &str {
        &self.participant_id
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Highest sequence accepted from `sender`, if any.
    #[must_use]
    pub fn last_seen(&self, sender: &str) -> Option<u64> {
        self.last_seen.get(sender).copied()
    }

    /// Offline edits waiting to be re-sent.
    #[must_use]
    pub fn pending(&self) -> &[Mutation] {
        &self.pending
    }

    // --- Outbound ---

    /// Build the next outbound envelope.
    pub fn wrap(&mut self, kind: MessageType, payload: Value) -> SyncMessage {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        SyncMessage::new(kind, self.session_id.clone(), self.participant_id.clone(), sequence, payload)
    }

    /// Envelope for a mutation.
    ///
    /// # Errors
    ///
    /// `Payload` if the mutation cannot be encoded.
    pub fn wrap_mutation(&mut self, mutation: &Mutation) -> Result<SyncMessage, SyncError> {
        let kind = mutation.message_type();
        let payload = mutation.to_payload().map_err(|source| SyncError::Payload { kind, source })?;
        Ok(self.wrap(kind, payload))
    }

    /// Envelope for a locally applied edit, or `None` when the edit was
    /// buffered because the channel is down.
    ///
    /// # Errors
    ///
    /// `Payload` if the mutation cannot be encoded.
    pub fn outbound(&mut self, mutation: Mutation) -> Result<Option<SyncMessage>, SyncError> {
        if self.is_connected() {
            return self.wrap_mutation(&mutation).map(Some);
        }
        debug!(kind = %mutation.message_type(), pending = self.pending.len() + 1, "sync: buffering offline edit");
        self.pending.push(mutation);
        Ok(None)
    }

    // --- Inbound ---

    /// Admit an inbound message: same session, and a sequence past the last
    /// one seen from its sender. Advances the last-seen table on success.
    ///
    /// # Errors
    ///
    /// `WrongSession` or `DuplicateMessage`.
    pub fn accept(&mut self, message: &SyncMessage) -> Result<(), SyncError> {
        if message.session_id != self.session_id {
            return Err(SyncError::WrongSession {
                expected: self.session_id.clone(),
                got: message.session_id.clone(),
            });
        }
        if let Some(&last_seen) = self.last_seen.get(&message.sender_id) {
            if message.sequence <= last_seen {
                return Err(SyncError::DuplicateMessage {
                    sender: message.sender_id.clone(),
                    sequence: message.sequence,
                    last_seen,
                });
            }
        }
        self.last_seen.insert(message.sender_id.clone(), message.sequence);
        Ok(())
    }

    /// Decode the mutation carried by `message`.
    ///
    /// # Errors
    ///
    /// `Payload` if the payload does not match the message type.
    pub fn decode_mutation(message: &SyncMessage) -> Result<Mutation, SyncError> {
        Mutation::from_message(message.kind, &message.payload)
            .map_err(|source| SyncError::Payload { kind: message.kind, source })
    }

    /// Forget a sender's sequence history, e.g. when it rejoins with a fresh
    /// counter.
    pub fn forget(&mut self, sender: &str) {
        self.last_seen.remove(sender);
    }

    /// Decide what an incoming snapshot means. Returns `Ok(true)` when it
    /// should be loaded, `Ok(false)` when it can be ignored.
    ///
    /// # Errors
    ///
    /// `DesyncDetected` when an unsolicited snapshot is ahead of the local
    /// revision.
    pub fn check_revision(&self, local: u64, remote: u64) -> Result<bool, SyncError> {
        if self.state == ConnectionState::Resyncing {
            return Ok(true);
        }
        if remote > local {
            return Err(SyncError::DesyncDetected { local, remote });
        }
        Ok(false)
    }

    // --- Connection lifecycle ---

    /// The channel dropped. Edits from now on are buffered.
    pub fn on_disconnect(&mut self) {
        if self.state != ConnectionState::Disconnected {
            warn!(session = %self.session_id, "sync: channel lost");
        }
        self.state = ConnectionState::Disconnected;
    }

    /// The channel is up. Resets the last-seen table. An authoritative
    /// client (the host) is immediately connected and returns its buffered
    /// edits for sending; anyone else returns a snapshot request and waits.
    pub fn on_connect(&mut self, authoritative: bool) -> Reconnect {
        self.last_seen.clear();
        if authoritative {
            self.state = ConnectionState::Connected;
            info!(session = %self.session_id, pending = self.pending.len(), "sync: connected");
            return Reconnect::Flush(std::mem::take(&mut self.pending));
        }
        self.state = ConnectionState::Resyncing;
        info!(session = %self.session_id, "sync: requesting snapshot");
        Reconnect::RequestSnapshot(self.snapshot_request())
    }

    /// Ask the session for a fresh snapshot and wait for it.
    pub fn request_resync(&mut self) -> SyncMessage {
        self.state = ConnectionState::Resyncing;
        self.snapshot_request()
    }

    /// A snapshot was loaded. Returns the buffered edits to re-apply and send.
    pub fn on_snapshot_loaded(&mut self) -> Vec<Mutation> {
        self.state = ConnectionState::Connected;
        std::mem::take(&mut self.pending)
    }

    fn snapshot_request(&mut self) -> SyncMessage {
        self.wrap(MessageType::SnapshotRequest, Value::Object(serde_json::Map::new()))
    }
}

/// What to do right after the channel comes up.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconnect {
    /// Send these buffered edits now.
    Flush(Vec<Mutation>),
    /// Send this request and wait for `state:snapshot`.
    RequestSnapshot(SyncMessage),
}
