//! Session service: join, part, and fan-out.
//!
//! DESIGN
//! ======
//! The relay forwards every client message to the other clients of the same
//! session and never reads payloads. It stamps `senderId` with the
//! connection's participant so clients can trust it, and it originates the
//! roster notices (`session:welcome`, `participant:join`,
//! `participant:leave`) under the `relay` sender id with its own sequence.
//!
//! A client whose queue is full is disconnected rather than skipped. A gap
//! in its stream would go unnoticed, while a reconnect makes it request a
//! fresh snapshot.

use frames::{MessageType, SyncMessage};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ErrorCode;
use crate::state::{AppState, ConnectedClient, Participant, RELAY_SENDER, Role, SessionState};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("message for session {got} sent on session {expected}")]
    WrongSession { expected: String, got: String },
    #[error("session {session} already has host {host}")]
    HostTaken { session: String, host: String },
    #[error("only the host may send {0}")]
    HostOnly(MessageType),
    #[error("{0} is sent by the relay only")]
    Reserved(MessageType),
}

impl ErrorCode for SessionError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "E_SESSION_NOT_FOUND",
            Self::WrongSession { .. } => "E_WRONG_SESSION",
            Self::HostTaken { .. } => "E_HOST_TAKEN",
            Self::HostOnly(_) => "E_HOST_ONLY",
            Self::Reserved(_) => "E_RESERVED_TYPE",
        }
    }
}

/// Register a connection and announce it. Returns the `session:welcome`
/// message for the joining client, carrying the full roster.
///
/// # Errors
///
/// Returns `HostTaken` if `participant` claims the host role while a
/// different host is connected.
pub async fn join(
    state: &AppState,
    session_id: &str,
    client_id: Uuid,
    participant: Participant,
    tx: mpsc::Sender<SyncMessage>,
) -> Result<SyncMessage, SessionError> {
    let mut sessions = state.sessions.write().await;

    if participant.role == Role::Host {
        if let Some(host) = sessions.get(session_id).and_then(SessionState::host)
            && host.id != participant.id
        {
            return Err(SessionError::HostTaken { session: session_id.to_owned(), host: host.id.clone() });
        }
    }

    let session = sessions.entry(session_id.to_owned()).or_default();
    session.clients.insert(client_id, ConnectedClient { participant: participant.clone(), tx });

    let roster = json!({ "participants": session.roster() });
    let welcome = relay_message(session, session_id, MessageType::SessionWelcome, roster);
    let notice = relay_message(session, session_id, MessageType::ParticipantJoin, json!(participant));
    let notified = fan_out(session, session_id, &notice, Some(client_id));

    info!(%session_id, %client_id, participant = %participant.id, role = ?participant.role, notified, "session: joined");
    Ok(welcome)
}

/// Remove a connection. Peers hear `participant:leave` once the
/// participant's last connection is gone. Empty sessions are evicted.
pub async fn part(state: &AppState, session_id: &str, client_id: Uuid) {
    let mut sessions = state.sessions.write().await;
    let Some(session) = sessions.get_mut(session_id) else {
        return;
    };
    // A lagging client was already removed by fan-out.
    let removed = session.clients.remove(&client_id);
    if session.clients.is_empty() {
        sessions.remove(session_id);
        info!(%session_id, "session: evicted");
        return;
    }
    let Some(client) = removed else {
        return;
    };
    info!(%session_id, %client_id, participant = %client.participant.id, remaining = session.clients.len(), "session: parted");
    announce_leave(session, session_id, &client.participant.id);
}

/// Forward a client message to every other client of the session. Returns
/// the number of clients it was queued for.
///
/// `session:end` from the host is forwarded and then drops the session,
/// which closes every connection in it.
///
/// # Errors
///
/// Returns an error if the message names another session, is a
/// relay-originated type, or is `session:end` from a non-host. Nothing is
/// forwarded in that case.
pub async fn relay(
    state: &AppState,
    session_id: &str,
    client_id: Uuid,
    mut message: SyncMessage,
) -> Result<usize, SessionError> {
    if message.session_id != session_id {
        return Err(SessionError::WrongSession { expected: session_id.to_owned(), got: message.session_id });
    }
    if message.kind.is_presence() {
        return Err(SessionError::Reserved(message.kind));
    }

    let mut sessions = state.sessions.write().await;
    let Some(session) = sessions.get_mut(session_id) else {
        return Err(SessionError::NotFound(session_id.to_owned()));
    };
    let Some(sender) = session.clients.get(&client_id) else {
        return Err(SessionError::NotFound(session_id.to_owned()));
    };

    message.sender_id.clone_from(&sender.participant.id);
    if message.kind == MessageType::SessionEnd {
        if sender.participant.role != Role::Host {
            return Err(SessionError::HostOnly(message.kind));
        }
        let delivered = fan_out(session, session_id, &message, Some(client_id));
        sessions.remove(session_id);
        info!(%session_id, host = %message.sender_id, delivered, "session: ended by host");
        return Ok(delivered);
    }

    let delivered = fan_out(session, session_id, &message, Some(client_id));
    debug!(%session_id, kind = %message.kind, sender = %message.sender_id, seq = message.sequence, delivered, "session: relayed");
    Ok(delivered)
}

fn relay_message(
    session: &mut SessionState,
    session_id: &str,
    kind: MessageType,
    payload: serde_json::Value,
) -> SyncMessage {
    SyncMessage::new(kind, session_id, RELAY_SENDER, session.next_sequence(), payload)
}

/// Queue `message` for every client except `exclude`. Returns how many
/// queues accepted it. Clients whose queue is full are dropped from the
/// session; their socket loop sees the closed queue and disconnects.
fn fan_out(session: &mut SessionState, session_id: &str, message: &SyncMessage, exclude: Option<Uuid>) -> usize {
    let mut delivered = 0;
    let mut lagging = Vec::new();
    for (client_id, client) in &session.clients {
        if exclude == Some(*client_id) {
            continue;
        }
        match client.tx.try_send(message.clone()) {
            Ok(()) => delivered += 1,
            Err(mpsc::error::TrySendError::Full(_)) => lagging.push(*client_id),
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(%client_id, "session: client queue closed");
            }
        }
    }
    for client_id in lagging {
        let Some(client) = session.clients.remove(&client_id) else {
            continue;
        };
        warn!(%session_id, %client_id, participant = %client.participant.id, kind = %message.kind, "session: client queue full, disconnecting");
        announce_leave(session, session_id, &client.participant.id);
    }
    delivered
}

/// Tell the remaining clients that `participant_id` is gone, unless another
/// of its connections is still open.
fn announce_leave(session: &mut SessionState, session_id: &str, participant_id: &str) {
    if session.is_connected(participant_id) {
        return;
    }
    let notice = relay_message(session, session_id, MessageType::ParticipantLeave, json!({ "id": participant_id }));
    fan_out(session, session_id, &notice, None);
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
