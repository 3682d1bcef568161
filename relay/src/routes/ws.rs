//! WebSocket handler for the session relay channel.
//!
//! DESIGN
//! ======
//! On upgrade, registers the connection with its session and enters a
//! `select!` loop:
//! - Incoming client messages → decode → session fan-out
//! - Messages from session peers → encode → forward to client
//!
//! Each client speaks JSON text or protobuf binary. The relay answers in
//! whichever format the client last used, starting from the `format` query
//! parameter.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → join session → send `session:welcome`
//! 2. Client messages are stamped and fanned out to peers
//! 3. Close → `participant:leave` to peers → cleanup
//! 4. Host `session:end` drops the session; every peer queue closes and the
//!    loop sends a close frame
//! 5. A client too slow to drain its queue is dropped the same way and is
//!    expected to reconnect and resync

use std::collections::HashMap;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use frames::SyncMessage;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ErrorCode;
use crate::services;
use crate::state::{AppState, Participant, Role};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WireFormat {
    Json,
    Binary,
}

/// A validated join request from the upgrade query string.
#[derive(Debug, Clone, PartialEq, Eq)]
struct JoinRequest {
    session_id: String,
    participant: Participant,
    format: WireFormat,
}

#[derive(Debug, thiserror::Error)]
enum FrameError {
    #[error("invalid json message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid binary message: {0}")]
    Codec(#[from] frames::CodecError),
}

impl ErrorCode for FrameError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Json(_) => "E_FRAME_JSON",
            Self::Codec(_) => "E_FRAME_CODEC",
        }
    }
}

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let join = match parse_join(&params) {
        Ok(join) => join,
        Err(message) => return (StatusCode::BAD_REQUEST, message).into_response(),
    };
    ws.on_upgrade(move |socket| run_ws(socket, state, join))
}

/// `session` and `participant` are required; `name` defaults to the
/// participant id, `role` to `player`, `format` to `json`.
fn parse_join(params: &HashMap<String, String>) -> Result<JoinRequest, &'static str> {
    let required = |key: &str| params.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

    let Some(session_id) = required("session") else {
        return Err("session required");
    };
    let Some(participant_id) = required("participant") else {
        return Err("participant required");
    };
    let role = match required("role").unwrap_or("player") {
        "host" => Role::Host,
        "player" => Role::Player,
        _ => return Err("role must be host or player"),
    };
    let format = match required("format").unwrap_or("json") {
        "json" => WireFormat::Json,
        "binary" => WireFormat::Binary,
        _ => return Err("format must be json or binary"),
    };
    let name = required("name").unwrap_or(participant_id);

    Ok(JoinRequest {
        session_id: session_id.to_owned(),
        participant: Participant { id: participant_id.to_owned(), name: name.to_owned(), role },
        format,
    })
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState, join: JoinRequest) {
    let client_id = Uuid::new_v4();
    let JoinRequest { session_id, participant, mut format } = join;
    let participant_id = participant.id.clone();

    // Per-connection queue for messages from session peers. The session owns
    // the only sender, so dropping the session (or this client from it)
    // closes this queue.
    let (client_tx, mut client_rx) = mpsc::channel::<SyncMessage>(state.config.client_buffer);

    let welcome = match services::session::join(&state, &session_id, client_id, participant, client_tx).await {
        Ok(welcome) => welcome,
        Err(e) => {
            warn!(%session_id, participant = %participant_id, error = %e, code = e.error_code(), "ws: join refused");
            close(&mut socket, close_code::POLICY, &e.to_string()).await;
            return;
        }
    };
    if send_message(&mut socket, &welcome, format).await.is_err() {
        services::session::part(&state, &session_id, client_id).await;
        return;
    }

    info!(%client_id, %session_id, participant = %participant_id, "ws: client connected");

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                let decoded = match msg {
                    Message::Text(text) => {
                        format = WireFormat::Json;
                        serde_json::from_str::<SyncMessage>(&text).map_err(FrameError::from)
                    }
                    Message::Binary(bytes) => {
                        format = WireFormat::Binary;
                        frames::decode_message(&bytes).map_err(FrameError::from)
                    }
                    Message::Close(_) => break,
                    _ => continue,
                };
                process_inbound(&state, &session_id, client_id, decoded).await;
            }
            out = client_rx.recv() => {
                let Some(out) = out else {
                    info!(%client_id, %session_id, "ws: relay channel closed");
                    close(&mut socket, close_code::NORMAL, "relay channel closed").await;
                    break;
                };
                if send_message(&mut socket, &out, format).await.is_err() {
                    break;
                }
            }
        }
    }

    services::session::part(&state, &session_id, client_id).await;
    info!(%client_id, %session_id, "ws: client disconnected");
}

/// Hand one decoded client message to the session. Failures are logged and
/// the message is dropped; the connection stays open.
async fn process_inbound(
    state: &AppState,
    session_id: &str,
    client_id: Uuid,
    decoded: Result<SyncMessage, FrameError>,
) {
    let message = match decoded {
        Ok(message) => message,
        Err(e) => {
            warn!(%client_id, error = %e, code = e.error_code(), "ws: invalid inbound message");
            return;
        }
    };
    let kind = message.kind;
    if let Err(e) = services::session::relay(state, session_id, client_id, message).await {
        warn!(%client_id, %kind, error = %e, code = e.error_code(), retryable = e.retryable(), "ws: message refused");
    }
}

// =============================================================================
// HELPERS
// =============================================================================

async fn send_message(socket: &mut WebSocket, message: &SyncMessage, format: WireFormat) -> Result<(), ()> {
    let frame = match format {
        WireFormat::Json => match serde_json::to_string(message) {
            Ok(json) => Message::Text(json.into()),
            Err(e) => {
                warn!(error = %e, kind = %message.kind, "ws: failed to serialize message");
                return Err(());
            }
        },
        WireFormat::Binary => Message::Binary(frames::encode_message(message).into()),
    };
    debug!(kind = %message.kind, sender = %message.sender_id, seq = message.sequence, "ws: send message");
    socket.send(frame).await.map_err(|_| ())
}

async fn close(socket: &mut WebSocket, code: u16, reason: &str) {
    let frame = CloseFrame { code, reason: reason.to_owned().into() };
    if let Err(e) = socket.send(Message::Close(Some(frame))).await {
        debug!(error = %e, "ws: close frame not delivered");
    }
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
