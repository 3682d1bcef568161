//! Shared sync envelope and protobuf codec for the tabletop realtime channel.
//!
//! This crate owns the wire representation used by both `relay` and the
//! `tabletop` client core. Payloads stay flexible (`serde_json::Value`) so the
//! relay can forward them without understanding them, while the binary codec
//! carries them as `google.protobuf.Value` for compact transport.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use prost::Message;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Error returned by [`decode_message`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The raw bytes could not be decoded as a protobuf `WireMessage`.
    #[error("failed to decode protobuf message: {0}")]
    Decode(#[from] prost::DecodeError),
    /// The `type` string on the wire does not name a known [`MessageType`].
    #[error("unknown message type: {0}")]
    UnknownType(String),
}

/// Error returned when parsing a [`MessageType`] from its string form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown message type: {0}")]
pub struct UnknownMessageType(pub String);

/// Every message kind that may travel over the realtime channel.
///
/// The serialized form is the namespaced string, e.g. `"token:move"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    #[serde(rename = "token:add")]
    TokenAdd,
    #[serde(rename = "token:move")]
    TokenMove,
    /// Explicit edit of a token's label.
    #[serde(rename = "token:update")]
    TokenUpdate,
    #[serde(rename = "token:remove")]
    TokenRemove,
    #[serde(rename = "drawing:add")]
    DrawingAdd,
    #[serde(rename = "drawing:remove")]
    DrawingRemove,
    #[serde(rename = "drawing:clear")]
    DrawingClear,
    #[serde(rename = "fog:reveal")]
    FogReveal,
    #[serde(rename = "fog:hide")]
    FogHide,
    /// Removal of one reveal area by id.
    #[serde(rename = "fog:remove")]
    FogRemove,
    #[serde(rename = "fog:clear")]
    FogClear,
    /// Enables or disables the fog layer.
    #[serde(rename = "fog:toggle")]
    FogToggle,
    #[serde(rename = "scene:add")]
    SceneAdd,
    #[serde(rename = "scene:switch")]
    SceneSwitch,
    #[serde(rename = "grid:update")]
    GridUpdate,
    #[serde(rename = "permission:update")]
    PermissionUpdate,
    #[serde(rename = "state:snapshotRequest")]
    SnapshotRequest,
    #[serde(rename = "state:snapshot")]
    Snapshot,
    /// Relay greeting carrying the current roster.
    #[serde(rename = "session:welcome")]
    SessionWelcome,
    #[serde(rename = "session:end")]
    SessionEnd,
    #[serde(rename = "participant:join")]
    ParticipantJoin,
    #[serde(rename = "participant:leave")]
    ParticipantLeave,
}

impl MessageType {
    /// All known message types, in taxonomy order.
    pub const ALL: [Self; 22] = [
        Self::TokenAdd,
        Self::TokenMove,
        Self::TokenUpdate,
        Self::TokenRemove,
        Self::DrawingAdd,
        Self::DrawingRemove,
        Self::DrawingClear,
        Self::FogReveal,
        Self::FogHide,
        Self::FogRemove,
        Self::FogClear,
        Self::FogToggle,
        Self::SceneAdd,
        Self::SceneSwitch,
        Self::GridUpdate,
        Self::PermissionUpdate,
        Self::SnapshotRequest,
        Self::Snapshot,
        Self::SessionWelcome,
        Self::SessionEnd,
        Self::ParticipantJoin,
        Self::ParticipantLeave,
    ];

    /// The namespaced wire string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TokenAdd => "token:add",
            Self::TokenMove => "token:move",
            Self::TokenUpdate => "token:update",
            Self::TokenRemove => "token:remove",
            Self::DrawingAdd => "drawing:add",
            Self::DrawingRemove => "drawing:remove",
            Self::DrawingClear => "drawing:clear",
            Self::FogReveal => "fog:reveal",
            Self::FogHide => "fog:hide",
            Self::FogRemove => "fog:remove",
            Self::FogClear => "fog:clear",
            Self::FogToggle => "fog:toggle",
            Self::SceneAdd => "scene:add",
            Self::SceneSwitch => "scene:switch",
            Self::GridUpdate => "grid:update",
            Self::PermissionUpdate => "permission:update",
            Self::SnapshotRequest => "state:snapshotRequest",
            Self::Snapshot => "state:snapshot",
            Self::SessionWelcome => "session:welcome",
            Self::SessionEnd => "session:end",
            Self::ParticipantJoin => "participant:join",
            Self::ParticipantLeave => "participant:leave",
        }
    }

    /// Namespace before the first `:` (`"token"`, `"fog"`, ...).
    #[must_use]
    pub fn prefix(self) -> &'static str {
        let s = self.as_str();
        s.split_once(':').map_or(s, |(prefix, _)| prefix)
    }

    /// Whether this message carries a state mutation that receivers apply.
    #[must_use]
    pub fn is_mutation(self) -> bool {
        matches!(
            self,
            Self::TokenAdd
                | Self::TokenMove
                | Self::TokenUpdate
                | Self::TokenRemove
                | Self::DrawingAdd
                | Self::DrawingRemove
                | Self::DrawingClear
                | Self::FogReveal
                | Self::FogHide
                | Self::FogRemove
                | Self::FogClear
                | Self::FogToggle
                | Self::SceneAdd
                | Self::SceneSwitch
                | Self::GridUpdate
        )
    }

    /// Whether this message is a roster notice produced by the relay itself.
    #[must_use]
    pub fn is_presence(self) -> bool {
        matches!(self, Self::SessionWelcome | Self::ParticipantJoin | Self::ParticipantLeave)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = UnknownMessageType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownMessageType(s.to_owned()))
    }
}

/// The envelope for every message on the realtime channel.
///
/// `sequence` is a per-sender monotonic counter; receivers use it to drop
/// replayed or duplicated deliveries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMessage {
    /// What the payload means.
    #[serde(rename = "type")]
    pub kind: MessageType,
    /// Session (relay channel) this message belongs to.
    pub session_id: String,
    /// Participant that produced the message. The relay overwrites this with
    /// the authenticated connection's participant id.
    pub sender_id: String,
    /// Per-sender monotonic counter.
    pub sequence: u64,
    /// Message-specific JSON body.
    #[serde(default)]
    pub payload: Value,
    /// Milliseconds since the Unix epoch when the message was created.
    pub timestamp: i64,
}

/// Current time as milliseconds since Unix epoch.
fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

impl SyncMessage {
    /// Build a message stamped with the current time.
    pub fn new(
        kind: MessageType,
        session_id: impl Into<String>,
        sender_id: impl Into<String>,
        sequence: u64,
        payload: Value,
    ) -> Self {
        Self {
            kind,
            session_id: session_id.into(),
            sender_id: sender_id.into(),
            sequence,
            payload,
            timestamp: now_ms(),
        }
    }

    /// Namespace of the message type.
    #[must_use]
    pub fn prefix(&self) -> &'static str {
        self.kind.prefix()
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Encode a message into protobuf bytes.
#[must_use]
pub fn encode_message(message: &SyncMessage) -> Vec<u8> {
    let wire = message_to_wire(message);

    let mut out = Vec::with_capacity(wire.encoded_len());
    // Encoding into a growable Vec cannot run out of buffer space.
    wire.encode(&mut out).unwrap_or_default();
    out
}

/// Decode protobuf bytes into a message.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] for malformed bytes and
/// [`CodecError::UnknownType`] for unrecognized type strings.
pub fn decode_message(bytes: &[u8]) -> Result<SyncMessage, CodecError> {
    let wire = WireMessage::decode(bytes)?;
    wire_to_message(wire)
}

fn message_to_wire(message: &SyncMessage) -> WireMessage {
    WireMessage {
        kind: message.kind.as_str().to_owned(),
        session_id: message.session_id.clone(),
        sender_id: message.sender_id.clone(),
        sequence: message.sequence,
        payload: Some(json_to_proto_value(&message.payload)),
        timestamp: message.timestamp,
    }
}

fn wire_to_message(wire: WireMessage) -> Result<SyncMessage, CodecError> {
    let kind = wire
        .kind
        .parse::<MessageType>()
        .map_err(|UnknownMessageType(raw)| CodecError::UnknownType(raw))?;
    Ok(SyncMessage {
        kind,
        session_id: wire.session_id,
        sender_id: wire.sender_id,
        sequence: wire.sequence,
        payload: wire
            .payload
            .map_or(Value::Object(Map::new()), |v| proto_to_json_value(&v)),
        timestamp: wire.timestamp,
    })
}

fn json_to_proto_value(value: &Value) -> prost_types::Value {
    let kind = match value {
        Value::Null => {
            prost_types::value::Kind::NullValue(prost_types::NullValue::NullValue as i32)
        }
        Value::Bool(v) => prost_types::value::Kind::BoolValue(*v),
        Value::Number(v) => prost_types::value::Kind::NumberValue(v.as_f64().unwrap_or(0.0)),
        Value::String(v) => prost_types::value::Kind::StringValue(v.clone()),
        Value::Array(v) => prost_types::value::Kind::ListValue(prost_types::ListValue {
            values: v.iter().map(json_to_proto_value).collect(),
        }),
        Value::Object(v) => prost_types::value::Kind::StructValue(prost_types::Struct {
            fields: v
                .iter()
                .map(|(k, v)| (k.clone(), json_to_proto_value(v)))
                .collect(),
        }),
    };

    prost_types::Value { kind: Some(kind) }
}

/// Largest integer an `f64` represents exactly.
const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0;

fn proto_to_json_value(value: &prost_types::Value) -> Value {
    let Some(kind) = &value.kind else {
        return Value::Null;
    };

    match kind {
        prost_types::value::Kind::NullValue(_) => Value::Null,
        prost_types::value::Kind::NumberValue(v) => number_to_json(*v),
        prost_types::value::Kind::StringValue(v) => Value::String(v.clone()),
        prost_types::value::Kind::BoolValue(v) => Value::Bool(*v),
        prost_types::value::Kind::StructValue(v) => Value::Object(
            v.fields
                .iter()
                .map(|(k, v)| (k.clone(), proto_to_json_value(v)))
                .collect(),
        ),
        prost_types::value::Kind::ListValue(v) => {
            Value::Array(v.values.iter().map(proto_to_json_value).collect())
        }
    }
}

/// Integral numbers come back as JSON integers so ids and counters survive
/// the protobuf double representation.
#[allow(clippy::cast_possible_truncation)]
fn number_to_json(v: f64) -> Value {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < MAX_EXACT_INT {
        return Value::from(v as i64);
    }
    serde_json::Number::from_f64(v).map_or(Value::Null, Value::Number)
}

#[derive(Clone, PartialEq, Message)]
struct WireMessage {
    #[prost(string, tag = "1")]
    kind: String,
    #[prost(string, tag = "2")]
    session_id: String,
    #[prost(string, tag = "3")]
    sender_id: String,
    #[prost(uint64, tag = "4")]
    sequence: u64,
    #[prost(message, optional, tag = "5")]
    payload: Option<prost_types::Value>,
    #[prost(int64, tag = "6")]
    timestamp: i64,
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
