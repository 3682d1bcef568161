use super::*;

fn sample_message() -> SyncMessage {
    SyncMessage {
        kind: MessageType::TokenMove,
        session_id: "session-1".to_owned(),
        sender_id: "player-1".to_owned(),
        sequence: 7,
        payload: serde_json::json!({
            "id": "gm:token-3",
            "x": 140.5,
            "y": -12.25,
            "visible": true,
            "tags": ["a", "b"],
            "nested": {"k": "v"},
            "nil": null
        }),
        timestamp: 42,
    }
}

#[test]
fn message_type_strings_round_trip() {
    for kind in MessageType::ALL {
        let parsed: MessageType = kind.as_str().parse().expect("known type");
        assert_eq!(parsed, kind);
    }
}

#[test]
fn message_type_serializes_as_namespaced_string() {
    let json = serde_json::to_string(&MessageType::SnapshotRequest).expect("serialize");
    assert_eq!(json, "\"state:snapshotRequest\"");
    let back: MessageType = serde_json::from_str("\"fog:hide\"").expect("deserialize");
    assert_eq!(back, MessageType::FogHide);
}

#[test]
fn message_type_serde_matches_as_str() {
    for kind in MessageType::ALL {
        let json = serde_json::to_string(&kind).expect("serialize");
        assert_eq!(json, format!("\"{}\"", kind.as_str()));
    }
}

#[test]
fn message_type_parse_rejects_unknown() {
    let err = "token:teleport".parse::<MessageType>().expect_err("unknown type");
    assert_eq!(err, UnknownMessageType("token:teleport".to_owned()));
}

#[test]
fn message_type_prefix() {
    assert_eq!(MessageType::TokenMove.prefix(), "token");
    assert_eq!(MessageType::SnapshotRequest.prefix(), "state");
    assert_eq!(MessageType::ParticipantJoin.prefix(), "participant");
}

#[test]
fn mutation_and_presence_classes_are_disjoint() {
    for kind in MessageType::ALL {
        assert!(!(kind.is_mutation() && kind.is_presence()), "{kind} is both");
    }
    assert!(MessageType::FogReveal.is_mutation());
    assert!(!MessageType::PermissionUpdate.is_mutation());
    assert!(!MessageType::Snapshot.is_mutation());
    assert!(MessageType::SessionWelcome.is_presence());
}

#[test]
fn envelope_uses_camel_case_keys() {
    let json = serde_json::to_value(sample_message()).expect("serialize");
    assert_eq!(json["type"], "token:move");
    assert_eq!(json["sessionId"], "session-1");
    assert_eq!(json["senderId"], "player-1");
    assert_eq!(json["sequence"], 7);
    assert_eq!(json["timestamp"], 42);
}

#[test]
fn envelope_payload_defaults_to_null_when_absent() {
    let raw = r#"{"type":"fog:clear","sessionId":"s","senderId":"gm","sequence":1,"timestamp":5}"#;
    let msg: SyncMessage = serde_json::from_str(raw).expect("deserialize");
    assert_eq!(msg.kind, MessageType::FogClear);
    assert!(msg.payload.is_null());
}

#[test]
fn new_stamps_timestamp() {
    let msg = SyncMessage::new(MessageType::FogClear, "s", "gm", 1, Value::Null);
    assert!(msg.timestamp > 0);
    assert_eq!(msg.prefix(), "fog");
}

#[test]
fn encode_decode_round_trip_preserves_message() {
    let msg = sample_message();
    let bytes = encode_message(&msg);
    let decoded = decode_message(&bytes).expect("decode should succeed");
    assert_eq!(decoded, msg);
}

#[test]
fn integral_payload_numbers_decode_as_integers() {
    let msg = SyncMessage {
        payload: serde_json::json!({"revision": 12}),
        ..sample_message()
    };
    let decoded = decode_message(&encode_message(&msg)).expect("decode");
    assert_eq!(decoded.payload["revision"].as_u64(), Some(12));
}

#[test]
fn decode_rejects_malformed_bytes() {
    let err = decode_message(&[0xff, 0x00, 0x01]).expect_err("bytes should fail");
    assert!(matches!(err, CodecError::Decode(_)));
}

#[test]
fn decode_rejects_unknown_type() {
    let wire = WireMessage {
        kind: "dice:roll".to_owned(),
        session_id: "s".to_owned(),
        sender_id: "gm".to_owned(),
        sequence: 1,
        timestamp: 1,
        payload: None,
    };
    let mut bytes = Vec::new();
    wire.encode(&mut bytes).expect("encode");
    let err = decode_message(&bytes).expect_err("type should be unknown");
    assert!(matches!(err, CodecError::UnknownType(ref raw) if raw == "dice:roll"));
}

#[test]
fn decode_defaults_missing_payload_to_empty_object() {
    let wire = WireMessage {
        kind: "fog:clear".to_owned(),
        session_id: "s".to_owned(),
        sender_id: "gm".to_owned(),
        sequence: 3,
        timestamp: 9,
        payload: None,
    };
    let mut bytes = Vec::new();
    wire.encode(&mut bytes).expect("encode");
    let decoded = decode_message(&bytes).expect("decode");
    assert_eq!(decoded.payload, serde_json::json!({}));
}
