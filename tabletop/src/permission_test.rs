use serde_json::json;

use super::*;

fn roster() -> Roster {
    let mut roster = Roster::new();
    roster.join(Participant::host("gm", "Game Master"));
    roster.join(Participant::player("p1", "Alice"));
    roster
}

fn move_t1() -> Mutation {
    Mutation::MoveToken { id: "t1".into(), x: 1.0, y: 2.0 }
}

#[test]
fn host_may_do_anything() {
    let roster = roster();
    for m in [move_t1(), Mutation::ClearFog {}, Mutation::SwitchScene { scene_id: "x".into() }] {
        assert_eq!(PermissionGate::check(&roster, "gm", &m), Ok(()));
    }
}

#[test]
fn player_without_assignment_cannot_move_token() {
    let roster = roster();
    assert_eq!(
        PermissionGate::check(&roster, "p1", &move_t1()),
        Err(Denial::TokenNotAssigned("t1".into()))
    );
}

#[test]
fn player_with_assignment_may_move_only_that_token() {
    let mut roster = roster();
    roster.grant_token("p1", "t1");
    assert_eq!(PermissionGate::check(&roster, "p1", &move_t1()), Ok(()));
    let other = Mutation::MoveToken { id: "t2".into(), x: 0.0, y: 0.0 };
    assert!(PermissionGate::check(&roster, "p1", &other).is_err());
}

#[test]
fn player_cannot_add_or_remove_tokens_even_if_assigned() {
    let mut roster = roster();
    roster.grant_token("p1", "t1");
    let remove = Mutation::RemoveToken { id: "t1".into() };
    assert_eq!(PermissionGate::check(&roster, "p1", &remove), Err(Denial::HostOnly("token:remove")));
}

#[test]
fn drawing_requires_capability() {
    let mut roster = roster();
    assert_eq!(
        PermissionGate::check(&roster, "p1", &Mutation::ClearDrawings {}),
        Err(Denial::DrawingNotAllowed)
    );
    let update = PermissionUpdate {
        participant_id: "p1".into(),
        capabilities: Capabilities { can_move_token_ids: BTreeSet::new(), can_draw: true },
    };
    roster.set_capabilities("gm", update).unwrap();
    assert_eq!(PermissionGate::check(&roster, "p1", &Mutation::ClearDrawings {}), Ok(()));
}

#[test]
fn fog_and_scene_edits_are_host_only() {
    let roster = roster();
    let hide = Mutation::HideFog { x: 0.0, y: 0.0, radius: 10.0 };
    assert_eq!(PermissionGate::check(&roster, "p1", &hide), Err(Denial::HostOnly("fog:hide")));
}

#[test]
fn unknown_participant_is_denied() {
    let roster = roster();
    assert_eq!(
        PermissionGate::check(&roster, "stranger", &move_t1()),
        Err(Denial::UnknownParticipant("stranger".into()))
    );
}

#[test]
fn only_host_may_set_capabilities() {
    let mut roster = roster();
    roster.join(Participant::player("p2", "Bob"));
    let update = PermissionUpdate { participant_id: "p2".into(), capabilities: Capabilities::default() };
    assert_eq!(roster.set_capabilities("p1", update.clone()), Err(Denial::HostOnly("permission:update")));

    let missing = PermissionUpdate { participant_id: "ghost".into(), ..update };
    assert_eq!(roster.set_capabilities("gm", missing), Err(Denial::UnknownParticipant("ghost".into())));
}

#[test]
fn rejoin_keeps_granted_capabilities() {
    let mut roster = roster();
    roster.grant_token("p1", "t1");
    roster.leave("p1");
    assert!(PermissionGate::check(&roster, "p1", &move_t1()).is_err());

    roster.join(Participant::player("p1", "Alice (reconnected)"));
    assert_eq!(PermissionGate::check(&roster, "p1", &move_t1()), Ok(()));
    assert_eq!(roster.get("p1").map(|p| p.name.as_str()), Some("Alice (reconnected)"));
}

#[test]
fn welcome_roster_does_not_clear_grants() {
    let mut roster = roster();
    roster.grant_token("p1", "t1");
    roster.join(Participant::player("p2", "Bob"));
    roster.grant_token("p2", "t1");

    // Relay rosters carry no capabilities; p2 is away for now.
    roster.replace(vec![Participant::host("gm", "Game Master"), Participant::player("p1", "Alice")]);
    assert_eq!(PermissionGate::check(&roster, "p1", &move_t1()), Ok(()));
    assert!(roster.get("p2").is_none());

    roster.replace(vec![
        Participant::host("gm", "Game Master"),
        Participant::player("p1", "Alice"),
        Participant::player("p2", "Bob"),
    ]);
    assert_eq!(PermissionGate::check(&roster, "p2", &move_t1()), Ok(()));
}

#[test]
fn revocation_is_not_undone_by_rejoin() {
    let mut roster = roster();
    roster.grant_token("p1", "t1");
    let revoke = PermissionUpdate { participant_id: "p1".into(), capabilities: Capabilities::default() };
    roster.set_capabilities("gm", revoke).unwrap();
    roster.leave("p1");
    roster.join(Participant::player("p1", "Alice"));
    assert!(PermissionGate::check(&roster, "p1", &move_t1()).is_err());
}

#[test]
fn capabilities_wire_shape() {
    let update: PermissionUpdate = serde_json::from_value(json!({
        "participantId": "p1",
        "capabilities": { "canMoveTokenIds": ["t1"], "canDraw": true }
    }))
    .unwrap();
    assert!(update.capabilities.can_draw);
    assert!(update.capabilities.can_move_token_ids.contains("t1"));

    let roster_json = serde_json::to_value(Participant::player("p1", "Alice")).unwrap();
    assert_eq!(roster_json["role"], json!("player"));
    assert_eq!(roster_json["capabilities"]["canDraw"], json!(false));
}
