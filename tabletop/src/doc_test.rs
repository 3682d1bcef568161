#![allow(clippy::float_cmp)]

use serde_json::json;

use super::*;
use crate::fog::FogKind;

fn token(id: &str, x: f64, y: f64) -> Token {
    Token {
        id: id.to_owned(),
        scene_id: "main".to_owned(),
        x,
        y,
        radius: 35.0,
        label: String::new(),
        color: None,
        owner: None,
    }
}

fn drawing(id: &str) -> Drawing {
    Drawing {
        id: id.to_owned(),
        points: vec![Point::new(0.0, 0.0), Point::new(10.0, 5.0)],
        color: "#000".to_owned(),
        width: 3.0,
        author: None,
    }
}

fn area(id: &str, x: f64, y: f64, r: f64) -> FogArea {
    FogArea::reveal(id, Point::new(x, y), r)
}

fn store_with_token() -> StateStore {
    let mut store = StateStore::default();
    store.add_token(token("t1", 10.0, 20.0)).unwrap();
    store
}

// --- Tokens ---

#[test]
fn add_token_places_on_scene_and_bumps_revision() {
    let store = store_with_token();
    assert_eq!(store.revision(), 1);
    assert_eq!(store.active_scene().token_ids, vec!["t1".to_owned()]);
    assert_eq!(store.token("t1").map(|t| t.x), Some(10.0));
}

#[test]
fn add_token_twice_is_idempotent() {
    let mut store = store_with_token();
    let entry = store.add_token(token("t1", 10.0, 20.0)).unwrap();
    assert!(entry.is_noop());
    assert_eq!(store.revision(), 1);
    assert_eq!(store.active_scene().token_ids.len(), 1);
}

#[test]
fn add_token_with_same_id_replaces() {
    let mut store = store_with_token();
    let entry = store.add_token(token("t1", 99.0, 20.0)).unwrap();
    assert_eq!(entry.inverse, vec![Mutation::AddToken { token: token("t1", 10.0, 20.0) }]);
    assert_eq!(store.token("t1").map(|t| t.x), Some(99.0));
    assert_eq!(store.active_scene().token_ids.len(), 1);
}

#[test]
fn add_token_to_unknown_scene_fails() {
    let mut store = StateStore::default();
    let mut t = token("t1", 0.0, 0.0);
    t.scene_id = "nowhere".to_owned();
    let err = store.add_token(t).unwrap_err();
    assert!(matches!(err, MutationError::NotFound { kind: "scene", .. }));
    assert_eq!(store.revision(), 0);
}

#[test]
fn add_token_rejects_non_finite_position() {
    let mut store = StateStore::default();
    let err = store.add_token(token("t1", f64::NAN, 0.0)).unwrap_err();
    assert_eq!(err, MutationError::Validation(ValidationError::NonFinite { field: "token.x" }));
    assert!(store.token("t1").is_none());
}

#[test]
fn move_token_records_previous_position() {
    let mut store = store_with_token();
    let entry = store.move_token("t1", 50.0, 60.0).unwrap();
    assert_eq!(entry.forward, vec![Mutation::MoveToken { id: "t1".into(), x: 50.0, y: 60.0 }]);
    assert_eq!(entry.inverse, vec![Mutation::MoveToken { id: "t1".into(), x: 10.0, y: 20.0 }]);
    assert_eq!(store.revision(), 2);
}

#[test]
fn move_token_to_current_position_is_noop() {
    let mut store = store_with_token();
    store.move_token("t1", 50.0, 60.0).unwrap();
    let replay = store.move_token("t1", 50.0, 60.0).unwrap();
    assert!(replay.is_noop());
    assert_eq!(store.revision(), 2);
}

#[test]
fn move_unknown_token_is_not_found() {
    let mut store = StateStore::default();
    let err = store.move_token("ghost", 1.0, 1.0).unwrap_err();
    assert_eq!(err, MutationError::NotFound { kind: "token", id: "ghost".into() });
}

#[test]
fn conflicting_moves_resolve_last_write_wins() {
    let mut store = store_with_token();
    store.apply(Mutation::MoveToken { id: "t1".into(), x: 1.0, y: 1.0 }).unwrap();
    store.apply(Mutation::MoveToken { id: "t1".into(), x: 2.0, y: 2.0 }).unwrap();
    assert_eq!(store.token("t1").map(Token::center), Some(Point::new(2.0, 2.0)));
}

#[test]
fn update_token_label() {
    let mut store = store_with_token();
    let entry = store.update_token("t1", "Goblin".into()).unwrap();
    assert_eq!(entry.inverse, vec![Mutation::UpdateToken { id: "t1".into(), label: String::new() }]);
    assert_eq!(store.token("t1").map(|t| t.label.as_str()), Some("Goblin"));
}

#[test]
fn remove_token_and_remove_again() {
    let mut store = store_with_token();
    let entry = store.remove_token("t1");
    assert_eq!(entry.inverse, vec![Mutation::AddToken { token: token("t1", 10.0, 20.0) }]);
    assert!(store.active_scene().token_ids.is_empty());
    assert!(store.remove_token("t1").is_noop());
    assert_eq!(store.revision(), 2);
}

// --- Drawings ---

#[test]
fn add_and_remove_drawing() {
    let mut store = StateStore::default();
    store.add_drawing(drawing("d1")).unwrap();
    assert_eq!(store.drawings().len(), 1);
    let entry = store.remove_drawing("d1");
    assert_eq!(entry.inverse, vec![Mutation::AddDrawing { drawing: drawing("d1") }]);
    assert!(store.drawings().is_empty());
}

#[test]
fn add_drawing_rejects_empty_path() {
    let mut store = StateStore::default();
    let mut d = drawing("d1");
    d.points.clear();
    assert_eq!(
        store.add_drawing(d).unwrap_err(),
        MutationError::Validation(ValidationError::Empty { field: "drawing.points" })
    );
}

#[test]
fn clear_drawings_inverse_restores_all_in_order() {
    let mut store = StateStore::default();
    store.add_drawing(drawing("d1")).unwrap();
    store.add_drawing(drawing("d2")).unwrap();
    let entry = store.clear_drawings();
    assert!(store.drawings().is_empty());
    assert_eq!(
        entry.inverse,
        vec![Mutation::AddDrawing { drawing: drawing("d1") }, Mutation::AddDrawing { drawing: drawing("d2") }]
    );
    assert!(store.clear_drawings().is_noop());
}

// --- Fog ---

#[test]
fn reveal_and_hide_fog_through_store() {
    let mut store = StateStore::default();
    store.reveal_fog(area("f1", 100.0, 100.0, 50.0)).unwrap();
    assert_eq!(store.fog().areas().len(), 1);

    let miss = store.hide_fog(Point::new(300.0, 100.0), 20.0).unwrap();
    assert!(miss.is_noop());

    let hit = store.hide_fog(Point::new(140.0, 100.0), 20.0).unwrap();
    assert_eq!(hit.inverse, vec![Mutation::RevealFog { area: area("f1", 100.0, 100.0, 50.0) }]);
    assert!(store.fog().areas().is_empty());
}

#[test]
fn reveal_same_area_twice_is_idempotent() {
    let mut store = StateStore::default();
    store.reveal_fog(area("f1", 0.0, 0.0, 10.0)).unwrap();
    assert!(store.reveal_fog(area("f1", 0.0, 0.0, 10.0)).unwrap().is_noop());
    assert_eq!(store.fog().areas().len(), 1);
}

#[test]
fn reveal_stores_reveal_kind_only() {
    let mut store = StateStore::default();
    let mut hidden = area("f1", 0.0, 0.0, 10.0);
    hidden.kind = FogKind::Hide;
    store.reveal_fog(hidden).unwrap();
    assert_eq!(store.fog().areas()[0].kind, FogKind::Reveal);
}

#[test]
fn toggle_and_clear_fog() {
    let mut store = StateStore::default();
    store.reveal_fog(area("f1", 0.0, 0.0, 10.0)).unwrap();
    let entry = store.set_fog_enabled(false);
    assert_eq!(entry.inverse, vec![Mutation::SetFogEnabled { enabled: true }]);
    assert!(store.set_fog_enabled(false).is_noop());
    assert_eq!(store.clear_fog().inverse.len(), 1);
    assert!(store.remove_fog_area("f1").is_noop());
}

// --- Scenes ---

#[test]
fn scenes_keep_their_own_contents() {
    let mut store = store_with_token();
    store.reveal_fog(area("f1", 0.0, 0.0, 10.0)).unwrap();
    store.add_scene(Scene::new("cave", "Cave")).unwrap();
    store.switch_scene("cave").unwrap();

    assert_eq!(store.active_scene().id, "cave");
    assert!(store.tokens().is_empty());
    assert!(store.fog().areas().is_empty());

    store.switch_scene("main").unwrap();
    assert_eq!(store.tokens().len(), 1);
    assert_eq!(store.fog().areas().len(), 1);
}

#[test]
fn add_scene_is_irreversible_but_update_is_not() {
    let mut store = StateStore::default();
    let created = store.add_scene(Scene::new("cave", "Cave")).unwrap();
    assert!(!created.is_noop());
    assert!(!created.is_reversible());

    let renamed = store.add_scene(Scene::new("cave", "Deep Cave")).unwrap();
    assert_eq!(renamed.inverse, vec![Mutation::AddScene { scene: Scene::new("cave", "Cave") }]);
    assert_eq!(store.scene("cave").map(|s| s.name.as_str()), Some("Deep Cave"));
}

#[test]
fn switch_to_unknown_scene_fails() {
    let mut store = StateStore::default();
    assert!(matches!(store.switch_scene("nope"), Err(MutationError::NotFound { kind: "scene", .. })));
}

#[test]
fn set_grid_validates_and_records_previous() {
    let mut store = StateStore::default();
    let grid = GridConfig { enabled: false, cell_size: 70.0, color: "#fff".into() };
    let entry = store.set_grid(grid.clone()).unwrap();
    assert_eq!(entry.inverse, vec![Mutation::SetGrid { grid: GridConfig::default() }]);
    assert_eq!(store.active_scene().grid, grid);

    let bad = GridConfig { cell_size: 0.0, ..GridConfig::default() };
    assert!(store.set_grid(bad).is_err());
}

// --- Snapshot ---

#[test]
fn snapshot_load_reproduces_state() {
    let mut store = store_with_token();
    store.add_token(token("t2", 5.0, 5.0)).unwrap();
    store.add_drawing(drawing("d1")).unwrap();
    store.reveal_fog(area("f1", 3.0, 4.0, 12.0)).unwrap();
    store.set_fog_enabled(false);
    let snap = store.snapshot();

    let mut fresh = StateStore::default();
    fresh.load_snapshot(snap.clone());

    assert_eq!(fresh.snapshot(), snap);
    assert_eq!(fresh.revision(), store.revision());
}

#[test]
fn snapshot_survives_json() {
    let mut store = store_with_token();
    store.reveal_fog(area("f1", 3.5, 4.5, 12.5)).unwrap();
    let snap = store.snapshot();
    let value = serde_json::to_value(&snap).unwrap();
    assert!(value.get("fogAreas").is_some());
    assert!(value.get("fogEnabled").is_some());
    let back: Snapshot = serde_json::from_value(value).unwrap();
    assert_eq!(back, snap);
}

#[test]
fn load_snapshot_replaces_scene_contents() {
    let mut store = store_with_token();
    store.add_drawing(drawing("d-old")).unwrap();

    let mut other = StateStore::default();
    other.add_token(token("t9", 1.0, 1.0)).unwrap();
    let snap = other.snapshot();

    store.load_snapshot(snap);
    assert!(store.token("t1").is_none());
    assert!(store.drawing("d-old").is_none());
    assert_eq!(store.tokens().len(), 1);
    assert_eq!(store.revision(), 1);
}

#[test]
fn load_snapshot_leaves_other_scenes_alone() {
    let mut store = store_with_token();
    store.add_scene(Scene::new("cave", "Cave")).unwrap();

    let mut remote = StateStore::new(Scene::new("cave", "Cave"));
    let mut t = token("c1", 0.0, 0.0);
    t.scene_id = "cave".into();
    remote.add_token(t).unwrap();

    store.load_snapshot(remote.snapshot());
    assert_eq!(store.active_scene().id, "cave");
    assert!(store.token("t1").is_some());
    assert!(store.token("c1").is_some());
}

#[test]
fn load_snapshot_drops_malformed_tokens() {
    let mut store = StateStore::default();
    let mut snap = StateStore::default().snapshot();
    let mut bad = token("bad", 0.0, 0.0);
    bad.radius = -1.0;
    snap.tokens = vec![token("ok", 0.0, 0.0), bad];
    store.load_snapshot(snap);
    assert_eq!(store.active_scene().token_ids, vec!["ok".to_owned()]);
}

#[test]
fn restore_rebuilds_from_parts() {
    let mut source = store_with_token();
    source.add_drawing(drawing("d1")).unwrap();
    source.add_scene(Scene::new("cave", "Cave")).unwrap();

    let restored = StateStore::restore(
        source.scenes().to_vec(),
        "main",
        source.all_tokens().cloned().collect(),
        source.all_drawings().cloned().collect(),
        source.revision(),
    )
    .unwrap();
    assert_eq!(restored.snapshot(), source.snapshot());
    assert_eq!(restored.scenes().len(), 2);
}

#[test]
fn restore_with_unknown_active_scene_fails() {
    let err = StateStore::restore(Vec::new(), "main", Vec::new(), Vec::new(), 0).unwrap_err();
    assert!(matches!(err, MutationError::NotFound { kind: "scene", .. }));
}

// --- Mutation wire form ---

#[test]
fn mutation_payload_uses_camel_case_fields() {
    let payload = Mutation::SwitchScene { scene_id: "cave".into() }.to_payload().unwrap();
    assert_eq!(payload, json!({ "sceneId": "cave" }));
}

#[test]
fn mutation_decodes_from_message_parts() {
    let payload = json!({ "id": "t1", "x": 1.5, "y": -2.5 });
    let m = Mutation::from_message(MessageType::TokenMove, &payload).unwrap();
    assert_eq!(m, Mutation::MoveToken { id: "t1".into(), x: 1.5, y: -2.5 });
    assert_eq!(m.message_type(), MessageType::TokenMove);
}

#[test]
fn fieldless_mutation_accepts_null_payload() {
    let m = Mutation::from_message(MessageType::FogClear, &Value::Null).unwrap();
    assert_eq!(m, Mutation::ClearFog {});
    assert_eq!(m.to_payload().unwrap(), json!({}));
}

#[test]
fn non_mutation_type_does_not_decode() {
    assert!(Mutation::from_message(MessageType::ParticipantJoin, &json!({})).is_err());
}

#[test]
fn mutation_payload_round_trips_for_token_add() {
    let m = Mutation::AddToken { token: token("t1", 10.5, 20.5) };
    let payload = m.to_payload().unwrap();
    assert_eq!(payload["token"]["sceneId"], json!("main"));
    assert_eq!(Mutation::from_message(m.message_type(), &payload).unwrap(), m);
}

#[test]
fn mutation_token_id() {
    assert_eq!(Mutation::RemoveToken { id: "t1".into() }.token_id(), Some("t1"));
    assert_eq!(Mutation::ClearFog {}.token_id(), None);
}
