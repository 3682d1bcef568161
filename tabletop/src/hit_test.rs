use super::*;

fn token(id: &str, x: f64, y: f64) -> Token {
    Token {
        id: id.into(),
        scene_id: "main".into(),
        x,
        y,
        radius: 35.0,
        label: String::new(),
        color: None,
        owner: None,
    }
}

fn stroke(id: &str, points: &[(f64, f64)]) -> Drawing {
    Drawing {
        id: id.into(),
        points: points.iter().map(|&(x, y)| Point::new(x, y)).collect(),
        color: "#000".into(),
        width: 3.0,
        author: None,
    }
}

// =============================================================
// token_at
// =============================================================

#[test]
fn token_at_inside_radius() {
    let a = token("a", 100.0, 100.0);
    let tokens = [&a];
    assert_eq!(token_at(&tokens, Point::new(120.0, 100.0)).map(|t| t.id.as_str()), Some("a"));
}

#[test]
fn token_at_edge_counts() {
    let a = token("a", 0.0, 0.0);
    assert!(token_at(&[&a], Point::new(35.0, 0.0)).is_some());
    assert!(token_at(&[&a], Point::new(35.1, 0.0)).is_none());
}

#[test]
fn token_at_prefers_topmost() {
    let a = token("a", 0.0, 0.0);
    let b = token("b", 10.0, 0.0);
    let tokens = [&a, &b];
    assert_eq!(token_at(&tokens, Point::new(5.0, 0.0)).map(|t| t.id.as_str()), Some("b"));
}

#[test]
fn token_at_empty() {
    assert!(token_at(&[], Point::new(0.0, 0.0)).is_none());
}

// =============================================================
// drawings_near
// =============================================================

#[test]
fn drawings_near_matches_any_point() {
    let a = stroke("a", &[(0.0, 0.0), (100.0, 0.0)]);
    let b = stroke("b", &[(500.0, 500.0)]);
    let hits = drawings_near(&[&a, &b], Point::new(95.0, 0.0), 9.0);
    assert_eq!(hits, vec!["a".to_owned()]);
}

#[test]
fn drawings_near_is_strict() {
    let a = stroke("a", &[(9.0, 0.0)]);
    assert!(drawings_near(&[&a], Point::new(0.0, 0.0), 9.0).is_empty());
}
