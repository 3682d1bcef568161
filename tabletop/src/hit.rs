//! World-space hit tests for tokens and drawings. Callers convert screen
//! coordinates through the camera first.

#[cfg(test)]
#[path = "hit_test.rs"]
mod hit_test;

use crate::camera::Point;
use crate::doc::{Drawing, EntityId, Token};

/// The topmost token whose disc contains `world`. Later tokens in
/// `tokens` are drawn above earlier ones.
#[must_use]
pub fn token_at<'a>(tokens: &[&'a Token], world: Point) -> Option<&'a Token> {
    tokens.iter().rev().copied().find(|t| t.center().distance(world) <= t.radius)
}

/// Ids of every drawing with a path point closer than `reach` to `world`.
#[must_use]
pub fn drawings_near(drawings: &[&Drawing], world: Point, reach: f64) -> Vec<EntityId> {
    drawings
        .iter()
        .filter(|d| d.points.iter().any(|p| p.distance(world) < reach))
        .map(|d| d.id.clone())
        .collect()
}
