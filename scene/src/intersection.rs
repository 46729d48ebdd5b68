#[cfg(test)]
#[path = "intersection_test.rs"]
mod intersection_test;

use glam::{Mat4, Vec3};
use wire::GlobalId;
use wire::events::PokerProximity;

use crate::consts::{PROXIMITY_DIST_MAX, PROXIMITY_DIST_MIN, PROXIMITY_UV_MAX, PROXIMITY_UV_MIN};
use crate::hand::Hand;

#[derive(Debug, Clone, Copy)]
struct ActivePanel {
    id: GlobalId,
    panel_from_universe: Mat4,
    z_scale: f32,
    hand: Hand,
}

#[derive(Debug, Clone, Copy)]
struct ActivePoker {
    id: GlobalId,
    position: Vec3,
    pressed: bool,
    hand: Hand,
}

/// Proximity results for one poker.
#[derive(Debug, Clone, PartialEq)]
pub struct PokerResult {
    pub poker_id: GlobalId,
    pub is_pressed: bool,
    pub proximity: Vec<PokerProximity>,
}

/// Poker ↔ panel proximity tester. Participants are registered during
/// traversal and cleared at the start of each frame.
#[derive(Debug, Default)]
pub struct IntersectionTester {
    panels: Vec<ActivePanel>,
    pokers: Vec<ActivePoker>,
}

impl IntersectionTester {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.panels.clear();
        self.pokers.clear();
    }

    /// `z_scale` converts panel-local depth into universe distance.
    pub fn add_active_panel(&mut self, id: GlobalId, panel_from_universe: Mat4, z_scale: f32, hand: Hand) {
        self.panels.push(ActivePanel { id, panel_from_universe, z_scale, hand });
    }

    pub fn add_active_poker(&mut self, id: GlobalId, position: Vec3, pressed: bool, hand: Hand) {
        self.pokers.push(ActivePoker { id, position, pressed, hand });
    }

    /// Proximity of every poker to every panel it may interact with. Every
    /// registered poker gets a result, possibly empty, in registration order.
    #[must_use]
    pub fn update_proximity(&self) -> Vec<PokerResult> {
        self.pokers
            .iter()
            .map(|poker| PokerResult {
                poker_id: poker.id,
                is_pressed: poker.pressed,
                proximity: self
                    .panels
                    .iter()
                    .filter(|panel| poker.hand.may_interact(panel.hand))
                    .filter_map(|panel| proximity(panel, poker.position))
                    .collect(),
            })
            .collect()
    }
}

/// Panel-local projection of a universe-space point, if it lies inside the band.
fn proximity(panel: &ActivePanel, universe_point: Vec3) -> Option<PokerProximity> {
    let local = panel.panel_from_universe.transform_point3(universe_point);
    let u = local.x + 0.5;
    let v = local.z + 0.5;
    let dist = local.y * panel.z_scale;
    let in_uv = |c: f32| (PROXIMITY_UV_MIN..=PROXIMITY_UV_MAX).contains(&c);
    if in_uv(u) && in_uv(v) && (PROXIMITY_DIST_MIN..=PROXIMITY_DIST_MAX).contains(&dist) {
        Some(PokerProximity { panel_id: panel.id, u, v, dist })
    } else {
        None
    }
}
