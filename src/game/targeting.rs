//! Nearest-opponent lookup for unit facing and projectile aim

use glam::Vec3;

use super::entity::{EntityId, Unit};
use super::registry::Roster;
use super::spatial::SpatialQuery;

/// Closest unit of the opposing roster to `from`.
///
/// Linear scan; on equal distances the first one in roster order wins.
/// `None` means there is nothing to aim at this tick.
pub fn nearest_opponent(
    from: Vec3,
    opponents: &Roster<Unit>,
    spatial: &impl SpatialQuery,
) -> Option<EntityId> {
    let mut best: Option<(EntityId, f32)> = None;
    for unit in opponents.iter() {
        let distance = spatial.distance(from, unit.position);
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((unit.id, distance)),
        }
    }
    best.map(|(id, _)| id)
}

/// Position of the nearest opponent, if any
pub fn nearest_opponent_position(
    from: Vec3,
    opponents: &Roster<Unit>,
    spatial: &impl SpatialQuery,
) -> Option<Vec3> {
    nearest_opponent(from, opponents, spatial)
        .and_then(|id| opponents.get(id))
        .map(|unit| unit.position)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::collaborator::{BodyHandle, VisualHandle};
    use crate::game::entity::{PlayerMode, Stance};
    use crate::game::spatial::AabbSpatial;

    fn unit(id: u64, position: Vec3) -> Unit {
        Unit {
            id: EntityId(id),
            stance: Stance::Player(PlayerMode::Offence),
            position,
            velocity: Vec3::ZERO,
            health: 50,
            facing: None,
            visual: VisualHandle(id),
            body: BodyHandle(id),
        }
    }

    #[test]
    fn empty_roster_has_no_target() {
        let roster: Roster<Unit> = Roster::new();
        assert_eq!(nearest_opponent(Vec3::ZERO, &roster, &AabbSpatial), None);
    }

    #[test]
    fn picks_the_closest() {
        let mut roster = Roster::new();
        roster.add(unit(1, Vec3::new(100.0, 0.0, 0.0)));
        roster.add(unit(2, Vec3::new(0.0, 30.0, 0.0)));
        roster.add(unit(3, Vec3::new(0.0, 0.0, -60.0)));
        assert_eq!(nearest_opponent(Vec3::ZERO, &roster, &AabbSpatial), Some(EntityId(2)));
    }

    #[test]
    fn ties_go_to_the_first_in_roster_order() {
        let mut roster = Roster::new();
        roster.add(unit(7, Vec3::new(50.0, 0.0, 0.0)));
        roster.add(unit(3, Vec3::new(-50.0, 0.0, 0.0)));
        roster.add(unit(5, Vec3::new(0.0, 50.0, 0.0)));
        assert_eq!(nearest_opponent(Vec3::ZERO, &roster, &AabbSpatial), Some(EntityId(7)));
    }
}
