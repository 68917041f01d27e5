//! Unit movement - obstacle steering, gate seeking and integration

use glam::Vec3;

use super::entity::{EnemyMode, EntityId, Obstacle, Stance, Unit};
use super::registry::{EntityRegistry, Roster};
use super::spatial::SpatialQuery;
use super::targeting::nearest_opponent;

/// Movement tunables
#[derive(Debug, Clone, Copy)]
pub struct SteeringParams {
    /// Length of a moving unit's velocity after gate seeking
    pub unit_speed: f32,
    /// Sideways speed while deflecting off an obstacle
    pub steering_speed: f32,
    /// Magnitude of the per-tick pull toward the objective gate
    pub gate_seek_speed: f32,
}

/// Steering system for updating unit headings and positions
pub struct SteeringSystem;

impl SteeringSystem {
    /// Velocity from `from` toward `to` at `speed` (zero if the points coincide)
    pub fn heading_toward(from: Vec3, to: Vec3, speed: f32) -> Vec3 {
        (to - from).normalize_or_zero() * speed
    }

    /// Sideways velocity that carries a unit around an obstacle.
    /// Perpendicular to the direction toward the obstacle in the horizontal (XZ) plane.
    pub fn deflect(unit_at: Vec3, obstacle_at: Vec3, steering_speed: f32) -> Vec3 {
        let toward = obstacle_at - unit_at;
        let side = Vec3::new(-toward.z, 0.0, toward.x);
        // Obstacle straight above or below: any horizontal direction will do
        side.try_normalize().unwrap_or(Vec3::X) * steering_speed
    }

    /// Add a pull toward the goal, then restore the configured speed
    pub fn seek(velocity: Vec3, position: Vec3, goal: Vec3, params: &SteeringParams) -> Vec3 {
        let pull = Self::heading_toward(position, goal, params.gate_seek_speed);
        (velocity + pull).normalize_or_zero() * params.unit_speed
    }

    /// Steer and move one unit for this tick. Returns false if the unit holds position.
    pub fn steer_unit(
        unit: &mut Unit,
        goal: Vec3,
        obstacles: &Roster<Obstacle>,
        spatial: &impl SpatialQuery,
        params: &SteeringParams,
    ) -> bool {
        if !unit.stance.advances() {
            return false;
        }

        // Avoidance overrides the current velocity; the last overlapping obstacle wins
        let hull = unit.collider();
        for obstacle in obstacles.iter() {
            if spatial.intersects(&hull, &obstacle.collider()) {
                unit.velocity = Self::deflect(unit.position, obstacle.position, params.steering_speed);
            }
        }

        unit.velocity = Self::seek(unit.velocity, unit.position, goal, params);
        unit.position += unit.velocity;
        true
    }
}

/// Promote the first defensive enemy when no aggressive one is left.
/// Returns the promoted unit, if any.
pub fn promote_if_stalled(enemies: &mut Roster<Unit>) -> Option<EntityId> {
    let any_aggressive = enemies
        .iter()
        .any(|u| u.stance == Stance::Enemy(EnemyMode::Aggressive));
    if any_aggressive {
        return None;
    }

    let unit = enemies
        .iter_mut()
        .find(|u| u.stance == Stance::Enemy(EnemyMode::Defensive))?;
    unit.stance = Stance::Enemy(EnemyMode::Aggressive);
    Some(unit.id)
}

/// Face the nearest opponent, then steer and move every unit in `own`
fn move_roster(
    own: &mut Roster<Unit>,
    opponents: &Roster<Unit>,
    obstacles: &Roster<Obstacle>,
    goal: Vec3,
    spatial: &impl SpatialQuery,
    params: &SteeringParams,
) {
    for unit in own.iter_mut() {
        unit.facing = nearest_opponent(unit.position, opponents, spatial);
        SteeringSystem::steer_unit(unit, goal, obstacles, spatial, params);
    }
}

/// Run one movement tick for both sides. Returns a promoted enemy, if any.
pub fn run(
    registry: &mut EntityRegistry,
    spatial: &impl SpatialQuery,
    params: &SteeringParams,
) -> Option<EntityId> {
    let promoted = promote_if_stalled(&mut registry.enemy_units);

    let player_goal = registry.enemy_gate.position;
    let enemy_goal = registry.player_gate.position;

    move_roster(
        &mut registry.player_units,
        &registry.enemy_units,
        &registry.obstacles,
        player_goal,
        spatial,
        params,
    );
    move_roster(
        &mut registry.enemy_units,
        &registry.player_units,
        &registry.obstacles,
        enemy_goal,
        spatial,
        params,
    );

    promoted
}
