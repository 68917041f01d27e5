//! Combat system - firing, projectile travel, hit detection and rams

use glam::Vec3;

use crate::config::{RamPolicy, SimConfig};

use super::collaborator::Collaborator;
use super::economy::Economy;
use super::entity::{EntityId, EntityKind, Faction, GateHit, Projectile};
use super::registry::EntityRegistry;
use super::spatial::SpatialQuery;
use super::targeting::nearest_opponent_position;

/// Projectile stats for one side
#[derive(Debug, Clone, Copy)]
pub struct ProjectileStats {
    /// Distance per tick
    pub speed: f32,
    /// Travel distance after which the projectile is despawned
    pub max_range: f32,
}

impl ProjectileStats {
    pub fn for_faction(faction: Faction, config: &SimConfig) -> Self {
        let max_range = match faction {
            Faction::Player => config.player_projectile_range,
            Faction::Enemy => config.enemy_projectile_range,
        };
        Self {
            speed: config.projectile_speed,
            max_range,
        }
    }
}

/// How a unit died
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillCause {
    Shot,
    Ram,
}

/// Something combat did this tick
#[derive(Debug, Clone, PartialEq)]
pub enum CombatEvent {
    UnitHit {
        target: EntityId,
        faction: Faction,
        remaining: u32,
    },
    UnitKilled {
        victim: EntityId,
        faction: Faction,
        cause: KillCause,
        /// Side that was paid and its new balance
        paid: Faction,
        gold: u32,
    },
    GateHit {
        faction: Faction,
        remaining: Option<u32>,
    },
    GateDestroyed {
        faction: Faction,
    },
}

/// Combat system for managing projectiles and damage
pub struct CombatSystem;

impl CombatSystem {
    /// Every living unit of `shooter` fires one projectile at its nearest opponent.
    /// Units with nothing to aim at hold fire. Returns the number of shots.
    pub fn fire_volley(
        registry: &mut EntityRegistry,
        shooter: Faction,
        stats: ProjectileStats,
        spatial: &impl SpatialQuery,
        collaborator: &mut impl Collaborator,
    ) -> usize {
        let shots: Vec<(Vec3, Vec3)> = registry
            .units(shooter)
            .iter()
            .filter_map(|unit| {
                let target = nearest_opponent_position(
                    unit.position,
                    registry.units(shooter.opponent()),
                    spatial,
                )?;
                let direction = (target - unit.position).try_normalize()?;
                Some((unit.position, direction))
            })
            .collect();

        let kind = EntityKind::projectile(shooter);
        for &(origin, direction) in &shots {
            let id = registry.allocate_id();
            let projectile = Projectile {
                id,
                owner: shooter,
                position: origin,
                direction,
                travelled: 0.0,
                speed: stats.speed,
                max_range: stats.max_range,
                visual: collaborator.spawn_visual(kind, origin),
            };
            registry.projectiles_mut(shooter).add(projectile);
        }

        shots.len()
    }

    /// Move every projectile of `owner` and despawn the ones past their range.
    /// Returns how many expired.
    pub fn advance_projectiles(
        registry: &mut EntityRegistry,
        owner: Faction,
        collaborator: &mut impl Collaborator,
    ) -> usize {
        let expired: Vec<EntityId> = registry
            .projectiles_mut(owner)
            .iter_mut()
            .filter_map(|p| (!p.advance()).then_some(p.id))
            .collect();

        for id in &expired {
            registry.despawn_projectile(owner, *id, collaborator);
        }
        expired.len()
    }

    /// Test each projectile of `owner` against opposing units, then the opposing gate.
    /// First hit wins; the projectile is consumed.
    ///
    /// A unit only counts as struck when its centre lies within the shot's
    /// range of the firing point. Hull contact alone is not enough, so a shot
    /// never lands on a target further away than its range. Gates are struck
    /// on contact.
    pub fn resolve_projectile_hits(
        registry: &mut EntityRegistry,
        owner: Faction,
        kill_reward: u32,
        economy: &mut Economy,
        spatial: &impl SpatialQuery,
        collaborator: &mut impl Collaborator,
    ) -> Vec<CombatEvent> {
        let mut events = Vec::new();
        let target_side = owner.opponent();

        for projectile_id in registry.projectiles(owner).ids() {
            let Some((shot, origin, range)) = registry
                .projectiles(owner)
                .get(projectile_id)
                .map(|p| (p.collider(), p.origin(), p.max_range))
            else {
                continue;
            };

            let struck = registry
                .units(target_side)
                .iter()
                .find(|unit| {
                    spatial.intersects(&shot, &unit.collider())
                        && spatial.distance(origin, unit.position) <= range
                })
                .map(|unit| unit.id);

            if let Some(target) = struck {
                let killed = registry
                    .units_mut(target_side)
                    .get_mut(target)
                    .map(|unit| (unit.take_hit(), unit.health));

                match killed {
                    Some((true, _)) => {
                        registry.despawn_unit(target_side, target, collaborator);
                        let gold = economy.credit(owner, kill_reward);
                        events.push(CombatEvent::UnitKilled {
                            victim: target,
                            faction: target_side,
                            cause: KillCause::Shot,
                            paid: owner,
                            gold,
                        });
                    }
                    Some((false, remaining)) => events.push(CombatEvent::UnitHit {
                        target,
                        faction: target_side,
                        remaining,
                    }),
                    None => {}
                }
                registry.despawn_projectile(owner, projectile_id, collaborator);
                continue;
            }

            let gate = registry.gate(target_side);
            if gate.is_destroyed() || !spatial.intersects(&shot, &gate.collider()) {
                continue;
            }

            match registry.gate_mut(target_side).take_hit() {
                GateHit::Absorbed => events.push(CombatEvent::GateHit {
                    faction: target_side,
                    remaining: None,
                }),
                GateHit::Damaged { remaining } => events.push(CombatEvent::GateHit {
                    faction: target_side,
                    remaining: Some(remaining),
                }),
                GateHit::Destroyed => {
                    registry.release_gate_visual(target_side, collaborator);
                    events.push(CombatEvent::GateDestroyed {
                        faction: target_side,
                    });
                }
            }
            registry.despawn_projectile(owner, projectile_id, collaborator);
        }

        events
    }

    /// Body-to-body contact: each touching enemy loses one health per tick.
    /// A ram that kills the enemy resolves according to `policy`.
    pub fn resolve_rams(
        registry: &mut EntityRegistry,
        policy: RamPolicy,
        kill_reward: u32,
        economy: &mut Economy,
        spatial: &impl SpatialQuery,
        collaborator: &mut impl Collaborator,
    ) -> Vec<CombatEvent> {
        let mut events = Vec::new();

        for player_id in registry.player_units.ids() {
            for enemy_id in registry.enemy_units.ids() {
                let Some(hull) = registry.player_units.get(player_id).map(|u| u.collider()) else {
                    break;
                };
                let Some(enemy) = registry.enemy_units.get_mut(enemy_id) else {
                    continue;
                };
                if !spatial.intersects(&hull, &enemy.collider()) {
                    continue;
                }

                if !enemy.take_hit() {
                    events.push(CombatEvent::UnitHit {
                        target: enemy_id,
                        faction: Faction::Enemy,
                        remaining: enemy.health,
                    });
                    continue;
                }

                registry.despawn_unit(Faction::Enemy, enemy_id, collaborator);
                let gold = economy.credit(Faction::Player, kill_reward);
                events.push(CombatEvent::UnitKilled {
                    victim: enemy_id,
                    faction: Faction::Enemy,
                    cause: KillCause::Ram,
                    paid: Faction::Player,
                    gold,
                });

                if policy == RamPolicy::Mutual {
                    registry.despawn_unit(Faction::Player, player_id, collaborator);
                    let gold = economy.credit(Faction::Enemy, kill_reward);
                    events.push(CombatEvent::UnitKilled {
                        victim: player_id,
                        faction: Faction::Player,
                        cause: KillCause::Ram,
                        paid: Faction::Enemy,
                        gold,
                    });
                    break;
                }
            }
        }

        events
    }

    /// One combat tick: travel, range expiry, projectile hits for both sides, then rams
    pub fn run(
        registry: &mut EntityRegistry,
        config: &SimConfig,
        economy: &mut Economy,
        spatial: &impl SpatialQuery,
        collaborator: &mut impl Collaborator,
    ) -> Vec<CombatEvent> {
        Self::advance_projectiles(registry, Faction::Player, collaborator);
        Self::advance_projectiles(registry, Faction::Enemy, collaborator);

        let mut events = Self::resolve_projectile_hits(
            registry,
            Faction::Player,
            config.kill_reward,
            economy,
            spatial,
            collaborator,
        );
        events.extend(Self::resolve_projectile_hits(
            registry,
            Faction::Enemy,
            config.kill_reward,
            economy,
            spatial,
            collaborator,
        ));
        events.extend(Self::resolve_rams(
            registry,
            config.ram_policy,
            config.kill_reward,
            economy,
            spatial,
            collaborator,
        ));
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::collaborator::HeadlessCollaborator;
    use crate::game::entity::{EnemyMode, PlayerMode, Stance, Unit};
    use crate::game::spatial::AabbSpatial;

    fn registry(c: &mut HeadlessCollaborator) -> EntityRegistry {
        EntityRegistry::new(Vec3::new(0.0, 500.0, 0.0), Vec3::new(0.0, -500.0, 0.0), Some(3), c)
    }

    fn add_unit(
        reg: &mut EntityRegistry,
        c: &mut HeadlessCollaborator,
        faction: Faction,
        position: Vec3,
        health: u32,
    ) -> EntityId {
        let id = reg.allocate_id();
        let stance = match faction {
            Faction::Player => Stance::Player(PlayerMode::Offence),
            Faction::Enemy => Stance::Enemy(EnemyMode::Aggressive),
        };
        let kind = EntityKind::unit(faction);
        reg.units_mut(faction).add(Unit {
            id,
            stance,
            position,
            velocity: Vec3::ZERO,
            health,
            facing: None,
            visual: c.spawn_visual(kind, position),
            body: c.spawn_physics_body(kind, position),
        });
        id
    }

    fn add_projectile(
        reg: &mut EntityRegistry,
        c: &mut HeadlessCollaborator,
        owner: Faction,
        position: Vec3,
        direction: Vec3,
        max_range: f32,
    ) -> EntityId {
        let id = reg.allocate_id();
        reg.projectiles_mut(owner).add(Projectile {
            id,
            owner,
            position,
            direction,
            travelled: 0.0,
            speed: 5.0,
            max_range,
            visual: c.spawn_visual(EntityKind::projectile(owner), position),
        });
        id
    }

    fn step(reg: &mut EntityRegistry, economy: &mut Economy, c: &mut HeadlessCollaborator) -> Vec<CombatEvent> {
        let config = SimConfig {
            kill_reward: 5,
            ..SimConfig::default()
        };
        CombatSystem::run(reg, &config, economy, &AabbSpatial, c)
    }

    #[test]
    fn volley_aims_at_nearest_and_skips_when_empty() {
        let mut c = HeadlessCollaborator::new();
        let mut reg = registry(&mut c);
        add_unit(&mut reg, &mut c, Faction::Player, Vec3::ZERO, 50);
        add_unit(&mut reg, &mut c, Faction::Player, Vec3::new(0.0, 100.0, 0.0), 50);
        let stats = ProjectileStats {
            speed: 5.0,
            max_range: 600.0,
        };

        assert_eq!(CombatSystem::fire_volley(&mut reg, Faction::Player, stats, &AabbSpatial, &mut c), 0);

        add_unit(&mut reg, &mut c, Faction::Enemy, Vec3::new(200.0, 0.0, 0.0), 50);
        assert_eq!(CombatSystem::fire_volley(&mut reg, Faction::Player, stats, &AabbSpatial, &mut c), 2);
        let first = reg.player_projectiles.iter().next().expect("projectile");
        assert_eq!(first.direction, Vec3::X);
    }

    #[test]
    fn short_range_projectile_never_hits() {
        let mut c = HeadlessCollaborator::new();
        let mut reg = registry(&mut c);
        let mut economy = Economy::default();
        let target = add_unit(&mut reg, &mut c, Faction::Enemy, Vec3::new(100.0, 0.0, 0.0), 50);
        add_projectile(&mut reg, &mut c, Faction::Player, Vec3::ZERO, Vec3::X, 50.0);

        for _ in 0..40 {
            step(&mut reg, &mut economy, &mut c);
        }

        assert_eq!(reg.enemy_units.get(target).map(|u| u.health), Some(50));
        assert!(reg.player_projectiles.is_empty());
    }

    #[test]
    fn range_is_measured_to_the_target_centre() {
        for (range, health) in [(85.0, 50), (99.0, 50), (100.0, 49)] {
            let mut c = HeadlessCollaborator::new();
            let mut reg = registry(&mut c);
            let mut economy = Economy::default();
            let target = add_unit(&mut reg, &mut c, Faction::Enemy, Vec3::new(100.0, 0.0, 0.0), 50);
            add_projectile(&mut reg, &mut c, Faction::Player, Vec3::ZERO, Vec3::X, range);

            for _ in 0..40 {
                step(&mut reg, &mut economy, &mut c);
            }

            assert_eq!(
                reg.enemy_units.get(target).map(|u| u.health),
                Some(health),
                "range {range}"
            );
            assert!(reg.player_projectiles.is_empty(), "range {range}");
        }
    }

    #[test]
    fn hit_costs_exactly_one_health_and_one_projectile() {
        let mut c = HeadlessCollaborator::new();
        let mut reg = registry(&mut c);
        let mut economy = Economy::default();
        let target = add_unit(&mut reg, &mut c, Faction::Enemy, Vec3::new(100.0, 0.0, 0.0), 50);
        add_projectile(&mut reg, &mut c, Faction::Player, Vec3::ZERO, Vec3::X, 600.0);
        let spare = add_projectile(&mut reg, &mut c, Faction::Player, Vec3::new(0.0, 0.0, 300.0), Vec3::Z, 600.0);

        let mut hits = 0;
        for _ in 0..40 {
            hits += step(&mut reg, &mut economy, &mut c)
                .iter()
                .filter(|e| matches!(e, CombatEvent::UnitHit { .. }))
                .count();
        }

        assert_eq!(hits, 1);
        assert_eq!(reg.enemy_units.get(target).map(|u| u.health), Some(49));
        assert_eq!(reg.player_projectiles.ids(), vec![spare]);
    }

    #[test]
    fn lethal_hit_removes_unit_and_pays_shooter() {
        let mut c = HeadlessCollaborator::new();
        let mut reg = registry(&mut c);
        let mut economy = Economy::default();
        let target = add_unit(&mut reg, &mut c, Faction::Player, Vec3::new(0.0, 0.0, 20.0), 1);
        add_projectile(&mut reg, &mut c, Faction::Enemy, Vec3::ZERO, Vec3::Z, 600.0);

        let events = step(&mut reg, &mut economy, &mut c);

        assert!(!reg.player_units.contains(target));
        assert_eq!(economy.gold(Faction::Enemy), 5);
        assert!(events.iter().any(|e| matches!(
            e,
            CombatEvent::UnitKilled { cause: KillCause::Shot, paid: Faction::Enemy, .. }
        )));
        assert_eq!(c.live_bodies(), 0);
    }

    #[test]
    fn gate_takes_damage_until_destroyed() {
        let mut c = HeadlessCollaborator::new();
        let mut reg = registry(&mut c);
        let mut economy = Economy::default();

        for _ in 0..4 {
            add_projectile(&mut reg, &mut c, Faction::Player, Vec3::new(0.0, -440.0, 0.0), Vec3::NEG_Y, 600.0);
            step(&mut reg, &mut economy, &mut c);
        }

        assert!(reg.enemy_gate.is_destroyed());
        assert!(reg.enemy_gate.visual.is_none());
        // The fourth shot passes through the wreck
        assert_eq!(reg.player_projectiles.len(), 1);
    }

    #[test]
    fn mutual_ram_destroys_both_and_pays_both() {
        let mut c = HeadlessCollaborator::new();
        let mut reg = registry(&mut c);
        let mut economy = Economy::default();
        add_unit(&mut reg, &mut c, Faction::Player, Vec3::ZERO, 50);
        add_unit(&mut reg, &mut c, Faction::Enemy, Vec3::new(10.0, 0.0, 0.0), 2);

        step(&mut reg, &mut economy, &mut c);
        assert_eq!(reg.enemy_units.iter().next().map(|u| u.health), Some(1));

        step(&mut reg, &mut economy, &mut c);
        assert!(reg.enemy_units.is_empty());
        assert!(reg.player_units.is_empty());
        assert_eq!(economy.gold(Faction::Player), 5);
        assert_eq!(economy.gold(Faction::Enemy), 5);
    }

    #[test]
    fn enemy_only_ram_spares_the_player() {
        let mut c = HeadlessCollaborator::new();
        let mut reg = registry(&mut c);
        let mut economy = Economy::default();
        add_unit(&mut reg, &mut c, Faction::Player, Vec3::ZERO, 50);
        add_unit(&mut reg, &mut c, Faction::Enemy, Vec3::new(10.0, 0.0, 0.0), 1);

        let events = CombatSystem::resolve_rams(
            &mut reg,
            RamPolicy::EnemyOnly,
            5,
            &mut economy,
            &AabbSpatial,
            &mut c,
        );

        assert_eq!(events.len(), 1);
        assert_eq!(reg.player_units.len(), 1);
        assert_eq!(economy.gold(Faction::Enemy), 0);
    }
}
