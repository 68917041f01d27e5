//! Strongly typed entity records held by the registry

use std::fmt;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::collaborator::{BodyHandle, VisualHandle};
use super::spatial::Collider;

/// Session-unique entity identifier (never reused within a session)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Side an entity fights for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Faction {
    Player,
    Enemy,
}

impl Faction {
    pub fn opponent(self) -> Self {
        match self {
            Faction::Player => Faction::Enemy,
            Faction::Enemy => Faction::Player,
        }
    }
}

impl fmt::Display for Faction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Faction::Player => f.write_str("player"),
            Faction::Enemy => f.write_str("enemy"),
        }
    }
}

/// Placement mode for player units
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerMode {
    /// Advances on the enemy gate
    #[default]
    Offence,
    /// Holds position and fires
    Defence,
}

/// Spawn type for enemy units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnemyMode {
    Aggressive,
    Defensive,
}

/// Behavioural mode, tagged by faction so the two can never disagree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "faction", content = "mode", rename_all = "snake_case")]
pub enum Stance {
    Player(PlayerMode),
    Enemy(EnemyMode),
}

impl Stance {
    pub fn faction(self) -> Faction {
        match self {
            Stance::Player(_) => Faction::Player,
            Stance::Enemy(_) => Faction::Enemy,
        }
    }

    /// Whether units in this stance move toward the opposing gate
    pub fn advances(self) -> bool {
        matches!(
            self,
            Stance::Player(PlayerMode::Offence) | Stance::Enemy(EnemyMode::Aggressive)
        )
    }
}

/// Every kind of thing the collaborators are asked to represent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    PlayerUnit,
    EnemyUnit,
    PlayerGate,
    EnemyGate,
    PlayerProjectile,
    EnemyProjectile,
    Obstacle,
}

impl EntityKind {
    pub fn unit(faction: Faction) -> Self {
        match faction {
            Faction::Player => EntityKind::PlayerUnit,
            Faction::Enemy => EntityKind::EnemyUnit,
        }
    }

    pub fn gate(faction: Faction) -> Self {
        match faction {
            Faction::Player => EntityKind::PlayerGate,
            Faction::Enemy => EntityKind::EnemyGate,
        }
    }

    pub fn projectile(faction: Faction) -> Self {
        match faction {
            Faction::Player => EntityKind::PlayerProjectile,
            Faction::Enemy => EntityKind::EnemyProjectile,
        }
    }

    /// Half extents of the bounding box for this kind
    pub fn half_extents(self) -> Vec3 {
        match self {
            // 40 x 40 x 40 ship hull
            EntityKind::PlayerUnit | EntityKind::EnemyUnit => Vec3::splat(20.0),
            // 100 x 200 x 100 gate
            EntityKind::PlayerGate | EntityKind::EnemyGate => Vec3::new(50.0, 100.0, 50.0),
            EntityKind::PlayerProjectile | EntityKind::EnemyProjectile => Vec3::splat(2.0),
            EntityKind::Obstacle => Vec3::splat(30.0),
        }
    }
}

/// Anything stored in a roster
pub trait Entity {
    fn id(&self) -> EntityId;
}

/// A ship, player or enemy
#[derive(Debug, Clone)]
pub struct Unit {
    pub id: EntityId,
    pub stance: Stance,
    pub position: Vec3,
    pub velocity: Vec3,
    pub health: u32,
    /// Nearest opponent this tick, if any
    pub facing: Option<EntityId>,
    pub visual: VisualHandle,
    pub body: BodyHandle,
}

impl Unit {
    pub fn faction(&self) -> Faction {
        self.stance.faction()
    }

    pub fn kind(&self) -> EntityKind {
        EntityKind::unit(self.faction())
    }

    pub fn collider(&self) -> Collider {
        Collider::new(self.position, self.kind().half_extents())
    }

    /// Apply one point of damage, returns true once the unit is dead
    pub fn take_hit(&mut self) -> bool {
        self.health = self.health.saturating_sub(1);
        self.health == 0
    }
}

impl Entity for Unit {
    fn id(&self) -> EntityId {
        self.id
    }
}

/// Gate damage outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateHit {
    /// Gate has no health pool and absorbs the shot
    Absorbed,
    Damaged { remaining: u32 },
    Destroyed,
}

/// A side's home structure
#[derive(Debug, Clone)]
pub struct Gate {
    pub faction: Faction,
    pub position: Vec3,
    /// `None` means indestructible
    pub health: Option<u32>,
    pub visual: Option<VisualHandle>,
}

impl Gate {
    pub fn kind(&self) -> EntityKind {
        EntityKind::gate(self.faction)
    }

    pub fn collider(&self) -> Collider {
        Collider::new(self.position, self.kind().half_extents())
    }

    pub fn is_destroyed(&self) -> bool {
        self.health == Some(0)
    }

    /// Apply one point of damage. Callers check `is_destroyed` first.
    pub fn take_hit(&mut self) -> GateHit {
        match self.health.as_mut() {
            None => GateHit::Absorbed,
            Some(health) => {
                *health = health.saturating_sub(1);
                if *health == 0 {
                    GateHit::Destroyed
                } else {
                    GateHit::Damaged { remaining: *health }
                }
            }
        }
    }
}

/// A shot in flight
#[derive(Debug, Clone)]
pub struct Projectile {
    pub id: EntityId,
    pub owner: Faction,
    pub position: Vec3,
    /// Unit-length travel direction
    pub direction: Vec3,
    pub travelled: f32,
    pub speed: f32,
    pub max_range: f32,
    pub visual: VisualHandle,
}

impl Projectile {
    pub fn kind(&self) -> EntityKind {
        EntityKind::projectile(self.owner)
    }

    pub fn collider(&self) -> Collider {
        Collider::new(self.position, self.kind().half_extents())
    }

    /// Where the shot was fired from
    pub fn origin(&self) -> Vec3 {
        self.position - self.direction * self.travelled
    }

    /// Advance one tick, returns false once the projectile is out of range
    pub fn advance(&mut self) -> bool {
        self.position += self.direction * self.speed;
        self.travelled += self.speed;
        self.travelled <= self.max_range
    }
}

impl Entity for Projectile {
    fn id(&self) -> EntityId {
        self.id
    }
}

/// Static steering deflector
#[derive(Debug, Clone)]
pub struct Obstacle {
    pub id: EntityId,
    pub position: Vec3,
    pub visual: VisualHandle,
}

impl Obstacle {
    pub fn collider(&self) -> Collider {
        Collider::new(self.position, EntityKind::Obstacle.half_extents())
    }
}

impl Entity for Obstacle {
    fn id(&self) -> EntityId {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn projectile(speed: f32, max_range: f32) -> Projectile {
        Projectile {
            id: EntityId(1),
            owner: Faction::Player,
            position: Vec3::ZERO,
            direction: Vec3::X,
            travelled: 0.0,
            speed,
            max_range,
            visual: VisualHandle(1),
        }
    }

    #[test]
    fn stance_gates_advance() {
        assert!(Stance::Player(PlayerMode::Offence).advances());
        assert!(!Stance::Player(PlayerMode::Defence).advances());
        assert!(Stance::Enemy(EnemyMode::Aggressive).advances());
        assert!(!Stance::Enemy(EnemyMode::Defensive).advances());
        assert_eq!(Stance::Enemy(EnemyMode::Defensive).faction(), Faction::Enemy);
    }

    #[test]
    fn projectile_expires_past_max_range() {
        let mut p = projectile(5.0, 10.0);
        assert!(p.advance());
        assert!(p.advance());
        assert!(!p.advance());
        assert_eq!(p.position, Vec3::new(15.0, 0.0, 0.0));
    }

    #[test]
    fn gate_without_health_absorbs() {
        let mut gate = Gate {
            faction: Faction::Enemy,
            position: Vec3::ZERO,
            health: None,
            visual: None,
        };
        assert_eq!(gate.take_hit(), GateHit::Absorbed);
        assert!(!gate.is_destroyed());
    }

    #[test]
    fn gate_destroyed_at_zero() {
        let mut gate = Gate {
            faction: Faction::Player,
            position: Vec3::ZERO,
            health: Some(2),
            visual: None,
        };
        assert_eq!(gate.take_hit(), GateHit::Damaged { remaining: 1 });
        assert_eq!(gate.take_hit(), GateHit::Destroyed);
        assert!(gate.is_destroyed());
    }
}
