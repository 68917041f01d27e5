//! Entity registry - the authoritative rosters of a session
//!
//! Systems never hold a borrow of a roster across a removal. They take a
//! snapshot of ids with [`Roster::ids`], walk it, and re-fetch each entry;
//! entries removed mid-pass are simply not found.

use glam::Vec3;
use tracing::debug;

use super::collaborator::Collaborator;
use super::entity::{Entity, EntityId, EntityKind, Faction, Gate, Obstacle, Projectile, Unit};

/// Insertion-ordered list of entities keyed by id
#[derive(Debug, Clone)]
pub struct Roster<T> {
    entries: Vec<T>,
}

impl<T> Default for Roster<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T: Entity> Roster<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add an entity. An id already present is left untouched and false is returned.
    pub fn add(&mut self, entity: T) -> bool {
        if self.contains(entity.id()) {
            return false;
        }
        self.entries.push(entity);
        true
    }

    /// Remove by id, keeping the order of the rest. Absent ids are a no-op.
    pub fn remove(&mut self, id: EntityId) -> Option<T> {
        let idx = self.entries.iter().position(|e| e.id() == id)?;
        Some(self.entries.remove(idx))
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entries.iter().any(|e| e.id() == id)
    }

    pub fn get(&self, id: EntityId) -> Option<&T> {
        self.entries.iter().find(|e| e.id() == id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut T> {
        self.entries.iter_mut().find(|e| e.id() == id)
    }

    /// Snapshot of the current ids in iteration order
    pub fn ids(&self) -> Vec<EntityId> {
        self.entries.iter().map(Entity::id).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.entries.iter_mut()
    }

    /// Take every entry out, leaving the roster empty
    pub fn drain(&mut self) -> Vec<T> {
        std::mem::take(&mut self.entries)
    }
}

/// Owner of every entity record in a session
#[derive(Debug)]
pub struct EntityRegistry {
    next_id: u64,
    pub player_units: Roster<Unit>,
    pub enemy_units: Roster<Unit>,
    pub player_projectiles: Roster<Projectile>,
    pub enemy_projectiles: Roster<Projectile>,
    pub obstacles: Roster<Obstacle>,
    pub player_gate: Gate,
    pub enemy_gate: Gate,
}

impl EntityRegistry {
    /// Create the registry with both gates in place
    pub fn new(
        player_gate_at: Vec3,
        enemy_gate_at: Vec3,
        gate_health: Option<u32>,
        collaborator: &mut impl Collaborator,
    ) -> Self {
        let player_gate = Gate {
            faction: Faction::Player,
            position: player_gate_at,
            health: gate_health,
            visual: Some(collaborator.spawn_visual(EntityKind::PlayerGate, player_gate_at)),
        };
        let enemy_gate = Gate {
            faction: Faction::Enemy,
            position: enemy_gate_at,
            health: gate_health,
            visual: Some(collaborator.spawn_visual(EntityKind::EnemyGate, enemy_gate_at)),
        };

        Self {
            next_id: 0,
            player_units: Roster::new(),
            enemy_units: Roster::new(),
            player_projectiles: Roster::new(),
            enemy_projectiles: Roster::new(),
            obstacles: Roster::new(),
            player_gate,
            enemy_gate,
        }
    }

    pub fn allocate_id(&mut self) -> EntityId {
        self.next_id += 1;
        EntityId(self.next_id)
    }

    pub fn units(&self, faction: Faction) -> &Roster<Unit> {
        match faction {
            Faction::Player => &self.player_units,
            Faction::Enemy => &self.enemy_units,
        }
    }

    pub fn units_mut(&mut self, faction: Faction) -> &mut Roster<Unit> {
        match faction {
            Faction::Player => &mut self.player_units,
            Faction::Enemy => &mut self.enemy_units,
        }
    }

    pub fn projectiles(&self, faction: Faction) -> &Roster<Projectile> {
        match faction {
            Faction::Player => &self.player_projectiles,
            Faction::Enemy => &self.enemy_projectiles,
        }
    }

    pub fn projectiles_mut(&mut self, faction: Faction) -> &mut Roster<Projectile> {
        match faction {
            Faction::Player => &mut self.player_projectiles,
            Faction::Enemy => &mut self.enemy_projectiles,
        }
    }

    pub fn gate(&self, faction: Faction) -> &Gate {
        match faction {
            Faction::Player => &self.player_gate,
            Faction::Enemy => &self.enemy_gate,
        }
    }

    pub fn gate_mut(&mut self, faction: Faction) -> &mut Gate {
        match faction {
            Faction::Player => &mut self.player_gate,
            Faction::Enemy => &mut self.enemy_gate,
        }
    }

    /// Remove a unit and release its visual and body.
    /// Returns `None` without side effects if the unit is already gone.
    pub fn despawn_unit(
        &mut self,
        faction: Faction,
        id: EntityId,
        collaborator: &mut impl Collaborator,
    ) -> Option<Unit> {
        let unit = self.units_mut(faction).remove(id)?;
        collaborator.release_visual(unit.visual);
        collaborator.release_physics_body(unit.body);
        debug!(unit_id = %id, faction = %faction, "Unit despawned");
        Some(unit)
    }

    /// Remove a projectile and release its visual. Absent ids are a no-op.
    pub fn despawn_projectile(
        &mut self,
        owner: Faction,
        id: EntityId,
        collaborator: &mut impl Collaborator,
    ) -> Option<Projectile> {
        let projectile = self.projectiles_mut(owner).remove(id)?;
        collaborator.release_visual(projectile.visual);
        Some(projectile)
    }

    /// Drop the visual of a destroyed gate (the record itself stays)
    pub fn release_gate_visual(&mut self, faction: Faction, collaborator: &mut impl Collaborator) {
        if let Some(handle) = self.gate_mut(faction).visual.take() {
            collaborator.release_visual(handle);
        }
    }

    /// Put a gate back to full health, re-creating its visual if it was destroyed
    pub fn repair_gate(
        &mut self,
        faction: Faction,
        health: Option<u32>,
        collaborator: &mut impl Collaborator,
    ) {
        let gate = self.gate_mut(faction);
        gate.health = health;
        if gate.visual.is_none() {
            let kind = gate.kind();
            let position = gate.position;
            gate.visual = Some(collaborator.spawn_visual(kind, position));
        }
    }

    /// Tear down units, projectiles and obstacles, releasing their resources
    pub fn clear_round(&mut self, collaborator: &mut impl Collaborator) {
        for unit in self
            .player_units
            .drain()
            .into_iter()
            .chain(self.enemy_units.drain())
        {
            collaborator.release_visual(unit.visual);
            collaborator.release_physics_body(unit.body);
        }
        for projectile in self
            .player_projectiles
            .drain()
            .into_iter()
            .chain(self.enemy_projectiles.drain())
        {
            collaborator.release_visual(projectile.visual);
        }
        for obstacle in self.obstacles.drain() {
            collaborator.release_visual(obstacle.visual);
        }
    }
}
