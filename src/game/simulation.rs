//! Wave director - the round state machine and everything it owns
//!
//! A [`Simulation`] is one local authority: it owns the registry, the economy,
//! the RNG and the collaborator, and advances exactly one tick per call to
//! [`Simulation::tick`]. Firing is driven separately through
//! [`Simulation::fire_volley`] so callers can run it on its own clock.

use glam::Vec3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{ConfigError, GatePolicy, SimConfig};

use super::collaborator::{Collaborator, LoadToken, ModelLoad, VisualHandle};
use super::combat::{CombatEvent, CombatSystem, KillCause, ProjectileStats};
use super::economy::Economy;
use super::entity::{
    EnemyMode, EntityId, EntityKind, Faction, Obstacle, PlayerMode, Stance, Unit,
};
use super::error::{PlacementRejection, SimError};
use super::physics::{self, SteeringParams, SteeringSystem};
use super::registry::EntityRegistry;
use super::spatial::{AabbSpatial, SpatialQuery};

/// Director phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Accepting placements
    #[default]
    Placement,
    /// Round in progress
    Active,
    /// Round over; only observable while the reset runs
    Terminal,
}

/// How a round ended for the player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundOutcome {
    Win,
    Loss,
    Draw,
}

/// Which termination condition fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndCause {
    BothFleetsLost,
    EnemyFleetLost,
    PlayerFleetLost,
    EnemyGateReached,
    PlayerGateReached,
    EnemyGateDestroyed,
    PlayerGateDestroyed,
}

impl EndCause {
    pub fn outcome(self) -> RoundOutcome {
        match self {
            EndCause::BothFleetsLost => RoundOutcome::Draw,
            EndCause::EnemyFleetLost | EndCause::EnemyGateReached | EndCause::EnemyGateDestroyed => {
                RoundOutcome::Win
            }
            EndCause::PlayerFleetLost
            | EndCause::PlayerGateReached
            | EndCause::PlayerGateDestroyed => RoundOutcome::Loss,
        }
    }
}

/// Summary of a finished round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundReport {
    pub outcome: RoundOutcome,
    pub cause: EndCause,
    /// Round epoch that ended
    pub round: u64,
    /// Wave counter after the round
    pub wave: u32,
    /// Active ticks the round lasted
    pub ticks: u64,
}

/// Result of a placement command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Ship is in the roster
    Placed(EntityId),
    /// Ship model is still loading
    Pending(LoadToken),
}

/// Result of a start command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartRound {
    Started { enemies: usize },
    /// Start is recorded and happens when the last pending model resolves
    AwaitingLoads { pending: usize },
}

/// A placement waiting on its ship model
#[derive(Debug, Clone)]
pub struct PendingPlacement {
    pub token: LoadToken,
    pub position: Vec3,
    pub mode: PlayerMode,
    pub visual: VisualHandle,
}

/// One session's simulation
pub struct Simulation<C: Collaborator, S: SpatialQuery = AabbSpatial> {
    config: SimConfig,
    registry: EntityRegistry,
    economy: Economy,
    phase: Phase,
    placement_mode: PlayerMode,
    pending: Vec<PendingPlacement>,
    start_requested: bool,
    next_token: u64,
    round: u64,
    round_ticks: u64,
    rng: ChaCha8Rng,
    spatial: S,
    collaborator: C,
}

impl<C: Collaborator> Simulation<C, AabbSpatial> {
    pub fn new(config: SimConfig, collaborator: C) -> Result<Self, ConfigError> {
        Self::with_spatial(config, collaborator, AabbSpatial)
    }
}

impl<C: Collaborator, S: SpatialQuery> Simulation<C, S> {
    /// Create both gates and the first obstacle field.
    /// Fails before touching the collaborator if the config is unusable.
    pub fn with_spatial(
        config: SimConfig,
        mut collaborator: C,
        spatial: S,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let seed = config.seed.unwrap_or_else(rand::random);
        let registry = EntityRegistry::new(
            config.player_gate_position(),
            config.enemy_gate_position(),
            config.gate_max_health,
            &mut collaborator,
        );

        let mut sim = Self {
            config,
            registry,
            economy: Economy::default(),
            phase: Phase::Placement,
            placement_mode: PlayerMode::default(),
            pending: Vec::new(),
            start_requested: false,
            next_token: 0,
            round: 0,
            round_ticks: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
            spatial,
            collaborator,
        };
        sim.spawn_obstacles();
        debug!(seed, "Simulation initialised");
        Ok(sim)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Epoch of the current (or last) active round
    pub fn round(&self) -> u64 {
        self.round
    }

    /// Active ticks so far in the current round
    pub fn round_ticks(&self) -> u64 {
        self.round_ticks
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn economy(&self) -> &Economy {
        &self.economy
    }

    pub fn placement_mode(&self) -> PlayerMode {
        self.placement_mode
    }

    /// Placements still waiting on their ship models, oldest first
    pub fn pending(&self) -> &[PendingPlacement] {
        &self.pending
    }

    #[cfg(test)]
    pub(crate) fn collaborator(&self) -> &C {
        &self.collaborator
    }

    #[cfg(test)]
    pub(crate) fn registry_mut(&mut self) -> &mut EntityRegistry {
        &mut self.registry
    }

    // ------------------------------------------------------------------
    // Placement commands
    // ------------------------------------------------------------------

    /// Mode applied to ships placed from now on
    pub fn set_placement_mode(&mut self, mode: PlayerMode) -> Result<(), SimError> {
        self.require_phase(Phase::Placement, "set_placement_mode")?;
        self.placement_mode = mode;
        Ok(())
    }

    /// Place a player ship. Rejected inside the enemy gate radius or once the fleet is full.
    pub fn place_unit(&mut self, position: Vec3) -> Result<Placement, SimError> {
        self.require_phase(Phase::Placement, "place_unit")?;

        let fleet = self.registry.player_units.len() + self.pending.len();
        if fleet >= self.config.max_ships {
            return Err(self.reject(PlacementRejection::RosterFull {
                max: self.config.max_ships,
            }));
        }

        let distance = self
            .spatial
            .distance(position, self.registry.enemy_gate.position);
        if distance <= self.config.gate_radius {
            return Err(self.reject(PlacementRejection::InsideGateRadius {
                distance,
                radius: self.config.gate_radius,
            }));
        }

        self.next_token += 1;
        let token = LoadToken(self.next_token);
        match self
            .collaborator
            .load_unit_model(token, EntityKind::PlayerUnit, position)
        {
            ModelLoad::Ready(visual) => {
                let id = self.finalize_placement(position, self.placement_mode, visual);
                Ok(Placement::Placed(id))
            }
            ModelLoad::Deferred(visual) => {
                self.pending.push(PendingPlacement {
                    token,
                    position,
                    mode: self.placement_mode,
                    visual,
                });
                debug!(token = token.0, "Placement waiting for model");
                Ok(Placement::Pending(token))
            }
            ModelLoad::Failed(reason) => {
                warn!(reason = %reason, "Ship model failed to load");
                self.collaborator
                    .log_event(&format!("Ship could not be placed: {reason}"), true, false);
                Err(SimError::ResourceLoadFailure(reason))
            }
        }
    }

    /// Resolve a deferred model load.
    /// On success the ship joins the roster; on failure nothing is registered.
    /// If a start was requested and this was the last pending load, the round begins.
    pub fn complete_load(
        &mut self,
        token: LoadToken,
        result: Result<(), String>,
    ) -> Result<EntityId, SimError> {
        let idx = self
            .pending
            .iter()
            .position(|p| p.token == token)
            .ok_or(SimError::UnknownLoadToken)?;
        let pending = self.pending.remove(idx);

        let outcome = match result {
            Ok(()) => {
                self.collaborator.model_ready(EntityKind::PlayerUnit);
                Ok(self.finalize_placement(pending.position, pending.mode, pending.visual))
            }
            Err(reason) => {
                self.collaborator.release_visual(pending.visual);
                warn!(token = token.0, reason = %reason, "Deferred ship model failed");
                self.collaborator
                    .log_event(&format!("Ship could not be placed: {reason}"), true, false);
                Err(SimError::ResourceLoadFailure(reason))
            }
        };

        if self.start_requested && self.pending.is_empty() {
            self.begin_round();
        }
        outcome
    }

    /// Remove the first player ship whose hull contains `position`
    pub fn remove_unit(&mut self, position: Vec3) -> Result<EntityId, SimError> {
        self.require_phase(Phase::Placement, "remove_unit")?;

        let id = self
            .registry
            .player_units
            .iter()
            .find(|unit| self.spatial.contains(&unit.collider(), position))
            .map(|unit| unit.id)
            .ok_or(SimError::NoUnitAt)?;

        self.registry
            .despawn_unit(Faction::Player, id, &mut self.collaborator);
        self.collaborator
            .log_event(&format!("Ship {id} removed"), false, false);
        Ok(id)
    }

    /// Launch the round, or arm it to launch once pending models resolve
    pub fn start_round(&mut self) -> Result<StartRound, SimError> {
        self.require_phase(Phase::Placement, "start_round")?;

        if !self.pending.is_empty() {
            self.start_requested = true;
            info!(pending = self.pending.len(), "Start deferred until ship models load");
            return Ok(StartRound::AwaitingLoads {
                pending: self.pending.len(),
            });
        }

        Ok(StartRound::Started {
            enemies: self.begin_round(),
        })
    }

    /// Tear the field down from any phase and go back to placement.
    /// Gold and the wave counter are kept.
    pub fn reset_game(&mut self) {
        self.reset_field();
        self.phase = Phase::Placement;
        info!(wave = self.economy.wave, "Game reset");
        self.collaborator.log_event("Game reset", true, false);
    }

    // ------------------------------------------------------------------
    // Periodic work
    // ------------------------------------------------------------------

    /// Every living unit of `shooter` fires at its nearest opponent.
    /// A no-op outside an active round.
    pub fn fire_volley(&mut self, shooter: Faction) -> usize {
        if self.phase != Phase::Active {
            return 0;
        }
        let stats = ProjectileStats::for_faction(shooter, &self.config);
        CombatSystem::fire_volley(
            &mut self.registry,
            shooter,
            stats,
            &self.spatial,
            &mut self.collaborator,
        )
    }

    /// Advance one simulation tick. Returns the report if the round ended.
    pub fn tick(&mut self) -> Option<RoundReport> {
        if self.phase != Phase::Active {
            return None;
        }
        self.round_ticks += 1;

        if let Some(cause) = self.check_termination() {
            return Some(self.end_round(cause));
        }

        let params = SteeringParams {
            unit_speed: self.config.unit_speed,
            steering_speed: self.config.steering_speed,
            gate_seek_speed: self.config.gate_seek_speed,
        };
        if let Some(promoted) = physics::run(&mut self.registry, &self.spatial, &params) {
            info!(unit_id = %promoted, "Defensive enemy promoted to aggressive");
            self.collaborator
                .log_event(&format!("Enemy {promoted} breaks formation and attacks"), true, false);
        }

        let events = CombatSystem::run(
            &mut self.registry,
            &self.config,
            &mut self.economy,
            &self.spatial,
            &mut self.collaborator,
        );
        self.report_combat(&events);

        self.check_termination().map(|cause| self.end_round(cause))
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn require_phase(&self, phase: Phase, command: &'static str) -> Result<(), SimError> {
        if self.phase == phase {
            Ok(())
        } else {
            Err(SimError::WrongPhase {
                command,
                phase: self.phase,
            })
        }
    }

    fn reject(&mut self, rejection: PlacementRejection) -> SimError {
        warn!(reason = %rejection, "Placement rejected");
        self.collaborator
            .log_event(&format!("Placement rejected: {rejection}"), true, false);
        SimError::InvalidPlacement(rejection)
    }

    fn finalize_placement(&mut self, position: Vec3, mode: PlayerMode, visual: VisualHandle) -> EntityId {
        let id = self.registry.allocate_id();
        let body = self
            .collaborator
            .spawn_physics_body(EntityKind::PlayerUnit, position);
        self.registry.player_units.add(Unit {
            id,
            stance: Stance::Player(mode),
            position,
            velocity: Vec3::ZERO,
            health: self.config.unit_max_health,
            facing: None,
            visual,
            body,
        });

        info!(unit_id = %id, mode = ?mode, "Ship placed");
        self.collaborator
            .log_event(&format!("Ship {id} placed ({mode:?})"), false, false);
        id
    }

    /// Spawn the enemy wave, point the fleet at the enemy gate and go active
    fn begin_round(&mut self) -> usize {
        let enemies = self.spawn_enemy_wave();

        let enemy_gate = self.registry.enemy_gate.position;
        let speed = self.config.unit_speed;
        for unit in self.registry.player_units.iter_mut() {
            unit.velocity = SteeringSystem::heading_toward(unit.position, enemy_gate, speed);
        }

        self.start_requested = false;
        self.round += 1;
        self.round_ticks = 0;
        self.phase = Phase::Active;

        info!(
            round = self.round,
            wave = self.economy.wave + 1,
            ships = self.registry.player_units.len(),
            enemies,
            "Round started"
        );
        self.collaborator.log_event(
            &format!("Wave {} incoming: {enemies} enemy ships", self.economy.wave + 1),
            true,
            true,
        );
        enemies
    }

    fn spawn_enemy_wave(&mut self) -> usize {
        let player_gate = self.registry.player_gate.position;
        let enemy_gate = self.registry.enemy_gate.position;
        let speed = self.config.unit_speed;

        for _ in 0..self.config.total_enemy_spawn {
            let mode = if self.rng.gen_bool(self.config.defensive_share) {
                EnemyMode::Defensive
            } else {
                EnemyMode::Aggressive
            };
            let (position, velocity) = match mode {
                EnemyMode::Aggressive => {
                    let at = random_on_enemy_shell(&mut self.rng, self.config.arena_radius);
                    (at, SteeringSystem::heading_toward(at, player_gate, speed))
                }
                EnemyMode::Defensive => {
                    let at = random_near_gate(&mut self.rng, enemy_gate, self.config.gate_radius);
                    (at, Vec3::ZERO)
                }
            };

            let id = self.registry.allocate_id();
            let visual = self.collaborator.spawn_visual(EntityKind::EnemyUnit, position);
            let body = self
                .collaborator
                .spawn_physics_body(EntityKind::EnemyUnit, position);
            self.registry.enemy_units.add(Unit {
                id,
                stance: Stance::Enemy(mode),
                position,
                velocity,
                health: self.config.unit_max_health,
                facing: None,
                visual,
                body,
            });
            debug!(unit_id = %id, mode = ?mode, "Enemy spawned");
        }

        self.registry.enemy_units.len()
    }

    fn spawn_obstacles(&mut self) {
        // Keep the field clear of both gates
        let field_radius = self.config.arena_radius * 0.6;
        for _ in 0..self.config.obstacle_count {
            let position = random_in_ball(&mut self.rng, field_radius);
            let id = self.registry.allocate_id();
            let visual = self.collaborator.spawn_visual(EntityKind::Obstacle, position);
            self.registry.obstacles.add(Obstacle {
                id,
                position,
                visual,
            });
        }
    }

    /// First matching condition wins
    fn check_termination(&self) -> Option<EndCause> {
        let reg = &self.registry;
        let no_players = reg.player_units.is_empty();
        let no_enemies = reg.enemy_units.is_empty();

        if no_players && no_enemies {
            return Some(EndCause::BothFleetsLost);
        }
        if no_enemies {
            return Some(EndCause::EnemyFleetLost);
        }
        if no_players {
            return Some(EndCause::PlayerFleetLost);
        }

        let enemy_gate = reg.enemy_gate.collider();
        if reg
            .player_units
            .iter()
            .any(|u| self.spatial.intersects(&u.collider(), &enemy_gate))
        {
            return Some(EndCause::EnemyGateReached);
        }
        let player_gate = reg.player_gate.collider();
        if reg
            .enemy_units
            .iter()
            .any(|u| self.spatial.intersects(&u.collider(), &player_gate))
        {
            return Some(EndCause::PlayerGateReached);
        }

        if self.config.gate_policy == GatePolicy::EndsRound {
            if reg.enemy_gate.is_destroyed() {
                return Some(EndCause::EnemyGateDestroyed);
            }
            if reg.player_gate.is_destroyed() {
                return Some(EndCause::PlayerGateDestroyed);
            }
        }
        None
    }

    /// Terminal phase: score the round, then reset synchronously back to placement
    fn end_round(&mut self, cause: EndCause) -> RoundReport {
        self.phase = Phase::Terminal;
        let outcome = cause.outcome();

        let message = match outcome {
            RoundOutcome::Win => "Victory! The enemy line is broken",
            RoundOutcome::Loss => "Defeat. The fleet is lost",
            RoundOutcome::Draw => "Draw. No ship survived",
        };
        self.collaborator.log_event(message, true, true);

        if outcome == RoundOutcome::Win {
            let wave = self.economy.advance_wave();
            self.collaborator
                .log_event(&format!("Wave {wave} cleared"), true, true);
        }

        let report = RoundReport {
            outcome,
            cause,
            round: self.round,
            wave: self.economy.wave,
            ticks: self.round_ticks,
        };
        info!(
            round = report.round,
            outcome = ?outcome,
            cause = ?cause,
            wave = report.wave,
            ticks = report.ticks,
            "Round ended"
        );

        self.reset_field();
        self.phase = Phase::Placement;
        report
    }

    /// Clear units, projectiles, obstacles and pending placements; repair gates; new obstacles
    fn reset_field(&mut self) {
        self.registry.clear_round(&mut self.collaborator);
        for pending in self.pending.drain(..) {
            self.collaborator.release_visual(pending.visual);
        }
        self.start_requested = false;

        let health = self.config.gate_max_health;
        self.registry
            .repair_gate(Faction::Player, health, &mut self.collaborator);
        self.registry
            .repair_gate(Faction::Enemy, health, &mut self.collaborator);

        self.spawn_obstacles();
    }

    fn report_combat(&mut self, events: &[CombatEvent]) {
        for event in events {
            match *event {
                CombatEvent::UnitHit {
                    target,
                    faction,
                    remaining,
                } => {
                    debug!(unit_id = %target, faction = %faction, remaining, "Unit hit");
                }
                CombatEvent::UnitKilled {
                    victim,
                    faction,
                    cause,
                    paid,
                    gold,
                } => {
                    info!(unit_id = %victim, faction = %faction, cause = ?cause, "Unit destroyed");
                    let how = match cause {
                        KillCause::Shot => "shot down",
                        KillCause::Ram => "destroyed in a collision",
                    };
                    self.collaborator.log_event(
                        &format!("{faction} ship {victim} {how}; {paid} gold now {gold}"),
                        true,
                        false,
                    );
                }
                CombatEvent::GateHit { faction, remaining } => {
                    debug!(faction = %faction, remaining = ?remaining, "Gate hit");
                    let message = match remaining {
                        Some(hp) => format!("{faction} gate hit ({hp} left)"),
                        None => format!("{faction} gate hit"),
                    };
                    self.collaborator.log_event(&message, false, false);
                }
                CombatEvent::GateDestroyed { faction } => {
                    info!(faction = %faction, "Gate destroyed");
                    self.collaborator
                        .log_event(&format!("{faction} gate destroyed"), true, true);
                }
            }
        }
    }
}

/// Uniform point on the enemy half (y <= 0) of the arena shell
fn random_on_enemy_shell(rng: &mut ChaCha8Rng, radius: f32) -> Vec3 {
    let y: f32 = rng.gen_range(-1.0..=0.0);
    let theta: f32 = rng.gen_range(0.0..std::f32::consts::TAU);
    let ring = (1.0 - y * y).sqrt();
    Vec3::new(ring * theta.cos(), y, ring * theta.sin()) * radius
}

/// Point in a box in front of (arena-side of) a gate at the south pole
fn random_near_gate(rng: &mut ChaCha8Rng, gate: Vec3, spread: f32) -> Vec3 {
    let clearance = EntityKind::EnemyGate.half_extents().y + EntityKind::EnemyUnit.half_extents().y;
    let spread = spread.max(1.0);
    gate + Vec3::new(
        rng.gen_range(-spread..spread),
        clearance + rng.gen_range(0.0..spread),
        rng.gen_range(-spread..spread),
    )
}

fn random_in_ball(rng: &mut ChaCha8Rng, radius: f32) -> Vec3 {
    loop {
        let p = Vec3::new(
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
        );
        if p.length_squared() <= 1.0 {
            return p * radius;
        }
    }
}
