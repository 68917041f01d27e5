//! Snapshot building

use crate::ws::protocol::{
    GateView, ObstacleView, PendingView, ProjectileView, ServerMsg, Snapshot, UnitView,
};

use super::collaborator::Collaborator;
use super::entity::Faction;
use super::simulation::Simulation;
use super::spatial::SpatialQuery;

/// Builds battlefield snapshots for network transmission
pub struct SnapshotBuilder {
    /// Frames since the last snapshot
    frames_since_snapshot: u32,
    /// Snapshot interval in frames
    snapshot_interval: u32,
}

impl SnapshotBuilder {
    pub fn new(snapshot_interval: u32) -> Self {
        Self {
            // First check after creation sends straight away
            frames_since_snapshot: snapshot_interval.max(1) - 1,
            snapshot_interval: snapshot_interval.max(1),
        }
    }

    /// Check if it's time to send a snapshot
    pub fn should_send(&mut self) -> bool {
        self.frames_since_snapshot += 1;
        if self.frames_since_snapshot >= self.snapshot_interval {
            self.frames_since_snapshot = 0;
            true
        } else {
            false
        }
    }

    /// Force snapshot on next check (used after phase changes)
    pub fn force_next(&mut self) {
        self.frames_since_snapshot = self.snapshot_interval;
    }

    /// Build a snapshot message
    pub fn build<C: Collaborator, S: SpatialQuery>(
        &self,
        frame: u64,
        sim: &Simulation<C, S>,
    ) -> ServerMsg {
        let registry = sim.registry();

        let units = registry
            .player_units
            .iter()
            .chain(registry.enemy_units.iter())
            .map(|u| UnitView {
                id: u.id,
                stance: u.stance,
                position: u.position.to_array(),
                velocity: u.velocity.to_array(),
                health: u.health,
                facing: u.facing,
                visual: u.visual,
            })
            .collect();

        let projectiles = registry
            .player_projectiles
            .iter()
            .chain(registry.enemy_projectiles.iter())
            .map(|p| ProjectileView {
                id: p.id,
                owner: p.owner,
                position: p.position.to_array(),
                visual: p.visual,
            })
            .collect();

        let gates = [Faction::Player, Faction::Enemy]
            .into_iter()
            .map(|f| {
                let gate = registry.gate(f);
                GateView {
                    faction: f,
                    position: gate.position.to_array(),
                    health: gate.health,
                    destroyed: gate.is_destroyed(),
                }
            })
            .collect();

        let obstacles = registry
            .obstacles
            .iter()
            .map(|o| ObstacleView {
                id: o.id,
                position: o.position.to_array(),
                visual: o.visual,
            })
            .collect();

        let pending = sim
            .pending()
            .iter()
            .map(|p| PendingView {
                token: p.token,
                position: p.position.to_array(),
                visual: p.visual,
            })
            .collect();

        let economy = sim.economy();
        ServerMsg::Snapshot(Snapshot {
            frame,
            round: sim.round(),
            phase: sim.phase(),
            round_ticks: sim.round_ticks(),
            wave: economy.wave,
            player_gold: economy.gold(Faction::Player),
            enemy_gold: economy.gold(Faction::Enemy),
            placement_mode: sim.placement_mode(),
            units,
            projectiles,
            gates,
            obstacles,
            pending,
        })
    }
}
