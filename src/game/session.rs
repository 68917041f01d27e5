//! Session task - one simulation per connection and its clocks

use dashmap::DashMap;
use glam::Vec3;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{ConfigError, SimConfig};
use crate::util::time::{fire_period, frame_period, unix_millis};
use crate::ws::protocol::{ClientMsg, ServerMsg};

use super::collaborator::ChannelCollaborator;
use super::entity::Faction;
use super::error::SimError;
use super::simulation::{Phase, Simulation, StartRound};
use super::snapshot::SnapshotBuilder;

/// Buffered snapshots per session. Each one is complete, so skipping is fine.
const SNAPSHOT_CHANNEL_CAPACITY: usize = 16;
/// Buffered inbound commands per session
const COMMAND_CHANNEL_CAPACITY: usize = 256;

/// Handle to a running session
#[derive(Clone)]
pub struct SessionHandle {
    pub id: Uuid,
    pub command_tx: mpsc::Sender<ClientMsg>,
    /// Ordered path to the client for replies that must not be lost
    pub outbound_tx: mpsc::UnboundedSender<ServerMsg>,
}

/// What a session sends to its connection
pub struct SessionOutput {
    /// Collaborator calls and command replies, in order, never dropped
    pub outbound: mpsc::UnboundedReceiver<ServerMsg>,
    /// Periodic snapshots; a slow reader skips to the newest
    pub snapshots: broadcast::Receiver<ServerMsg>,
}

/// Registry of all live sessions
pub struct SessionRegistry {
    sessions: DashMap<Uuid, SessionHandle>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    pub fn insert(&self, handle: SessionHandle) {
        self.sessions.insert(handle.id, handle);
    }

    pub fn remove(&self, id: &Uuid) -> Option<SessionHandle> {
        self.sessions.remove(id).map(|(_, h)| h)
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Firing clocks for one active round. Dropping them cancels both.
struct FireTimers {
    round: u64,
    player: Interval,
    enemy: Interval,
}

impl FireTimers {
    fn start(round: u64, config: &SimConfig) -> Self {
        let arm = |ms| {
            let period = fire_period(ms);
            let mut timer = interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            timer
        };
        Self {
            round,
            player: arm(config.player_fire_interval_ms),
            enemy: arm(config.enemy_fire_interval_ms),
        }
    }

    async fn next(&mut self) -> Faction {
        tokio::select! {
            _ = self.player.tick() => Faction::Player,
            _ = self.enemy.tick() => Faction::Enemy,
        }
    }
}

async fn next_volley(timers: &mut Option<FireTimers>) -> Faction {
    match timers {
        Some(timers) => timers.next().await,
        None => std::future::pending().await,
    }
}

/// The session task
pub struct GameSession {
    id: Uuid,
    sim: Simulation<ChannelCollaborator>,
    command_rx: mpsc::Receiver<ClientMsg>,
    outbound_tx: mpsc::UnboundedSender<ServerMsg>,
    snapshot_tx: broadcast::Sender<ServerMsg>,
    snapshot_builder: SnapshotBuilder,
    frame: u64,
}

impl GameSession {
    /// Create a session. The outbound queue already holds the initial gate
    /// and obstacle visuals.
    pub fn new(
        id: Uuid,
        config: SimConfig,
    ) -> Result<(Self, SessionHandle, SessionOutput), ConfigError> {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (outbound_tx, outbound) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshots) = broadcast::channel(SNAPSHOT_CHANNEL_CAPACITY);

        let snapshot_builder = SnapshotBuilder::new(config.snapshot_every);
        let collaborator = ChannelCollaborator::new(outbound_tx.clone());
        let sim = Simulation::new(config, collaborator)?;

        let handle = SessionHandle {
            id,
            command_tx,
            outbound_tx: outbound_tx.clone(),
        };
        let session = Self {
            id,
            sim,
            command_rx,
            outbound_tx,
            snapshot_tx,
            snapshot_builder,
            frame: 0,
        };

        Ok((session, handle, SessionOutput { outbound, snapshots }))
    }

    pub fn phase(&self) -> Phase {
        self.sim.phase()
    }

    /// Run until every command sender is gone
    pub async fn run(mut self) {
        info!(session_id = %self.id, "Session started");

        let mut frames = interval(frame_period(self.sim.config().frame_rate));
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut fire: Option<FireTimers> = None;

        loop {
            tokio::select! {
                _ = frames.tick() => {
                    if !self.drain_commands() {
                        break;
                    }
                    self.step_frame();
                }
                shooter = next_volley(&mut fire) => {
                    let shots = self.sim.fire_volley(shooter);
                    debug!(session_id = %self.id, faction = %shooter, shots, "Volley");
                }
            }
            self.sync_fire_timers(&mut fire);
        }

        info!(session_id = %self.id, frames = self.frame, "Session closed");
    }

    /// Timers exist exactly while a round is active, one set per round epoch
    fn sync_fire_timers(&self, fire: &mut Option<FireTimers>) {
        let round = self.sim.round();
        match (self.sim.phase(), fire.as_ref()) {
            (Phase::Active, Some(timers)) if timers.round == round => {}
            (Phase::Active, _) => {
                debug!(session_id = %self.id, round, "Firing timers armed");
                *fire = Some(FireTimers::start(round, self.sim.config()));
            }
            (_, Some(timers)) => {
                debug!(session_id = %self.id, round = timers.round, "Firing timers cancelled");
                *fire = None;
            }
            (_, None) => {}
        }
    }

    /// Apply every queued command. Returns false once the connection side is gone.
    fn drain_commands(&mut self) -> bool {
        loop {
            match self.command_rx.try_recv() {
                Ok(msg) => self.handle_command(msg),
                Err(mpsc::error::TryRecvError::Empty) => return true,
                Err(mpsc::error::TryRecvError::Disconnected) => return false,
            }
        }
    }

    fn handle_command(&mut self, msg: ClientMsg) {
        let round_before = self.sim.round();

        let result = match msg {
            ClientMsg::PlaceUnit { position } => {
                self.sim.place_unit(Vec3::from_array(position)).map(|_| ())
            }
            ClientMsg::RemoveUnit { position } => {
                self.sim.remove_unit(Vec3::from_array(position)).map(|_| ())
            }
            ClientMsg::SetPlacementMode { mode } => self.sim.set_placement_mode(mode),
            ClientMsg::StartRound => self.sim.start_round().map(|start| {
                if let StartRound::AwaitingLoads { pending } = start {
                    debug!(session_id = %self.id, pending, "Start waits for ship models");
                }
            }),
            ClientMsg::ResetGame => {
                self.sim.reset_game();
                self.snapshot_builder.force_next();
                Ok(())
            }
            ClientMsg::ResetViewport => {
                debug!(session_id = %self.id, "Viewport reset");
                Ok(())
            }
            ClientMsg::ModelLoaded {
                token,
                success,
                reason,
            } => {
                let result = if success {
                    Ok(())
                } else {
                    Err(reason.unwrap_or_else(|| "model failed to load".to_string()))
                };
                match self.sim.complete_load(token, result) {
                    Err(SimError::UnknownLoadToken) => {
                        warn!(session_id = %self.id, token = token.0, "Load result for unknown token ignored");
                        Ok(())
                    }
                    other => other.map(|_| ()),
                }
            }
            ClientMsg::Ping { t } => {
                self.send(ServerMsg::Pong {
                    t,
                    server_time: unix_millis(),
                });
                Ok(())
            }
        };

        if let Err(e) = result {
            warn!(session_id = %self.id, code = e.code(), error = %e, "Command rejected");
            self.send(ServerMsg::CommandRejected {
                code: e.code().to_string(),
                message: e.to_string(),
            });
        }

        if self.sim.round() != round_before && self.sim.phase() == Phase::Active {
            self.send(ServerMsg::RoundStarted {
                round: self.sim.round(),
                wave: self.sim.economy().wave + 1,
                enemies: self.sim.registry().enemy_units.len(),
            });
            self.snapshot_builder.force_next();
        }
    }

    fn step_frame(&mut self) {
        self.frame += 1;

        if let Some(report) = self.sim.tick() {
            self.send(ServerMsg::RoundEnded { report });
            self.snapshot_builder.force_next();
        }

        if self.snapshot_builder.should_send() {
            let snapshot = self.snapshot_builder.build(self.frame, &self.sim);
            // No subscribers just means the socket is already gone
            let _ = self.snapshot_tx.send(snapshot);
        }
    }

    fn send(&self, msg: ServerMsg) {
        let _ = self.outbound_tx.send(msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::collaborator::LoadToken;
    use crate::game::entity::EntityKind;
    use std::time::Duration;
    use tokio_test::assert_ok;

    fn config() -> SimConfig {
        SimConfig {
            seed: Some(11),
            total_enemy_spawn: 1,
            defensive_share: 0.0,
            ..SimConfig::default()
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerMsg>) -> Vec<ServerMsg> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn projectile_spawns(msgs: &[ServerMsg]) -> usize {
        msgs.iter()
            .filter(|m| {
                matches!(
                    m,
                    ServerMsg::SpawnVisual {
                        kind: EntityKind::PlayerProjectile | EntityKind::EnemyProjectile,
                        ..
                    }
                )
            })
            .count()
    }

    #[tokio::test(start_paused = true)]
    async fn firing_timers_follow_the_active_phase() {
        let (session, handle, mut output) = GameSession::new(Uuid::new_v4(), config()).unwrap();
        let task = tokio::spawn(session.run());

        let initial = drain(&mut output.outbound);
        assert!(initial
            .iter()
            .any(|m| matches!(m, ServerMsg::SpawnVisual { kind: EntityKind::EnemyGate, .. })));

        assert_ok!(
            handle
                .command_tx
                .send(ClientMsg::PlaceUnit {
                    position: [0.0, 300.0, 0.0]
                })
                .await
        );
        assert_ok!(handle.command_tx.send(ClientMsg::StartRound).await);
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Start waits for the model
        let msgs = drain(&mut output.outbound);
        assert!(msgs.iter().any(|m| matches!(m, ServerMsg::LoadModel { .. })));
        assert!(!msgs.iter().any(|m| matches!(m, ServerMsg::RoundStarted { .. })));

        assert_ok!(
            handle
                .command_tx
                .send(ClientMsg::ModelLoaded {
                    token: LoadToken(1),
                    success: true,
                    reason: None,
                })
                .await
        );
        tokio::time::sleep(Duration::from_millis(600)).await;

        let msgs = drain(&mut output.outbound);
        assert!(msgs
            .iter()
            .any(|m| matches!(m, ServerMsg::RoundStarted { round: 1, .. })));
        assert!(projectile_spawns(&msgs) > 0, "volleys fire while active");

        assert_ok!(handle.command_tx.send(ClientMsg::ResetGame).await);
        tokio::time::sleep(Duration::from_millis(50)).await;
        drain(&mut output.outbound);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(
            projectile_spawns(&drain(&mut output.outbound)),
            0,
            "timers cancelled on reset"
        );

        drop(handle);
        assert_ok!(task.await);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_commands_are_reported() {
        let (session, handle, mut output) = GameSession::new(Uuid::new_v4(), config()).unwrap();
        let task = tokio::spawn(session.run());

        assert_ok!(
            handle
                .command_tx
                .send(ClientMsg::PlaceUnit {
                    position: [0.0, -450.0, 0.0]
                })
                .await
        );
        assert_ok!(handle.command_tx.send(ClientMsg::Ping { t: 42 }).await);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let msgs = drain(&mut output.outbound);
        assert!(msgs.iter().any(|m| matches!(
            m,
            ServerMsg::CommandRejected { code, .. } if code == "inside_gate_radius"
        )));
        assert!(msgs.iter().any(|m| matches!(m, ServerMsg::Pong { t: 42, .. })));

        drop(handle);
        assert_ok!(task.await);
    }

    #[tokio::test(start_paused = true)]
    async fn collaborator_traffic_survives_snapshot_lag() {
        let config = SimConfig {
            snapshot_every: 1,
            obstacle_count: 6,
            ..config()
        };
        let (session, handle, mut output) = GameSession::new(Uuid::new_v4(), config).unwrap();
        let task = tokio::spawn(session.run());

        // Nobody reads snapshots for two seconds of frames
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_ok!(
            handle
                .command_tx
                .send(ClientMsg::PlaceUnit {
                    position: [0.0, 300.0, 0.0]
                })
                .await
        );
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(matches!(
            output.snapshots.try_recv(),
            Err(broadcast::error::TryRecvError::Lagged(_))
        ));

        let msgs = drain(&mut output.outbound);
        let obstacles = msgs
            .iter()
            .filter(|m| matches!(m, ServerMsg::SpawnVisual { kind: EntityKind::Obstacle, .. }))
            .count();
        assert_eq!(obstacles, 6);
        assert!(msgs
            .iter()
            .any(|m| matches!(m, ServerMsg::LoadModel { token: LoadToken(1), .. })));

        // The newest snapshot alone is enough to rebuild the scene
        let mut latest = None;
        while let Ok(msg) = output.snapshots.try_recv() {
            latest = Some(msg);
        }
        match latest {
            Some(ServerMsg::Snapshot(snapshot)) => {
                assert_eq!(snapshot.obstacles.len(), 6);
                assert_eq!(snapshot.pending.len(), 1);
                assert_eq!(snapshot.pending[0].token, LoadToken(1));
            }
            other => panic!("unexpected message: {other:?}"),
        }

        drop(handle);
        assert_ok!(task.await);
    }

    #[test]
    fn invalid_config_is_refused() {
        let config = SimConfig {
            defensive_share: 2.0,
            ..config()
        };
        assert!(matches!(
            GameSession::new(Uuid::new_v4(), config),
            Err(ConfigError::OutOfRange("DEFENSIVE_SHARE"))
        ));
    }

    #[test]
    fn registry_tracks_sessions() {
        let registry = SessionRegistry::new();
        let (_session, handle, _output) = GameSession::new(Uuid::new_v4(), config()).unwrap();
        let id = handle.id;

        registry.insert(handle);
        assert_eq!(registry.active_sessions(), 1);
        assert!(registry.remove(&id).is_some());
        assert!(registry.remove(&id).is_none());
        assert_eq!(registry.active_sessions(), 0);
    }
}
