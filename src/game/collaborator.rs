//! Collaborator seam - rendering, physics bodies and the UI log
//!
//! The simulation never draws or simulates rigid bodies itself. It asks a
//! collaborator to represent entities and hands back the handles on removal.

use std::collections::HashSet;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::ws::protocol::ServerMsg;

use super::entity::EntityKind;

/// Opaque handle to a visual representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VisualHandle(pub u64);

/// Opaque handle to a physics body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BodyHandle(pub u64);

/// Ticket for a unit placement whose model is still loading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoadToken(pub u64);

/// Answer to a unit model load request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelLoad {
    /// Model is available now
    Ready(VisualHandle),
    /// Model is loading; completion arrives later for the request's token
    Deferred(VisualHandle),
    /// Model cannot be loaded
    Failed(String),
}

/// Everything the simulation asks of the outside world
pub trait Collaborator {
    fn spawn_visual(&mut self, kind: EntityKind, position: Vec3) -> VisualHandle;

    fn release_visual(&mut self, handle: VisualHandle);

    /// Request a ship model for a placement
    fn load_unit_model(&mut self, token: LoadToken, kind: EntityKind, position: Vec3) -> ModelLoad;

    fn spawn_physics_body(&mut self, kind: EntityKind, position: Vec3) -> BodyHandle;

    fn release_physics_body(&mut self, handle: BodyHandle);

    /// Report a notable transition to the UI. Outcome is ignored.
    fn log_event(&mut self, message: &str, reveal: bool, highlight: bool);

    /// A deferred model of `kind` finished loading
    fn model_ready(&mut self, _kind: EntityKind) {}
}

/// How the headless collaborator answers model loads
#[cfg(test)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoadMode {
    #[default]
    Immediate,
    Deferred,
    Fail,
}

/// A log line as the UI would have received it
#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedEvent {
    pub message: String,
    pub reveal: bool,
    pub highlight: bool,
}

/// In-process collaborator that only keeps books on handles
#[cfg(test)]
#[derive(Debug, Default)]
pub struct HeadlessCollaborator {
    pub load_mode: LoadMode,
    next_visual: u64,
    next_body: u64,
    live_visuals: Vec<VisualHandle>,
    live_bodies: Vec<BodyHandle>,
    log: Vec<LoggedEvent>,
}

#[cfg(test)]
impl HeadlessCollaborator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_load_mode(load_mode: LoadMode) -> Self {
        Self {
            load_mode,
            ..Self::default()
        }
    }

    pub fn live_visuals(&self) -> usize {
        self.live_visuals.len()
    }

    pub fn live_bodies(&self) -> usize {
        self.live_bodies.len()
    }

    pub fn log(&self) -> &[LoggedEvent] {
        &self.log
    }

    pub fn logged(&self, needle: &str) -> bool {
        self.log.iter().any(|e| e.message.contains(needle))
    }

    fn allocate_visual(&mut self) -> VisualHandle {
        self.next_visual += 1;
        let handle = VisualHandle(self.next_visual);
        self.live_visuals.push(handle);
        handle
    }
}

#[cfg(test)]
impl Collaborator for HeadlessCollaborator {
    fn spawn_visual(&mut self, _kind: EntityKind, _position: Vec3) -> VisualHandle {
        self.allocate_visual()
    }

    fn release_visual(&mut self, handle: VisualHandle) {
        self.live_visuals.retain(|h| *h != handle);
    }

    fn load_unit_model(&mut self, _token: LoadToken, _kind: EntityKind, _position: Vec3) -> ModelLoad {
        match self.load_mode {
            LoadMode::Immediate => ModelLoad::Ready(self.allocate_visual()),
            LoadMode::Deferred => ModelLoad::Deferred(self.allocate_visual()),
            LoadMode::Fail => ModelLoad::Failed("model unavailable".to_string()),
        }
    }

    fn spawn_physics_body(&mut self, _kind: EntityKind, _position: Vec3) -> BodyHandle {
        self.next_body += 1;
        let handle = BodyHandle(self.next_body);
        self.live_bodies.push(handle);
        handle
    }

    fn release_physics_body(&mut self, handle: BodyHandle) {
        self.live_bodies.retain(|h| *h != handle);
    }

    fn log_event(&mut self, message: &str, reveal: bool, highlight: bool) {
        self.log.push(LoggedEvent {
            message: message.to_string(),
            reveal,
            highlight,
        });
    }
}

/// Collaborator that forwards every request to the connected renderer.
///
/// Messages go out on an unbounded queue so none is ever dropped: a lost
/// `load_model` would leave its placement pending for the rest of the round.
/// The first model of each kind loads on the client and is deferred. Once one
/// has loaded, later placements of that kind spawn straight away.
pub struct ChannelCollaborator {
    tx: mpsc::UnboundedSender<ServerMsg>,
    loaded: HashSet<EntityKind>,
    next_visual: u64,
    next_body: u64,
}

impl ChannelCollaborator {
    pub fn new(tx: mpsc::UnboundedSender<ServerMsg>) -> Self {
        Self {
            tx,
            loaded: HashSet::new(),
            next_visual: 0,
            next_body: 0,
        }
    }

    fn next_visual(&mut self) -> VisualHandle {
        self.next_visual += 1;
        VisualHandle(self.next_visual)
    }

    /// Returns false once the renderer side is gone
    fn send(&self, msg: ServerMsg) -> bool {
        self.tx.send(msg).is_ok()
    }
}

impl Collaborator for ChannelCollaborator {
    fn spawn_visual(&mut self, kind: EntityKind, position: Vec3) -> VisualHandle {
        let handle = self.next_visual();
        self.send(ServerMsg::SpawnVisual {
            handle,
            kind,
            position: position.to_array(),
        });
        handle
    }

    fn release_visual(&mut self, handle: VisualHandle) {
        self.send(ServerMsg::ReleaseVisual { handle });
    }

    fn load_unit_model(&mut self, token: LoadToken, kind: EntityKind, position: Vec3) -> ModelLoad {
        let handle = self.next_visual();
        let position = position.to_array();

        if self.loaded.contains(&kind) {
            return if self.send(ServerMsg::SpawnVisual {
                handle,
                kind,
                position,
            }) {
                ModelLoad::Ready(handle)
            } else {
                ModelLoad::Failed("renderer disconnected".to_string())
            };
        }

        if self.send(ServerMsg::LoadModel {
            token,
            handle,
            kind,
            position,
        }) {
            ModelLoad::Deferred(handle)
        } else {
            ModelLoad::Failed("renderer disconnected".to_string())
        }
    }

    fn spawn_physics_body(&mut self, kind: EntityKind, position: Vec3) -> BodyHandle {
        self.next_body += 1;
        let handle = BodyHandle(self.next_body);
        self.send(ServerMsg::SpawnBody {
            handle,
            kind,
            position: position.to_array(),
        });
        handle
    }

    fn release_physics_body(&mut self, handle: BodyHandle) {
        self.send(ServerMsg::ReleaseBody { handle });
    }

    fn log_event(&mut self, message: &str, reveal: bool, highlight: bool) {
        self.send(ServerMsg::Log {
            message: message.to_string(),
            reveal,
            highlight,
        });
    }

    fn model_ready(&mut self, kind: EntityKind) {
        self.loaded.insert(kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headless_tracks_live_handles() {
        let mut c = HeadlessCollaborator::new();
        let a = c.spawn_visual(EntityKind::Obstacle, Vec3::ZERO);
        let b = c.spawn_visual(EntityKind::Obstacle, Vec3::ONE);
        assert_ne!(a, b);
        c.release_visual(a);
        c.release_visual(a);
        assert_eq!(c.live_visuals(), 1);
    }

    #[test]
    fn channel_collaborator_defers_the_first_model_only() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut c = ChannelCollaborator::new(tx);

        let load = c.load_unit_model(LoadToken(7), EntityKind::PlayerUnit, Vec3::ZERO);
        assert!(matches!(load, ModelLoad::Deferred(_)));
        match rx.try_recv() {
            Ok(ServerMsg::LoadModel { token, .. }) => assert_eq!(token, LoadToken(7)),
            other => panic!("unexpected message: {other:?}"),
        }

        c.model_ready(EntityKind::PlayerUnit);
        let load = c.load_unit_model(LoadToken(8), EntityKind::PlayerUnit, Vec3::ONE);
        let ModelLoad::Ready(handle) = load else {
            panic!("expected a ready model, got {load:?}");
        };
        assert!(matches!(
            rx.try_recv(),
            Ok(ServerMsg::SpawnVisual { handle: h, kind: EntityKind::PlayerUnit, .. }) if h == handle
        ));
    }

    #[test]
    fn channel_collaborator_fails_loads_without_a_renderer() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut c = ChannelCollaborator::new(tx);
        drop(rx);

        let load = c.load_unit_model(LoadToken(1), EntityKind::PlayerUnit, Vec3::ZERO);
        assert!(matches!(load, ModelLoad::Failed(_)));
    }

    #[test]
    fn channel_collaborator_keeps_every_message_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut c = ChannelCollaborator::new(tx);

        for i in 0..5000 {
            c.spawn_visual(EntityKind::Obstacle, Vec3::splat(i as f32));
        }
        let body = c.spawn_physics_body(EntityKind::EnemyUnit, Vec3::ZERO);
        c.release_physics_body(body);

        let mut visuals = 0;
        while let Ok(msg) = rx.try_recv() {
            match msg {
                ServerMsg::SpawnVisual { handle, .. } => {
                    visuals += 1;
                    assert_eq!(handle, VisualHandle(visuals));
                }
                ServerMsg::SpawnBody { .. } => assert_eq!(visuals, 5000),
                ServerMsg::ReleaseBody { handle } => assert_eq!(handle, body),
                other => panic!("unexpected message: {other:?}"),
            }
        }
        assert_eq!(visuals, 5000);
    }
}
