//! WebSocket protocol message definitions
//! These are the wire types between the renderer client and a session

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::collaborator::{BodyHandle, LoadToken, VisualHandle};
use crate::game::entity::{EntityId, EntityKind, Faction, PlayerMode, Stance};
use crate::game::simulation::{Phase, RoundReport};

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Place a player ship at a world position
    PlaceUnit { position: [f32; 3] },

    /// Remove the player ship under a world position
    RemoveUnit { position: [f32; 3] },

    /// Mode for ships placed from now on
    SetPlacementMode { mode: PlayerMode },

    /// Launch the wave
    StartRound,

    /// Tear down the battlefield and return to placement
    ResetGame,

    /// Camera reset; render-only
    ResetViewport,

    /// Result of a `load_model` request
    ModelLoaded {
        token: LoadToken,
        success: bool,
        #[serde(default)]
        reason: Option<String>,
    },

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome {
        session_id: Uuid,
        server_time: u64,
        phase: Phase,
    },

    /// Create a visual for an entity
    SpawnVisual {
        handle: VisualHandle,
        kind: EntityKind,
        position: [f32; 3],
    },

    /// Dispose of a visual
    ReleaseVisual { handle: VisualHandle },

    /// Load a ship model and answer with `model_loaded`
    LoadModel {
        token: LoadToken,
        handle: VisualHandle,
        kind: EntityKind,
        position: [f32; 3],
    },

    /// Create a physics body
    SpawnBody {
        handle: BodyHandle,
        kind: EntityKind,
        position: [f32; 3],
    },

    /// Dispose of a physics body
    ReleaseBody { handle: BodyHandle },

    /// Line for the battle log
    Log {
        message: String,
        /// Open the log panel
        reveal: bool,
        /// Emphasise the line
        highlight: bool,
    },

    /// A command was refused; nothing changed
    CommandRejected { code: String, message: String },

    /// Placement is over and the wave is in
    RoundStarted { round: u64, wave: u32, enemies: usize },

    /// Round finished and the field has been reset
    RoundEnded { report: RoundReport },

    /// Battlefield state (sent every few frames)
    Snapshot(Snapshot),

    /// The client sent something that is not a command
    Error { code: String, message: String },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
        server_time: u64,
    },
}

/// Whole-battlefield view. Complete on its own, so a client that missed
/// earlier snapshots can rebuild its scene from the latest one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Session frame number
    pub frame: u64,
    pub round: u64,
    pub phase: Phase,
    /// Active ticks so far in this round
    pub round_ticks: u64,
    pub wave: u32,
    pub player_gold: u32,
    pub enemy_gold: u32,
    pub placement_mode: PlayerMode,
    pub units: Vec<UnitView>,
    pub projectiles: Vec<ProjectileView>,
    pub gates: Vec<GateView>,
    pub obstacles: Vec<ObstacleView>,
    /// Placements still waiting for `model_loaded`
    pub pending: Vec<PendingView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitView {
    pub id: EntityId,
    pub stance: Stance,
    pub position: [f32; 3],
    pub velocity: [f32; 3],
    pub health: u32,
    /// Nearest opponent this unit faces
    pub facing: Option<EntityId>,
    pub visual: VisualHandle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectileView {
    pub id: EntityId,
    pub owner: Faction,
    pub position: [f32; 3],
    pub visual: VisualHandle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateView {
    pub faction: Faction,
    pub position: [f32; 3],
    /// `None` for an indestructible gate
    pub health: Option<u32>,
    pub destroyed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObstacleView {
    pub id: EntityId,
    pub position: [f32; 3],
    pub visual: VisualHandle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingView {
    pub token: LoadToken,
    pub position: [f32; 3],
    pub visual: VisualHandle,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_messages_are_tagged_by_type() {
        let msg: ClientMsg =
            serde_json::from_str(r#"{"type":"place_unit","position":[10.0,300.0,0.0]}"#).unwrap();
        assert!(matches!(msg, ClientMsg::PlaceUnit { position } if position == [10.0, 300.0, 0.0]));

        let msg: ClientMsg =
            serde_json::from_str(r#"{"type":"set_placement_mode","mode":"defence"}"#).unwrap();
        assert!(matches!(
            msg,
            ClientMsg::SetPlacementMode {
                mode: PlayerMode::Defence
            }
        ));
    }

    #[test]
    fn model_loaded_reason_is_optional() {
        let msg: ClientMsg =
            serde_json::from_str(r#"{"type":"model_loaded","token":3,"success":true}"#).unwrap();
        match msg {
            ClientMsg::ModelLoaded {
                token,
                success,
                reason,
            } => {
                assert_eq!(token, LoadToken(3));
                assert!(success);
                assert!(reason.is_none());
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn rejection_serialises_with_code() {
        let json = serde_json::to_value(ServerMsg::CommandRejected {
            code: "roster_full".into(),
            message: "fleet is full".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "command_rejected");
        assert_eq!(json["code"], "roster_full");
    }
}
