//! Command rejection errors

use super::simulation::Phase;

/// Why a placement was refused
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum PlacementRejection {
    #[error("too close to the enemy gate ({distance:.1} <= {radius:.1})")]
    InsideGateRadius { distance: f32, radius: f32 },

    #[error("fleet is full ({max} ships)")]
    RosterFull { max: usize },
}

/// Errors returned by simulation commands. None of them change state.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimError {
    #[error("Invalid placement: {0}")]
    InvalidPlacement(#[from] PlacementRejection),

    #[error("{command} is not allowed during {phase:?}")]
    WrongPhase { command: &'static str, phase: Phase },

    #[error("No pending placement for this load token")]
    UnknownLoadToken,

    #[error("No player ship at that position")]
    NoUnitAt,

    #[error("Ship model failed to load: {0}")]
    ResourceLoadFailure(String),
}

impl SimError {
    /// Short machine-readable code for the wire
    pub fn code(&self) -> &'static str {
        match self {
            SimError::InvalidPlacement(PlacementRejection::InsideGateRadius { .. }) => {
                "inside_gate_radius"
            }
            SimError::InvalidPlacement(PlacementRejection::RosterFull { .. }) => "roster_full",
            SimError::WrongPhase { .. } => "wrong_phase",
            SimError::UnknownLoadToken => "unknown_load_token",
            SimError::NoUnitAt => "no_unit_at",
            SimError::ResourceLoadFailure(_) => "resource_load_failure",
        }
    }
}
