//! Game simulation modules

pub mod collaborator;
pub mod combat;
pub mod economy;
pub mod entity;
pub mod error;
pub mod physics;
pub mod registry;
pub mod session;
pub mod simulation;
pub mod snapshot;
pub mod spatial;
pub mod targeting;


pub use session::{GameSession, SessionOutput, SessionRegistry};
