//! Formations: named groups of participants and their own lifecycle.

pub mod actions;
pub mod commands;
pub mod events;
pub mod machines;
pub mod models;

pub use machines::FormationMachine;
pub use models::{Formation, FormationState, FormationStatus, FormationTemplate};
