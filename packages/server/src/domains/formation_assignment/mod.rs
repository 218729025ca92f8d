//! Formation assignments: one directed row per ordered pair of participants,
//! each negotiating its configuration through tenant-mapping notifications.

pub mod actions;
pub mod commands;
pub mod events;
pub mod machines;
pub mod models;
pub mod notifications;

pub use actions::{AssignmentReport, ProcessingReport, StatusAck, StatusReport};
pub use machines::AssignmentMachine;
pub use models::{AssignmentOperation, AssignmentState, FormationAssignment};
