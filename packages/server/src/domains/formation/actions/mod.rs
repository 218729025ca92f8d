//! Formation actions - the consumer-facing operations
//!
//! Actions are plain async functions over `ServerDeps`. They return
//! `EngineResult` so handlers can map failures onto status codes; notification
//! failures are not errors here and show up in the returned reports and in
//! `formation_status`.

mod create;
mod delete;
pub mod lifecycle;
mod membership;
mod queries;
mod resynchronize;
mod status_report;

pub use create::{create_formation, CreateFormation};
pub use delete::delete_formation;
pub use membership::{assign_participant, unassign_participant};
pub use queries::{
    formation_status, list_assignments, list_notifications, list_notifications_for_participant,
    FormationStatusView,
};
pub use resynchronize::{resynchronize_formation, ResyncReport};
pub use status_report::{report_formation_status, FormationStatusAck, FormationStatusReport};
