//! Assignment actions - notification processing and the Status API
//!
//! Processing works in rounds: load the assignment and its surroundings,
//! decide what the remote side has to hear, dispatch, then apply the result
//! through `AssignmentMachine` under the formation lock.

pub mod process;
mod reset;
mod status_report;

pub use process::{
    apply_event, process_assignments, process_one, process_wakes, spawn_wakes, ApplyGuard,
    AssignmentReport, ProcessingReport, StepOutcome, Wake,
};
pub use reset::reset_assignment_status;
pub use status_report::{report_assignment_status, StatusAck, StatusReport};
