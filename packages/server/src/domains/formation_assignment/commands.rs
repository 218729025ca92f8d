use crate::common::{FormationAssignmentId, FormationId, NotificationError, ParticipantId};
use crate::domains::formation_assignment::models::FormationAssignment;

/// Assignment commands - side effects decided by the assignment machine
#[derive(Debug, Clone, PartialEq)]
pub enum AssignmentCommand {
    /// Store the updated assignment
    Persist(FormationAssignment),

    /// Remove the assignment row (unassign finished)
    Delete(FormationAssignmentId),

    /// The assignment landed in an error state
    RecordError {
        assignment_id: FormationAssignmentId,
        error: NotificationError,
    },

    /// Process the reverse pair: it may be waiting on this configuration
    WakeReverse {
        formation_id: FormationId,
        source: ParticipantId,
        target: ParticipantId,
    },
}
