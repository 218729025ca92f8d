use serde::{Deserialize, Serialize};

use crate::common::{ErrorCode, FormationAssignmentId};
use crate::domains::formation::models::{Formation, FormationState};
use crate::domains::formation_assignment::models::FormationAssignment;

/// Aggregated view of a formation and all of its assignments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormationStatus {
    pub condition: FormationCondition,
    pub errors: Vec<FormationStatusError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FormationCondition {
    Ready,
    InProgress,
    Error,
}

/// One error entry. Formation-level errors carry no assignment ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormationStatusError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignment_id: Option<FormationAssignmentId>,
    pub message: String,
    pub error_code: ErrorCode,
}

impl FormationStatus {
    /// Any error anywhere wins over in-progress work; READY only when nothing
    /// is pending or failed.
    pub fn aggregate(formation: &Formation, assignments: &[FormationAssignment]) -> Self {
        let mut errors = Vec::new();

        if let Some(err) = formation.error.as_ref().filter(|_| formation.state.is_error()) {
            errors.push(FormationStatusError {
                assignment_id: None,
                message: err.message.clone(),
                error_code: err.error_code,
            });
        }

        for fa in assignments.iter().filter(|fa| fa.state.is_error()) {
            if let Some(err) = &fa.error {
                errors.push(FormationStatusError {
                    assignment_id: Some(fa.id),
                    message: err.message.clone(),
                    error_code: err.error_code,
                });
            }
        }

        let any_error =
            formation.state.is_error() || assignments.iter().any(|fa| fa.state.is_error());
        let any_pending = matches!(
            formation.state,
            FormationState::Initial | FormationState::Deleting
        ) || assignments.iter().any(|fa| fa.state.is_in_progress());

        let condition = if any_error {
            FormationCondition::Error
        } else if any_pending {
            FormationCondition::InProgress
        } else {
            FormationCondition::Ready
        };

        Self { condition, errors }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{CustomerTenantContext, FormationTemplateId, NotificationError, ParticipantId};
    use crate::domains::formation_assignment::models::AssignmentState;
    use crate::domains::participant::ParticipantKind;

    fn formation() -> Formation {
        Formation::new(
            "f",
            FormationTemplateId::new(),
            CustomerTenantContext::for_tenant("t"),
            FormationState::Ready,
        )
    }

    fn assignment(formation: &Formation, state: AssignmentState) -> FormationAssignment {
        let mut fa = FormationAssignment::new(
            formation.id,
            (ParticipantId::new(), ParticipantKind::Application),
            (ParticipantId::new(), ParticipantKind::Runtime),
        );
        fa.state = state;
        fa
    }

    #[test]
    fn test_all_ready_is_ready() {
        let f = formation();
        let fas = vec![assignment(&f, AssignmentState::Ready)];
        let status = FormationStatus::aggregate(&f, &fas);
        assert_eq!(status.condition, FormationCondition::Ready);
        assert!(status.errors.is_empty());
    }

    #[test]
    fn test_assignment_error_overrides_ready_formation() {
        let f = formation();
        let mut failed = assignment(&f, AssignmentState::CreateError);
        failed.error = Some(NotificationError::client("boom"));
        let mut failed_twin = assignment(&f, AssignmentState::CreateError);
        failed_twin.error = Some(NotificationError::client("boom"));
        let pending = assignment(&f, AssignmentState::ConfigPending);

        let status = FormationStatus::aggregate(&f, &[failed, failed_twin, pending]);
        assert_eq!(status.condition, FormationCondition::Error);
        // Same message on two assignments is reported twice
        assert_eq!(status.errors.len(), 2);
    }

    #[test]
    fn test_pending_formation_is_in_progress() {
        let mut f = formation();
        f.state = FormationState::Initial;
        let status = FormationStatus::aggregate(&f, &[]);
        assert_eq!(status.condition, FormationCondition::InProgress);
    }
}
