//! Assignment state machine
//!
//! Pure decision logic - NO IO, only state transitions. The machine owns a
//! snapshot of one assignment, applies an event to it and returns the
//! commands the caller must execute.

use crate::common::{ErrorCode, NotificationError};
use crate::domains::formation_assignment::commands::AssignmentCommand;
use crate::domains::formation_assignment::events::{
    AssignmentEvent, NotificationResult, UNASSIGN_CONFIG_PENDING_MESSAGE,
};
use crate::domains::formation_assignment::models::{
    AssignmentOperation, AssignmentState, FormationAssignment,
};

pub struct AssignmentMachine {
    assignment: FormationAssignment,
    /// Consecutive CONFIG_PENDING rounds allowed; 0 = unlimited
    resend_limit: u32,
}

impl AssignmentMachine {
    pub fn new(assignment: FormationAssignment, resend_limit: u32) -> Self {
        Self {
            assignment,
            resend_limit,
        }
    }

    pub fn assignment(&self) -> &FormationAssignment {
        &self.assignment
    }

    pub fn decide(&mut self, event: &AssignmentEvent) -> Vec<AssignmentCommand> {
        match event {
            AssignmentEvent::StatusForced {
                state,
                configuration,
            } => self.force(*state, configuration),
            AssignmentEvent::PeerReset => {
                let fa = &mut self.assignment;
                fa.last_operation = AssignmentOperation::Assign;
                fa.state = AssignmentState::Initial;
                fa.error = None;
                fa.config_pending_rounds = 0;
                vec![self.persist()]
            }
            AssignmentEvent::UnassignRequested => {
                let fa = &mut self.assignment;
                fa.last_operation = AssignmentOperation::Unassign;
                fa.state = AssignmentState::Deleting;
                fa.error = None;
                fa.config_pending_rounds = 0;
                vec![self.persist()]
            }
            AssignmentEvent::Reopened {
                discard_configuration,
            } => self.reopen(*discard_configuration),
            _ => match self.assignment.last_operation {
                AssignmentOperation::Assign => self.decide_assign(event),
                AssignmentOperation::Unassign => self.decide_unassign(event),
            },
        }
    }

    // =========================================================================
    // OUT-OF-BAND
    // =========================================================================

    fn force(&mut self, state: AssignmentState, configuration: &serde_json::Value) -> Vec<AssignmentCommand> {
        let fa = &mut self.assignment;
        fa.last_operation = AssignmentOperation::Assign;
        fa.state = state;
        fa.configuration = Some(configuration.clone());
        fa.value = Some(configuration.clone());
        fa.error = None;
        fa.config_pending_rounds = 0;
        vec![self.persist(), self.wake_reverse()]
    }

    /// Assign-side rounds restart at INITIAL, unassign-side at DELETING.
    /// READY assign-side assignments are left alone.
    fn reopen(&mut self, discard_configuration: bool) -> Vec<AssignmentCommand> {
        let fa = &mut self.assignment;
        match fa.last_operation {
            AssignmentOperation::Assign if fa.state == AssignmentState::Ready => Vec::new(),
            AssignmentOperation::Assign => {
                fa.state = AssignmentState::Initial;
                fa.error = None;
                fa.config_pending_rounds = 0;
                if discard_configuration {
                    fa.configuration = None;
                    fa.value = None;
                }
                vec![self.persist()]
            }
            AssignmentOperation::Unassign => {
                fa.state = AssignmentState::Deleting;
                fa.error = None;
                vec![self.persist()]
            }
        }
    }

    // =========================================================================
    // ASSIGN
    // =========================================================================

    fn decide_assign(&mut self, event: &AssignmentEvent) -> Vec<AssignmentCommand> {
        match event {
            AssignmentEvent::NotificationSkipped => {
                let fa = &mut self.assignment;
                fa.state = AssignmentState::Ready;
                fa.error = None;
                fa.config_pending_rounds = 0;
                vec![self.persist()]
            }

            // Stays INITIAL until the status report arrives
            AssignmentEvent::NotificationAccepted => {
                let fa = &mut self.assignment;
                fa.state = AssignmentState::Initial;
                fa.error = None;
                vec![self.persist()]
            }

            AssignmentEvent::ResultReturned(result) => match result.state {
                AssignmentState::Ready => self.assign_ready(result),
                AssignmentState::ConfigPending => self.assign_config_pending(result),
                AssignmentState::CreateError => self.fail(result.error.clone().unwrap_or_else(
                    || NotificationError::client("participant reported CREATE_ERROR"),
                )),
                other => self.fail(NotificationError::technical(format!(
                    "unexpected state {} for an assign notification",
                    other
                ))),
            },

            // Out-of-band events are decided in `decide`
            _ => Vec::new(),
        }
    }

    fn assign_ready(&mut self, result: &NotificationResult) -> Vec<AssignmentCommand> {
        let fa = &mut self.assignment;
        fa.state = AssignmentState::Ready;
        fa.error = None;
        fa.config_pending_rounds = 0;

        let mut commands = Vec::new();
        if let Some(config) = &result.configuration {
            fa.configuration = Some(config.clone());
            fa.value = Some(config.clone());
            commands.push(self.persist());
            commands.push(self.wake_reverse());
        } else {
            commands.push(self.persist());
        }
        commands
    }

    fn assign_config_pending(&mut self, result: &NotificationResult) -> Vec<AssignmentCommand> {
        let rounds = self.assignment.config_pending_rounds + 1;
        if self.resend_limit > 0 && rounds > self.resend_limit as i32 {
            self.assignment.config_pending_rounds = 0;
            return self.fail(NotificationError::new(
                ErrorCode::ConfigPendingLimitExceeded,
                format!(
                    "participant answered CONFIG_PENDING more than {} consecutive times",
                    self.resend_limit
                ),
            ));
        }

        let fa = &mut self.assignment;
        fa.state = AssignmentState::ConfigPending;
        fa.error = None;
        fa.config_pending_rounds = rounds;

        if let Some(config) = &result.configuration {
            fa.value = Some(config.clone());
            vec![self.persist(), self.wake_reverse()]
        } else {
            vec![self.persist()]
        }
    }

    // =========================================================================
    // UNASSIGN
    // =========================================================================

    fn decide_unassign(&mut self, event: &AssignmentEvent) -> Vec<AssignmentCommand> {
        match event {
            AssignmentEvent::NotificationSkipped => vec![AssignmentCommand::Delete(self.assignment.id)],

            AssignmentEvent::NotificationAccepted => {
                let fa = &mut self.assignment;
                fa.state = AssignmentState::Deleting;
                fa.error = None;
                vec![self.persist()]
            }

            AssignmentEvent::ResultReturned(result) => match result.state {
                AssignmentState::Ready => vec![AssignmentCommand::Delete(self.assignment.id)],
                AssignmentState::DeleteError => self.fail(result.error.clone().unwrap_or_else(
                    || NotificationError::client("participant reported DELETE_ERROR"),
                )),
                AssignmentState::ConfigPending => {
                    self.fail(NotificationError::client(UNASSIGN_CONFIG_PENDING_MESSAGE))
                }
                other => self.fail(NotificationError::technical(format!(
                    "unexpected state {} for an unassign notification",
                    other
                ))),
            },

            _ => Vec::new(),
        }
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    fn fail(&mut self, error: NotificationError) -> Vec<AssignmentCommand> {
        let fa = &mut self.assignment;
        fa.state = fa.last_operation.error_state();
        fa.error = Some(error.clone());
        vec![
            self.persist(),
            AssignmentCommand::RecordError {
                assignment_id: self.assignment.id,
                error,
            },
        ]
    }

    fn persist(&mut self) -> AssignmentCommand {
        self.assignment.touch();
        AssignmentCommand::Persist(self.assignment.clone())
    }

    fn wake_reverse(&self) -> AssignmentCommand {
        AssignmentCommand::WakeReverse {
            formation_id: self.assignment.formation_id,
            source: self.assignment.target,
            target: self.assignment.source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{FormationId, ParticipantId};
    use crate::domains::participant::ParticipantKind;
    use serde_json::json;

    fn assignment() -> FormationAssignment {
        FormationAssignment::new(
            FormationId::new(),
            (ParticipantId::new(), ParticipantKind::Application),
            (ParticipantId::new(), ParticipantKind::Runtime),
        )
    }

    fn result(state: AssignmentState, config: Option<serde_json::Value>) -> AssignmentEvent {
        AssignmentEvent::ResultReturned(NotificationResult {
            state,
            configuration: config,
            error: None,
        })
    }

    fn persisted(commands: &[AssignmentCommand]) -> &FormationAssignment {
        commands
            .iter()
            .find_map(|c| match c {
                AssignmentCommand::Persist(fa) => Some(fa),
                _ => None,
            })
            .expect("no persist command")
    }

    fn wakes(commands: &[AssignmentCommand]) -> bool {
        commands
            .iter()
            .any(|c| matches!(c, AssignmentCommand::WakeReverse { .. }))
    }

    #[test]
    fn test_skipped_assign_becomes_ready() {
        let mut machine = AssignmentMachine::new(assignment(), 10);
        let commands = machine.decide(&AssignmentEvent::NotificationSkipped);
        assert_eq!(persisted(&commands).state, AssignmentState::Ready);
        assert!(!wakes(&commands));
    }

    #[test]
    fn test_ready_with_config_wakes_reverse() {
        let fa = assignment();
        let (source, target) = (fa.source, fa.target);
        let mut machine = AssignmentMachine::new(fa, 10);
        let commands = machine.decide(&result(AssignmentState::Ready, Some(json!({"k": "v"}))));

        let stored = persisted(&commands);
        assert_eq!(stored.configuration, Some(json!({"k": "v"})));
        assert_eq!(stored.value, Some(json!({"k": "v"})));
        assert!(commands.contains(&AssignmentCommand::WakeReverse {
            formation_id: stored.formation_id,
            source: target,
            target: source,
        }));
    }

    #[test]
    fn test_ready_without_config_keeps_previous_configuration() {
        let mut fa = assignment();
        fa.configuration = Some(json!({"old": true}));
        let mut machine = AssignmentMachine::new(fa, 10);
        let commands = machine.decide(&result(AssignmentState::Ready, None));
        assert_eq!(persisted(&commands).configuration, Some(json!({"old": true})));
        assert!(!wakes(&commands));
    }

    #[test]
    fn test_config_pending_stores_value_only() {
        let mut machine = AssignmentMachine::new(assignment(), 10);
        let commands = machine.decide(&result(
            AssignmentState::ConfigPending,
            Some(json!({"partial": 1})),
        ));
        let stored = persisted(&commands);
        assert_eq!(stored.state, AssignmentState::ConfigPending);
        assert_eq!(stored.value, Some(json!({"partial": 1})));
        assert_eq!(stored.configuration, None);
        assert_eq!(stored.config_pending_rounds, 1);
        assert!(wakes(&commands));
    }

    #[test]
    fn test_config_pending_cap() {
        let mut fa = assignment();
        fa.config_pending_rounds = 2;
        let mut machine = AssignmentMachine::new(fa, 2);
        let commands = machine.decide(&result(AssignmentState::ConfigPending, Some(json!({"x": 1}))));

        let stored = persisted(&commands);
        assert_eq!(stored.state, AssignmentState::CreateError);
        assert_eq!(
            stored.error.as_ref().map(|e| e.error_code),
            Some(ErrorCode::ConfigPendingLimitExceeded)
        );
        assert!(!wakes(&commands));
    }

    #[test]
    fn test_zero_limit_is_unlimited() {
        let mut fa = assignment();
        fa.config_pending_rounds = 1000;
        let mut machine = AssignmentMachine::new(fa, 0);
        let commands = machine.decide(&result(AssignmentState::ConfigPending, None));
        assert_eq!(persisted(&commands).state, AssignmentState::ConfigPending);
    }

    #[test]
    fn test_accepted_assign_stays_initial() {
        let mut machine = AssignmentMachine::new(assignment(), 10);
        let commands = machine.decide(&AssignmentEvent::NotificationAccepted);
        assert_eq!(persisted(&commands).state, AssignmentState::Initial);
    }

    #[test]
    fn test_failure_records_error() {
        let fa = assignment();
        let id = fa.id;
        let mut machine = AssignmentMachine::new(fa, 10);
        let error = NotificationError::new(ErrorCode::RemoteRejection, "boom");
        let commands = machine.decide(&AssignmentEvent::ResultReturned(NotificationResult::failed(
            AssignmentOperation::Assign,
            error.clone(),
        )));
        assert_eq!(persisted(&commands).state, AssignmentState::CreateError);
        assert!(commands.contains(&AssignmentCommand::RecordError {
            assignment_id: id,
            error,
        }));
    }

    #[test]
    fn test_unassign_ready_deletes() {
        let mut fa = assignment();
        fa.last_operation = AssignmentOperation::Unassign;
        fa.state = AssignmentState::Deleting;
        let id = fa.id;
        let mut machine = AssignmentMachine::new(fa, 10);
        assert_eq!(
            machine.decide(&result(AssignmentState::Ready, None)),
            vec![AssignmentCommand::Delete(id)]
        );
    }

    #[test]
    fn test_unassign_accepted_stays_deleting() {
        let mut fa = assignment();
        fa.last_operation = AssignmentOperation::Unassign;
        fa.state = AssignmentState::Deleting;
        let mut machine = AssignmentMachine::new(fa, 10);
        let commands = machine.decide(&AssignmentEvent::NotificationAccepted);
        assert_eq!(persisted(&commands).state, AssignmentState::Deleting);
    }

    #[test]
    fn test_unassign_config_pending_is_delete_error() {
        let mut fa = assignment();
        fa.last_operation = AssignmentOperation::Unassign;
        fa.state = AssignmentState::Deleting;
        let mut machine = AssignmentMachine::new(fa, 10);
        let commands = machine.decide(&result(AssignmentState::ConfigPending, None));
        let stored = persisted(&commands);
        assert_eq!(stored.state, AssignmentState::DeleteError);
        assert_eq!(
            stored.error.as_ref().map(|e| e.message.as_str()),
            Some(UNASSIGN_CONFIG_PENDING_MESSAGE)
        );
    }

    #[test]
    fn test_forced_status_sets_both_configurations_and_wakes() {
        let mut fa = assignment();
        fa.state = AssignmentState::Ready;
        let mut machine = AssignmentMachine::new(fa, 10);
        let commands = machine.decide(&AssignmentEvent::StatusForced {
            state: AssignmentState::ConfigPending,
            configuration: json!({"forced": true}),
        });
        let stored = persisted(&commands);
        assert_eq!(stored.state, AssignmentState::ConfigPending);
        assert_eq!(stored.configuration, Some(json!({"forced": true})));
        assert_eq!(stored.value, Some(json!({"forced": true})));
        assert!(wakes(&commands));
    }

    #[test]
    fn test_reopen_leaves_ready_assignments_alone() {
        let mut fa = assignment();
        fa.state = AssignmentState::Ready;
        let mut machine = AssignmentMachine::new(fa, 10);
        assert!(machine
            .decide(&AssignmentEvent::Reopened {
                discard_configuration: true
            })
            .is_empty());
    }

    #[test]
    fn test_reopen_failed_assign_keeps_configuration_unless_discarded() {
        let mut fa = assignment();
        fa.state = AssignmentState::CreateError;
        fa.error = Some(NotificationError::client("boom"));
        fa.configuration = Some(json!({"kept": 1}));

        let mut machine = AssignmentMachine::new(fa.clone(), 10);
        let commands = machine.decide(&AssignmentEvent::Reopened {
            discard_configuration: false,
        });
        let stored = persisted(&commands);
        assert_eq!(stored.state, AssignmentState::Initial);
        assert_eq!(stored.error, None);
        assert_eq!(stored.configuration, Some(json!({"kept": 1})));

        let mut machine = AssignmentMachine::new(fa, 10);
        let commands = machine.decide(&AssignmentEvent::Reopened {
            discard_configuration: true,
        });
        assert_eq!(persisted(&commands).configuration, None);
    }

    #[test]
    fn test_reopen_failed_unassign_goes_back_to_deleting() {
        let mut fa = assignment();
        fa.last_operation = AssignmentOperation::Unassign;
        fa.state = AssignmentState::DeleteError;
        let mut machine = AssignmentMachine::new(fa, 10);
        let commands = machine.decide(&AssignmentEvent::Reopened {
            discard_configuration: false,
        });
        assert_eq!(persisted(&commands).state, AssignmentState::Deleting);
    }

    #[test]
    fn test_unassign_request_switches_operation() {
        let mut fa = assignment();
        fa.state = AssignmentState::Ready;
        fa.configuration = Some(json!({"k": "v"}));
        let mut machine = AssignmentMachine::new(fa, 10);
        let commands = machine.decide(&AssignmentEvent::UnassignRequested);
        let stored = persisted(&commands);
        assert_eq!(stored.last_operation, AssignmentOperation::Unassign);
        assert_eq!(stored.state, AssignmentState::Deleting);
        assert!(stored.awaits_notification());
    }

    #[test]
    fn test_persist_bumps_revision() {
        let fa = assignment();
        let before = fa.revision;
        let mut machine = AssignmentMachine::new(fa, 10);
        let commands = machine.decide(&AssignmentEvent::NotificationSkipped);
        assert_eq!(persisted(&commands).revision, before + 1);
    }
}
