//! Formation lifecycle state machine
//!
//! Pure decision logic over the formation's own state:
//! - create: INITIAL -> READY | CREATE_ERROR
//! - delete: READY -> DELETING -> removed | DELETE_ERROR

use crate::common::NotificationError;
use crate::domains::formation::commands::FormationCommand;
use crate::domains::formation::events::FormationEvent;
use crate::domains::formation::models::{Formation, FormationState, LifecycleOperation};

pub struct FormationMachine {
    formation: Formation,
}

impl FormationMachine {
    pub fn new(formation: Formation) -> Self {
        Self { formation }
    }

    pub fn formation(&self) -> &Formation {
        &self.formation
    }

    pub fn decide(&mut self, event: &FormationEvent) -> Vec<FormationCommand> {
        let operation = self.formation.lifecycle_operation();

        match (event, operation) {
            (FormationEvent::DeleteRequested, _) => self.transition(FormationState::Deleting, None),

            (FormationEvent::NotificationSkipped, LifecycleOperation::Create) => {
                self.transition(FormationState::Ready, None)
            }
            (FormationEvent::NotificationSkipped, LifecycleOperation::Delete) => {
                vec![FormationCommand::HardDelete(self.formation.id)]
            }

            // Waits in INITIAL or DELETING for the status report
            (FormationEvent::NotificationAccepted, _) => {
                let state = self.formation.state;
                self.transition(state, None)
            }

            (FormationEvent::ResultReturned { state, error }, operation) => {
                self.result_returned(operation, *state, error.clone())
            }

            (FormationEvent::Reopened, LifecycleOperation::Create) => match self.formation.state {
                FormationState::Ready => Vec::new(),
                _ => self.transition(FormationState::Initial, None),
            },
            (FormationEvent::Reopened, LifecycleOperation::Delete) => {
                self.transition(FormationState::Deleting, None)
            }
        }
    }

    fn result_returned(
        &mut self,
        operation: LifecycleOperation,
        state: FormationState,
        error: Option<NotificationError>,
    ) -> Vec<FormationCommand> {
        match (operation, state) {
            (LifecycleOperation::Create, FormationState::Ready) => {
                self.transition(FormationState::Ready, None)
            }
            (LifecycleOperation::Delete, FormationState::Ready) => {
                vec![FormationCommand::HardDelete(self.formation.id)]
            }
            (LifecycleOperation::Create, FormationState::CreateError)
            | (LifecycleOperation::Delete, FormationState::DeleteError) => self.fail(
                operation,
                error.unwrap_or_else(|| {
                    NotificationError::client(format!("lifecycle webhook reported {}", state))
                }),
            ),
            (operation, other) => self.fail(
                operation,
                NotificationError::technical(format!(
                    "unexpected state {} for a {} notification",
                    other,
                    operation.template_name()
                )),
            ),
        }
    }

    fn fail(&mut self, operation: LifecycleOperation, error: NotificationError) -> Vec<FormationCommand> {
        let mut commands = self.transition(operation.error_state(), Some(error.clone()));
        commands.push(FormationCommand::RecordError {
            formation_id: self.formation.id,
            error,
        });
        commands
    }

    fn transition(
        &mut self,
        state: FormationState,
        error: Option<NotificationError>,
    ) -> Vec<FormationCommand> {
        self.formation.transition(state, error);
        vec![FormationCommand::Persist(self.formation.clone())]
    }
}
