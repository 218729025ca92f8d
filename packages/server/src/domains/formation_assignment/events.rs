use serde_json::Value;

use crate::common::NotificationError;
use crate::domains::formation_assignment::models::{
    non_empty_config, AssignmentOperation, AssignmentState,
};
use crate::domains::webhook::{DispatchOutcome, RemoteResult};

/// Message recorded when a participant asks for another round on unassign
pub const UNASSIGN_CONFIG_PENDING_MESSAGE: &str =
    "config propagation is not supported on unassign notifications";

/// What a notification round produced for an assignment, after validation
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationResult {
    pub state: AssignmentState,
    pub configuration: Option<Value>,
    pub error: Option<NotificationError>,
}

impl NotificationResult {
    pub fn ready(configuration: Option<Value>) -> Self {
        Self {
            state: AssignmentState::Ready,
            configuration: non_empty_config(configuration),
            error: None,
        }
    }

    pub fn failed(operation: AssignmentOperation, error: NotificationError) -> Self {
        Self {
            state: operation.error_state(),
            configuration: None,
            error: Some(error),
        }
    }
}

/// Assignment events - facts about a notification round
#[derive(Debug, Clone, PartialEq)]
pub enum AssignmentEvent {
    /// No notification is owed: self-pair, no webhook, or suppressed by a constraint
    NotificationSkipped,

    /// An asynchronous webhook accepted the notification
    NotificationAccepted,

    /// A result arrived, from a synchronous response or a status report
    ResultReturned(NotificationResult),

    /// State and configuration forced through the status reset call
    StatusForced {
        state: AssignmentState,
        configuration: Value,
    },

    /// The reverse assignment was force-reset; this one negotiates again
    PeerReset,

    /// A participant of the pair is leaving the formation
    UnassignRequested,

    /// Resynchronization reopens a failed or unfinished round
    Reopened { discard_configuration: bool },
}

impl AssignmentEvent {
    /// Translate a dispatch outcome into an event. Participant-reported
    /// states that make no sense for `operation` become client errors.
    pub fn from_dispatch(operation: AssignmentOperation, outcome: DispatchOutcome) -> Self {
        match outcome {
            DispatchOutcome::Accepted => AssignmentEvent::NotificationAccepted,
            DispatchOutcome::Failed(err) => {
                AssignmentEvent::ResultReturned(NotificationResult::failed(operation, err))
            }
            DispatchOutcome::Succeeded(remote) => {
                AssignmentEvent::ResultReturned(from_remote(operation, remote, None))
            }
            DispatchOutcome::Incomplete(remote) => AssignmentEvent::ResultReturned(from_remote(
                operation,
                remote,
                Some(AssignmentState::ConfigPending),
            )),
        }
    }
}

fn from_remote(
    operation: AssignmentOperation,
    remote: RemoteResult,
    implied: Option<AssignmentState>,
) -> NotificationResult {
    if let Some(message) = remote.error {
        return NotificationResult::failed(operation, NotificationError::client(message));
    }

    let state = match (implied, remote.state.as_deref()) {
        (Some(state), _) => Ok(state),
        (None, Some(raw)) => parse_reported_state(operation, raw),
        (None, None) => Ok(AssignmentState::Ready),
    }
    .and_then(|state| check_reported_state(operation, state));

    match state {
        Ok(state) if state.is_error() => NotificationResult::failed(
            operation,
            NotificationError::client(format!("participant reported {}", state)),
        ),
        Ok(state) => NotificationResult {
            state,
            configuration: non_empty_config(remote.configuration),
            error: None,
        },
        Err(message) => NotificationResult::failed(operation, NotificationError::client(message)),
    }
}

/// Parse a participant-reported state and check it is valid for `operation`.
pub fn parse_reported_state(
    operation: AssignmentOperation,
    raw: &str,
) -> Result<AssignmentState, String> {
    let state = raw
        .parse::<AssignmentState>()
        .map_err(|_| format!("invalid state {:?}", raw))?;
    check_reported_state(operation, state)
}

/// States a participant may report: READY, CONFIG_PENDING or CREATE_ERROR
/// for assign; READY or DELETE_ERROR for unassign.
pub fn check_reported_state(
    operation: AssignmentOperation,
    state: AssignmentState,
) -> Result<AssignmentState, String> {
    use AssignmentState::*;

    match (operation, state) {
        (AssignmentOperation::Assign, Ready | ConfigPending | CreateError) => Ok(state),
        (AssignmentOperation::Unassign, Ready | DeleteError) => Ok(state),
        (AssignmentOperation::Unassign, ConfigPending) => {
            Err(UNASSIGN_CONFIG_PENDING_MESSAGE.to_string())
        }
        _ => Err(format!(
            "state {} is not valid for {} notifications",
            state,
            operation.template_name()
        )),
    }
}
