//! Status report action
//!
//! Participants report the outcome of an accepted asynchronous notification
//! through the Status API. Reports are applied if newer: an older
//! `reported_at` or an exact repeat of the current state is acknowledged
//! without changing anything. A report with no notification awaiting it is
//! rejected; statuses outside the notification flow go through the reset.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::common::{
    EngineError, EngineResult, FormationAssignmentId, FormationId, NotificationError,
};
use crate::domains::formation::models::FormationState;
use crate::domains::formation_assignment::actions::process::{
    apply_event, spawn_wakes, ApplyGuard, AssignmentReport,
};
use crate::domains::formation_assignment::events::{
    check_reported_state, AssignmentEvent, NotificationResult,
};
use crate::domains::formation_assignment::models::{
    non_empty_config, AssignmentState, FormationAssignment,
};
use crate::domains::formation_assignment::notifications::AssignmentDetails;
use crate::domains::formation_constraint;
use crate::domains::webhook::models::CallbackSubject;
use crate::kernel::ServerDeps;

/// Body of an assignment status report
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatusReport {
    pub state: Option<String>,
    pub configuration: Option<Value>,
    pub error: Option<String>,
    pub reported_at: Option<DateTime<Utc>>,
}

/// How a status report was handled
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusAck {
    Applied {
        #[serde(skip_serializing_if = "Option::is_none")]
        assignment: Option<AssignmentReport>,
    },
    /// Older than the last applied report
    Stale,
    /// Same state and configuration as already stored
    Duplicate,
}

/// A report that passed validation
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ValidReport {
    pub state: AssignmentState,
    pub configuration: Option<Value>,
    pub error: Option<String>,
}

/// Shape checks that do not depend on the stored assignment.
pub(crate) fn validate(report: &StatusReport) -> EngineResult<ValidReport> {
    let raw = report
        .state
        .as_deref()
        .ok_or_else(|| EngineError::invalid("state is required"))?;
    let state: AssignmentState = raw
        .parse()
        .map_err(|_| EngineError::invalid(format!("invalid state {:?}", raw)))?;

    if !matches!(
        state,
        AssignmentState::Ready
            | AssignmentState::CreateError
            | AssignmentState::DeleteError
            | AssignmentState::ConfigPending
    ) {
        return Err(EngineError::invalid(format!(
            "state {} cannot be reported",
            state
        )));
    }

    let configuration = non_empty_config(report.configuration.clone());
    let error = report.error.clone().filter(|e| !e.trim().is_empty());

    if configuration.is_some() && error.is_some() {
        return Err(EngineError::invalid(
            "configuration and error cannot be reported together",
        ));
    }
    if error.is_some() && !state.is_error() {
        return Err(EngineError::invalid(format!(
            "an error can only be reported with CREATE_ERROR or DELETE_ERROR, not {}",
            state
        )));
    }
    if configuration.is_some()
        && !matches!(state, AssignmentState::Ready | AssignmentState::ConfigPending)
    {
        return Err(EngineError::invalid(format!(
            "configuration can only be reported with READY or CONFIG_PENDING, not {}",
            state
        )));
    }

    Ok(ValidReport {
        state,
        configuration,
        error,
    })
}

/// Load the assignment addressed by the route and check its formation is READY.
pub(crate) async fn load_target(
    formation_id: FormationId,
    assignment_id: FormationAssignmentId,
    deps: &ServerDeps,
) -> EngineResult<FormationAssignment> {
    let fa = deps
        .store
        .get_assignment(assignment_id)
        .await?
        .filter(|fa| fa.formation_id == formation_id)
        .ok_or_else(|| EngineError::not_found("formation assignment", assignment_id))?;

    let formation = deps
        .store
        .get_formation(formation_id)
        .await?
        .ok_or_else(|| EngineError::not_found("formation", formation_id))?;
    if formation.state != FormationState::Ready {
        return Err(EngineError::FormationNotReady(formation_id));
    }
    Ok(fa)
}

fn is_duplicate(fa: &FormationAssignment, report: &ValidReport) -> bool {
    if fa.state != report.state {
        return false;
    }
    match report.state {
        AssignmentState::Ready => report
            .configuration
            .as_ref()
            .map_or(true, |c| fa.configuration.as_ref() == Some(c)),
        AssignmentState::ConfigPending => fa.value == report.configuration,
        _ => fa.error.as_ref().map(|e| e.message.as_str()) == report.error.as_deref(),
    }
}

/// Apply a participant's status report to an assignment.
pub async fn report_assignment_status(
    formation_id: FormationId,
    assignment_id: FormationAssignmentId,
    report: StatusReport,
    deps: &ServerDeps,
) -> EngineResult<StatusAck> {
    let valid = validate(&report)?;
    let fa = load_target(formation_id, assignment_id, deps).await?;

    check_reported_state(fa.last_operation, valid.state).map_err(EngineError::invalid)?;

    if let (Some(reported), Some(last)) = (report.reported_at, fa.last_status_reported_at) {
        if reported < last {
            info!(
                assignment_id = %assignment_id,
                reported_at = %reported,
                last_reported_at = %last,
                "Ignoring stale status report"
            );
            return Ok(StatusAck::Stale);
        }
    }
    if is_duplicate(&fa, &valid) {
        info!(assignment_id = %assignment_id, state = %valid.state, "Ignoring duplicate status report");
        return Ok(StatusAck::Duplicate);
    }

    let Some(pending) = deps
        .store
        .get_callback(CallbackSubject::Assignment(assignment_id))
        .await?
        .filter(|c| c.operation == fa.last_operation.template_name())
    else {
        return Err(EngineError::invalid(format!(
            "no {} notification is awaiting a status report",
            fa.last_operation.template_name()
        )));
    };
    if report.reported_at.is_some_and(|at| at < pending.accepted_at) {
        info!(
            assignment_id = %assignment_id,
            notification_id = %pending.notification_id,
            "Ignoring status report made before the pending notification was accepted"
        );
        return Ok(StatusAck::Stale);
    }

    let operation = fa.last_operation;
    let mut result = match valid.state {
        state if state.is_error() => NotificationResult::failed(
            operation,
            NotificationError::client(
                valid
                    .error
                    .unwrap_or_else(|| format!("participant reported {}", state)),
            ),
        ),
        state => NotificationResult {
            state,
            configuration: valid.configuration,
            error: None,
        },
    };

    if let Some(details) = AssignmentDetails::load(fa, deps.store.as_ref()).await? {
        if let Err(err) =
            formation_constraint::after_status_returned(deps, &details, &mut result).await
        {
            warn!(
                assignment_id = %assignment_id,
                error = %format!("{:#}", err),
                "Constraint failed for status report"
            );
            result = NotificationResult::failed(
                operation,
                NotificationError::technical(format!("{:#}", err)),
            );
        }
    }

    let reported_at = report.reported_at.unwrap_or_else(Utc::now);
    let outcome = apply_event(
        assignment_id,
        ApplyGuard::reported_at(reported_at),
        &AssignmentEvent::ResultReturned(result),
        deps,
    )
    .await?;
    if !outcome.applied {
        return Ok(StatusAck::Stale);
    }

    info!(
        formation_id = %formation_id,
        assignment_id = %assignment_id,
        state = ?outcome.report.as_ref().and_then(|r| r.state),
        wakes = outcome.wakes.len(),
        "Status report applied"
    );
    spawn_wakes(outcome.wakes, deps.clone());

    Ok(StatusAck::Applied {
        assignment: outcome.report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn report(state: Option<&str>, configuration: Option<Value>, error: Option<&str>) -> StatusReport {
        StatusReport {
            state: state.map(str::to_string),
            configuration,
            error: error.map(str::to_string),
            reported_at: None,
        }
    }

    #[test]
    fn test_state_is_required() {
        assert!(validate(&report(None, None, None)).is_err());
    }

    #[test]
    fn test_error_requires_error_state() {
        assert!(validate(&report(Some("READY"), None, Some("boom"))).is_err());
        let valid = validate(&report(Some("CREATE_ERROR"), None, Some("boom"))).unwrap();
        assert_eq!(valid.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_configuration_requires_ready_or_config_pending() {
        assert!(validate(&report(Some("DELETE_ERROR"), Some(json!({"a": 1})), None)).is_err());
        let valid = validate(&report(Some("CONFIG_PENDING"), Some(json!({"a": 1})), None)).unwrap();
        assert_eq!(valid.configuration, Some(json!({"a": 1})));
    }

    #[test]
    fn test_empty_configuration_is_dropped() {
        let valid = validate(&report(Some("READY"), Some(json!({})), None)).unwrap();
        assert_eq!(valid.configuration, None);
        let valid = validate(&report(Some("READY"), Some(json!("")), None)).unwrap();
        assert_eq!(valid.configuration, None);
    }

    #[test]
    fn test_unreportable_states_are_rejected() {
        assert!(validate(&report(Some("INITIAL"), None, None)).is_err());
        assert!(validate(&report(Some("DELETING"), None, None)).is_err());
        assert!(validate(&report(Some("bogus"), None, None)).is_err());
    }

    #[test]
    fn test_unknown_fields_are_denied() {
        let parsed: Result<StatusReport, _> =
            serde_json::from_value(json!({"state": "READY", "extra": true}));
        assert!(parsed.is_err());
    }
}
