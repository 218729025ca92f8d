//! Formation status report action
//!
//! Terminal result of an accepted asynchronous lifecycle notification; a
//! report with no lifecycle notification awaiting it is rejected. READY while
//! deleting removes the formation; READY otherwise makes it usable and
//! resynchronizes its assignments in the background.

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::common::{EngineError, EngineResult, FormationId, NotificationError};
use crate::domains::formation::actions::create::load_formation;
use crate::domains::formation::actions::lifecycle::apply_formation_event;
use crate::domains::formation::actions::resynchronize::resynchronize_formation;
use crate::domains::formation::events::FormationEvent;
use crate::domains::formation::models::{Formation, FormationState, LifecycleOperation};
use crate::domains::webhook::models::CallbackSubject;
use crate::kernel::ServerDeps;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FormationStatusReport {
    pub state: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FormationStatusAck {
    Applied {
        #[serde(skip_serializing_if = "Option::is_none")]
        formation: Option<Formation>,
    },
    Duplicate,
}

fn validate(report: &FormationStatusReport) -> EngineResult<(FormationState, Option<String>)> {
    let raw = report
        .state
        .as_deref()
        .ok_or_else(|| EngineError::invalid("state is required"))?;
    let state: FormationState = raw
        .parse()
        .map_err(|_| EngineError::invalid(format!("invalid state {:?}", raw)))?;
    if !matches!(
        state,
        FormationState::Ready | FormationState::CreateError | FormationState::DeleteError
    ) {
        return Err(EngineError::invalid(format!("state {} cannot be reported", state)));
    }

    let error = report.error.clone().filter(|e| !e.trim().is_empty());
    if error.is_some() && !state.is_error() {
        return Err(EngineError::invalid(format!(
            "an error can only be reported with CREATE_ERROR or DELETE_ERROR, not {}",
            state
        )));
    }
    Ok((state, error))
}

pub async fn report_formation_status(
    formation_id: FormationId,
    report: FormationStatusReport,
    deps: &ServerDeps,
) -> EngineResult<FormationStatusAck> {
    let (state, error) = validate(&report)?;
    let formation = load_formation(formation_id, deps).await?;
    let operation = formation.lifecycle_operation();

    if state != FormationState::Ready && state != operation.error_state() {
        return Err(EngineError::invalid(format!(
            "state {} is not valid for {} notifications",
            state,
            operation.template_name()
        )));
    }
    let unchanged_error = formation.error.as_ref().map(|e| e.message.as_str()) == error.as_deref();
    if formation.state == state && unchanged_error {
        info!(formation_id = %formation_id, state = %state, "Ignoring duplicate formation status report");
        return Ok(FormationStatusAck::Duplicate);
    }
    let pending = deps
        .store
        .get_callback(CallbackSubject::Formation(formation_id))
        .await?
        .filter(|c| c.operation == operation.template_name());
    if pending.is_none() {
        return Err(EngineError::invalid(format!(
            "no {} lifecycle notification is awaiting a status report",
            operation.template_name()
        )));
    }

    let event = FormationEvent::ResultReturned {
        state,
        error: error.map(NotificationError::client),
    };
    let stored = apply_formation_event(formation_id, None, &event, deps).await?;
    if stored.is_none() {
        deps.locks.forget(formation_id);
    }

    info!(
        formation_id = %formation_id,
        state = ?stored.as_ref().map(|f| f.state),
        "Formation status report applied"
    );

    if operation == LifecycleOperation::Create
        && stored.as_ref().is_some_and(|f| f.state == FormationState::Ready)
    {
        let deps = deps.clone();
        tokio::spawn(async move {
            if let Err(err) = resynchronize_formation(formation_id, false, &deps).await {
                error!(formation_id = %formation_id, error = %err, "Background resynchronization failed");
            }
        });
    }

    Ok(FormationStatusAck::Applied { formation: stored })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(state: Option<&str>, error: Option<&str>) -> FormationStatusReport {
        FormationStatusReport {
            state: state.map(str::to_string),
            error: error.map(str::to_string),
        }
    }

    #[test]
    fn test_error_requires_error_state() {
        assert!(validate(&report(Some("READY"), Some("boom"))).is_err());
        assert!(validate(&report(Some("DELETE_ERROR"), Some("boom"))).is_ok());
    }

    #[test]
    fn test_only_terminal_states_can_be_reported() {
        assert!(validate(&report(Some("INITIAL"), None)).is_err());
        assert!(validate(&report(Some("DELETING"), None)).is_err());
        assert!(validate(&report(None, None)).is_err());
        assert_eq!(
            validate(&report(Some("READY"), None)).unwrap(),
            (FormationState::Ready, None)
        );
    }
}
