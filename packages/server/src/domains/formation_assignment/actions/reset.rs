//! Status reset action
//!
//! Forces an assignment to READY or CONFIG_PENDING with a supplied
//! configuration. Used when the configuration was negotiated outside the
//! engine's own notification flow. The reverse assignment goes back to
//! INITIAL and is notified again with the new configuration.

use chrono::Utc;
use tracing::info;

use crate::common::{EngineError, EngineResult, FormationAssignmentId, FormationId};
use crate::domains::formation_assignment::actions::process::{
    apply_event, spawn_wakes, ApplyGuard,
};
use crate::domains::formation_assignment::actions::status_report::{
    load_target, validate, StatusAck, StatusReport,
};
use crate::domains::formation_assignment::events::{check_reported_state, AssignmentEvent};
use crate::domains::formation_assignment::models::AssignmentState;
use crate::kernel::ServerDeps;

/// Forces a READY assignment to READY or CONFIG_PENDING with the reported
/// configuration. Requires a configuration and a READY reverse assignment.
pub async fn reset_assignment_status(
    formation_id: FormationId,
    assignment_id: FormationAssignmentId,
    report: StatusReport,
    deps: &ServerDeps,
) -> EngineResult<StatusAck> {
    let valid = validate(&report)?;
    let fa = load_target(formation_id, assignment_id, deps).await?;
    check_reported_state(fa.last_operation, valid.state).map_err(EngineError::invalid)?;

    if !matches!(valid.state, AssignmentState::Ready | AssignmentState::ConfigPending) {
        return Err(EngineError::invalid(format!(
            "cannot reset assignment to state {}",
            valid.state
        )));
    }
    let Some(configuration) = valid.configuration else {
        return Err(EngineError::invalid(
            "cannot reset assignment without a configuration",
        ));
    };
    if fa.state != AssignmentState::Ready {
        return Err(EngineError::invalid(format!(
            "cannot reset assignment in state {}, it must be READY",
            fa.state
        )));
    }
    let reverse = deps
        .store
        .get_assignment_by_pair(fa.formation_id, fa.target, fa.source)
        .await?
        .ok_or_else(|| EngineError::invalid("cannot reset assignment without a reverse assignment"))?;
    if reverse.state != AssignmentState::Ready {
        return Err(EngineError::invalid(format!(
            "cannot reset assignment while its reverse is in state {}, it must be READY",
            reverse.state
        )));
    }

    if let (Some(reported), Some(last)) = (report.reported_at, fa.last_status_reported_at) {
        if reported < last {
            info!(
                assignment_id = %assignment_id,
                reported_at = %reported,
                last_reported_at = %last,
                "Ignoring reset older than the last status report"
            );
            return Ok(StatusAck::Stale);
        }
    }

    info!(
        formation_id = %formation_id,
        assignment_id = %assignment_id,
        reverse_id = %reverse.id,
        state = %valid.state,
        "Resetting assignment status"
    );

    let reported_at = report.reported_at.unwrap_or_else(Utc::now);
    let outcome = apply_event(
        assignment_id,
        ApplyGuard::reported_at(reported_at),
        &AssignmentEvent::StatusForced {
            state: valid.state,
            configuration,
        },
        deps,
    )
    .await?;
    if !outcome.applied {
        return Ok(StatusAck::Stale);
    }
    apply_event(
        reverse.id,
        ApplyGuard::revision(reverse.revision),
        &AssignmentEvent::PeerReset,
        deps,
    )
    .await?;

    spawn_wakes(outcome.wakes, deps.clone());

    Ok(StatusAck::Applied {
        assignment: outcome.report,
    })
}
