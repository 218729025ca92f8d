//! Resynchronize formation action
//!
//! Re-drives whatever is not in a terminal success state: first the
//! formation's own lifecycle notification, then every failed or unfinished
//! assignment in one batch. Calling it on a consistent formation sends
//! nothing.

use serde::Serialize;
use tracing::info;

use crate::common::{EngineError, EngineResult, FormationId};
use crate::domains::formation::actions::create::{load_formation, load_template};
use crate::domains::formation::actions::lifecycle::{apply_formation_event, drive_lifecycle};
use crate::domains::formation::events::FormationEvent;
use crate::domains::formation::models::{Formation, FormationState};
use crate::domains::formation_assignment::actions::{
    apply_event, process_assignments, ApplyGuard, ProcessingReport,
};
use crate::domains::formation_assignment::events::AssignmentEvent;
use crate::kernel::ServerDeps;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResyncReport {
    /// `None` when the formation was removed by a re-driven delete
    pub formation: Option<Formation>,
    pub assignments: ProcessingReport,
}

/// Resynchronize a formation's notifications.
///
/// With `reset`, failed and unfinished assignments also lose their
/// configuration before they are notified again. Requires a formation
/// template that supports reset.
pub async fn resynchronize_formation(
    formation_id: FormationId,
    reset: bool,
    deps: &ServerDeps,
) -> EngineResult<ResyncReport> {
    let mut formation = load_formation(formation_id, deps).await?;
    let template = load_template(formation.template_id, deps).await?;
    if reset && !template.supports_reset {
        return Err(EngineError::ResetNotSupported(formation_id));
    }

    info!(
        formation_id = %formation_id,
        reset,
        state = %formation.state,
        "Resynchronizing formation"
    );

    if formation.state != FormationState::Ready {
        let reopened = apply_formation_event(
            formation_id,
            Some(formation.revision),
            &FormationEvent::Reopened,
            deps,
        )
        .await?
        .ok_or_else(|| EngineError::not_found("formation", formation_id))?;

        match drive_lifecycle(reopened, &template, deps).await? {
            Some(f) if f.state == FormationState::Ready => formation = f,
            other => {
                return Ok(ResyncReport {
                    formation: other,
                    assignments: ProcessingReport::default(),
                })
            }
        }
    }

    let mut pending = Vec::new();
    for fa in deps.store.list_assignments(formation_id).await? {
        let outcome = apply_event(
            fa.id,
            ApplyGuard::revision(fa.revision),
            &AssignmentEvent::Reopened {
                discard_configuration: reset,
            },
            deps,
        )
        .await?;
        if outcome.report.is_some() {
            if let Some(reopened) = deps.store.get_assignment(fa.id).await? {
                if reopened.awaits_notification() {
                    pending.push(reopened);
                }
            }
        }
    }

    if pending.is_empty() {
        info!(formation_id = %formation_id, "Formation is consistent, nothing to resynchronize");
        return Ok(ResyncReport {
            formation: Some(formation),
            assignments: ProcessingReport::default(),
        });
    }

    info!(
        formation_id = %formation_id,
        assignments = pending.len(),
        "Resending assignment notifications"
    );
    let assignments = process_assignments(pending, deps).await?;
    let formation = deps.store.get_formation(formation_id).await?;

    Ok(ResyncReport {
        formation,
        assignments,
    })
}
