//! Assign and unassign participant actions
//!
//! Assigning a participant creates its self-pair plus both directions
//! towards every current member, then runs the notification batch for the
//! new rows. Unassigning switches every row involving the participant to
//! UNASSIGN; rows disappear as their unassign notifications succeed, and the
//! participant has left once none remain.

use std::collections::BTreeMap;

use tracing::info;

use crate::common::{EngineError, EngineResult, FormationId, ParticipantId};
use crate::domains::formation::actions::create::{load_formation, load_template};
use crate::domains::formation::models::FormationState;
use crate::domains::formation_assignment::actions::{
    apply_event, process_assignments, ApplyGuard, ProcessingReport,
};
use crate::domains::formation_assignment::events::AssignmentEvent;
use crate::domains::formation_assignment::models::{AssignmentOperation, FormationAssignment};
use crate::domains::formation_constraint;
use crate::domains::participant::{Participant, ParticipantKind};
use crate::kernel::ServerDeps;

async fn load_participant(participant_id: ParticipantId, deps: &ServerDeps) -> EngineResult<Participant> {
    deps.store
        .get_participant(participant_id)
        .await?
        .ok_or_else(|| EngineError::not_found("participant", participant_id))
}

/// Assign a participant to a formation and send the notifications it causes.
///
/// Assigning a current member again sends nothing and reports its rows.
pub async fn assign_participant(
    formation_id: FormationId,
    participant_id: ParticipantId,
    deps: &ServerDeps,
) -> EngineResult<ProcessingReport> {
    let formation = load_formation(formation_id, deps).await?;
    if formation.state != FormationState::Ready {
        return Err(EngineError::FormationNotReady(formation_id));
    }
    let template = load_template(formation.template_id, deps).await?;
    let participant = load_participant(participant_id, deps).await?;

    if !template.accepts(participant.kind) {
        return Err(EngineError::invalid(format!(
            "formation template {} does not accept {} participants",
            template.name, participant.kind
        )));
    }

    let existing = deps
        .store
        .list_assignments_for_participant(formation_id, participant_id)
        .await?;
    if !existing.is_empty() {
        info!(
            formation_id = %formation_id,
            participant_id = %participant_id,
            "Participant is already assigned"
        );
        return Ok(ProcessingReport::from_assignments(&existing));
    }

    let participant_template = match participant.template_id {
        Some(id) => deps.store.get_participant_template(id).await?,
        None => None,
    };
    formation_constraint::before_assign(
        deps,
        &formation,
        &template,
        &participant,
        participant_template.as_ref(),
    )
    .await?;

    let me = (participant.id, participant.kind);
    let plan = |current: &[FormationAssignment]| plan_rows(formation_id, me, current);
    let created = {
        let _lock = deps.locks.lock(formation_id).await;
        deps.store
            .insert_planned_assignments(formation_id, &plan)
            .await?
    };
    if created.is_empty() {
        // Assigned concurrently while constraints were evaluated
        let existing = deps
            .store
            .list_assignments_for_participant(formation_id, participant_id)
            .await?;
        return Ok(ProcessingReport::from_assignments(&existing));
    }

    info!(
        formation_id = %formation_id,
        participant_id = %participant_id,
        assignments = created.len(),
        "Participant assigned"
    );
    Ok(process_assignments(created, deps).await?)
}

/// Rows joining `me` to the formation: its self-pair plus both directions
/// towards every current member. Nothing when `me` already has rows.
fn plan_rows(
    formation_id: FormationId,
    me: (ParticipantId, ParticipantKind),
    current: &[FormationAssignment],
) -> Vec<FormationAssignment> {
    if current.iter().any(|fa| fa.involves(me.0)) {
        return Vec::new();
    }
    let members: BTreeMap<_, _> = current
        .iter()
        .flat_map(|fa| [(fa.source, fa.source_type), (fa.target, fa.target_type)])
        .collect();

    let mut rows = vec![FormationAssignment::new(formation_id, me, me)];
    for member in members {
        rows.push(FormationAssignment::new(formation_id, me, member));
        rows.push(FormationAssignment::new(formation_id, member, me));
    }
    rows
}

/// Remove a participant from a formation through unassign notifications.
pub async fn unassign_participant(
    formation_id: FormationId,
    participant_id: ParticipantId,
    deps: &ServerDeps,
) -> EngineResult<ProcessingReport> {
    load_formation(formation_id, deps).await?;

    let involved = deps
        .store
        .list_assignments_for_participant(formation_id, participant_id)
        .await?;
    if involved.is_empty() {
        return Err(EngineError::not_found("formation participant", participant_id));
    }

    let mut switched = Vec::with_capacity(involved.len());
    for fa in involved {
        if fa.last_operation == AssignmentOperation::Unassign && fa.awaits_notification() {
            switched.push(fa);
            continue;
        }
        apply_event(
            fa.id,
            ApplyGuard::revision(fa.revision),
            &AssignmentEvent::UnassignRequested,
            deps,
        )
        .await?;
        if let Some(updated) = deps.store.get_assignment(fa.id).await? {
            switched.push(updated);
        }
    }

    info!(
        formation_id = %formation_id,
        participant_id = %participant_id,
        assignments = switched.len(),
        "Unassigning participant"
    );
    Ok(process_assignments(switched, deps).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_rows_pairs_new_participant_with_every_member() {
        let fid = FormationId::new();
        let a = (ParticipantId::new(), ParticipantKind::Application);
        let b = (ParticipantId::new(), ParticipantKind::Runtime);
        let current = vec![FormationAssignment::new(fid, a, a)];

        let rows = plan_rows(fid, b, &current);
        let pairs: Vec<_> = rows.iter().map(|fa| (fa.source, fa.target)).collect();
        assert_eq!(pairs, vec![(b.0, b.0), (b.0, a.0), (a.0, b.0)]);
    }

    #[test]
    fn test_plan_rows_is_empty_for_current_member() {
        let fid = FormationId::new();
        let a = (ParticipantId::new(), ParticipantKind::Application);
        let current = vec![FormationAssignment::new(fid, a, a)];

        assert!(plan_rows(fid, a, &current).is_empty());
    }
}
