//! Read-only formation queries

use serde::Serialize;

use crate::common::{EngineResult, FormationId, ParticipantId};
use crate::domains::formation::actions::create::load_formation;
use crate::domains::formation::models::{Formation, FormationStatus};
use crate::domains::formation_assignment::models::FormationAssignment;
use crate::domains::webhook::models::NotificationRecord;
use crate::kernel::ServerDeps;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormationStatusView {
    pub formation: Formation,
    pub status: FormationStatus,
}

/// Aggregated status of a formation and its assignments.
pub async fn formation_status(
    formation_id: FormationId,
    deps: &ServerDeps,
) -> EngineResult<FormationStatusView> {
    let formation = load_formation(formation_id, deps).await?;
    let assignments = deps.store.list_assignments(formation_id).await?;
    let status = FormationStatus::aggregate(&formation, &assignments);
    Ok(FormationStatusView { formation, status })
}

pub async fn list_assignments(
    formation_id: FormationId,
    deps: &ServerDeps,
) -> EngineResult<Vec<FormationAssignment>> {
    load_formation(formation_id, deps).await?;
    Ok(deps.store.list_assignments(formation_id).await?)
}

/// Notifications sent for a formation, oldest first
pub async fn list_notifications(
    formation_id: FormationId,
    deps: &ServerDeps,
) -> EngineResult<Vec<NotificationRecord>> {
    load_formation(formation_id, deps).await?;
    Ok(deps.store.list_notifications_for_formation(formation_id).await?)
}

/// Notifications sent to a participant, redirected ones included
pub async fn list_notifications_for_participant(
    participant_id: ParticipantId,
    deps: &ServerDeps,
) -> EngineResult<Vec<NotificationRecord>> {
    Ok(deps.store.list_notifications_for_target(participant_id).await?)
}
