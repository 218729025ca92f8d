//! Status API routes
//!
//! Participants (or adapters acting for them) report the outcome of
//! asynchronous notifications here. Every route needs an authenticated caller
//! that owns the reported object.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, Path};
use axum::Json;

use crate::common::{AppState, EngineError, EngineResult, FormationAssignmentId, FormationId};
use crate::domains::auth::{authorize_assignment_caller, authorize_formation_caller};
use crate::domains::formation::actions::{
    report_formation_status, FormationStatusAck, FormationStatusReport,
};
use crate::domains::formation_assignment::actions::{
    report_assignment_status, reset_assignment_status, StatusAck, StatusReport,
};
use crate::server::middleware::AuthUser;

async fn authorize_assignment(
    state: &AppState,
    user: &AuthUser,
    formation_id: FormationId,
    assignment_id: FormationAssignmentId,
) -> EngineResult<()> {
    let assignment = state
        .deps
        .store
        .get_assignment(assignment_id)
        .await?
        .filter(|fa| fa.formation_id == formation_id)
        .ok_or_else(|| EngineError::not_found("formation assignment", assignment_id))?;
    authorize_assignment_caller(&user.claims, &assignment, &state.deps).await
}

/// PATCH /v1/businessIntegrations/:formation_id/assignments/:assignment_id/status
pub async fn assignment_status_handler(
    Extension(state): Extension<AppState>,
    user: Option<Extension<AuthUser>>,
    Path((formation_id, assignment_id)): Path<(FormationId, FormationAssignmentId)>,
    body: Result<Json<StatusReport>, JsonRejection>,
) -> EngineResult<Json<StatusAck>> {
    let user = AuthUser::require(user)?;
    authorize_assignment(&state, &user, formation_id, assignment_id).await?;
    let Json(report) = body?;

    let ack = report_assignment_status(formation_id, assignment_id, report, &state.deps).await?;
    Ok(Json(ack))
}

/// PATCH /v1/businessIntegrations/:formation_id/assignments/:assignment_id/status/reset
pub async fn assignment_status_reset_handler(
    Extension(state): Extension<AppState>,
    user: Option<Extension<AuthUser>>,
    Path((formation_id, assignment_id)): Path<(FormationId, FormationAssignmentId)>,
    body: Result<Json<StatusReport>, JsonRejection>,
) -> EngineResult<Json<StatusAck>> {
    let user = AuthUser::require(user)?;
    authorize_assignment(&state, &user, formation_id, assignment_id).await?;
    let Json(report) = body?;

    let ack = reset_assignment_status(formation_id, assignment_id, report, &state.deps).await?;
    Ok(Json(ack))
}

/// PATCH /v1/businessIntegrations/:formation_id/status
pub async fn formation_status_handler(
    Extension(state): Extension<AppState>,
    user: Option<Extension<AuthUser>>,
    Path(formation_id): Path<FormationId>,
    body: Result<Json<FormationStatusReport>, JsonRejection>,
) -> EngineResult<Json<FormationStatusAck>> {
    let user = AuthUser::require(user)?;
    let formation = state
        .deps
        .store
        .get_formation(formation_id)
        .await?
        .ok_or_else(|| EngineError::not_found("formation", formation_id))?;
    authorize_formation_caller(&user.claims, &formation)?;
    let Json(report) = body?;

    let ack = report_formation_status(formation_id, report, &state.deps).await?;
    Ok(Json(ack))
}
