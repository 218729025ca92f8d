//! Consumer-facing formation routes
//!
//! Thin JSON wrappers over `domains::formation::actions`. Notification
//! failures are not HTTP errors: they come back inside the processing
//! reports and through the status route.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Extension, Path, Query};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::common::{AppState, EngineResult, FormationId, ParticipantId};
use crate::domains::formation::actions::{
    self, CreateFormation, FormationStatusView, ResyncReport,
};
use crate::domains::formation::models::Formation;
use crate::domains::formation_assignment::models::FormationAssignment;
use crate::domains::formation_assignment::ProcessingReport;
use crate::domains::webhook::models::NotificationRecord;
use crate::server::middleware::AuthUser;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssignParticipantRequest {
    pub participant_id: ParticipantId,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResynchronizeParams {
    #[serde(default)]
    pub reset: bool,
}

#[derive(Debug, Serialize)]
pub struct DeleteFormationResponse {
    pub removed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formation: Option<Formation>,
}

/// POST /v1/formations
pub async fn create_formation_handler(
    Extension(state): Extension<AppState>,
    user: Option<Extension<AuthUser>>,
    body: Result<Json<CreateFormation>, JsonRejection>,
) -> EngineResult<(StatusCode, Json<Formation>)> {
    AuthUser::require(user)?;
    let Json(input) = body?;
    let formation = actions::create_formation(input, &state.deps).await?;
    Ok((StatusCode::CREATED, Json(formation)))
}

/// DELETE /v1/formations/:formation_id
pub async fn delete_formation_handler(
    Extension(state): Extension<AppState>,
    user: Option<Extension<AuthUser>>,
    Path(formation_id): Path<FormationId>,
) -> EngineResult<Json<DeleteFormationResponse>> {
    AuthUser::require(user)?;
    let formation = actions::delete_formation(formation_id, &state.deps).await?;
    Ok(Json(DeleteFormationResponse {
        removed: formation.is_none(),
        formation,
    }))
}

/// POST /v1/formations/:formation_id/participants
pub async fn assign_participant_handler(
    Extension(state): Extension<AppState>,
    user: Option<Extension<AuthUser>>,
    Path(formation_id): Path<FormationId>,
    body: Result<Json<AssignParticipantRequest>, JsonRejection>,
) -> EngineResult<Json<ProcessingReport>> {
    AuthUser::require(user)?;
    let Json(request) = body?;
    let report =
        actions::assign_participant(formation_id, request.participant_id, &state.deps).await?;
    Ok(Json(report))
}

/// DELETE /v1/formations/:formation_id/participants/:participant_id
pub async fn unassign_participant_handler(
    Extension(state): Extension<AppState>,
    user: Option<Extension<AuthUser>>,
    Path((formation_id, participant_id)): Path<(FormationId, ParticipantId)>,
) -> EngineResult<Json<ProcessingReport>> {
    AuthUser::require(user)?;
    let report = actions::unassign_participant(formation_id, participant_id, &state.deps).await?;
    Ok(Json(report))
}

/// POST /v1/formations/:formation_id/resynchronize?reset=bool
pub async fn resynchronize_handler(
    Extension(state): Extension<AppState>,
    user: Option<Extension<AuthUser>>,
    Path(formation_id): Path<FormationId>,
    params: Result<Query<ResynchronizeParams>, QueryRejection>,
) -> EngineResult<Json<ResyncReport>> {
    AuthUser::require(user)?;
    let Query(params) = params?;
    let report =
        actions::resynchronize_formation(formation_id, params.reset, &state.deps).await?;
    Ok(Json(report))
}

/// GET /v1/formations/:formation_id/status
pub async fn formation_status_handler(
    Extension(state): Extension<AppState>,
    user: Option<Extension<AuthUser>>,
    Path(formation_id): Path<FormationId>,
) -> EngineResult<Json<FormationStatusView>> {
    AuthUser::require(user)?;
    Ok(Json(actions::formation_status(formation_id, &state.deps).await?))
}

/// GET /v1/formations/:formation_id/assignments
pub async fn list_assignments_handler(
    Extension(state): Extension<AppState>,
    user: Option<Extension<AuthUser>>,
    Path(formation_id): Path<FormationId>,
) -> EngineResult<Json<Vec<FormationAssignment>>> {
    AuthUser::require(user)?;
    Ok(Json(actions::list_assignments(formation_id, &state.deps).await?))
}

/// GET /v1/formations/:formation_id/notifications
pub async fn list_notifications_handler(
    Extension(state): Extension<AppState>,
    user: Option<Extension<AuthUser>>,
    Path(formation_id): Path<FormationId>,
) -> EngineResult<Json<Vec<NotificationRecord>>> {
    AuthUser::require(user)?;
    Ok(Json(actions::list_notifications(formation_id, &state.deps).await?))
}
