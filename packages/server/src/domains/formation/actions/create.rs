//! Create formation action

use serde::Deserialize;
use tracing::info;

use crate::common::{
    CustomerTenantContext, EngineError, EngineResult, FormationId, FormationTemplateId,
};
use crate::domains::formation::actions::lifecycle::drive_lifecycle;
use crate::domains::formation::models::{Formation, FormationState, FormationTemplate};
use crate::domains::webhook::resolver::resolve_lifecycle_webhook;
use crate::kernel::ServerDeps;

/// Input for creating a formation
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateFormation {
    pub name: String,
    pub template_id: FormationTemplateId,
    pub tenant: CustomerTenantContext,
}

pub(crate) async fn load_template(
    template_id: FormationTemplateId,
    deps: &ServerDeps,
) -> EngineResult<FormationTemplate> {
    deps.store
        .get_formation_template(template_id)
        .await?
        .ok_or_else(|| EngineError::not_found("formation template", template_id))
}

pub(crate) async fn load_formation(
    formation_id: FormationId,
    deps: &ServerDeps,
) -> EngineResult<Formation> {
    deps.store
        .get_formation(formation_id)
        .await?
        .ok_or_else(|| EngineError::not_found("formation", formation_id))
}

/// Create a formation. Without a lifecycle webhook it is READY right away;
/// otherwise it starts INITIAL and the create notification decides.
pub async fn create_formation(input: CreateFormation, deps: &ServerDeps) -> EngineResult<Formation> {
    if input.name.trim().is_empty() {
        return Err(EngineError::invalid("formation name must not be empty"));
    }
    let template = load_template(input.template_id, deps).await?;

    let has_lifecycle = resolve_lifecycle_webhook(deps.store.as_ref(), template.id)
        .await?
        .is_some();
    let state = if has_lifecycle {
        FormationState::Initial
    } else {
        FormationState::Ready
    };

    let formation = Formation::new(input.name, template.id, input.tenant, state);
    deps.store.insert_formation(&formation).await?;
    info!(
        formation_id = %formation.id,
        name = %formation.name,
        template = %template.name,
        state = %formation.state,
        "Formation created"
    );

    if !has_lifecycle {
        return Ok(formation);
    }

    let formation_id = formation.id;
    drive_lifecycle(formation, &template, deps)
        .await?
        .ok_or_else(|| EngineError::not_found("formation", formation_id))
}
