//! Delete formation action

use tracing::info;

use crate::common::{EngineError, EngineResult, FormationId};
use crate::domains::formation::actions::create::{load_formation, load_template};
use crate::domains::formation::actions::lifecycle::{apply_formation_event, drive_lifecycle};
use crate::domains::formation::events::FormationEvent;
use crate::domains::formation::models::Formation;
use crate::kernel::ServerDeps;

/// Delete a formation. Returns `None` once it is gone, or the formation still
/// waiting in DELETING / failed in DELETE_ERROR.
pub async fn delete_formation(
    formation_id: FormationId,
    deps: &ServerDeps,
) -> EngineResult<Option<Formation>> {
    let formation = load_formation(formation_id, deps).await?;
    if !deps.store.list_assignments(formation_id).await?.is_empty() {
        return Err(EngineError::FormationNotEmpty(formation_id));
    }
    let template = load_template(formation.template_id, deps).await?;

    let formation = if formation.state.is_delete_side() {
        formation
    } else {
        match apply_formation_event(
            formation_id,
            Some(formation.revision),
            &FormationEvent::DeleteRequested,
            deps,
        )
        .await?
        {
            Some(f) if f.state.is_delete_side() => f,
            Some(_) => return Err(EngineError::invalid("formation changed while being deleted")),
            None => return Ok(None),
        }
    };

    info!(formation_id = %formation_id, "Deleting formation");
    Ok(drive_lifecycle(formation, &template, deps).await?)
}
