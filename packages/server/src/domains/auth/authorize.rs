//! Status API caller authorization
//!
//! A caller may report on an assignment when it owns the assignment's target
//! or source participant. Ownership means one of:
//! - the caller is the integration system the participant is registered under
//! - the caller is the participant itself (application or runtime tokens)
//! - the caller's tenant owns the participant, or the parent runtime of a
//!   runtime context

use tracing::debug;

use crate::common::{EngineError, EngineResult};
use crate::domains::auth::jwt::{Claims, ConsumerType};
use crate::domains::formation::models::Formation;
use crate::domains::formation_assignment::models::FormationAssignment;
use crate::domains::participant::Participant;
use crate::kernel::ServerDeps;

fn owns_directly(claims: &Claims, participant: &Participant) -> bool {
    match claims.consumer_type {
        ConsumerType::IntegrationSystem => {
            participant.integration_system_id.as_deref() == Some(claims.sub.as_str())
        }
        ConsumerType::Application | ConsumerType::Runtime => {
            claims.sub == participant.id.to_string() || claims.tenant_id == participant.owner_tenant
        }
        ConsumerType::User => claims.tenant_id == participant.owner_tenant,
    }
}

async fn owns(claims: &Claims, participant: &Participant, deps: &ServerDeps) -> EngineResult<bool> {
    if owns_directly(claims, participant) {
        return Ok(true);
    }
    let Some(parent_id) = participant.parent_id else {
        return Ok(false);
    };
    match deps.store.get_participant(parent_id).await? {
        Some(parent) => Ok(parent.owner_tenant == claims.tenant_id),
        None => Ok(false),
    }
}

/// Check that the caller may report status for `assignment`.
pub async fn authorize_assignment_caller(
    claims: &Claims,
    assignment: &FormationAssignment,
    deps: &ServerDeps,
) -> EngineResult<()> {
    for participant_id in [assignment.target, assignment.source] {
        if let Some(participant) = deps.store.get_participant(participant_id).await? {
            if owns(claims, &participant, deps).await? {
                return Ok(());
            }
        }
    }

    debug!(
        consumer = %claims.sub,
        consumer_type = %claims.consumer_type,
        assignment_id = %assignment.id,
        "Caller owns neither side of the assignment"
    );
    Err(EngineError::Unauthorized)
}

/// Check that the caller may report status for a formation: its tenant must
/// be the formation's tenant.
pub fn authorize_formation_caller(claims: &Claims, formation: &Formation) -> EngineResult<()> {
    if formation.tenant.tenant_id == claims.tenant_id {
        return Ok(());
    }
    debug!(
        consumer = %claims.sub,
        formation_id = %formation.id,
        "Caller tenant does not own the formation"
    );
    Err(EngineError::Unauthorized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{CustomerTenantContext, FormationTemplateId};
    use crate::domains::formation::models::FormationState;
    use crate::domains::participant::ParticipantKind;
    use crate::kernel::TestDependencies;

    fn claims(sub: &str, tenant: &str, consumer_type: ConsumerType) -> Claims {
        Claims {
            sub: sub.to_string(),
            tenant_id: tenant.to_string(),
            consumer_type,
            exp: 0,
            iat: 0,
            iss: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn test_integration_system_owning_target_is_authorized() {
        let test_deps = TestDependencies::new();
        let deps = test_deps.server_deps();

        let source = Participant::new(ParticipantKind::Runtime, "rt", "tenant-a");
        let target = Participant::new(ParticipantKind::Application, "app", "tenant-b")
            .with_integration_system("system-1");
        deps.store.save_participant(&source).await.unwrap();
        deps.store.save_participant(&target).await.unwrap();

        let fa = FormationAssignment::new(
            crate::common::FormationId::new(),
            (source.id, source.kind),
            (target.id, target.kind),
        );

        let caller = claims("system-1", "tenant-x", ConsumerType::IntegrationSystem);
        assert!(authorize_assignment_caller(&caller, &fa, &deps).await.is_ok());

        let stranger = claims("system-2", "tenant-x", ConsumerType::IntegrationSystem);
        assert!(matches!(
            authorize_assignment_caller(&stranger, &fa, &deps).await,
            Err(EngineError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_parent_runtime_tenant_owns_runtime_context() {
        let test_deps = TestDependencies::new();
        let deps = test_deps.server_deps();

        let runtime = Participant::new(ParticipantKind::Runtime, "rt", "tenant-rt");
        let context = Participant::new(ParticipantKind::RuntimeContext, "ctx", "tenant-consumer")
            .with_parent(runtime.id);
        deps.store.save_participant(&runtime).await.unwrap();
        deps.store.save_participant(&context).await.unwrap();

        let fa = FormationAssignment::new(
            crate::common::FormationId::new(),
            (context.id, context.kind),
            (context.id, context.kind),
        );

        let caller = claims("user-1", "tenant-rt", ConsumerType::User);
        assert!(authorize_assignment_caller(&caller, &fa, &deps).await.is_ok());
    }

    #[test]
    fn test_formation_caller_must_share_tenant() {
        let formation = Formation::new(
            "f",
            FormationTemplateId::new(),
            CustomerTenantContext::for_tenant("tenant-a"),
            FormationState::Ready,
        );
        assert!(authorize_formation_caller(&claims("u", "tenant-a", ConsumerType::User), &formation).is_ok());
        assert!(authorize_formation_caller(&claims("u", "tenant-b", ConsumerType::User), &formation).is_err());
    }
}
