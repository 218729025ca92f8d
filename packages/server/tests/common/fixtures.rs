//! Test fixtures for creating test data.
//!
//! These fixtures write straight into the store and return the stored models.

use formation_core::common::CustomerTenantContext;
use formation_core::domains::formation::actions::{create_formation, CreateFormation};
use formation_core::domains::formation::models::{Formation, FormationTemplate};
use formation_core::domains::participant::{Participant, ParticipantKind};
use formation_core::domains::webhook::{Webhook, WebhookMode, WebhookOwner, WebhookType};
use formation_core::kernel::{BaseFormationStore, ServerDeps};

pub const TENANT: &str = "tenant-a";

/// URL template sending PATCH for assign and DELETE for unassign
pub const TENANT_MAPPING_URL_TEMPLATE: &str = r#"{"path": "/v1/tenant-mappings/{{ formation.id }}", "method": "{% if operation == 'assign' %}PATCH{% else %}DELETE{% endif %}"}"#;

/// Reads `config`, `state` and `error` from the response body; 200 succeeds,
/// 204 asks for another round
pub const SYNC_OUTPUT_TEMPLATE: &str = r#"{"config": {% if body.config is defined %}{{ body.config | tojson }}{% else %}null{% endif %}, "state": {% if body.state is defined %}"{{ body.state }}"{% else %}null{% endif %}, "error": {% if body.error is defined %}"{{ body.error }}"{% else %}null{% endif %}, "success_status_code": 200, "incomplete_status_code": 204}"#;

pub const ASYNC_OUTPUT_TEMPLATE: &str = r#"{"success_status_code": 202}"#;

pub const LIFECYCLE_URL_TEMPLATE: &str = r#"{"path": "/v1/formation-lifecycle", "method": "{% if operation == 'create' %}POST{% else %}DELETE{% endif %}"}"#;

/// Request URL the tenant mapping template produces for a formation
pub fn mapping_url(base: &str, formation: &Formation) -> String {
    format!("{}/v1/tenant-mappings/{}", base.trim_end_matches('/'), formation.id)
}

pub fn lifecycle_url(base: &str) -> String {
    format!("{}/v1/formation-lifecycle", base.trim_end_matches('/'))
}

pub async fn create_template(deps: &ServerDeps, name: &str) -> FormationTemplate {
    let template = FormationTemplate::new(name);
    deps.store
        .save_formation_template(&template)
        .await
        .expect("Failed to save formation template");
    template
}

pub async fn create_reset_template(deps: &ServerDeps, name: &str) -> FormationTemplate {
    let template = FormationTemplate::new(name).with_reset_support();
    deps.store
        .save_formation_template(&template)
        .await
        .expect("Failed to save formation template");
    template
}

pub async fn create_formation_for(deps: &ServerDeps, template: &FormationTemplate) -> Formation {
    create_formation(
        CreateFormation {
            name: format!("{}-formation", template.name),
            template_id: template.id,
            tenant: CustomerTenantContext::for_tenant(TENANT),
        },
        deps,
    )
    .await
    .expect("Failed to create formation")
}

pub async fn create_application(deps: &ServerDeps, name: &str) -> Participant {
    save_participant(deps, Participant::new(ParticipantKind::Application, name, TENANT)).await
}

pub async fn save_participant(deps: &ServerDeps, participant: Participant) -> Participant {
    deps.store
        .save_participant(&participant)
        .await
        .expect("Failed to save participant");
    participant
}

/// Give a participant a synchronous tenant mapping webhook under `base_url`.
pub async fn add_sync_webhook(deps: &ServerDeps, participant: &Participant, base_url: &str) -> Webhook {
    save_webhook(
        deps,
        Webhook::new(
            WebhookOwner::Participant(participant.id),
            WebhookType::TenantMapping,
            WebhookMode::Sync,
            TENANT_MAPPING_URL_TEMPLATE,
            SYNC_OUTPUT_TEMPLATE,
        )
        .with_url(base_url),
    )
    .await
}

pub async fn add_async_webhook(deps: &ServerDeps, participant: &Participant, base_url: &str) -> Webhook {
    save_webhook(
        deps,
        Webhook::new(
            WebhookOwner::Participant(participant.id),
            WebhookType::TenantMapping,
            WebhookMode::AsyncCallback,
            TENANT_MAPPING_URL_TEMPLATE,
            ASYNC_OUTPUT_TEMPLATE,
        )
        .with_url(base_url),
    )
    .await
}

pub async fn add_lifecycle_webhook(
    deps: &ServerDeps,
    template: &FormationTemplate,
    mode: WebhookMode,
    base_url: &str,
) -> Webhook {
    let output = match mode {
        WebhookMode::Sync => SYNC_OUTPUT_TEMPLATE,
        WebhookMode::AsyncCallback => ASYNC_OUTPUT_TEMPLATE,
    };
    save_webhook(
        deps,
        Webhook::new(
            WebhookOwner::FormationTemplate(template.id),
            WebhookType::FormationLifecycle,
            mode,
            LIFECYCLE_URL_TEMPLATE,
            output,
        )
        .with_url(base_url),
    )
    .await
}

pub async fn save_webhook(deps: &ServerDeps, webhook: Webhook) -> Webhook {
    deps.store
        .save_webhook(&webhook)
        .await
        .expect("Failed to save webhook");
    webhook
}
