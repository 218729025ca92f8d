//! Ordered webhook lookup.
//!
//! A participant's own webhook of the requested type wins, then its
//! template's. A runtime context with neither borrows its parent runtime's.

use anyhow::Result;

use crate::common::FormationTemplateId;
use crate::domains::participant::{Participant, ParticipantKind};
use crate::domains::webhook::models::{Webhook, WebhookOwner, WebhookType};
use crate::kernel::BaseFormationStore;

pub async fn resolve_participant_webhook(
    store: &dyn BaseFormationStore,
    participant: &Participant,
    webhook_type: WebhookType,
) -> Result<Option<Webhook>> {
    if let Some(webhook) = own_or_template_webhook(store, participant, webhook_type).await? {
        return Ok(Some(webhook));
    }

    if participant.kind == ParticipantKind::RuntimeContext {
        if let Some(parent_id) = participant.parent_id {
            if let Some(parent) = store.get_participant(parent_id).await? {
                return own_or_template_webhook(store, &parent, webhook_type).await;
            }
        }
    }

    Ok(None)
}

async fn own_or_template_webhook(
    store: &dyn BaseFormationStore,
    participant: &Participant,
    webhook_type: WebhookType,
) -> Result<Option<Webhook>> {
    let own = store
        .list_webhooks(&WebhookOwner::Participant(participant.id))
        .await?;
    if let Some(webhook) = own.into_iter().find(|w| w.webhook_type == webhook_type) {
        return Ok(Some(webhook));
    }

    let Some(template_id) = participant.template_id else {
        return Ok(None);
    };
    let inherited = store
        .list_webhooks(&WebhookOwner::ParticipantTemplate(template_id))
        .await?;
    Ok(inherited.into_iter().find(|w| w.webhook_type == webhook_type))
}

/// The formation template's lifecycle webhook, if it declares one
pub async fn resolve_lifecycle_webhook(
    store: &dyn BaseFormationStore,
    template_id: FormationTemplateId,
) -> Result<Option<Webhook>> {
    let webhooks = store
        .list_webhooks(&WebhookOwner::FormationTemplate(template_id))
        .await?;
    Ok(webhooks
        .into_iter()
        .find(|w| w.webhook_type == WebhookType::FormationLifecycle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::participant::ParticipantTemplate;
    use crate::domains::webhook::models::WebhookMode;
    use crate::kernel::InMemoryFormationStore;

    fn webhook(owner: WebhookOwner, webhook_type: WebhookType) -> Webhook {
        Webhook::new(
            owner,
            webhook_type,
            WebhookMode::Sync,
            r#"{"path": "http://x", "method": "POST"}"#,
            r#"{"success_status_code": 200}"#,
        )
    }

    #[tokio::test]
    async fn test_participant_webhook_wins_over_template() {
        let store = InMemoryFormationStore::new();
        let template = ParticipantTemplate::new("tmpl");
        store.save_participant_template(&template).await.unwrap();
        let app = Participant::new(ParticipantKind::Application, "app", "t").with_template(template.id);
        store.save_participant(&app).await.unwrap();

        let inherited = webhook(
            WebhookOwner::ParticipantTemplate(template.id),
            WebhookType::TenantMapping,
        );
        store.save_webhook(&inherited).await.unwrap();
        let found = resolve_participant_webhook(&store, &app, WebhookType::TenantMapping)
            .await
            .unwrap();
        assert_eq!(found.map(|w| w.id), Some(inherited.id));

        let own = webhook(WebhookOwner::Participant(app.id), WebhookType::TenantMapping);
        store.save_webhook(&own).await.unwrap();
        let found = resolve_participant_webhook(&store, &app, WebhookType::TenantMapping)
            .await
            .unwrap();
        assert_eq!(found.map(|w| w.id), Some(own.id));
    }

    #[tokio::test]
    async fn test_non_matching_type_is_ignored() {
        let store = InMemoryFormationStore::new();
        let app = Participant::new(ParticipantKind::Application, "app", "t");
        store.save_participant(&app).await.unwrap();
        store
            .save_webhook(&webhook(
                WebhookOwner::Participant(app.id),
                WebhookType::FormationLifecycle,
            ))
            .await
            .unwrap();

        let found = resolve_participant_webhook(&store, &app, WebhookType::TenantMapping)
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_runtime_context_falls_back_to_parent_runtime() {
        let store = InMemoryFormationStore::new();
        let runtime = Participant::new(ParticipantKind::Runtime, "rt", "t");
        store.save_participant(&runtime).await.unwrap();
        let ctx = Participant::new(ParticipantKind::RuntimeContext, "ctx", "t").with_parent(runtime.id);
        store.save_participant(&ctx).await.unwrap();

        let parent_hook = webhook(WebhookOwner::Participant(runtime.id), WebhookType::TenantMapping);
        store.save_webhook(&parent_hook).await.unwrap();

        let found = resolve_participant_webhook(&store, &ctx, WebhookType::TenantMapping)
            .await
            .unwrap();
        assert_eq!(found.map(|w| w.id), Some(parent_hook.id));
    }
}
