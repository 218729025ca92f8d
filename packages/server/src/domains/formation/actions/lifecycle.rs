//! Formation lifecycle notifications
//!
//! Sends the create/delete notification through the formation template's
//! lifecycle webhook and applies the outcome through `FormationMachine`.

use anyhow::Result;
use serde_json::json;
use tracing::{info, warn};

use crate::common::{FormationId, NotificationError};
use crate::domains::formation::commands::FormationCommand;
use crate::domains::formation::events::FormationEvent;
use crate::domains::formation::machines::FormationMachine;
use crate::domains::formation::models::{
    Formation, FormationState, FormationTemplate, LifecycleOperation,
};
use crate::domains::formation_assignment::notifications::{formation_json, webhook_json};
use crate::domains::webhook::models::CallbackSubject;
use crate::domains::webhook::resolver::resolve_lifecycle_webhook;
use crate::domains::webhook::{dispatch, DispatchOutcome, Notification, RemoteResult};
use crate::kernel::ServerDeps;

/// Send the lifecycle notification owed by the formation's current state.
pub async fn notify_lifecycle(
    formation: &Formation,
    template: &FormationTemplate,
    deps: &ServerDeps,
) -> Result<FormationEvent> {
    let Some(webhook) = resolve_lifecycle_webhook(deps.store.as_ref(), template.id).await? else {
        return Ok(FormationEvent::NotificationSkipped);
    };
    let operation = formation.lifecycle_operation();

    let context = json!({
        "operation": operation.template_name(),
        "formation": formation_json(formation, template),
        "customer_tenant": formation.tenant,
        "webhook": webhook_json(&webhook),
    });
    let notification = Notification {
        formation_id: formation.id,
        subject: CallbackSubject::Formation(formation.id),
        operation: operation.template_name().to_string(),
        assignment_id: None,
        target_id: None,
        webhook,
        context,
        redirect_url: None,
    };

    let outcome = dispatch(&notification, deps).await?;
    Ok(event_from_dispatch(operation, outcome))
}

fn event_from_dispatch(operation: LifecycleOperation, outcome: DispatchOutcome) -> FormationEvent {
    let failed = |error: NotificationError| FormationEvent::ResultReturned {
        state: operation.error_state(),
        error: Some(error),
    };

    match outcome {
        DispatchOutcome::Accepted => FormationEvent::NotificationAccepted,
        DispatchOutcome::Failed(err) => failed(err),
        DispatchOutcome::Incomplete(_) => failed(NotificationError::client(
            "lifecycle notifications cannot ask for another round",
        )),
        DispatchOutcome::Succeeded(RemoteResult {
            error: Some(message),
            ..
        }) => failed(NotificationError::client(message)),
        DispatchOutcome::Succeeded(RemoteResult { state: None, .. }) => FormationEvent::ResultReturned {
            state: FormationState::Ready,
            error: None,
        },
        DispatchOutcome::Succeeded(RemoteResult {
            state: Some(raw), ..
        }) => match raw.parse::<FormationState>() {
            Ok(FormationState::Ready) => FormationEvent::ResultReturned {
                state: FormationState::Ready,
                error: None,
            },
            Ok(state) if state == operation.error_state() => failed(NotificationError::client(
                format!("lifecycle webhook reported {}", state),
            )),
            _ => failed(NotificationError::client(format!(
                "state {:?} is not valid for {} notifications",
                raw,
                operation.template_name()
            ))),
        },
    }
}

/// Apply a lifecycle event under the formation lock. Returns the formation
/// as stored afterwards; `None` once it has been removed.
///
/// With `expected_revision`, the event is dropped if the formation changed
/// since it was read.
pub async fn apply_formation_event(
    formation_id: FormationId,
    expected_revision: Option<i64>,
    event: &FormationEvent,
    deps: &ServerDeps,
) -> Result<Option<Formation>> {
    let _lock = deps.locks.lock(formation_id).await;

    let Some(current) = deps.store.get_formation(formation_id).await? else {
        return Ok(None);
    };
    if expected_revision.is_some_and(|r| r != current.revision) {
        info!(
            formation_id = %formation_id,
            expected = ?expected_revision,
            revision = current.revision,
            "Formation changed in the meantime, dropping stale result"
        );
        return Ok(Some(current));
    }

    let mut machine = FormationMachine::new(current.clone());
    let mut stored = Some(current);

    for command in machine.decide(event) {
        match command {
            FormationCommand::Persist(formation) => {
                deps.store.update_formation(&formation).await?;
                stored = Some(formation);
            }
            FormationCommand::HardDelete(id) => {
                if !deps.store.list_assignments(id).await?.is_empty() {
                    warn!(formation_id = %id, "Formation still has assignments, keeping it in DELETING");
                    continue;
                }
                deps.store.delete_formation(id).await?;
                deps.store
                    .delete_callback(CallbackSubject::Formation(id))
                    .await?;
                info!(formation_id = %id, "Formation removed");
                stored = None;
            }
            FormationCommand::RecordError {
                formation_id,
                error,
            } => {
                warn!(
                    formation_id = %formation_id,
                    error_code = %error.error_code,
                    error = %error.message,
                    "Formation lifecycle notification failed"
                );
            }
        }
    }

    if matches!(event, FormationEvent::ResultReturned { .. }) {
        deps.store
            .delete_callback(CallbackSubject::Formation(formation_id))
            .await?;
    }

    Ok(stored)
}

/// Notify and apply in one go. The lock is not held while the webhook runs.
pub async fn drive_lifecycle(
    formation: Formation,
    template: &FormationTemplate,
    deps: &ServerDeps,
) -> Result<Option<Formation>> {
    let revision = formation.revision;
    let event = notify_lifecycle(&formation, template, deps).await?;
    let stored = apply_formation_event(formation.id, Some(revision), &event, deps).await?;

    if stored.is_none() {
        deps.locks.forget(formation.id);
    }
    Ok(stored)
}
