//! Webhook dispatch: render, send, interpret, record.
//!
//! Dispatch never fails because the remote side misbehaved. Template,
//! transport and remote failures come back as `DispatchOutcome::Failed`; only
//! store errors propagate.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::Utc;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::common::{
    ErrorCode, FormationAssignmentId, FormationId, NotificationError, NotificationRecordId,
    ParticipantId, TemplateError,
};
use crate::domains::webhook::models::{
    CallbackCorrelation, CallbackSubject, NotificationOutcome, NotificationRecord, Webhook,
    WebhookMode,
};
use crate::domains::webhook::template::{ResponseSpec, TemplateRenderer};
use crate::kernel::{ServerDeps, WebhookRequest, WebhookResponse};

/// A notification ready to be sent: the resolved webhook and its template context
#[derive(Debug, Clone)]
pub struct Notification {
    pub formation_id: FormationId,
    pub subject: CallbackSubject,
    /// "assign", "unassign", "create" or "delete"
    pub operation: String,
    pub assignment_id: Option<FormationAssignmentId>,
    /// Original target, kept even when the call is redirected
    pub target_id: Option<ParticipantId>,
    pub webhook: Webhook,
    pub context: Value,
    /// Replaces the rendered URL when a redirect constraint fired
    pub redirect_url: Option<String>,
}

/// What the participant reported in a response or status callback
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteResult {
    pub state: Option<String>,
    pub configuration: Option<Value>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Synchronous webhook answered with its success status
    Succeeded(RemoteResult),
    /// Synchronous webhook answered with its incomplete status
    Incomplete(RemoteResult),
    /// Asynchronous webhook accepted the request; the result arrives later
    Accepted,
    Failed(NotificationError),
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("{0}")]
    Remote(String),
}

impl DispatchError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            DispatchError::Template(_) => ErrorCode::TemplateError,
            DispatchError::Transport(_) => ErrorCode::TransportError,
            DispatchError::Remote(_) => ErrorCode::RemoteRejection,
        }
    }
}

impl From<DispatchError> for NotificationError {
    fn from(err: DispatchError) -> Self {
        NotificationError::new(err.error_code(), err.to_string())
    }
}

/// Send one notification and record it.
pub async fn dispatch(notification: &Notification, deps: &ServerDeps) -> Result<DispatchOutcome> {
    let renderer = deps.renderer.as_ref();

    let request = match build_request(notification, renderer) {
        Ok(request) => request,
        Err(err) => {
            warn!(
                formation_id = %notification.formation_id,
                webhook_id = %notification.webhook.id,
                error = %err,
                "Failed to render webhook request"
            );
            let outcome = DispatchOutcome::Failed(err.into());
            record(notification, None, None, &outcome, deps).await?;
            return Ok(outcome);
        }
    };

    debug!(
        formation_id = %notification.formation_id,
        operation = %notification.operation,
        method = %request.method,
        url = %request.url,
        "Sending notification"
    );

    let (outcome, status) = match deps.webhook_client.send(&request).await {
        Ok(response) => (
            interpret(notification, renderer, &response),
            Some(response.status),
        ),
        Err(err) => (
            DispatchOutcome::Failed(DispatchError::Transport(format!("{:#}", err)).into()),
            None,
        ),
    };

    let record_id = record(notification, Some(&request), status, &outcome, deps).await?;

    if outcome == DispatchOutcome::Accepted {
        let correlation = CallbackCorrelation {
            subject: notification.subject,
            formation_id: notification.formation_id,
            operation: notification.operation.clone(),
            webhook_id: notification.webhook.id,
            notification_id: record_id,
            accepted_at: Utc::now(),
        };
        deps.store.save_callback(&correlation).await?;
    }

    info!(
        formation_id = %notification.formation_id,
        operation = %notification.operation,
        url = %request.url,
        status = ?status,
        outcome = %outcome_kind(&outcome),
        "Notification dispatched"
    );

    Ok(outcome)
}

fn build_request(
    notification: &Notification,
    renderer: &TemplateRenderer,
) -> Result<WebhookRequest, DispatchError> {
    let webhook = &notification.webhook;
    let rendered = renderer.render_url(&webhook.url_template, &notification.context)?;

    let url = match &notification.redirect_url {
        Some(redirect) => redirect.clone(),
        None => resolve_url(webhook.url.as_deref(), &rendered.path)?,
    };

    let body = webhook
        .input_template
        .as_deref()
        .map(|t| renderer.render_input(t, &notification.context))
        .transpose()?;

    let headers = webhook
        .header_template
        .as_deref()
        .map(|t| renderer.render_headers(t, &notification.context))
        .transpose()?
        .unwrap_or_default();

    Ok(WebhookRequest {
        method: rendered.method.to_uppercase(),
        url,
        headers,
        body,
    })
}

/// Absolute paths are used as-is; relative ones resolve against the base URL.
fn resolve_url(base: Option<&str>, path: &str) -> Result<String, TemplateError> {
    if Url::parse(path).is_ok() {
        return Ok(path.to_string());
    }
    let base = base.ok_or_else(|| {
        TemplateError::new("url", format!("relative path {:?} but the webhook has no base URL", path))
    })?;
    Url::parse(base)
        .and_then(|b| b.join(path))
        .map(|u| u.to_string())
        .map_err(|e| TemplateError::new("url", format!("cannot resolve {:?} against {:?}: {}", path, base, e)))
}

fn interpret(
    notification: &Notification,
    renderer: &TemplateRenderer,
    response: &WebhookResponse,
) -> DispatchOutcome {
    let context = response_context(&notification.context, response);
    let spec = match renderer.render_output(&notification.webhook.output_template, &context) {
        Ok(spec) => spec,
        Err(err) => return DispatchOutcome::Failed(DispatchError::Template(err).into()),
    };

    classify(notification.webhook.mode, response.status, &spec)
}

/// Map a status code onto an outcome using the rendered response spec.
pub fn classify(mode: WebhookMode, status: u16, spec: &ResponseSpec) -> DispatchOutcome {
    let rejection = || {
        let message = spec.error_message().map(str::to_string).unwrap_or_else(|| {
            format!(
                "unexpected status code {} (expected {})",
                status, spec.success_status_code
            )
        });
        DispatchOutcome::Failed(DispatchError::Remote(message).into())
    };

    let result = || RemoteResult {
        state: spec.reported_state().map(str::to_string),
        configuration: spec.configuration(),
        error: spec.error_message().map(str::to_string),
    };

    match mode {
        WebhookMode::AsyncCallback if status == spec.success_status_code => DispatchOutcome::Accepted,
        WebhookMode::AsyncCallback => rejection(),
        WebhookMode::Sync if status == spec.success_status_code => DispatchOutcome::Succeeded(result()),
        WebhookMode::Sync if spec.incomplete_status_code == Some(status) => {
            DispatchOutcome::Incomplete(result())
        }
        WebhookMode::Sync => rejection(),
    }
}

/// The notification context plus `body`, `headers` and `status_code`.
fn response_context(base: &Value, response: &WebhookResponse) -> Value {
    let body = serde_json::from_str::<Value>(&response.body)
        .unwrap_or_else(|_| Value::String(response.body.clone()));
    let headers: BTreeMap<String, String> = response
        .headers
        .iter()
        .map(|(k, v)| (k.to_lowercase(), v.clone()))
        .collect();

    let mut context = base.clone();
    if let Value::Object(map) = &mut context {
        map.insert("body".to_string(), body);
        map.insert("headers".to_string(), serde_json::json!(headers));
        map.insert("status_code".to_string(), Value::from(response.status));
    }
    context
}

fn outcome_kind(outcome: &DispatchOutcome) -> NotificationOutcome {
    match outcome {
        DispatchOutcome::Succeeded(_) => NotificationOutcome::Succeeded,
        DispatchOutcome::Incomplete(_) => NotificationOutcome::Incomplete,
        DispatchOutcome::Accepted => NotificationOutcome::Accepted,
        DispatchOutcome::Failed(_) => NotificationOutcome::Failed,
    }
}

async fn record(
    notification: &Notification,
    request: Option<&WebhookRequest>,
    status: Option<u16>,
    outcome: &DispatchOutcome,
    deps: &ServerDeps,
) -> Result<NotificationRecordId> {
    let error = match outcome {
        DispatchOutcome::Failed(err) => Some(err.clone()),
        _ => None,
    };
    let record = NotificationRecord {
        id: NotificationRecordId::new(),
        formation_id: notification.formation_id,
        assignment_id: notification.assignment_id,
        target_id: notification.target_id,
        webhook_id: notification.webhook.id,
        operation: notification.operation.clone(),
        mode: notification.webhook.mode,
        request_method: request.map(|r| r.method.clone()).unwrap_or_default(),
        request_url: request.map(|r| r.url.clone()).unwrap_or_default(),
        request_body: request.and_then(|r| r.body.clone()),
        outcome: outcome_kind(outcome),
        response_status: status.map(i32::from),
        error,
        created_at: Utc::now(),
    };
    deps.store.insert_notification_record(&record).await?;
    Ok(record.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(success: u16, incomplete: Option<u16>) -> ResponseSpec {
        ResponseSpec {
            config: Some(json!({"k": "v"})),
            state: None,
            error: None,
            success_status_code: success,
            incomplete_status_code: incomplete,
        }
    }

    #[test]
    fn test_sync_status_classification() {
        let s = spec(200, Some(204));
        assert!(matches!(
            classify(WebhookMode::Sync, 200, &s),
            DispatchOutcome::Succeeded(RemoteResult { configuration: Some(_), .. })
        ));
        assert!(matches!(
            classify(WebhookMode::Sync, 204, &s),
            DispatchOutcome::Incomplete(_)
        ));
        match classify(WebhookMode::Sync, 500, &s) {
            DispatchOutcome::Failed(err) => assert_eq!(err.error_code, ErrorCode::RemoteRejection),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_async_only_confirms_acceptance() {
        let s = spec(202, None);
        assert_eq!(classify(WebhookMode::AsyncCallback, 202, &s), DispatchOutcome::Accepted);
        assert!(matches!(
            classify(WebhookMode::AsyncCallback, 400, &s),
            DispatchOutcome::Failed(_)
        ));
    }

    #[test]
    fn test_rejection_prefers_rendered_error() {
        let mut s = spec(200, None);
        s.error = Some("tenant not found".into());
        match classify(WebhookMode::Sync, 404, &s) {
            DispatchOutcome::Failed(err) => assert_eq!(err.message, "tenant not found"),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_relative_path_joins_base_url() {
        assert_eq!(
            resolve_url(Some("https://hooks.example.com/"), "/v1/mappings/1").unwrap(),
            "https://hooks.example.com/v1/mappings/1"
        );
        assert_eq!(
            resolve_url(None, "https://other.example.com/x").unwrap(),
            "https://other.example.com/x"
        );
        assert!(resolve_url(None, "/relative").is_err());
    }
}
