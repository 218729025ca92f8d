//! Webhooks: declaration, template rendering, resolution and dispatch.

pub mod dispatcher;
pub mod models;
pub mod resolver;
pub mod template;

pub use dispatcher::{dispatch, DispatchError, DispatchOutcome, Notification, RemoteResult};
pub use models::{Webhook, WebhookMode, WebhookOwner, WebhookType};
pub use template::TemplateRenderer;
