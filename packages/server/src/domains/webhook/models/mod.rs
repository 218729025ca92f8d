pub mod callback;
pub mod notification_record;
pub mod webhook;

pub use callback::{CallbackCorrelation, CallbackSubject};
pub use notification_record::{NotificationOutcome, NotificationRecord};
pub use webhook::{Webhook, WebhookMode, WebhookOwner, WebhookType};
