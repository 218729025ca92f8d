pub mod app_state;
pub mod entity_ids;
pub mod errors;
pub mod id;
pub mod types;

pub use app_state::AppState;
pub use entity_ids::*;
pub use errors::{EngineError, EngineResult, TemplateError};
pub use types::{CustomerTenantContext, ErrorCode, NotificationError};
