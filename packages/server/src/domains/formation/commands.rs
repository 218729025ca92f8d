use crate::common::{FormationId, NotificationError};
use crate::domains::formation::models::Formation;

/// Formation commands - side effects decided by the lifecycle machine
#[derive(Debug, Clone, PartialEq)]
pub enum FormationCommand {
    Persist(Formation),

    /// Remove the formation row; only issued once deletion succeeded
    HardDelete(FormationId),

    RecordError {
        formation_id: FormationId,
        error: NotificationError,
    },
}
