use crate::common::NotificationError;
use crate::domains::formation::models::FormationState;

/// Formation lifecycle events
#[derive(Debug, Clone, PartialEq)]
pub enum FormationEvent {
    /// Deletion was requested; the formation enters DELETING
    DeleteRequested,

    /// The template declares no lifecycle webhook
    NotificationSkipped,

    /// An asynchronous lifecycle webhook accepted the notification
    NotificationAccepted,

    /// A terminal result arrived, from the webhook response or the Status API
    ResultReturned {
        state: FormationState,
        error: Option<NotificationError>,
    },

    /// Resynchronization reopens a failed lifecycle round
    Reopened,
}
