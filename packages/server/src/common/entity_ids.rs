//! Typed ID definitions for every persisted entity.

pub use super::id::Id;

// ============================================================================
// Entity marker types
// ============================================================================

pub struct Formation;
pub struct FormationTemplate;
pub struct FormationAssignment;
/// Applications, runtimes and runtime contexts share one id space.
pub struct Participant;
pub struct ParticipantTemplate;
pub struct Webhook;
pub struct FormationConstraint;
pub struct NotificationRecord;

// ============================================================================
// Type aliases
// ============================================================================

pub type FormationId = Id<Formation>;
pub type FormationTemplateId = Id<FormationTemplate>;
pub type FormationAssignmentId = Id<FormationAssignment>;
pub type ParticipantId = Id<Participant>;
pub type ParticipantTemplateId = Id<ParticipantTemplate>;
pub type WebhookId = Id<Webhook>;
pub type ConstraintId = Id<FormationConstraint>;
pub type NotificationRecordId = Id<NotificationRecord>;
