//! Storage port for formations, assignments and everything they reference.
//!
//! Membership is not stored separately: a participant belongs to a formation
//! while at least one assignment involves it.

pub mod memory;
pub mod postgres;

pub use memory::InMemoryFormationStore;
pub use postgres::PostgresFormationStore;

use anyhow::Result;
use async_trait::async_trait;

use crate::common::{
    ConstraintId, FormationAssignmentId, FormationId, FormationTemplateId, ParticipantId,
    ParticipantTemplateId,
};
use crate::domains::formation::models::{Formation, FormationTemplate};
use crate::domains::formation_assignment::models::FormationAssignment;
use crate::domains::formation_constraint::models::{
    ConstraintType, DestinationRecord, FormationConstraint, TargetOperation,
};
use crate::domains::participant::{Participant, ParticipantTemplate};
use crate::domains::webhook::models::{
    CallbackCorrelation, CallbackSubject, NotificationRecord, Webhook, WebhookOwner,
};

/// Derives the rows to insert from a formation's current assignments
pub type AssignmentPlan<'a> =
    dyn Fn(&[FormationAssignment]) -> Vec<FormationAssignment> + Send + Sync + 'a;

#[async_trait]
pub trait BaseFormationStore: Send + Sync {
    // Templates
    async fn save_formation_template(&self, template: &FormationTemplate) -> Result<()>;
    async fn get_formation_template(&self, id: FormationTemplateId)
        -> Result<Option<FormationTemplate>>;
    async fn save_participant_template(&self, template: &ParticipantTemplate) -> Result<()>;
    async fn get_participant_template(
        &self,
        id: ParticipantTemplateId,
    ) -> Result<Option<ParticipantTemplate>>;

    // Participants
    async fn save_participant(&self, participant: &Participant) -> Result<()>;
    async fn get_participant(&self, id: ParticipantId) -> Result<Option<Participant>>;

    // Webhooks (insert or replace by ID)
    async fn save_webhook(&self, webhook: &Webhook) -> Result<()>;
    async fn list_webhooks(&self, owner: &WebhookOwner) -> Result<Vec<Webhook>>;

    // Formations
    async fn insert_formation(&self, formation: &Formation) -> Result<()>;
    async fn update_formation(&self, formation: &Formation) -> Result<()>;
    async fn get_formation(&self, id: FormationId) -> Result<Option<Formation>>;
    async fn delete_formation(&self, id: FormationId) -> Result<bool>;
    async fn list_formations_for_participant(&self, participant_id: ParticipantId)
        -> Result<Vec<Formation>>;

    // Assignments
    async fn insert_assignment(&self, assignment: &FormationAssignment) -> Result<()>;
    /// Reads the formation's assignments and inserts the rows `plan` derives
    /// from them as one step, serialized per formation across processes.
    async fn insert_planned_assignments(
        &self,
        formation_id: FormationId,
        plan: &AssignmentPlan<'_>,
    ) -> Result<Vec<FormationAssignment>>;
    async fn update_assignment(&self, assignment: &FormationAssignment) -> Result<()>;
    async fn get_assignment(&self, id: FormationAssignmentId)
        -> Result<Option<FormationAssignment>>;
    async fn get_assignment_by_pair(
        &self,
        formation_id: FormationId,
        source: ParticipantId,
        target: ParticipantId,
    ) -> Result<Option<FormationAssignment>>;
    async fn list_assignments(&self, formation_id: FormationId) -> Result<Vec<FormationAssignment>>;
    async fn list_assignments_for_participant(
        &self,
        formation_id: FormationId,
        participant_id: ParticipantId,
    ) -> Result<Vec<FormationAssignment>>;
    async fn delete_assignment(&self, id: FormationAssignmentId) -> Result<bool>;

    // Notification audit log
    async fn insert_notification_record(&self, record: &NotificationRecord) -> Result<()>;
    async fn list_notifications_for_target(&self, target_id: ParticipantId)
        -> Result<Vec<NotificationRecord>>;
    async fn list_notifications_for_formation(
        &self,
        formation_id: FormationId,
    ) -> Result<Vec<NotificationRecord>>;

    // Async callback correlation
    async fn save_callback(&self, callback: &CallbackCorrelation) -> Result<()>;
    async fn get_callback(&self, subject: CallbackSubject) -> Result<Option<CallbackCorrelation>>;
    async fn delete_callback(&self, subject: CallbackSubject) -> Result<()>;

    // Constraints
    async fn insert_constraint(&self, constraint: &FormationConstraint) -> Result<()>;
    async fn attach_constraint(
        &self,
        constraint_id: ConstraintId,
        template_id: FormationTemplateId,
    ) -> Result<()>;
    /// Global plus template-attached constraints, in evaluation order
    async fn list_constraints(
        &self,
        template_id: FormationTemplateId,
        target_operation: TargetOperation,
        constraint_type: ConstraintType,
    ) -> Result<Vec<FormationConstraint>>;

    // Provisioned destinations
    async fn save_destination_record(&self, record: &DestinationRecord) -> Result<()>;
    async fn list_destination_records(
        &self,
        assignment_id: FormationAssignmentId,
    ) -> Result<Vec<DestinationRecord>>;
    async fn delete_destination_records(&self, assignment_id: FormationAssignmentId) -> Result<()>;
}
