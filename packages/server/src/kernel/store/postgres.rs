//! PostgreSQL store. Each method delegates to the model's own SQL.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;

use super::{AssignmentPlan, BaseFormationStore};
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

#[derive(Clone)]
pub struct PostgresFormationStore {
    pool: PgPool,
}

impl PostgresFormationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl BaseFormationStore for PostgresFormationStore {
    async fn save_formation_template(&self, template: &FormationTemplate) -> Result<()> {
        template.upsert(&self.pool).await
    }

    async fn get_formation_template(
        &self,
        id: FormationTemplateId,
    ) -> Result<Option<FormationTemplate>> {
        FormationTemplate::find_by_id(id, &self.pool).await
    }

    async fn save_participant_template(&self, template: &ParticipantTemplate) -> Result<()> {
        template.upsert(&self.pool).await
    }

    async fn get_participant_template(
        &self,
        id: ParticipantTemplateId,
    ) -> Result<Option<ParticipantTemplate>> {
        ParticipantTemplate::find_by_id(id, &self.pool).await
    }

    async fn save_participant(&self, participant: &Participant) -> Result<()> {
        participant.upsert(&self.pool).await
    }

    async fn get_participant(&self, id: ParticipantId) -> Result<Option<Participant>> {
        Participant::find_by_id(id, &self.pool).await
    }

    async fn save_webhook(&self, webhook: &Webhook) -> Result<()> {
        webhook.upsert(&self.pool).await
    }

    async fn list_webhooks(&self, owner: &WebhookOwner) -> Result<Vec<Webhook>> {
        Webhook::find_by_owner(owner, &self.pool).await
    }

    async fn insert_formation(&self, formation: &Formation) -> Result<()> {
        formation
            .insert(&self.pool)
            .await
            .with_context(|| format!("Failed to insert formation {}", formation.id))
    }

    async fn update_formation(&self, formation: &Formation) -> Result<()> {
        formation.update(&self.pool).await
    }

    async fn get_formation(&self, id: FormationId) -> Result<Option<Formation>> {
        Formation::find_by_id(id, &self.pool).await
    }

    async fn delete_formation(&self, id: FormationId) -> Result<bool> {
        Formation::delete(id, &self.pool).await
    }

    async fn list_formations_for_participant(
        &self,
        participant_id: ParticipantId,
    ) -> Result<Vec<Formation>> {
        Formation::find_for_participant(participant_id, &self.pool).await
    }

    async fn insert_assignment(&self, assignment: &FormationAssignment) -> Result<()> {
        assignment.insert(&self.pool).await.with_context(|| {
            format!(
                "Failed to insert assignment {} -> {}",
                assignment.source, assignment.target
            )
        })
    }

    async fn insert_planned_assignments(
        &self,
        formation_id: FormationId,
        plan: &AssignmentPlan<'_>,
    ) -> Result<Vec<FormationAssignment>> {
        FormationAssignment::insert_planned(formation_id, plan, &self.pool)
            .await
            .with_context(|| format!("Failed to insert assignments into formation {}", formation_id))
    }

    async fn update_assignment(&self, assignment: &FormationAssignment) -> Result<()> {
        assignment.update(&self.pool).await
    }

    async fn get_assignment(
        &self,
        id: FormationAssignmentId,
    ) -> Result<Option<FormationAssignment>> {
        FormationAssignment::find_by_id(id, &self.pool).await
    }

    async fn get_assignment_by_pair(
        &self,
        formation_id: FormationId,
        source: ParticipantId,
        target: ParticipantId,
    ) -> Result<Option<FormationAssignment>> {
        FormationAssignment::find_by_pair(formation_id, source, target, &self.pool).await
    }

    async fn list_assignments(&self, formation_id: FormationId) -> Result<Vec<FormationAssignment>> {
        FormationAssignment::find_for_formation(formation_id, &self.pool).await
    }

    async fn list_assignments_for_participant(
        &self,
        formation_id: FormationId,
        participant_id: ParticipantId,
    ) -> Result<Vec<FormationAssignment>> {
        FormationAssignment::find_for_participant(formation_id, participant_id, &self.pool).await
    }

    async fn delete_assignment(&self, id: FormationAssignmentId) -> Result<bool> {
        FormationAssignment::delete(id, &self.pool).await
    }

    async fn insert_notification_record(&self, record: &NotificationRecord) -> Result<()> {
        record.insert(&self.pool).await
    }

    async fn list_notifications_for_target(
        &self,
        target_id: ParticipantId,
    ) -> Result<Vec<NotificationRecord>> {
        NotificationRecord::find_by_target(target_id, &self.pool).await
    }

    async fn list_notifications_for_formation(
        &self,
        formation_id: FormationId,
    ) -> Result<Vec<NotificationRecord>> {
        NotificationRecord::find_by_formation(formation_id, &self.pool).await
    }

    async fn save_callback(&self, callback: &CallbackCorrelation) -> Result<()> {
        callback.upsert(&self.pool).await
    }

    async fn get_callback(&self, subject: CallbackSubject) -> Result<Option<CallbackCorrelation>> {
        CallbackCorrelation::find(subject, &self.pool).await
    }

    async fn delete_callback(&self, subject: CallbackSubject) -> Result<()> {
        CallbackCorrelation::delete(subject, &self.pool).await
    }

    async fn insert_constraint(&self, constraint: &FormationConstraint) -> Result<()> {
        constraint.insert(&self.pool).await
    }

    async fn attach_constraint(
        &self,
        constraint_id: ConstraintId,
        template_id: FormationTemplateId,
    ) -> Result<()> {
        FormationConstraint::attach(constraint_id, template_id, &self.pool).await
    }

    async fn list_constraints(
        &self,
        template_id: FormationTemplateId,
        target_operation: TargetOperation,
        constraint_type: ConstraintType,
    ) -> Result<Vec<FormationConstraint>> {
        FormationConstraint::find_applicable(template_id, target_operation, constraint_type, &self.pool)
            .await
    }

    async fn save_destination_record(&self, record: &DestinationRecord) -> Result<()> {
        record.upsert(&self.pool).await
    }

    async fn list_destination_records(
        &self,
        assignment_id: FormationAssignmentId,
    ) -> Result<Vec<DestinationRecord>> {
        DestinationRecord::find_for_assignment(assignment_id, &self.pool).await
    }

    async fn delete_destination_records(&self, assignment_id: FormationAssignmentId) -> Result<()> {
        DestinationRecord::delete_for_assignment(assignment_id, &self.pool).await
    }
}
