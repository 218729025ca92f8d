//! In-process store used when no database is configured, and by tests.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use super::{AssignmentPlan, BaseFormationStore};
use crate::common::{
    ConstraintId, FormationAssignmentId, FormationId, FormationTemplateId, ParticipantId,
    ParticipantTemplateId, WebhookId,
};
use crate::domains::formation::models::{Formation, FormationTemplate};
use crate::domains::formation_assignment::models::FormationAssignment;
use crate::domains::formation_constraint::models::{
    sort_for_evaluation, ConstraintScope, ConstraintType, DestinationRecord, FormationConstraint,
    TargetOperation,
};
use crate::domains::participant::{Participant, ParticipantTemplate};
use crate::domains::webhook::models::{
    CallbackCorrelation, CallbackSubject, NotificationRecord, Webhook, WebhookOwner,
};

#[derive(Default)]
struct State {
    formation_templates: HashMap<FormationTemplateId, FormationTemplate>,
    participant_templates: HashMap<ParticipantTemplateId, ParticipantTemplate>,
    participants: HashMap<ParticipantId, Participant>,
    webhooks: HashMap<WebhookId, Webhook>,
    formations: HashMap<FormationId, Formation>,
    assignments: HashMap<FormationAssignmentId, FormationAssignment>,
    notifications: Vec<NotificationRecord>,
    callbacks: HashMap<CallbackSubject, CallbackCorrelation>,
    constraints: HashMap<ConstraintId, FormationConstraint>,
    attachments: HashSet<(ConstraintId, FormationTemplateId)>,
    destinations: Vec<DestinationRecord>,
}

#[derive(Default)]
pub struct InMemoryFormationStore {
    state: RwLock<State>,
}

impl InMemoryFormationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state.read().map_err(|_| anyhow!("formation store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state.write().map_err(|_| anyhow!("formation store lock poisoned"))
    }
}

fn sorted_assignments<'a>(
    iter: impl Iterator<Item = &'a FormationAssignment>,
) -> Vec<FormationAssignment> {
    let mut out: Vec<_> = iter.cloned().collect();
    out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    out
}

#[async_trait]
impl BaseFormationStore for InMemoryFormationStore {
    async fn save_formation_template(&self, template: &FormationTemplate) -> Result<()> {
        self.write()?
            .formation_templates
            .insert(template.id, template.clone());
        Ok(())
    }

    async fn get_formation_template(
        &self,
        id: FormationTemplateId,
    ) -> Result<Option<FormationTemplate>> {
        Ok(self.read()?.formation_templates.get(&id).cloned())
    }

    async fn save_participant_template(&self, template: &ParticipantTemplate) -> Result<()> {
        self.write()?
            .participant_templates
            .insert(template.id, template.clone());
        Ok(())
    }

    async fn get_participant_template(
        &self,
        id: ParticipantTemplateId,
    ) -> Result<Option<ParticipantTemplate>> {
        Ok(self.read()?.participant_templates.get(&id).cloned())
    }

    async fn save_participant(&self, participant: &Participant) -> Result<()> {
        self.write()?
            .participants
            .insert(participant.id, participant.clone());
        Ok(())
    }

    async fn get_participant(&self, id: ParticipantId) -> Result<Option<Participant>> {
        Ok(self.read()?.participants.get(&id).cloned())
    }

    async fn save_webhook(&self, webhook: &Webhook) -> Result<()> {
        self.write()?.webhooks.insert(webhook.id, webhook.clone());
        Ok(())
    }

    async fn list_webhooks(&self, owner: &WebhookOwner) -> Result<Vec<Webhook>> {
        let state = self.read()?;
        let mut webhooks: Vec<_> = state
            .webhooks
            .values()
            .filter(|w| &w.owner == owner)
            .cloned()
            .collect();
        webhooks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(webhooks)
    }

    async fn insert_formation(&self, formation: &Formation) -> Result<()> {
        let mut state = self.write()?;
        if state.formations.contains_key(&formation.id) {
            bail!("formation {} already exists", formation.id);
        }
        state.formations.insert(formation.id, formation.clone());
        Ok(())
    }

    async fn update_formation(&self, formation: &Formation) -> Result<()> {
        let mut state = self.write()?;
        match state.formations.get_mut(&formation.id) {
            Some(existing) => {
                *existing = formation.clone();
                Ok(())
            }
            None => bail!("formation {} does not exist", formation.id),
        }
    }

    async fn get_formation(&self, id: FormationId) -> Result<Option<Formation>> {
        Ok(self.read()?.formations.get(&id).cloned())
    }

    async fn delete_formation(&self, id: FormationId) -> Result<bool> {
        Ok(self.write()?.formations.remove(&id).is_some())
    }

    async fn list_formations_for_participant(
        &self,
        participant_id: ParticipantId,
    ) -> Result<Vec<Formation>> {
        let state = self.read()?;
        let ids: HashSet<FormationId> = state
            .assignments
            .values()
            .filter(|fa| fa.involves(participant_id))
            .map(|fa| fa.formation_id)
            .collect();
        let mut formations: Vec<_> = ids
            .iter()
            .filter_map(|id| state.formations.get(id).cloned())
            .collect();
        formations.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(formations)
    }

    async fn insert_assignment(&self, assignment: &FormationAssignment) -> Result<()> {
        let mut state = self.write()?;
        let duplicate = state.assignments.values().any(|fa| {
            fa.formation_id == assignment.formation_id
                && fa.source == assignment.source
                && fa.target == assignment.target
        });
        if duplicate {
            bail!(
                "assignment {} -> {} already exists in formation {}",
                assignment.source,
                assignment.target,
                assignment.formation_id
            );
        }
        state.assignments.insert(assignment.id, assignment.clone());
        Ok(())
    }

    async fn insert_planned_assignments(
        &self,
        formation_id: FormationId,
        plan: &AssignmentPlan<'_>,
    ) -> Result<Vec<FormationAssignment>> {
        let mut state = self.write()?;
        let current = sorted_assignments(
            state
                .assignments
                .values()
                .filter(|fa| fa.formation_id == formation_id),
        );
        let planned = plan(current.as_slice());
        for fa in &planned {
            if current
                .iter()
                .any(|c| c.source == fa.source && c.target == fa.target)
            {
                bail!(
                    "assignment {} -> {} already exists in formation {}",
                    fa.source,
                    fa.target,
                    formation_id
                );
            }
        }
        for fa in &planned {
            state.assignments.insert(fa.id, fa.clone());
        }
        Ok(planned)
    }

    async fn update_assignment(&self, assignment: &FormationAssignment) -> Result<()> {
        let mut state = self.write()?;
        match state.assignments.get_mut(&assignment.id) {
            Some(existing) => {
                *existing = assignment.clone();
                Ok(())
            }
            None => bail!("assignment {} does not exist", assignment.id),
        }
    }

    async fn get_assignment(
        &self,
        id: FormationAssignmentId,
    ) -> Result<Option<FormationAssignment>> {
        Ok(self.read()?.assignments.get(&id).cloned())
    }

    async fn get_assignment_by_pair(
        &self,
        formation_id: FormationId,
        source: ParticipantId,
        target: ParticipantId,
    ) -> Result<Option<FormationAssignment>> {
        Ok(self
            .read()?
            .assignments
            .values()
            .find(|fa| fa.formation_id == formation_id && fa.source == source && fa.target == target)
            .cloned())
    }

    async fn list_assignments(&self, formation_id: FormationId) -> Result<Vec<FormationAssignment>> {
        let state = self.read()?;
        Ok(sorted_assignments(
            state
                .assignments
                .values()
                .filter(|fa| fa.formation_id == formation_id),
        ))
    }

    async fn list_assignments_for_participant(
        &self,
        formation_id: FormationId,
        participant_id: ParticipantId,
    ) -> Result<Vec<FormationAssignment>> {
        let state = self.read()?;
        Ok(sorted_assignments(state.assignments.values().filter(|fa| {
            fa.formation_id == formation_id && fa.involves(participant_id)
        })))
    }

    async fn delete_assignment(&self, id: FormationAssignmentId) -> Result<bool> {
        Ok(self.write()?.assignments.remove(&id).is_some())
    }

    async fn insert_notification_record(&self, record: &NotificationRecord) -> Result<()> {
        self.write()?.notifications.push(record.clone());
        Ok(())
    }

    async fn list_notifications_for_target(
        &self,
        target_id: ParticipantId,
    ) -> Result<Vec<NotificationRecord>> {
        Ok(self
            .read()?
            .notifications
            .iter()
            .filter(|n| n.target_id == Some(target_id))
            .cloned()
            .collect())
    }

    async fn list_notifications_for_formation(
        &self,
        formation_id: FormationId,
    ) -> Result<Vec<NotificationRecord>> {
        Ok(self
            .read()?
            .notifications
            .iter()
            .filter(|n| n.formation_id == formation_id)
            .cloned()
            .collect())
    }

    async fn save_callback(&self, callback: &CallbackCorrelation) -> Result<()> {
        self.write()?
            .callbacks
            .insert(callback.subject, callback.clone());
        Ok(())
    }

    async fn get_callback(&self, subject: CallbackSubject) -> Result<Option<CallbackCorrelation>> {
        Ok(self.read()?.callbacks.get(&subject).cloned())
    }

    async fn delete_callback(&self, subject: CallbackSubject) -> Result<()> {
        self.write()?.callbacks.remove(&subject);
        Ok(())
    }

    async fn insert_constraint(&self, constraint: &FormationConstraint) -> Result<()> {
        self.write()?
            .constraints
            .insert(constraint.id, constraint.clone());
        Ok(())
    }

    async fn attach_constraint(
        &self,
        constraint_id: ConstraintId,
        template_id: FormationTemplateId,
    ) -> Result<()> {
        let mut state = self.write()?;
        if !state.constraints.contains_key(&constraint_id) {
            bail!("constraint {} does not exist", constraint_id);
        }
        state.attachments.insert((constraint_id, template_id));
        Ok(())
    }

    async fn list_constraints(
        &self,
        template_id: FormationTemplateId,
        target_operation: TargetOperation,
        constraint_type: ConstraintType,
    ) -> Result<Vec<FormationConstraint>> {
        let state = self.read()?;
        let mut constraints: Vec<_> = state
            .constraints
            .values()
            .filter(|c| c.target_operation == target_operation && c.constraint_type == constraint_type)
            .filter(|c| {
                c.scope == ConstraintScope::Global
                    || state.attachments.contains(&(c.id, template_id))
            })
            .cloned()
            .collect();
        sort_for_evaluation(&mut constraints);
        Ok(constraints)
    }

    async fn save_destination_record(&self, record: &DestinationRecord) -> Result<()> {
        let mut state = self.write()?;
        state
            .destinations
            .retain(|d| !(d.name == record.name && d.assignment_id == record.assignment_id));
        state.destinations.push(record.clone());
        Ok(())
    }

    async fn list_destination_records(
        &self,
        assignment_id: FormationAssignmentId,
    ) -> Result<Vec<DestinationRecord>> {
        Ok(self
            .read()?
            .destinations
            .iter()
            .filter(|d| d.assignment_id == assignment_id)
            .cloned()
            .collect())
    }

    async fn delete_destination_records(&self, assignment_id: FormationAssignmentId) -> Result<()> {
        self.write()?
            .destinations
            .retain(|d| d.assignment_id != assignment_id);
        Ok(())
    }
}
