//! Notification context for assignment notifications.
//!
//! Everything a template or a constraint input may reference about one
//! assignment is loaded once into `AssignmentDetails`.

use anyhow::Result;
use serde_json::{json, Map, Value};

use crate::domains::formation::models::{Formation, FormationTemplate};
use crate::domains::formation_assignment::models::{AssignmentOperation, FormationAssignment};
use crate::domains::participant::{Participant, ParticipantTemplate};
use crate::domains::webhook::Webhook;
use crate::kernel::BaseFormationStore;

#[derive(Debug, Clone)]
pub struct AssignmentDetails {
    pub operation: AssignmentOperation,
    pub formation: Formation,
    pub formation_template: FormationTemplate,
    pub assignment: FormationAssignment,
    pub reverse: Option<FormationAssignment>,
    pub source: Participant,
    pub source_template: Option<ParticipantTemplate>,
    pub target: Participant,
    pub target_template: Option<ParticipantTemplate>,
}

impl AssignmentDetails {
    /// Load everything around `assignment`. Returns `None` when the formation,
    /// its template or either participant no longer exists.
    pub async fn load(
        assignment: FormationAssignment,
        store: &dyn BaseFormationStore,
    ) -> Result<Option<Self>> {
        let Some(formation) = store.get_formation(assignment.formation_id).await? else {
            return Ok(None);
        };
        let Some(formation_template) = store.get_formation_template(formation.template_id).await?
        else {
            return Ok(None);
        };
        let Some(source) = store.get_participant(assignment.source).await? else {
            return Ok(None);
        };
        let Some(target) = store.get_participant(assignment.target).await? else {
            return Ok(None);
        };

        let source_template = participant_template(&source, store).await?;
        let target_template = participant_template(&target, store).await?;
        let reverse = store
            .get_assignment_by_pair(assignment.formation_id, assignment.target, assignment.source)
            .await?;

        Ok(Some(Self {
            operation: assignment.last_operation,
            formation,
            formation_template,
            assignment,
            reverse,
            source,
            source_template,
            target,
            target_template,
        }))
    }

    /// Subtype of the target: its own label, else its template's
    pub fn target_subtype(&self) -> Option<&str> {
        subtype_of(&self.target, self.target_template.as_ref())
    }

    pub fn source_subtype(&self) -> Option<&str> {
        subtype_of(&self.source, self.source_template.as_ref())
    }

    /// Template context. Absent optional parts are left out rather than null,
    /// so templates guard them with `is defined`.
    pub fn context(&self, webhook: Option<&Webhook>) -> Value {
        let mut ctx = Map::new();
        ctx.insert("operation".into(), json!(self.operation.template_name()));
        ctx.insert("formation".into(), formation_json(&self.formation, &self.formation_template));
        ctx.insert("customer_tenant".into(), json!(self.formation.tenant));
        ctx.insert("source".into(), json!(self.source));
        ctx.insert("target".into(), json!(self.target));
        if let Some(template) = &self.source_template {
            ctx.insert("source_template".into(), json!(template));
        }
        if let Some(template) = &self.target_template {
            ctx.insert("target_template".into(), json!(template));
        }
        ctx.insert("assignment".into(), assignment_json(&self.assignment));
        if let Some(reverse) = &self.reverse {
            ctx.insert("reverse_assignment".into(), assignment_json(reverse));
        }
        if let Some(webhook) = webhook {
            ctx.insert("webhook".into(), webhook_json(webhook));
        }
        Value::Object(ctx)
    }
}

async fn participant_template(
    participant: &Participant,
    store: &dyn BaseFormationStore,
) -> Result<Option<ParticipantTemplate>> {
    match participant.template_id {
        Some(id) => store.get_participant_template(id).await,
        None => Ok(None),
    }
}

pub fn subtype_of<'a>(
    participant: &'a Participant,
    template: Option<&'a ParticipantTemplate>,
) -> Option<&'a str> {
    participant
        .subtype
        .as_deref()
        .or_else(|| template.and_then(|t| t.subtype.as_deref()))
}

pub fn formation_json(formation: &Formation, template: &FormationTemplate) -> Value {
    json!({
        "id": formation.id,
        "name": formation.name,
        "state": formation.state,
        "template_id": formation.template_id,
        "type": template.name,
    })
}

/// Configuration and value render as "" when empty.
pub fn assignment_json(fa: &FormationAssignment) -> Value {
    json!({
        "id": fa.id,
        "source": fa.source,
        "source_type": fa.source_type,
        "target": fa.target,
        "target_type": fa.target_type,
        "state": fa.state,
        "configuration": fa.configuration.clone().unwrap_or_else(|| json!("")),
        "value": fa.value.clone().unwrap_or_else(|| json!("")),
    })
}

pub fn webhook_json(webhook: &Webhook) -> Value {
    let mut value = json!({
        "id": webhook.id,
        "type": webhook.webhook_type,
        "mode": webhook.mode,
    });
    if let (Some(url), Value::Object(map)) = (&webhook.url, &mut value) {
        map.insert("url".into(), json!(url));
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::CustomerTenantContext;
    use crate::domains::formation::models::FormationState;
    use crate::domains::participant::ParticipantKind;

    fn details() -> AssignmentDetails {
        let template = FormationTemplate::new("side-by-side");
        let formation = Formation::new(
            "f",
            template.id,
            CustomerTenantContext::for_tenant("t-1"),
            FormationState::Ready,
        );
        let source = Participant::new(ParticipantKind::Application, "a", "t-1");
        let target = Participant::new(ParticipantKind::Runtime, "b", "t-1").with_subtype("kyma");
        let assignment = FormationAssignment::new(
            formation.id,
            (source.id, source.kind),
            (target.id, target.kind),
        );
        AssignmentDetails {
            operation: AssignmentOperation::Assign,
            formation,
            formation_template: template,
            assignment,
            reverse: None,
            source,
            source_template: None,
            target,
            target_template: None,
        }
    }

    #[test]
    fn test_absent_parts_are_omitted() {
        let ctx = details().context(None);
        assert!(ctx.get("reverse_assignment").is_none());
        assert!(ctx.get("source_template").is_none());
        assert!(ctx.get("webhook").is_none());
        assert_eq!(ctx["operation"], "assign");
        assert_eq!(ctx["customer_tenant"]["tenant_id"], "t-1");
        assert_eq!(ctx["formation"]["type"], "side-by-side");
    }

    #[test]
    fn test_empty_configuration_renders_as_empty_string() {
        let ctx = details().context(None);
        assert_eq!(ctx["assignment"]["configuration"], "");
        assert_eq!(ctx["assignment"]["state"], "INITIAL");
    }

    #[test]
    fn test_subtype_falls_back_to_template() {
        let mut d = details();
        assert_eq!(d.target_subtype(), Some("kyma"));
        assert_eq!(d.source_subtype(), None);

        let mut template = ParticipantTemplate::new("crm-template");
        template.subtype = Some("crm".into());
        d.source_template = Some(template);
        assert_eq!(d.source_subtype(), Some("crm"));
    }
}
