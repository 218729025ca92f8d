//! Validation operators evaluated before a participant joins a formation.

use anyhow::Result;
use serde::Deserialize;

use crate::domains::formation::models::{Formation, FormationTemplate};
use crate::domains::formation_assignment::notifications::subtype_of;
use crate::domains::participant::{Participant, ParticipantTemplate};
use crate::kernel::BaseFormationStore;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ExceptSubtypesInput {
    pub except_subtypes: Vec<String>,
}

/// The participant being assigned, with its template
pub struct AssignCandidate<'a> {
    pub participant: &'a Participant,
    pub template: Option<&'a ParticipantTemplate>,
}

impl AssignCandidate<'_> {
    pub fn subtype(&self) -> Option<&str> {
        subtype_of(self.participant, self.template)
    }
}

/// `IsNotAssignedToAnyFormationOfType`: reason for rejection, if any.
pub async fn already_in_formation_of_type(
    input: &ExceptSubtypesInput,
    candidate: &AssignCandidate<'_>,
    formation: &Formation,
    template: &FormationTemplate,
    store: &dyn BaseFormationStore,
) -> Result<Option<String>> {
    if let Some(subtype) = candidate.subtype() {
        if input.except_subtypes.iter().any(|s| s == subtype) {
            return Ok(None);
        }
    }

    let formations = store
        .list_formations_for_participant(candidate.participant.id)
        .await?;
    Ok(formations
        .iter()
        .find(|f| f.id != formation.id && f.template_id == formation.template_id)
        .map(|other| {
            format!(
                "participant {} is already assigned to formation {:?} of type {:?}",
                candidate.participant.id, other.name, template.name
            )
        }))
}

/// `DoesNotContainResourceOfSubtype`: reason for rejection, if any.
pub async fn contains_same_subtype(
    candidate: &AssignCandidate<'_>,
    formation: &Formation,
    store: &dyn BaseFormationStore,
) -> Result<Option<String>> {
    let Some(subtype) = candidate.subtype() else {
        return Ok(None);
    };

    let mut members: Vec<_> = store
        .list_assignments(formation.id)
        .await?
        .into_iter()
        .map(|fa| fa.source)
        .filter(|id| *id != candidate.participant.id)
        .collect();
    members.sort();
    members.dedup();

    for member_id in members {
        let Some(member) = store.get_participant(member_id).await? else {
            continue;
        };
        let member_template = match member.template_id {
            Some(id) => store.get_participant_template(id).await?,
            None => None,
        };
        if subtype_of(&member, member_template.as_ref()) == Some(subtype) {
            return Ok(Some(format!(
                "formation {:?} already contains a participant of subtype {:?}",
                formation.name, subtype
            )));
        }
    }
    Ok(None)
}
