//! Notification suppression operators.

use serde::Deserialize;

use crate::domains::formation_assignment::notifications::AssignmentDetails;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DoNotGenerateInput {
    /// Source subtypes that are still notified about
    pub except_subtypes: Vec<String>,
    /// Formation types (template names) the constraint does not apply to
    pub except_formation_types: Vec<String>,
}

/// `DoNotGenerateFormationAssignmentNotification`: suppress unless the
/// formation type or the source subtype is excepted.
pub fn suppresses(input: &DoNotGenerateInput, details: &AssignmentDetails) -> bool {
    if input
        .except_formation_types
        .iter()
        .any(|t| *t == details.formation_template.name)
    {
        return false;
    }

    match details.source_subtype() {
        Some(subtype) => !input.except_subtypes.iter().any(|s| s == subtype),
        None => true,
    }
}

/// `DoNotGenerateFormationAssignmentNotificationForLoops`
pub fn suppresses_loop(details: &AssignmentDetails) -> bool {
    details.assignment.is_self_pair()
}
