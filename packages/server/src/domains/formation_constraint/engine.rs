//! Constraint engine
//!
//! Finds the constraints attached to a join point, filters them by resource,
//! renders their input and runs the operators in priority order. Operators
//! are plain functions selected by `ConstraintOperator`; an operator that has
//! nothing to do at a join point is skipped.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::common::{EngineError, EngineResult};
use crate::domains::formation::models::{Formation, FormationTemplate};
use crate::domains::formation_assignment::events::NotificationResult;
use crate::domains::formation_assignment::notifications::{formation_json, AssignmentDetails};
use crate::domains::formation_constraint::models::{
    sort_for_evaluation, ConstraintOperator, ConstraintType, FormationConstraint, TargetOperation,
};
use crate::domains::formation_constraint::operators::assign_validation::{
    self, AssignCandidate, ExceptSubtypesInput,
};
use crate::domains::formation_constraint::operators::{
    config_mutator, destination_creator, do_not_generate, redirect,
};
use crate::domains::participant::{Participant, ParticipantKind, ParticipantTemplate};
use crate::kernel::ServerDeps;

/// Result of the pre-send stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Continue,
    /// Skip the notification; the named constraint fired
    Suppress { constraint: String },
    /// Send to `url` instead of the templated URL
    Redirect { constraint: String, url: String },
}

async fn matching_constraints(
    deps: &ServerDeps,
    template: &FormationTemplate,
    target_operation: TargetOperation,
    constraint_type: ConstraintType,
    kind: ParticipantKind,
    subtype: Option<&str>,
) -> Result<Vec<FormationConstraint>> {
    let mut constraints = deps
        .store
        .list_constraints(template.id, target_operation, constraint_type)
        .await?;
    constraints.retain(|c| c.matches_resource(kind, subtype));
    sort_for_evaluation(&mut constraints);
    Ok(constraints)
}

fn render_input<T: DeserializeOwned>(
    deps: &ServerDeps,
    constraint: &FormationConstraint,
    context: &Value,
) -> Result<T> {
    deps.renderer
        .render_json("constraint input", &constraint.input_template, context)
        .with_context(|| format!("constraint {}", constraint.name))
}

// =============================================================================
// Pre-Assign
// =============================================================================

/// Run the validation operators attached to `Assign`.
pub async fn before_assign(
    deps: &ServerDeps,
    formation: &Formation,
    template: &FormationTemplate,
    participant: &Participant,
    participant_template: Option<&ParticipantTemplate>,
) -> EngineResult<()> {
    let candidate = AssignCandidate {
        participant,
        template: participant_template,
    };
    let constraints = matching_constraints(
        deps,
        template,
        TargetOperation::Assign,
        ConstraintType::Pre,
        participant.kind,
        candidate.subtype(),
    )
    .await?;

    let mut context = json!({
        "operation": "assign",
        "formation": formation_json(formation, template),
        "customer_tenant": formation.tenant,
        "participant": participant,
    });
    if let (Some(t), Value::Object(map)) = (participant_template, &mut context) {
        map.insert("participant_template".into(), json!(t));
    }

    for constraint in &constraints {
        let violation = |reason: String| EngineError::ConstraintViolation {
            constraint: constraint.name.clone(),
            reason,
        };

        let rejection = match constraint.operator {
            ConstraintOperator::IsNotAssignedToAnyFormationOfType => {
                let input: ExceptSubtypesInput = render_input(deps, constraint, &context)
                    .map_err(|e| violation(format!("{:#}", e)))?;
                assign_validation::already_in_formation_of_type(
                    &input,
                    &candidate,
                    formation,
                    template,
                    deps.store.as_ref(),
                )
                .await?
            }
            ConstraintOperator::DoesNotContainResourceOfSubtype => {
                assign_validation::contains_same_subtype(&candidate, formation, deps.store.as_ref())
                    .await?
            }
            other => {
                debug!(constraint = %constraint.name, operator = %other, "Operator has no assign stage");
                None
            }
        };

        if let Some(reason) = rejection {
            info!(
                constraint = %constraint.name,
                participant_id = %participant.id,
                formation_id = %formation.id,
                "Assignment rejected by constraint"
            );
            return Err(violation(reason));
        }
    }
    Ok(())
}

// =============================================================================
// Pre-SendNotification
// =============================================================================

/// Run the pre-send constraints of an assignment notification. A suppression
/// short-circuits everything after it; the first redirect wins.
pub async fn before_send(deps: &ServerDeps, details: &AssignmentDetails) -> Result<StageOutcome> {
    let mut constraints = matching_constraints(
        deps,
        &details.formation_template,
        TargetOperation::GenerateAssignmentNotification,
        ConstraintType::Pre,
        details.target.kind,
        details.target_subtype(),
    )
    .await?;
    constraints.extend(
        matching_constraints(
            deps,
            &details.formation_template,
            TargetOperation::SendNotification,
            ConstraintType::Pre,
            details.target.kind,
            details.target_subtype(),
        )
        .await?,
    );

    let context = details.context(None);
    let mut outcome = StageOutcome::Continue;

    for constraint in &constraints {
        match constraint.operator {
            ConstraintOperator::DoNotGenerateFormationAssignmentNotification => {
                let input: do_not_generate::DoNotGenerateInput =
                    render_input(deps, constraint, &context)?;
                if do_not_generate::suppresses(&input, details) {
                    return Ok(suppressed(constraint, details));
                }
            }
            ConstraintOperator::DoNotGenerateFormationAssignmentNotificationForLoops => {
                if do_not_generate::suppresses_loop(details) {
                    return Ok(suppressed(constraint, details));
                }
            }
            ConstraintOperator::RedirectNotification => {
                let input: redirect::RedirectInput = render_input(deps, constraint, &context)?;
                let target = redirect::redirect_url(&input, &deps.renderer, &context)
                    .with_context(|| format!("constraint {}", constraint.name))?;
                if let Some(url) = target.filter(|_| outcome == StageOutcome::Continue) {
                    info!(
                        constraint = %constraint.name,
                        assignment_id = %details.assignment.id,
                        url = %url,
                        "Notification redirected"
                    );
                    outcome = StageOutcome::Redirect {
                        constraint: constraint.name.clone(),
                        url,
                    };
                }
            }
            ConstraintOperator::DestinationCreator => {
                destination_creator::before_send(details, deps)
                    .await
                    .with_context(|| format!("constraint {}", constraint.name))?;
            }
            other => {
                debug!(constraint = %constraint.name, operator = %other, "Operator has no pre-send stage");
            }
        }
    }

    Ok(outcome)
}

fn suppressed(constraint: &FormationConstraint, details: &AssignmentDetails) -> StageOutcome {
    info!(
        constraint = %constraint.name,
        assignment_id = %details.assignment.id,
        source = %details.source.id,
        target = %details.target.id,
        "Notification suppressed"
    );
    StageOutcome::Suppress {
        constraint: constraint.name.clone(),
    }
}

// =============================================================================
// NotificationStatusReturned
// =============================================================================

/// Run the status-returned constraints (pre, then post) over a result before
/// it is applied to the assignment.
pub async fn after_status_returned(
    deps: &ServerDeps,
    details: &AssignmentDetails,
    result: &mut NotificationResult,
) -> Result<()> {
    let mut constraints = Vec::new();
    for constraint_type in [ConstraintType::Pre, ConstraintType::Post] {
        constraints.extend(
            matching_constraints(
                deps,
                &details.formation_template,
                TargetOperation::NotificationStatusReturned,
                constraint_type,
                details.target.kind,
                details.target_subtype(),
            )
            .await?,
        );
    }
    if constraints.is_empty() {
        return Ok(());
    }

    let context = details.context(None);
    for constraint in &constraints {
        match constraint.operator {
            ConstraintOperator::ConfigMutator => {
                let input: config_mutator::ConfigMutatorInput =
                    render_input(deps, constraint, &context)?;
                let mutated = config_mutator::mutate(&input, details, result)
                    .with_context(|| format!("constraint {}", constraint.name))?;
                if mutated {
                    debug!(
                        constraint = %constraint.name,
                        assignment_id = %details.assignment.id,
                        state = %result.state,
                        "Result mutated"
                    );
                }
            }
            ConstraintOperator::DestinationCreator => {
                destination_creator::after_status_returned(details, result, deps)
                    .await
                    .with_context(|| format!("constraint {}", constraint.name))?;
            }
            other => {
                debug!(constraint = %constraint.name, operator = %other, "Operator has no status-returned stage");
            }
        }
    }
    Ok(())
}
