//! Assignment processing
//!
//! One processing step takes an assignment that awaits a notification, works
//! out the event (skip, dispatch result, acceptance), and applies it through
//! the assignment machine under the formation lock. The lock is never held
//! while a webhook is being called; a result computed against an assignment
//! that changed in the meantime is dropped.

use std::collections::{HashSet, VecDeque};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::common::{
    FormationAssignmentId, FormationId, NotificationError, ParticipantId,
};
use crate::domains::formation_assignment::commands::AssignmentCommand;
use crate::domains::formation_assignment::events::{AssignmentEvent, NotificationResult};
use crate::domains::formation_assignment::machines::AssignmentMachine;
use crate::domains::formation_assignment::models::{
    AssignmentOperation, AssignmentState, FormationAssignment,
};
use crate::domains::formation_assignment::notifications::AssignmentDetails;
use crate::domains::formation_constraint::{self, StageOutcome};
use crate::domains::webhook::models::CallbackSubject;
use crate::domains::webhook::resolver::resolve_participant_webhook;
use crate::domains::webhook::{dispatch, Notification, WebhookMode, WebhookType};
use crate::kernel::ServerDeps;

/// Where one assignment ended up after processing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignmentReport {
    pub assignment_id: FormationAssignmentId,
    pub source: ParticipantId,
    pub target: ParticipantId,
    /// `None` once the assignment has been removed
    pub state: Option<AssignmentState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<NotificationError>,
}

impl AssignmentReport {
    fn of(fa: &FormationAssignment) -> Self {
        Self {
            assignment_id: fa.id,
            source: fa.source,
            target: fa.target,
            state: Some(fa.state),
            error: fa.error.clone(),
        }
    }

    fn removed(fa: &FormationAssignment) -> Self {
        Self {
            state: None,
            error: None,
            ..Self::of(fa)
        }
    }
}

/// Outcome of a processing batch, latest entry per assignment
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessingReport {
    pub assignments: Vec<AssignmentReport>,
}

impl ProcessingReport {
    fn record(&mut self, entry: AssignmentReport) {
        match self
            .assignments
            .iter_mut()
            .find(|e| e.assignment_id == entry.assignment_id)
        {
            Some(existing) => *existing = entry,
            None => self.assignments.push(entry),
        }
    }

    /// Current state of `assignments`, without processing them
    pub fn from_assignments(assignments: &[FormationAssignment]) -> Self {
        Self {
            assignments: assignments.iter().map(AssignmentReport::of).collect(),
        }
    }

    pub fn merge(&mut self, other: ProcessingReport) {
        for entry in other.assignments {
            self.record(entry);
        }
    }

    pub fn get(&self, assignment_id: FormationAssignmentId) -> Option<&AssignmentReport> {
        self.assignments
            .iter()
            .find(|e| e.assignment_id == assignment_id)
    }

    /// Entries that ended in an error state
    pub fn errors(&self) -> impl Iterator<Item = &AssignmentReport> {
        self.assignments
            .iter()
            .filter(|e| e.state.is_some_and(|s| s.is_error()))
    }
}

/// Reverse pair to process because this one produced configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wake {
    pub formation_id: FormationId,
    pub source: ParticipantId,
    pub target: ParticipantId,
}

#[derive(Debug, Clone, Copy)]
enum WorkItem {
    /// Part of the batch; processed at most once
    Planned(FormationAssignmentId),
    /// Woken by its reverse; processed again if it still awaits configuration
    Woken(Wake),
}

// =============================================================================
// Batch
// =============================================================================

/// Process a batch of assignments of one formation.
///
/// Pairs without a notification go first, then synchronous pairs, then
/// asynchronous ones. Each assignment is followed by its reverse; a reverse
/// already handled earlier in the batch is not processed twice.
pub async fn process_assignments(
    assignments: Vec<FormationAssignment>,
    deps: &ServerDeps,
) -> Result<ProcessingReport> {
    let mut ranked = Vec::with_capacity(assignments.len());
    for fa in assignments {
        let rank = notification_rank(&fa, deps).await?;
        ranked.push((rank, fa));
    }
    ranked.sort_by_key(|(rank, _)| *rank);

    let mut queue = VecDeque::new();
    for (_, fa) in &ranked {
        queue.push_back(WorkItem::Planned(fa.id));
        if !fa.is_self_pair() {
            if let Some(reverse) = deps
                .store
                .get_assignment_by_pair(fa.formation_id, fa.target, fa.source)
                .await?
            {
                queue.push_back(WorkItem::Planned(reverse.id));
            }
        }
    }

    run(queue, deps).await
}

/// Process the assignment a wake points at, and anything it wakes in turn.
pub async fn process_wakes(wakes: Vec<Wake>, deps: &ServerDeps) -> Result<ProcessingReport> {
    run(wakes.into_iter().map(WorkItem::Woken).collect(), deps).await
}

/// Process wakes on a background task. Callers poll for the outcome.
pub fn spawn_wakes(wakes: Vec<Wake>, deps: ServerDeps) {
    if wakes.is_empty() {
        return;
    }
    tokio::spawn(async move {
        if let Err(err) = process_wakes(wakes, &deps).await {
            error!(error = %format!("{:#}", err), "Background processing of woken assignments failed");
        }
    });
}

async fn run(mut queue: VecDeque<WorkItem>, deps: &ServerDeps) -> Result<ProcessingReport> {
    let mut report = ProcessingReport::default();
    let mut processed: HashSet<FormationAssignmentId> = HashSet::new();

    while let Some(item) = queue.pop_front() {
        let fa = match item {
            WorkItem::Planned(id) => {
                if processed.contains(&id) {
                    continue;
                }
                match deps.store.get_assignment(id).await? {
                    Some(fa) if fa.awaits_notification() => fa,
                    _ => continue,
                }
            }
            WorkItem::Woken(wake) => {
                match deps
                    .store
                    .get_assignment_by_pair(wake.formation_id, wake.source, wake.target)
                    .await?
                {
                    Some(fa)
                        if fa.last_operation == AssignmentOperation::Assign
                            && fa.awaits_notification() =>
                    {
                        debug!(assignment_id = %fa.id, state = %fa.state, "Reverse assignment woken");
                        fa
                    }
                    _ => continue,
                }
            }
        };

        processed.insert(fa.id);
        let step = process_one(fa, deps).await?;
        if let Some(entry) = step.report {
            report.record(entry);
        }
        queue.extend(step.wakes.into_iter().map(WorkItem::Woken));
    }

    Ok(report)
}

/// 0 = no notification, 1 = synchronous, 2 = asynchronous
async fn notification_rank(fa: &FormationAssignment, deps: &ServerDeps) -> Result<u8> {
    if fa.is_self_pair() {
        return Ok(0);
    }
    let Some(target) = deps.store.get_participant(fa.target).await? else {
        return Ok(0);
    };
    let webhook =
        resolve_participant_webhook(deps.store.as_ref(), &target, WebhookType::TenantMapping)
            .await?;
    Ok(match webhook.map(|w| w.mode) {
        None => 0,
        Some(WebhookMode::Sync) => 1,
        Some(WebhookMode::AsyncCallback) => 2,
    })
}

// =============================================================================
// Single step
// =============================================================================

#[derive(Debug, Default)]
pub struct StepOutcome {
    pub report: Option<AssignmentReport>,
    pub wakes: Vec<Wake>,
    /// False when the event was dropped as stale or the assignment was gone
    pub applied: bool,
}

/// Run one notification round for `fa` and apply its result.
pub async fn process_one(fa: FormationAssignment, deps: &ServerDeps) -> Result<StepOutcome> {
    let revision = fa.revision;
    let assignment_id = fa.id;
    let operation = fa.last_operation;

    let event = match AssignmentDetails::load(fa, deps.store.as_ref()).await? {
        Some(details) => notify(&details, deps).await?,
        None => {
            warn!(assignment_id = %assignment_id, "Participants of assignment are gone, skipping notification");
            AssignmentEvent::NotificationSkipped
        }
    };

    debug!(
        assignment_id = %assignment_id,
        operation = %operation,
        event = ?event,
        "Applying notification event"
    );
    apply_event(assignment_id, ApplyGuard::revision(revision), &event, deps).await
}

async fn notify(details: &AssignmentDetails, deps: &ServerDeps) -> Result<AssignmentEvent> {
    let operation = details.operation;

    if details.assignment.is_self_pair() {
        return Ok(AssignmentEvent::NotificationSkipped);
    }

    let Some(webhook) =
        resolve_participant_webhook(deps.store.as_ref(), &details.target, WebhookType::TenantMapping)
            .await?
    else {
        return Ok(AssignmentEvent::NotificationSkipped);
    };

    let redirect_url = match formation_constraint::before_send(deps, details).await {
        Ok(StageOutcome::Continue) => None,
        Ok(StageOutcome::Suppress { .. }) => return Ok(AssignmentEvent::NotificationSkipped),
        Ok(StageOutcome::Redirect { url, .. }) => Some(url),
        Err(err) => return Ok(technical_failure(operation, details, err)),
    };

    let notification = Notification {
        formation_id: details.formation.id,
        subject: CallbackSubject::Assignment(details.assignment.id),
        operation: operation.template_name().to_string(),
        assignment_id: Some(details.assignment.id),
        target_id: Some(details.target.id),
        context: details.context(Some(&webhook)),
        webhook,
        redirect_url,
    };

    let outcome = dispatch(&notification, deps).await?;
    match AssignmentEvent::from_dispatch(operation, outcome) {
        AssignmentEvent::ResultReturned(mut result) => {
            if let Err(err) =
                formation_constraint::after_status_returned(deps, details, &mut result).await
            {
                return Ok(technical_failure(operation, details, err));
            }
            Ok(AssignmentEvent::ResultReturned(result))
        }
        other => Ok(other),
    }
}

fn technical_failure(
    operation: AssignmentOperation,
    details: &AssignmentDetails,
    err: anyhow::Error,
) -> AssignmentEvent {
    warn!(
        assignment_id = %details.assignment.id,
        error = %format!("{:#}", err),
        "Constraint failed for assignment notification"
    );
    AssignmentEvent::ResultReturned(NotificationResult::failed(
        operation,
        NotificationError::technical(format!("{:#}", err)),
    ))
}

/// Preconditions checked under the lock before an event is applied
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyGuard {
    /// Drop the event if the assignment changed since this revision was read
    pub expected_revision: Option<i64>,
    /// Time of the status report carrying the event; older reports are dropped
    pub reported_at: Option<DateTime<Utc>>,
}

impl ApplyGuard {
    pub fn revision(revision: i64) -> Self {
        Self {
            expected_revision: Some(revision),
            reported_at: None,
        }
    }

    pub fn reported_at(at: DateTime<Utc>) -> Self {
        Self {
            expected_revision: None,
            reported_at: Some(at),
        }
    }

    fn is_stale(&self, current: &FormationAssignment) -> bool {
        if self.expected_revision.is_some_and(|r| r != current.revision) {
            return true;
        }
        matches!(
            (self.reported_at, current.last_status_reported_at),
            (Some(reported), Some(last)) if reported < last
        )
    }
}

/// Apply `event` to the stored assignment under the formation lock.
pub async fn apply_event(
    assignment_id: FormationAssignmentId,
    guard: ApplyGuard,
    event: &AssignmentEvent,
    deps: &ServerDeps,
) -> Result<StepOutcome> {
    let Some(current) = deps.store.get_assignment(assignment_id).await? else {
        return Ok(StepOutcome::default());
    };
    let _lock = deps.locks.lock(current.formation_id).await;

    // Re-read under the lock
    let Some(current) = deps.store.get_assignment(assignment_id).await? else {
        return Ok(StepOutcome::default());
    };
    if guard.is_stale(&current) {
        info!(
            assignment_id = %assignment_id,
            expected_revision = ?guard.expected_revision,
            revision = current.revision,
            reported_at = ?guard.reported_at,
            "Assignment changed in the meantime, dropping stale result"
        );
        return Ok(StepOutcome {
            report: Some(AssignmentReport::of(&current)),
            wakes: Vec::new(),
            applied: false,
        });
    }

    let mut machine = AssignmentMachine::new(current.clone(), deps.settings.config_pending_resend_limit);
    let commands = machine.decide(event);
    let mut outcome = StepOutcome {
        applied: true,
        ..StepOutcome::default()
    };

    for command in commands {
        match command {
            AssignmentCommand::Persist(mut fa) => {
                if guard.reported_at.is_some() {
                    fa.last_status_reported_at = guard.reported_at;
                }
                deps.store.update_assignment(&fa).await?;
                outcome.report = Some(AssignmentReport::of(&fa));
            }
            AssignmentCommand::Delete(id) => {
                deps.store.delete_assignment(id).await?;
                deps.store
                    .delete_callback(CallbackSubject::Assignment(id))
                    .await?;
                deps.store.delete_destination_records(id).await?;
                info!(assignment_id = %id, "Assignment removed");
                outcome.report = Some(AssignmentReport::removed(&current));
            }
            AssignmentCommand::RecordError {
                assignment_id,
                error,
            } => {
                warn!(
                    assignment_id = %assignment_id,
                    error_code = %error.error_code,
                    error = %error.message,
                    "Assignment notification failed"
                );
            }
            AssignmentCommand::WakeReverse {
                formation_id,
                source,
                target,
            } => outcome.wakes.push(Wake {
                formation_id,
                source,
                target,
            }),
        }
    }

    if matches!(event, AssignmentEvent::ResultReturned(_)) {
        deps.store
            .delete_callback(CallbackSubject::Assignment(assignment_id))
            .await?;
    }

    Ok(outcome)
}
