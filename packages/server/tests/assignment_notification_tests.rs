//! Integration tests for assignment notifications.
//!
//! Covers the notification flows end to end against the in-memory store:
//! - Pairwise assignment creation and who gets notified
//! - Suppression and redirect constraints
//! - CONFIG_PENDING rounds resolved by the reverse assignment
//! - Failed asynchronous notifications recovered by resynchronization
//! - Destination provisioning, asynchronous unassign and late status reports

mod common;

use std::time::Duration;

use chrono::{TimeZone, Utc};
use common::*;
use formation_core::common::{EngineError, ErrorCode};
use formation_core::domains::formation::actions::{
    assign_participant, formation_status, resynchronize_formation, unassign_participant,
};
use formation_core::domains::formation::models::{Formation, FormationCondition};
use formation_core::domains::formation_assignment::models::AssignmentState;
use formation_core::domains::formation_assignment::{StatusAck, StatusReport};
use formation_core::domains::formation_assignment::actions::report_assignment_status;
use formation_core::domains::formation_constraint::models::{
    ConstraintOperator, ConstraintScope, ConstraintType, FormationConstraint, TargetOperation,
};
use formation_core::domains::participant::{Participant, ParticipantKind};
use formation_core::kernel::BaseFormationStore;
use serde_json::json;
use test_context::test_context;

const A_URL: &str = "https://a.example.com";
const C_URL: &str = "https://c.example.com";
const REDIRECT_URL: &str = "https://redirect.example.com/hooks";

// ============================================================================
// Pairwise notifications
// ============================================================================

#[test_context(TestHarness)]
#[tokio::test]
async fn test_every_pair_gets_an_assignment(ctx: &TestHarness) {
    let deps = ctx.deps();
    let template = create_template(&deps, "mesh").await;
    let formation = create_formation_for(&deps, &template).await;

    for name in ["one", "two", "three"] {
        let participant = create_application(&deps, name).await;
        assign_participant(formation.id, participant.id, &deps)
            .await
            .unwrap();
    }

    let assignments = deps.store.list_assignments(formation.id).await.unwrap();
    assert_eq!(assignments.len(), 9);
    assert!(assignments.iter().all(|fa| fa.state == AssignmentState::Ready));
    assert!(ctx.webhooks().requests().is_empty());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_only_participant_with_webhook_is_notified(ctx: &TestHarness) {
    let deps = ctx.deps();
    let template = create_template(&deps, "side-by-side").await;
    let formation = create_formation_for(&deps, &template).await;
    let a = create_application(&deps, "app-a").await;
    let b = create_application(&deps, "app-b").await;
    add_sync_webhook(&deps, &a, A_URL).await;
    ctx.webhooks().respond(
        &mapping_url(A_URL, &formation),
        200,
        r#"{"config": {"credentials": "for-b"}}"#,
    );

    assign_participant(formation.id, b.id, &deps).await.unwrap();
    assign_participant(formation.id, a.id, &deps).await.unwrap();

    let to_a = deps.store.list_notifications_for_target(a.id).await.unwrap();
    assert_eq!(to_a.len(), 1);
    assert_eq!(to_a[0].operation, "assign");
    assert_eq!(to_a[0].request_method, "PATCH");
    assert!(deps
        .store
        .list_notifications_for_target(b.id)
        .await
        .unwrap()
        .is_empty());

    let b_to_a = deps
        .store
        .get_assignment_by_pair(formation.id, b.id, a.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(b_to_a.state, AssignmentState::Ready);
    assert_eq!(b_to_a.configuration, Some(json!({"credentials": "for-b"})));

    unassign_participant(formation.id, a.id, &deps).await.unwrap();

    let to_a = deps.store.list_notifications_for_target(a.id).await.unwrap();
    assert_eq!(to_a.len(), 2);
    assert_eq!(to_a[1].operation, "unassign");
    assert_eq!(to_a[1].request_method, "DELETE");

    let remaining = deps.store.list_assignments(formation.id).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!((remaining[0].source, remaining[0].target), (b.id, b.id));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_resynchronizing_a_ready_formation_sends_nothing(ctx: &TestHarness) {
    let deps = ctx.deps();
    let template = create_template(&deps, "steady").await;
    let formation = create_formation_for(&deps, &template).await;
    let a = create_application(&deps, "app-a").await;
    let b = create_application(&deps, "app-b").await;
    add_sync_webhook(&deps, &a, A_URL).await;
    ctx.webhooks()
        .respond(&mapping_url(A_URL, &formation), 200, r#"{"config": {"k": "v"}}"#);

    assign_participant(formation.id, a.id, &deps).await.unwrap();
    assign_participant(formation.id, b.id, &deps).await.unwrap();
    let before = deps.store.list_assignments(formation.id).await.unwrap();
    let sent = ctx.webhooks().requests().len();

    let report = resynchronize_formation(formation.id, false, &deps)
        .await
        .unwrap();

    assert!(report.assignments.assignments.is_empty());
    assert_eq!(ctx.webhooks().requests().len(), sent);
    let after = deps.store.list_assignments(formation.id).await.unwrap();
    for (old, new) in before.iter().zip(after.iter()) {
        assert_eq!(old.id, new.id);
        assert_eq!(old.configuration, new.configuration);
        assert_eq!(old.state, new.state);
    }
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_failing_peer_does_not_block_other_pairs(ctx: &TestHarness) {
    let deps = ctx.deps();
    let template = create_template(&deps, "partial").await;
    let formation = create_formation_for(&deps, &template).await;
    let a = create_application(&deps, "app-a").await;
    let c = create_application(&deps, "app-c").await;
    let b = create_application(&deps, "app-b").await;
    add_sync_webhook(&deps, &a, A_URL).await;
    add_sync_webhook(&deps, &c, C_URL).await;
    ctx.webhooks().respond(&mapping_url(A_URL, &formation), 200, "{}");
    ctx.webhooks().respond(
        &mapping_url(C_URL, &formation),
        500,
        r#"{"error": "tenant mapping failed"}"#,
    );

    assign_participant(formation.id, a.id, &deps).await.unwrap();
    assign_participant(formation.id, c.id, &deps).await.unwrap();
    let report = assign_participant(formation.id, b.id, &deps).await.unwrap();

    let b_to_a = deps
        .store
        .get_assignment_by_pair(formation.id, b.id, a.id)
        .await
        .unwrap()
        .unwrap();
    let b_to_c = deps
        .store
        .get_assignment_by_pair(formation.id, b.id, c.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(b_to_a.state, AssignmentState::Ready);
    assert_eq!(b_to_c.state, AssignmentState::CreateError);
    assert_eq!(
        b_to_c.error.as_ref().map(|e| e.error_code),
        Some(ErrorCode::RemoteRejection)
    );
    assert!(report.errors().any(|r| r.assignment_id == b_to_c.id));

    let view = formation_status(formation.id, &deps).await.unwrap();
    assert_eq!(view.status.condition, FormationCondition::Error);
    assert!(view
        .status
        .errors
        .iter()
        .any(|e| e.message == "tenant mapping failed"));
}

// ============================================================================
// Constraints
// ============================================================================

#[test_context(TestHarness)]
#[tokio::test]
async fn test_suppression_constraint_skips_matching_subtype(ctx: &TestHarness) {
    let deps = ctx.deps();
    let template = create_template(&deps, "suppressed").await;
    let formation = create_formation_for(&deps, &template).await;

    let constraint = FormationConstraint::new(
        "no-notifications-for-ignored",
        ConstraintOperator::DoNotGenerateFormationAssignmentNotification,
        TargetOperation::GenerateAssignmentNotification,
        ConstraintType::Pre,
        ConstraintScope::Global,
        r#"{"except_subtypes": []}"#,
    )
    .for_resource(ParticipantKind::Application, Some("ignored"));
    deps.store.insert_constraint(&constraint).await.unwrap();

    let a = save_participant(
        &deps,
        Participant::new(ParticipantKind::Application, "app-a", TENANT).with_subtype("ignored"),
    )
    .await;
    let c = create_application(&deps, "app-c").await;
    let b = create_application(&deps, "app-b").await;
    add_sync_webhook(&deps, &a, A_URL).await;
    add_sync_webhook(&deps, &c, C_URL).await;
    ctx.webhooks().respond(&mapping_url(A_URL, &formation), 200, "{}");
    ctx.webhooks().respond(&mapping_url(C_URL, &formation), 200, "{}");

    for participant in [&a, &b, &c] {
        assign_participant(formation.id, participant.id, &deps)
            .await
            .unwrap();
    }

    assert!(deps
        .store
        .list_notifications_for_target(a.id)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(
        deps.store
            .list_notifications_for_target(c.id)
            .await
            .unwrap()
            .len(),
        2
    );
    let assignments = deps.store.list_assignments(formation.id).await.unwrap();
    assert_eq!(assignments.len(), 9);
    assert!(assignments.iter().all(|fa| fa.state == AssignmentState::Ready));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_redirect_constraint_changes_url_but_not_pair(ctx: &TestHarness) {
    let deps = ctx.deps();
    let template = create_template(&deps, "redirected").await;
    let formation = create_formation_for(&deps, &template).await;

    let constraint = FormationConstraint::new(
        "redirect-to-proxy",
        ConstraintOperator::RedirectNotification,
        TargetOperation::SendNotification,
        ConstraintType::Pre,
        ConstraintScope::Global,
        format!(r#"{{"should_redirect": true, "url": "{}"}}"#, REDIRECT_URL),
    )
    .for_resource(ParticipantKind::Application, Some("proxied"));
    deps.store.insert_constraint(&constraint).await.unwrap();

    let a = save_participant(
        &deps,
        Participant::new(ParticipantKind::Application, "app-a", TENANT).with_subtype("proxied"),
    )
    .await;
    let b = create_application(&deps, "app-b").await;
    add_sync_webhook(&deps, &a, A_URL).await;
    ctx.webhooks().respond(REDIRECT_URL, 200, "{}");

    assign_participant(formation.id, a.id, &deps).await.unwrap();
    assign_participant(formation.id, b.id, &deps).await.unwrap();

    let to_a = deps.store.list_notifications_for_target(a.id).await.unwrap();
    assert_eq!(to_a.len(), 1);
    assert_eq!(to_a[0].request_url, REDIRECT_URL);
    assert_ne!(to_a[0].request_url, mapping_url(A_URL, &formation));
    assert!(ctx
        .webhooks()
        .requests_to(&mapping_url(A_URL, &formation))
        .is_empty());

    let b_to_a = deps
        .store
        .get_assignment_by_pair(formation.id, b.id, a.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(to_a[0].assignment_id, Some(b_to_a.id));
    assert_eq!(b_to_a.state, AssignmentState::Ready);
}

// ============================================================================
// CONFIG_PENDING
// ============================================================================

#[test_context(TestHarness)]
#[tokio::test]
async fn test_config_pending_resolves_after_reverse_is_configured(ctx: &TestHarness) {
    const B_URL: &str = "https://b.example.com";

    let deps = ctx.deps();
    let template = create_template(&deps, "negotiated").await;
    let formation = create_formation_for(&deps, &template).await;
    let a = create_application(&deps, "app-a").await;
    let b = create_application(&deps, "app-b").await;
    add_sync_webhook(&deps, &a, A_URL).await;
    add_sync_webhook(&deps, &b, B_URL).await;

    // A needs B's configuration before it can finish
    ctx.webhooks().push_response(
        &mapping_url(A_URL, &formation),
        204,
        r#"{"config": {"a": "partial"}}"#,
    );
    ctx.webhooks().respond(
        &mapping_url(A_URL, &formation),
        200,
        r#"{"config": {"a": "complete"}}"#,
    );
    ctx.webhooks()
        .respond(&mapping_url(B_URL, &formation), 200, r#"{"config": {"b": "complete"}}"#);

    assign_participant(formation.id, a.id, &deps).await.unwrap();
    assign_participant(formation.id, b.id, &deps).await.unwrap();

    let b_to_a = deps
        .store
        .get_assignment_by_pair(formation.id, b.id, a.id)
        .await
        .unwrap()
        .unwrap();
    let a_to_b = deps
        .store
        .get_assignment_by_pair(formation.id, a.id, b.id)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(b_to_a.state, AssignmentState::Ready);
    assert_eq!(b_to_a.configuration, Some(json!({"a": "complete"})));
    assert_eq!(b_to_a.config_pending_rounds, 0);
    assert_eq!(a_to_b.state, AssignmentState::Ready);
    assert_eq!(a_to_b.configuration, Some(json!({"b": "complete"})));

    assert_eq!(
        ctx.webhooks()
            .requests_to(&mapping_url(A_URL, &formation))
            .len(),
        2
    );
    assert_eq!(
        ctx.webhooks()
            .requests_to(&mapping_url(B_URL, &formation))
            .len(),
        1
    );
}

#[tokio::test]
async fn test_config_pending_limit_fails_the_assignment() {
    const B_URL: &str = "https://b.example.com";

    let ctx = TestHarness::with_dependencies(
        formation_core::kernel::TestDependencies::new().with_resend_limit(1),
    );
    let deps = ctx.deps();
    let template = create_template(&deps, "stubborn").await;
    let formation = create_formation_for(&deps, &template).await;
    let a = create_application(&deps, "app-a").await;
    let b = create_application(&deps, "app-b").await;
    add_sync_webhook(&deps, &a, A_URL).await;
    add_sync_webhook(&deps, &b, B_URL).await;
    // Both sides keep asking for another round
    ctx.webhooks()
        .respond(&mapping_url(A_URL, &formation), 204, r#"{"config": {"a": "again"}}"#);
    ctx.webhooks()
        .respond(&mapping_url(B_URL, &formation), 204, r#"{"config": {"b": "again"}}"#);

    assign_participant(formation.id, a.id, &deps).await.unwrap();
    let report = assign_participant(formation.id, b.id, &deps).await.unwrap();

    for (source, target) in [(b.id, a.id), (a.id, b.id)] {
        let fa = deps
            .store
            .get_assignment_by_pair(formation.id, source, target)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fa.state, AssignmentState::CreateError);
        assert_eq!(
            fa.error.map(|e| e.error_code),
            Some(ErrorCode::ConfigPendingLimitExceeded)
        );
    }
    assert_eq!(report.errors().count(), 2);
    assert_eq!(
        ctx.webhooks()
            .requests_to(&mapping_url(A_URL, &formation))
            .len(),
        2
    );
}

// ============================================================================
// Asynchronous webhooks
// ============================================================================

#[test_context(TestHarness)]
#[tokio::test]
async fn test_rejected_async_notification_recovers_through_resync(ctx: &TestHarness) {
    let deps = ctx.deps();
    let template = create_template(&deps, "async").await;
    let formation = create_formation_for(&deps, &template).await;
    let a = create_application(&deps, "app-a").await;
    let b = create_application(&deps, "app-b").await;
    add_async_webhook(&deps, &a, A_URL).await;
    ctx.webhooks()
        .respond(&mapping_url(A_URL, &formation), 400, r#"{"error": "not yet"}"#);

    assign_participant(formation.id, a.id, &deps).await.unwrap();
    assign_participant(formation.id, b.id, &deps).await.unwrap();

    let b_to_a = deps
        .store
        .get_assignment_by_pair(formation.id, b.id, a.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(b_to_a.state, AssignmentState::CreateError);

    // Remote side fixed
    ctx.webhooks()
        .respond(&mapping_url(A_URL, &formation), 202, "");
    resynchronize_formation(formation.id, false, &deps)
        .await
        .unwrap();

    let accepted = deps.store.get_assignment(b_to_a.id).await.unwrap().unwrap();
    assert_eq!(accepted.state, AssignmentState::Initial);
    assert!(accepted.error.is_none());

    let ack = report_assignment_status(
        formation.id,
        b_to_a.id,
        StatusReport {
            state: Some("READY".to_string()),
            configuration: Some(json!({"tenant": "mapped"})),
            ..Default::default()
        },
        &deps,
    )
    .await
    .unwrap();
    assert!(matches!(ack, StatusAck::Applied { .. }));

    let ready = deps.store.get_assignment(b_to_a.id).await.unwrap().unwrap();
    assert_eq!(ready.state, AssignmentState::Ready);
    assert_eq!(ready.configuration, Some(json!({"tenant": "mapped"})));
    assert_eq!(
        deps.store
            .list_assignments(formation.id)
            .await
            .unwrap()
            .len(),
        4
    );
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_reset_resync_discards_configuration_of_unfinished_pairs(ctx: &TestHarness) {
    let deps = ctx.deps();
    let template = create_reset_template(&deps, "resettable").await;
    let formation = create_formation_for(&deps, &template).await;
    let a = create_application(&deps, "app-a").await;
    let b = create_application(&deps, "app-b").await;
    add_sync_webhook(&deps, &a, A_URL).await;
    ctx.webhooks()
        .respond(&mapping_url(A_URL, &formation), 204, r#"{"config": {"a": "half"}}"#);

    assign_participant(formation.id, a.id, &deps).await.unwrap();
    assign_participant(formation.id, b.id, &deps).await.unwrap();

    ctx.webhooks()
        .respond(&mapping_url(A_URL, &formation), 200, "{}");
    resynchronize_formation(formation.id, true, &deps)
        .await
        .unwrap();

    let b_to_a = deps
        .store
        .get_assignment_by_pair(formation.id, b.id, a.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(b_to_a.state, AssignmentState::Ready);
    assert_eq!(b_to_a.value, None);
    assert_eq!(b_to_a.configuration, None);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_reset_requires_template_support(ctx: &TestHarness) {
    let deps = ctx.deps();
    let template = create_template(&deps, "no-reset").await;
    let formation = create_formation_for(&deps, &template).await;

    let err = resynchronize_formation(formation.id, true, &deps)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        formation_core::common::EngineError::ResetNotSupported(_)
    ));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_status_report_wakes_pending_reverse_in_background(ctx: &TestHarness) {
    const B_URL: &str = "https://b.example.com";

    let deps = ctx.deps();
    let template = create_template(&deps, "mixed-modes").await;
    let formation = create_formation_for(&deps, &template).await;
    let a = create_application(&deps, "app-a").await;
    let b = create_application(&deps, "app-b").await;
    add_async_webhook(&deps, &a, A_URL).await;
    add_sync_webhook(&deps, &b, B_URL).await;
    ctx.webhooks()
        .respond(&mapping_url(A_URL, &formation), 202, "");
    // B waits for A's configuration before finishing
    ctx.webhooks().push_response(
        &mapping_url(B_URL, &formation),
        204,
        r#"{"config": {"b": "draft"}}"#,
    );
    ctx.webhooks()
        .respond(&mapping_url(B_URL, &formation), 200, r#"{"config": {"b": "final"}}"#);

    assign_participant(formation.id, a.id, &deps).await.unwrap();
    assign_participant(formation.id, b.id, &deps).await.unwrap();

    let a_to_b = deps
        .store
        .get_assignment_by_pair(formation.id, a.id, b.id)
        .await
        .unwrap()
        .unwrap();
    let b_to_a = deps
        .store
        .get_assignment_by_pair(formation.id, b.id, a.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(a_to_b.state, AssignmentState::ConfigPending);
    assert_eq!(b_to_a.state, AssignmentState::Initial);

    report_assignment_status(
        formation.id,
        b_to_a.id,
        StatusReport {
            state: Some("READY".to_string()),
            configuration: Some(json!({"a": "final"})),
            ..Default::default()
        },
        &deps,
    )
    .await
    .unwrap();

    let store = deps.store.clone();
    let resolved = ctx
        .eventually(|| {
            let store = store.clone();
            async move {
                store
                    .get_assignment(a_to_b.id)
                    .await
                    .ok()
                    .flatten()
                    .is_some_and(|fa| fa.state == AssignmentState::Ready)
            }
        })
        .await;
    assert!(resolved, "reverse assignment should resolve in the background");

    let a_to_b = deps.store.get_assignment(a_to_b.id).await.unwrap().unwrap();
    assert_eq!(a_to_b.configuration, Some(json!({"b": "final"})));
}

// ============================================================================
// Concurrent membership changes
// ============================================================================

#[test_context(TestHarness)]
#[tokio::test]
async fn test_concurrent_assigns_of_one_participant_both_succeed(ctx: &TestHarness) {
    let deps = ctx.deps();
    let template = create_template(&deps, "racy").await;
    let formation = create_formation_for(&deps, &template).await;
    let a = create_application(&deps, "app-a").await;
    let b = create_application(&deps, "app-b").await;
    assign_participant(formation.id, a.id, &deps).await.unwrap();

    // Both calls pass their pre-checks before either can insert
    let held = deps.locks.lock(formation.id).await;
    let spawn_assign = || {
        let deps = deps.clone();
        let (formation_id, participant_id) = (formation.id, b.id);
        tokio::spawn(async move { assign_participant(formation_id, participant_id, &deps).await })
    };
    let first = spawn_assign();
    let second = spawn_assign();
    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(held);

    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();
    assert_eq!(first.assignments.len(), 3);
    assert_eq!(second.assignments.len(), 3);
    assert_eq!(
        deps.store
            .list_assignments(formation.id)
            .await
            .unwrap()
            .len(),
        4
    );
}

// ============================================================================
// Destination provisioning
// ============================================================================

#[test_context(TestHarness)]
#[tokio::test]
async fn test_destination_creator_provisions_and_tears_down(ctx: &TestHarness) {
    let deps = ctx.deps();
    let template = create_template(&deps, "destinations").await;
    let formation = create_formation_for(&deps, &template).await;
    for (name, target_operation, constraint_type) in [
        (
            "provision-destinations",
            TargetOperation::NotificationStatusReturned,
            ConstraintType::Post,
        ),
        (
            "delete-destinations",
            TargetOperation::SendNotification,
            ConstraintType::Pre,
        ),
    ] {
        let constraint = FormationConstraint::new(
            name,
            ConstraintOperator::DestinationCreator,
            target_operation,
            constraint_type,
            ConstraintScope::Global,
            "{}",
        );
        deps.store.insert_constraint(&constraint).await.unwrap();
    }

    let a = create_application(&deps, "app-a").await;
    let b = create_application(&deps, "app-b").await;
    add_sync_webhook(&deps, &a, A_URL).await;
    ctx.webhooks().respond(
        &mapping_url(A_URL, &formation),
        200,
        r#"{"config": {"credentials": {"inboundCommunication": {"samlAssertion": {"destinations": [{"name": "saml-dest", "url": "https://saml.example.com"}]}}}}}"#,
    );

    assign_participant(formation.id, a.id, &deps).await.unwrap();
    assign_participant(formation.id, b.id, &deps).await.unwrap();

    let b_to_a = deps
        .store
        .get_assignment_by_pair(formation.id, b.id, a.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(b_to_a.state, AssignmentState::Ready);
    let config = b_to_a.configuration.expect("configuration should be stored");
    assert_eq!(
        config["credentials"]["inboundCommunication"]["samlAssertion"]["certificate"],
        "mock-certificate-saml-dest-cert"
    );

    let certificates = ctx.destinations().created_certificates();
    assert_eq!(certificates.len(), 1);
    assert_eq!(certificates[0].name, "saml-dest-cert");
    let destinations = ctx.destinations().created_destinations();
    assert_eq!(destinations.len(), 1);
    assert_eq!(destinations[0].name, "saml-dest");
    assert_eq!(destinations[0].authentication, "OAuth2SAMLBearerAssertion");
    assert_eq!(destinations[0].key_store_location.as_deref(), Some("saml-dest-cert"));

    unassign_participant(formation.id, b.id, &deps).await.unwrap();

    assert_eq!(ctx.destinations().deleted_destinations(), vec!["saml-dest".to_string()]);
    assert_eq!(
        ctx.destinations().deleted_certificates(),
        vec!["saml-dest-cert".to_string()]
    );
    assert!(deps
        .store
        .list_destination_records(b_to_a.id)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(
        deps.store
            .list_assignments(formation.id)
            .await
            .unwrap()
            .len(),
        1
    );
}

// ============================================================================
// Asynchronous unassign and late reports
// ============================================================================

/// A answers 202 to every notification; B has no webhook.
async fn async_members(ctx: &TestHarness, name: &str) -> (Formation, Participant, Participant) {
    let deps = ctx.deps();
    let template = create_template(&deps, name).await;
    let formation = create_formation_for(&deps, &template).await;
    let a = create_application(&deps, "app-a").await;
    let b = create_application(&deps, "app-b").await;
    add_async_webhook(&deps, &a, A_URL).await;
    ctx.webhooks()
        .respond(&mapping_url(A_URL, &formation), 202, "");

    assign_participant(formation.id, a.id, &deps).await.unwrap();
    assign_participant(formation.id, b.id, &deps).await.unwrap();
    (formation, a, b)
}

fn ready_report(configuration: serde_json::Value) -> StatusReport {
    StatusReport {
        state: Some("READY".to_string()),
        configuration: Some(configuration),
        ..Default::default()
    }
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_async_unassign_waits_for_status_report(ctx: &TestHarness) {
    let deps = ctx.deps();
    let (formation, a, b) = async_members(ctx, "async-unassign").await;
    let b_to_a = deps
        .store
        .get_assignment_by_pair(formation.id, b.id, a.id)
        .await
        .unwrap()
        .unwrap();
    report_assignment_status(formation.id, b_to_a.id, ready_report(json!({"v": 1})), &deps)
        .await
        .unwrap();

    unassign_participant(formation.id, b.id, &deps).await.unwrap();

    let deleting = deps.store.get_assignment(b_to_a.id).await.unwrap().unwrap();
    assert_eq!(deleting.state, AssignmentState::Deleting);
    let methods: Vec<_> = ctx
        .webhooks()
        .requests_to(&mapping_url(A_URL, &formation))
        .into_iter()
        .map(|r| r.method)
        .collect();
    assert_eq!(methods, vec!["PATCH".to_string(), "DELETE".to_string()]);

    let ack = report_assignment_status(
        formation.id,
        b_to_a.id,
        StatusReport {
            state: Some("READY".to_string()),
            ..Default::default()
        },
        &deps,
    )
    .await
    .unwrap();
    assert!(matches!(ack, StatusAck::Applied { .. }));
    assert!(deps.store.get_assignment(b_to_a.id).await.unwrap().is_none());
    assert_eq!(
        deps.store
            .list_assignments(formation.id)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_report_without_pending_notification_is_rejected(ctx: &TestHarness) {
    let deps = ctx.deps();
    let (formation, a, b) = async_members(ctx, "late-report").await;
    let b_to_a = deps
        .store
        .get_assignment_by_pair(formation.id, b.id, a.id)
        .await
        .unwrap()
        .unwrap();
    report_assignment_status(formation.id, b_to_a.id, ready_report(json!({"v": 1})), &deps)
        .await
        .unwrap();

    // The round is over; a second answer has nothing to resolve
    let err = report_assignment_status(formation.id, b_to_a.id, ready_report(json!({"v": 2})), &deps)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidStatusTransition(_)));

    // A->B was never sent anywhere
    let a_to_b = deps
        .store
        .get_assignment_by_pair(formation.id, a.id, b.id)
        .await
        .unwrap()
        .unwrap();
    let err = report_assignment_status(
        formation.id,
        a_to_b.id,
        StatusReport {
            state: Some("CREATE_ERROR".to_string()),
            error: Some("too late".to_string()),
            ..Default::default()
        },
        &deps,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, EngineError::InvalidStatusTransition(_)));

    let b_to_a = deps.store.get_assignment(b_to_a.id).await.unwrap().unwrap();
    assert_eq!(b_to_a.configuration, Some(json!({"v": 1})));
    let a_to_b = deps.store.get_assignment(a_to_b.id).await.unwrap().unwrap();
    assert_eq!(a_to_b.state, AssignmentState::Ready);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_report_older_than_pending_notification_is_stale(ctx: &TestHarness) {
    let deps = ctx.deps();
    let (formation, a, b) = async_members(ctx, "superseded-round").await;
    let b_to_a = deps
        .store
        .get_assignment_by_pair(formation.id, b.id, a.id)
        .await
        .unwrap()
        .unwrap();

    let mut report = ready_report(json!({"v": "old"}));
    report.reported_at = Some(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());
    let ack = report_assignment_status(formation.id, b_to_a.id, report, &deps)
        .await
        .unwrap();
    assert_eq!(ack, StatusAck::Stale);

    let pending = deps.store.get_assignment(b_to_a.id).await.unwrap().unwrap();
    assert_eq!(pending.state, AssignmentState::Initial);
    assert_eq!(pending.configuration, None);
}
