// tutormesh-core/tests/router.rs
// ============================================================================
// Module: Triage Router Tests
// Description: End-to-end tests for the triage pipeline and its audits.
// ============================================================================
//! ## Overview
//! Validates the routing sequence: validation, classification, the constant
//! intent→agent table, invocation accounting, and exactly one audit per
//! decision regardless of outcome.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod common;

use std::sync::Arc;

use common::CapturingAuditSink;
use common::STUDENT;
use common::ScriptedInvoker;
use common::ScriptedOutcome;
use common::triage_request;
use serde_json::json;
use tutormesh_core::BreakerConfig;
use tutormesh_core::IdentityContext;
use tutormesh_core::IntentClassifier;
use tutormesh_core::IntentTag;
use tutormesh_core::InvocationClient;
use tutormesh_core::NoopMetrics;
use tutormesh_core::PlaneError;
use tutormesh_core::RequestId;
use tutormesh_core::RetryPolicy;
use tutormesh_core::Role;
use tutormesh_core::StudentId;
use tutormesh_core::TriageRouter;
use tutormesh_core::UnixMillis;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Router over a scripted invoker and a capturing audit sink.
fn router(
    invoker: Arc<ScriptedInvoker>,
    audit: Arc<CapturingAuditSink>,
) -> TriageRouter {
    let client = Arc::new(InvocationClient::new(
        invoker,
        BreakerConfig::default(),
        RetryPolicy::default(),
        Arc::new(NoopMetrics),
    ));
    TriageRouter::new(IntentClassifier::deterministic(), client, audit, Arc::new(NoopMetrics))
}

/// Student identity matching the fixture requests.
fn student_identity() -> IdentityContext {
    IdentityContext::new(StudentId::new(STUDENT), Role::Student)
}

// ============================================================================
// SECTION: Successful Routing
// ============================================================================

/// A syntax-help query routes to the debug agent with one invocation and one
/// audit.
#[tokio::test(start_paused = true)]
async fn test_syntax_help_routes_to_debug_agent() {
    let invoker = ScriptedInvoker::new(vec![ScriptedOutcome::Ok(json!({ "reply": "try x=3" }))]);
    let audits = CapturingAuditSink::new();
    let router = router(Arc::clone(&invoker), Arc::clone(&audits));

    let response = router
        .triage(
            &student_identity(),
            triage_request(STUDENT, "I'm getting a TypeError on line 3"),
            RequestId::generate(),
        )
        .await
        .unwrap();

    assert_eq!(response.intent_tag, IntentTag::SyntaxHelp);
    assert!(response.confidence >= 0.66);
    assert_eq!(response.target_agent_id.as_str(), "debug");
    assert_eq!(response.agent_response, json!({ "reply": "try x=3" }));
    assert_eq!(invoker.attempt_count(), 1);

    let recorded = audits.recorded();
    assert_eq!(recorded.len(), 1);
    let audit = &recorded[0];
    assert!(audit.validation_result.schema_ok);
    assert!(audit.validation_result.auth_ok);
    assert!(audit.invocation_result.success);
    assert_eq!(audit.invocation_result.attempts, 1);
    assert_eq!(audit.decision.target_agent_id.as_str(), "debug");
    assert_eq!(audit.request_id, response.request_id);
}

/// A low-confidence query falls back to the review agent at the fixed
/// confidence.
#[tokio::test(start_paused = true)]
async fn test_low_confidence_query_falls_back_to_review() {
    let invoker = ScriptedInvoker::new(vec![ScriptedOutcome::Ok(json!({}))]);
    let audits = CapturingAuditSink::new();
    let router = router(invoker, audits);

    let response = router
        .triage(&student_identity(), triage_request(STUDENT, "maybe"), RequestId::generate())
        .await
        .unwrap();
    assert_eq!(response.intent_tag, IntentTag::Review);
    assert!((response.confidence - 0.4).abs() < f64::EPSILON);
    assert_eq!(response.target_agent_id.as_str(), "review");
}

// ============================================================================
// SECTION: Terminal Failures
// ============================================================================

/// Validation failures return the violation list and still audit.
#[tokio::test(start_paused = true)]
async fn test_validation_failure_is_terminal_and_audited() {
    let invoker = ScriptedInvoker::new(Vec::new());
    let audits = CapturingAuditSink::new();
    let router = router(Arc::clone(&invoker), Arc::clone(&audits));

    let mut request = triage_request(STUDENT, "help");
    request.query = String::new();
    let error =
        router.triage(&student_identity(), request, RequestId::generate()).await.unwrap_err();
    assert!(matches!(error, PlaneError::Validation { .. }));
    // No invocation happened, but the decision was audited.
    assert_eq!(invoker.attempt_count(), 0);
    let recorded = audits.recorded();
    assert_eq!(recorded.len(), 1);
    assert!(!recorded[0].validation_result.schema_ok);
    assert!(!recorded[0].invocation_result.success);
}

/// A student may not submit a triage request for another student.
#[tokio::test(start_paused = true)]
async fn test_cross_student_submission_is_rejected() {
    let invoker = ScriptedInvoker::new(Vec::new());
    let audits = CapturingAuditSink::new();
    let router = router(Arc::clone(&invoker), Arc::clone(&audits));

    let other = "student_bbbbbbbb-bbbb-bbbb-bbbb-bbbbbbbbbbbb";
    let error = router
        .triage(&student_identity(), triage_request(other, "help me"), RequestId::generate())
        .await
        .unwrap_err();
    assert!(matches!(error, PlaneError::Authorization));
    assert_eq!(invoker.attempt_count(), 0);
    assert!(!audits.recorded()[0].validation_result.auth_ok);
}

/// A teacher may submit on behalf of a student.
#[tokio::test(start_paused = true)]
async fn test_teacher_may_act_for_any_student() {
    let invoker = ScriptedInvoker::new(vec![ScriptedOutcome::Ok(json!({}))]);
    let audits = CapturingAuditSink::new();
    let router = router(invoker, audits);

    let teacher = IdentityContext::new(StudentId::new("teacher-1"), Role::Teacher);
    let response = router
        .triage(&teacher, triage_request(STUDENT, "explain what is recursion"), RequestId::generate())
        .await
        .unwrap();
    assert_eq!(response.intent_tag, IntentTag::ConceptExplanation);
}

/// Upstream exhaustion surfaces as unavailable with attempt accounting in
/// the audit.
#[tokio::test(start_paused = true)]
async fn test_upstream_exhaustion_is_audited() {
    let invoker = ScriptedInvoker::new(vec![
        ScriptedOutcome::Transient,
        ScriptedOutcome::Transient,
        ScriptedOutcome::Transient,
    ]);
    let audits = CapturingAuditSink::new();
    let router = router(invoker, Arc::clone(&audits));

    let error = router
        .triage(
            &student_identity(),
            triage_request(STUDENT, "I'm getting a TypeError on line 3"),
            RequestId::generate(),
        )
        .await
        .unwrap_err();
    assert!(matches!(error, PlaneError::UpstreamUnavailable { attempts: 3, .. }));

    let recorded = audits.recorded();
    assert_eq!(recorded.len(), 1);
    assert!(!recorded[0].invocation_result.success);
    assert_eq!(recorded[0].invocation_result.attempts, 3);
    assert!(recorded[0].invocation_result.error_message.is_some());
}

/// Timestamp anchor used by fixtures stays within the ingress skew window.
#[tokio::test(start_paused = true)]
async fn test_fixture_timestamps_are_fresh() {
    let request = triage_request(STUDENT, "help");
    assert!(request.client_timestamp.abs_diff(UnixMillis::now()) < 1_000);
}
