// tutormesh-core/tests/invoker.rs
// ============================================================================
// Module: Invocation Client Tests
// Description: Tests for retry policy, breaker integration, and timeouts.
// ============================================================================
//! ## Overview
//! Validates attempt accounting, transient-only retries, fast-fail under an
//! open breaker, and half-open recovery, all under paused time.

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
use std::time::Duration;

use common::ScriptedInvoker;
use common::ScriptedOutcome;
use serde_json::json;
use tutormesh_core::AgentId;
use tutormesh_core::BreakerConfig;
use tutormesh_core::BreakerState;
use tutormesh_core::InvocationClient;
use tutormesh_core::NoopMetrics;
use tutormesh_core::PlaneError;
use tutormesh_core::RetryPolicy;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Client over a scripted invoker with default policies.
fn client(invoker: Arc<ScriptedInvoker>) -> InvocationClient {
    InvocationClient::new(
        invoker,
        BreakerConfig::default(),
        RetryPolicy::default(),
        Arc::new(NoopMetrics),
    )
}

/// The debug agent target used throughout.
fn debug_agent() -> AgentId {
    AgentId::new("debug")
}

// ============================================================================
// SECTION: Retry Policy
// ============================================================================

/// Transient failures retry up to three attempts and then surface the
/// upstream error.
#[tokio::test(start_paused = true)]
async fn test_transient_failures_exhaust_three_attempts() {
    let invoker = ScriptedInvoker::new(vec![
        ScriptedOutcome::Transient,
        ScriptedOutcome::Transient,
        ScriptedOutcome::Transient,
    ]);
    let client = client(Arc::clone(&invoker));

    let failure = client.invoke(&debug_agent(), "handle_query", &json!({})).await.unwrap_err();
    assert_eq!(failure.attempts, 3);
    assert_eq!(invoker.attempt_count(), 3);
    assert!(matches!(failure.error, PlaneError::UpstreamUnavailable { attempts: 3, .. }));
}

/// A transient failure followed by success returns the response with the
/// attempt count.
#[tokio::test(start_paused = true)]
async fn test_retry_then_success() {
    let invoker = ScriptedInvoker::new(vec![
        ScriptedOutcome::Transient,
        ScriptedOutcome::Ok(json!({ "answer": 42 })),
    ]);
    let client = client(Arc::clone(&invoker));

    let success = client.invoke(&debug_agent(), "handle_query", &json!({})).await.unwrap();
    assert_eq!(success.attempts, 2);
    assert_eq!(success.response, json!({ "answer": 42 }));
    assert_eq!(success.breaker_state, BreakerState::Closed);
}

/// Permanent failures are not retried.
#[tokio::test(start_paused = true)]
async fn test_permanent_failure_is_not_retried() {
    let invoker = ScriptedInvoker::new(vec![ScriptedOutcome::Permanent]);
    let client = client(Arc::clone(&invoker));

    let failure = client.invoke(&debug_agent(), "handle_query", &json!({})).await.unwrap_err();
    assert_eq!(failure.attempts, 1);
    assert_eq!(invoker.attempt_count(), 1);
}

/// An attempt that outlives its deadline counts as a retryable failure.
#[tokio::test(start_paused = true)]
async fn test_attempt_timeout_is_retried() {
    let invoker = ScriptedInvoker::new(vec![
        ScriptedOutcome::Hang,
        ScriptedOutcome::Ok(json!({})),
    ]);
    let client = client(Arc::clone(&invoker));

    let success = client.invoke(&debug_agent(), "handle_query", &json!({})).await.unwrap();
    assert_eq!(success.attempts, 2);
}

// ============================================================================
// SECTION: Breaker Integration
// ============================================================================

/// Five failed invocations open the breaker; the sixth fast-fails with no
/// upstream attempt.
#[tokio::test(start_paused = true)]
async fn test_breaker_trips_after_five_failed_invocations() {
    let mut script = Vec::new();
    for _ in 0..15 {
        script.push(ScriptedOutcome::Transient);
    }
    let invoker = ScriptedInvoker::new(script);
    let client = client(Arc::clone(&invoker));
    let target = debug_agent();

    for _ in 0..5 {
        let failure = client.invoke(&target, "handle_query", &json!({})).await.unwrap_err();
        assert!(!failure.breaker_tripped);
    }
    assert_eq!(client.breaker_state(&target), BreakerState::Open);

    let attempts_before = invoker.attempt_count();
    let failure = client.invoke(&target, "handle_query", &json!({})).await.unwrap_err();
    assert!(failure.breaker_tripped);
    assert_eq!(failure.attempts, 0);
    assert_eq!(failure.breaker_state, BreakerState::Open);
    assert!(matches!(failure.error, PlaneError::BreakerOpen { .. }));
    // Fast-fail means no upstream attempt happened.
    assert_eq!(invoker.attempt_count(), attempts_before);
}

/// After the open window a single probe is admitted; success closes the
/// breaker for subsequent calls.
#[tokio::test(start_paused = true)]
async fn test_half_open_probe_recovers() {
    let mut script = Vec::new();
    for _ in 0..15 {
        script.push(ScriptedOutcome::Transient);
    }
    script.push(ScriptedOutcome::Ok(json!({ "ok": true })));
    let invoker = ScriptedInvoker::new(script);
    let client = client(Arc::clone(&invoker));
    let target = debug_agent();

    for _ in 0..5 {
        let _ = client.invoke(&target, "handle_query", &json!({})).await;
    }
    assert_eq!(client.breaker_state(&target), BreakerState::Open);

    tokio::time::advance(Duration::from_secs(30)).await;
    let success = client.invoke(&target, "handle_query", &json!({})).await.unwrap();
    assert_eq!(success.response, json!({ "ok": true }));
    assert_eq!(client.breaker_state(&target), BreakerState::Closed);
}

/// Distinct targets hold independent breakers.
#[tokio::test(start_paused = true)]
async fn test_breakers_are_per_target() {
    let mut script = Vec::new();
    for _ in 0..15 {
        script.push(ScriptedOutcome::Transient);
    }
    script.push(ScriptedOutcome::Ok(json!({})));
    let invoker = ScriptedInvoker::new(script);
    let client = client(Arc::clone(&invoker));

    for _ in 0..5 {
        let _ = client.invoke(&debug_agent(), "handle_query", &json!({})).await;
    }
    assert_eq!(client.breaker_state(&debug_agent()), BreakerState::Open);

    let concepts = AgentId::new("concepts");
    assert_eq!(client.breaker_state(&concepts), BreakerState::Closed);
    let success = client.invoke(&concepts, "handle_query", &json!({})).await.unwrap();
    assert_eq!(success.attempts, 1);
}
