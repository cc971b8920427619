// tutormesh-core/tests/breaker.rs
// ============================================================================
// Module: Circuit Breaker Tests
// Description: Tests for breaker state transitions and probe admission.
// ============================================================================
//! ## Overview
//! Validates the closed → open → half-open transition sequence with paused
//! time driving the open window.

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

use std::time::Duration;

use tutormesh_core::BreakerConfig;
use tutormesh_core::BreakerState;
use tutormesh_core::CircuitBreaker;
use tutormesh_core::runtime::BreakerDecision;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Breaker with the documented default thresholds.
fn default_breaker() -> CircuitBreaker {
    CircuitBreaker::new(BreakerConfig::default())
}

/// Asserts the breaker admits the next invocation.
fn assert_admitted(breaker: &CircuitBreaker) {
    assert_eq!(breaker.admit(), BreakerDecision::Admit);
}

// ============================================================================
// SECTION: Transitions
// ============================================================================

/// Five consecutive failures open the breaker; the next call fast-fails.
#[tokio::test(start_paused = true)]
async fn test_breaker_opens_after_five_consecutive_failures() {
    let breaker = default_breaker();
    for _ in 0..5 {
        assert_admitted(&breaker);
        breaker.record_failure();
    }
    assert_eq!(breaker.state(), BreakerState::Open);
    assert_eq!(
        breaker.admit(),
        BreakerDecision::FastFail {
            state: BreakerState::Open
        }
    );
}

/// Failures below the threshold keep the breaker closed, and one success
/// resets the count.
#[tokio::test(start_paused = true)]
async fn test_success_resets_consecutive_failures() {
    let breaker = default_breaker();
    for _ in 0..4 {
        assert_admitted(&breaker);
        breaker.record_failure();
    }
    assert_eq!(breaker.state(), BreakerState::Closed);
    breaker.record_success();
    for _ in 0..4 {
        assert_admitted(&breaker);
        breaker.record_failure();
    }
    assert_eq!(breaker.state(), BreakerState::Closed);
}

/// After the open window, exactly one half-open probe is admitted; success
/// closes the breaker.
#[tokio::test(start_paused = true)]
async fn test_half_open_probe_success_closes() {
    let breaker = default_breaker();
    for _ in 0..5 {
        breaker.record_failure();
    }
    assert_eq!(breaker.state(), BreakerState::Open);

    tokio::time::advance(Duration::from_secs(30)).await;
    assert_admitted(&breaker);
    assert_eq!(breaker.state(), BreakerState::HalfOpen);
    // The probe is outstanding: no second admission.
    assert_eq!(
        breaker.admit(),
        BreakerDecision::FastFail {
            state: BreakerState::HalfOpen
        }
    );

    breaker.record_success();
    assert_eq!(breaker.state(), BreakerState::Closed);
    assert_admitted(&breaker);
}

/// A failed half-open probe re-opens the breaker and restarts the timer.
#[tokio::test(start_paused = true)]
async fn test_half_open_probe_failure_reopens() {
    let breaker = default_breaker();
    for _ in 0..5 {
        breaker.record_failure();
    }
    tokio::time::advance(Duration::from_secs(30)).await;
    assert_admitted(&breaker);
    breaker.record_failure();
    assert_eq!(breaker.state(), BreakerState::Open);

    // The timer restarted: still fast-failing short of a full window.
    tokio::time::advance(Duration::from_secs(29)).await;
    assert_eq!(
        breaker.admit(),
        BreakerDecision::FastFail {
            state: BreakerState::Open
        }
    );
    tokio::time::advance(Duration::from_secs(1)).await;
    assert_admitted(&breaker);
}

/// The open window holds for its full duration before a probe is admitted.
#[tokio::test(start_paused = true)]
async fn test_open_window_holds_until_elapsed() {
    let breaker = default_breaker();
    for _ in 0..5 {
        breaker.record_failure();
    }
    tokio::time::advance(Duration::from_secs(29)).await;
    assert_eq!(
        breaker.admit(),
        BreakerDecision::FastFail {
            state: BreakerState::Open
        }
    );
}
