// tutormesh-core/tests/mastery_math.rs
// ============================================================================
// Module: Mastery Formula Tests
// Description: Tests for the weighted final score and running means.
// ============================================================================
//! ## Overview
//! Validates the 0.40/0.30/0.20/0.10 weighted formula, three-decimal
//! rounding, and the running-mean component update.

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

use proptest::prelude::proptest;
use tutormesh_core::ComponentName;
use tutormesh_core::EventDate;
use tutormesh_core::MasteryAggregate;
use tutormesh_core::StudentId;
use tutormesh_core::UnixMillis;
use tutormesh_core::core::mastery::round3;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Fresh aggregate for a fixed (student, date) pair.
fn aggregate() -> MasteryAggregate {
    let date = EventDate::parse("2026-07-01").unwrap();
    MasteryAggregate::new(StudentId::new("student_s1"), date, UnixMillis::new(0))
}

// ============================================================================
// SECTION: Weighted Formula
// ============================================================================

/// The documented scenario: 0.75/0.80/0.90/0.85 yields a final score of
/// exactly 0.805 (0.40·0.75 + 0.30·0.80 + 0.20·0.90 + 0.10·0.85).
#[test]
fn test_weighted_formula_matches_documented_scenario() {
    let mut aggregate = aggregate();
    let at = UnixMillis::new(1_000);
    aggregate.observe(ComponentName::Completion, 0.75, at);
    aggregate.observe(ComponentName::Quiz, 0.80, at);
    aggregate.observe(ComponentName::Quality, 0.90, at);
    aggregate.observe(ComponentName::Consistency, 0.85, at);
    aggregate.finalize(at);
    assert!((aggregate.final_score - 0.805).abs() < 1e-9);
}

/// Absent components contribute zero to the final score.
#[test]
fn test_missing_components_contribute_zero() {
    let mut aggregate = aggregate();
    let at = UnixMillis::new(1_000);
    aggregate.observe(ComponentName::Completion, 1.0, at);
    aggregate.finalize(at);
    assert!((aggregate.final_score - 0.4).abs() < 1e-9);
}

/// The stored final score always satisfies the formula invariant within
/// rounding tolerance.
proptest! {
    #[test]
    fn prop_final_score_matches_weighted_combination(
        completion in 0.0_f64..=1.0,
        quiz in 0.0_f64..=1.0,
        quality in 0.0_f64..=1.0,
        consistency in 0.0_f64..=1.0,
    ) {
        let mut aggregate = aggregate();
        let at = UnixMillis::new(1_000);
        aggregate.observe(ComponentName::Completion, completion, at);
        aggregate.observe(ComponentName::Quiz, quiz, at);
        aggregate.observe(ComponentName::Quality, quality, at);
        aggregate.observe(ComponentName::Consistency, consistency, at);
        aggregate.finalize(at);
        let expected = 0.40 * completion + 0.30 * quiz + 0.20 * quality + 0.10 * consistency;
        assert!((aggregate.final_score - expected).abs() < 1e-3);
    }
}

// ============================================================================
// SECTION: Running Means
// ============================================================================

/// The component value is the unweighted mean of its contributions.
#[test]
fn test_component_running_mean() {
    let mut aggregate = aggregate();
    let at = UnixMillis::new(1_000);
    aggregate.observe(ComponentName::Quiz, 0.50, at);
    aggregate.observe(ComponentName::Quiz, 1.00, at);
    aggregate.observe(ComponentName::Quiz, 0.80, at);

    let record = aggregate.components.get(&ComponentName::Quiz).unwrap();
    assert_eq!(record.sample_count, 3);
    assert!((record.value - (0.50 + 1.00 + 0.80) / 3.0).abs() < 1e-9);
}

/// A single contribution leaves the value equal to that contribution.
#[test]
fn test_first_contribution_sets_value() {
    let mut aggregate = aggregate();
    let at = UnixMillis::new(1_000);
    aggregate.observe(ComponentName::Completion, 0.85, at);
    let record = aggregate.components.get(&ComponentName::Completion).unwrap();
    assert_eq!(record.sample_count, 1);
    assert!((record.value - 0.85).abs() < 1e-9);
}

// ============================================================================
// SECTION: Rounding
// ============================================================================

/// Final scores round half up at the third decimal.
#[test]
fn test_round3() {
    assert!((round3(0.794_9) - 0.795).abs() < 1e-9);
    assert!((round3(0.123_449) - 0.123).abs() < 1e-9);
    assert!((round3(1.0) - 1.0).abs() < 1e-9);
}

/// Component weights cover the whole unit.
#[test]
fn test_weights_sum_to_one() {
    let total: f64 = ComponentName::ALL.iter().map(|component| component.weight()).sum();
    assert!((total - 1.0).abs() < 1e-9);
}

/// Aggregates survive a serialization round trip unchanged.
#[test]
fn test_aggregate_serde_round_trip() {
    let mut aggregate = aggregate();
    let at = UnixMillis::new(1_000);
    aggregate.observe(ComponentName::Quality, 0.9, at);
    aggregate.finalize(at);
    aggregate.version = 3;

    let encoded = serde_json::to_value(&aggregate).unwrap();
    let decoded: MasteryAggregate = serde_json::from_value(encoded).unwrap();
    assert_eq!(decoded, aggregate);
}
