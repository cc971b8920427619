// tutormesh-core/tests/recommender.rs
// ============================================================================
// Module: Recommender Tests
// Description: Tests for the threshold rule engine and ranking.
// ============================================================================
//! ## Overview
//! Validates candidate selection below the mastery threshold, gap-score
//! ranking, action mapping, priority buckets, and the review tie-breaker.

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

use common::STUDENT;
use tutormesh_core::AgentSource;
use tutormesh_core::ComponentName;
use tutormesh_core::EventDate;
use tutormesh_core::ExerciseId;
use tutormesh_core::MasteryAggregate;
use tutormesh_core::StudentId;
use tutormesh_core::UnixMillis;
use tutormesh_core::core::progress::ActivityEntry;
use tutormesh_core::core::triage::Priority;
use tutormesh_core::runtime::RecommendedAction;
use tutormesh_core::runtime::recommender::build_set;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Aggregate with the given component values.
fn aggregate_with(values: &[(ComponentName, f64)]) -> MasteryAggregate {
    let date = EventDate::parse("2026-07-01").unwrap();
    let mut aggregate =
        MasteryAggregate::new(StudentId::new(STUDENT), date, UnixMillis::new(0));
    for (component, value) in values {
        aggregate.observe(*component, *value, UnixMillis::new(0));
    }
    aggregate.finalize(UnixMillis::new(0));
    aggregate
}

// ============================================================================
// SECTION: Candidate Selection
// ============================================================================

/// Components at or above the threshold produce no items.
#[test]
fn test_strong_components_produce_no_items() {
    let aggregate = aggregate_with(&[
        (ComponentName::Completion, 0.90),
        (ComponentName::Quiz, 0.75),
        (ComponentName::Quality, 0.70),
        (ComponentName::Consistency, 0.99),
    ]);
    let set = build_set(&aggregate, &[], UnixMillis::new(0));
    assert!(set.items.is_empty());
}

/// Candidates rank by weight-scaled gap, strongest first.
#[test]
fn test_ranking_by_weighted_gap() {
    // Gaps: completion 0.40·0.30=0.120, quiz 0.30·0.20=0.060,
    // quality 0.20·0.50=0.100.
    let aggregate = aggregate_with(&[
        (ComponentName::Completion, 0.40),
        (ComponentName::Quiz, 0.50),
        (ComponentName::Quality, 0.20),
        (ComponentName::Consistency, 0.95),
    ]);
    let set = build_set(&aggregate, &[], UnixMillis::new(0));
    let targets: Vec<ComponentName> = set.items.iter().map(|item| item.target_area).collect();
    assert_eq!(
        targets,
        vec![ComponentName::Completion, ComponentName::Quality, ComponentName::Quiz]
    );
}

/// A component absent from the aggregate counts as zero and becomes the
/// strongest candidate.
#[test]
fn test_absent_component_is_a_candidate() {
    let aggregate = aggregate_with(&[
        (ComponentName::Quiz, 0.90),
        (ComponentName::Quality, 0.90),
        (ComponentName::Consistency, 0.90),
    ]);
    let set = build_set(&aggregate, &[], UnixMillis::new(0));
    assert_eq!(set.items.len(), 1);
    assert_eq!(set.items[0].target_area, ComponentName::Completion);
    assert_eq!(set.items[0].priority, Priority::High);
}

// ============================================================================
// SECTION: Actions and Priorities
// ============================================================================

/// Actions map by component: practice, refactor, and schedule.
#[test]
fn test_action_mapping() {
    let aggregate = aggregate_with(&[
        (ComponentName::Completion, 0.10),
        (ComponentName::Quiz, 0.30),
        (ComponentName::Quality, 0.50),
        (ComponentName::Consistency, 0.60),
    ]);
    let set = build_set(&aggregate, &[], UnixMillis::new(0));
    for item in &set.items {
        let expected = match item.target_area {
            ComponentName::Completion | ComponentName::Quiz => RecommendedAction::Practice,
            ComponentName::Quality => RecommendedAction::Refactor,
            ComponentName::Consistency => RecommendedAction::Schedule,
        };
        if item.action != RecommendedAction::Review {
            assert_eq!(item.action, expected);
        }
    }
}

/// Equal gap scores downgrade the later candidate to a review action.
#[test]
fn test_equal_scores_tie_break_to_review() {
    // completion 0.40·0.15=0.060 and quiz 0.30·0.20=0.060 tie exactly.
    let aggregate = aggregate_with(&[
        (ComponentName::Completion, 0.55),
        (ComponentName::Quiz, 0.50),
        (ComponentName::Quality, 0.90),
        (ComponentName::Consistency, 0.90),
    ]);
    let set = build_set(&aggregate, &[], UnixMillis::new(0));
    assert_eq!(set.items.len(), 2);
    assert_ne!(set.items[0].action, RecommendedAction::Review);
    assert_eq!(set.items[1].action, RecommendedAction::Review);
}

/// Priorities bucket on the gap score.
#[test]
fn test_priority_buckets() {
    // completion gap 0.40·0.40=0.16 → high; consistency 0.10·0.40=0.04 → low.
    let aggregate = aggregate_with(&[
        (ComponentName::Completion, 0.30),
        (ComponentName::Quiz, 0.90),
        (ComponentName::Quality, 0.90),
        (ComponentName::Consistency, 0.30),
    ]);
    let set = build_set(&aggregate, &[], UnixMillis::new(0));
    assert_eq!(set.items[0].priority, Priority::High);
    assert_eq!(set.items[1].priority, Priority::Low);
}

// ============================================================================
// SECTION: Resource References
// ============================================================================

/// Recent exercises attach as resource references.
#[test]
fn test_recent_activity_feeds_resource_refs() {
    let aggregate = aggregate_with(&[(ComponentName::Completion, 0.10)]);
    let recent = vec![
        ActivityEntry {
            exercise_identifier: ExerciseId::new("ex_latest"),
            agent_source: AgentSource::Exercise,
            server_timestamp: UnixMillis::new(2),
        },
        ActivityEntry {
            exercise_identifier: ExerciseId::new("ex_older"),
            agent_source: AgentSource::Debug,
            server_timestamp: UnixMillis::new(1),
        },
    ];
    let set = build_set(&aggregate, &recent, UnixMillis::new(0));
    assert_eq!(set.items[0].resource_refs, vec!["ex_latest", "ex_older"]);
}
