// tutormesh-core/tests/query_predictor.rs
// ============================================================================
// Module: Query and Predictor Tests
// Description: Tests for mastery reads, history aggregation, and projections.
// ============================================================================
//! ## Overview
//! Seeds daily aggregates directly under their store keys, then validates
//! authorization scoping, history spans and granularity, and the
//! least-squares projection with its confidence and trend rules.

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

use common::STUDENT;
use tutormesh_core::ComponentName;
use tutormesh_core::EventDate;
use tutormesh_core::Granularity;
use tutormesh_core::HotCache;
use tutormesh_core::IdentityContext;
use tutormesh_core::InMemoryStateStore;
use tutormesh_core::MasteryAggregate;
use tutormesh_core::PlaneError;
use tutormesh_core::Predictor;
use tutormesh_core::QueryService;
use tutormesh_core::Role;
use tutormesh_core::StateStore;
use tutormesh_core::StudentId;
use tutormesh_core::Trend;
use tutormesh_core::UnixMillis;
use tutormesh_core::runtime::SharedStateStore;
use tutormesh_core::runtime::keys;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Writes a daily aggregate with the given final score directly to the
/// store.
fn seed_daily(store: &SharedStateStore, student: &StudentId, date: EventDate, score: f64) {
    let mut aggregate = MasteryAggregate::new(student.clone(), date, UnixMillis::new(0));
    aggregate.observe(ComponentName::Completion, score, UnixMillis::new(0));
    aggregate.finalize(UnixMillis::new(0));
    aggregate.final_score = score;
    aggregate.version = 1;
    let key = keys::mastery_key(student, date);
    store.put(&key, &serde_json::to_value(&aggregate).unwrap(), None).unwrap();
}

/// Fresh service stack over one in-memory store.
fn stack() -> (SharedStateStore, Arc<QueryService>, Predictor) {
    let store = SharedStateStore::from_store(InMemoryStateStore::new());
    let query = Arc::new(QueryService::new(store.clone(), Arc::new(HotCache::default())));
    let predictor = Predictor::new(store.clone(), Arc::clone(&query));
    (store, query, predictor)
}

/// The subject student.
fn student() -> StudentId {
    StudentId::new(STUDENT)
}

/// Identity of the subject student.
fn self_identity() -> IdentityContext {
    IdentityContext::new(student(), Role::Student)
}

// ============================================================================
// SECTION: Authorization
// ============================================================================

/// A student may not read another student's records, and the denial does
/// not reveal whether the subject exists.
#[tokio::test(start_paused = true)]
async fn test_student_cannot_read_other_records() {
    let (_store, query, _predictor) = stack();
    let other = StudentId::new("student_bbbbbbbb-bbbb-bbbb-bbbb-bbbbbbbbbbbb");

    let error = query
        .current_mastery(&self_identity(), &other, UnixMillis::now())
        .await
        .unwrap_err();
    assert!(matches!(error, PlaneError::Authorization));
}

/// Teachers read any student within the tenant.
#[tokio::test(start_paused = true)]
async fn test_teacher_reads_any_student() {
    let (store, query, _predictor) = stack();
    let subject = student();
    seed_daily(&store, &subject, UnixMillis::now().date(), 0.5);

    let teacher = IdentityContext::new(StudentId::new("teacher-1"), Role::Teacher);
    let aggregate = query.current_mastery(&teacher, &subject, UnixMillis::now()).await.unwrap();
    assert!((aggregate.final_score - 0.5).abs() < 1e-9);
}

/// A student with no records reads an empty synthesized view at version
/// zero.
#[tokio::test(start_paused = true)]
async fn test_empty_view_is_synthesized() {
    let (_store, query, _predictor) = stack();
    let aggregate = query
        .current_mastery(&self_identity(), &student(), UnixMillis::now())
        .await
        .unwrap();
    assert_eq!(aggregate.version, 0);
    assert!(aggregate.components.is_empty());
}

// ============================================================================
// SECTION: History
// ============================================================================

/// History spans beyond 90 days are rejected.
#[tokio::test(start_paused = true)]
async fn test_history_span_beyond_ninety_days_is_rejected() {
    let (_store, query, _predictor) = stack();
    let start = EventDate::parse("2026-01-01").unwrap();
    let end = EventDate::parse("2026-05-01").unwrap();

    let error = query
        .history(&self_identity(), &student(), start, end, Granularity::Daily)
        .unwrap_err();
    assert!(matches!(error, PlaneError::Validation { .. }));
}

/// Daily history returns one point per day inside the range, in order.
#[tokio::test(start_paused = true)]
async fn test_daily_history_points() {
    let (store, query, _predictor) = stack();
    let subject = student();
    for (day, score) in [("2026-07-01", 0.4), ("2026-07-02", 0.5), ("2026-07-03", 0.6)] {
        seed_daily(&store, &subject, EventDate::parse(day).unwrap(), score);
    }
    // A neighbor outside the requested range.
    seed_daily(&store, &subject, EventDate::parse("2026-06-01").unwrap(), 0.9);

    let series = query
        .history(
            &self_identity(),
            &subject,
            EventDate::parse("2026-07-01").unwrap(),
            EventDate::parse("2026-07-31").unwrap(),
            Granularity::Daily,
        )
        .unwrap();
    assert_eq!(series.points.len(), 3);
    assert_eq!(series.points[0].bucket, "2026-07-01");
    assert!((series.points[2].final_score - 0.6).abs() < 1e-9);
    assert_eq!(series.version, 1);
}

/// Monthly granularity folds days into one averaged point.
#[tokio::test(start_paused = true)]
async fn test_monthly_history_averages() {
    let (store, query, _predictor) = stack();
    let subject = student();
    for (day, score) in [("2026-07-01", 0.4), ("2026-07-15", 0.8)] {
        seed_daily(&store, &subject, EventDate::parse(day).unwrap(), score);
    }

    let series = query
        .history(
            &self_identity(),
            &subject,
            EventDate::parse("2026-07-01").unwrap(),
            EventDate::parse("2026-07-31").unwrap(),
            Granularity::Monthly,
        )
        .unwrap();
    assert_eq!(series.points.len(), 1);
    assert_eq!(series.points[0].bucket, "2026-07");
    assert_eq!(series.points[0].days, 2);
    assert!((series.points[0].final_score - 0.6).abs() < 1e-9);
}

// ============================================================================
// SECTION: Predictions
// ============================================================================

/// Fewer than three daily points cannot be fitted.
#[tokio::test(start_paused = true)]
async fn test_prediction_requires_three_points() {
    let (store, _query, predictor) = stack();
    let subject = student();
    let now = UnixMillis::now();
    let today = now.date();
    seed_daily(&store, &subject, today.minus_days(1), 0.5);
    seed_daily(&store, &subject, today, 0.6);

    let error = predictor.predict(&self_identity(), &subject, 7, now).unwrap_err();
    assert!(matches!(
        error,
        PlaneError::InsufficientHistory {
            points: 2,
            minimum: 3
        }
    ));
}

/// Six points climbing 0.02/day and ending at 0.60 project to roughly 0.74
/// a week out, improving, with no intervention flag.
#[tokio::test(start_paused = true)]
async fn test_prediction_projects_linear_trend() {
    let (store, _query, predictor) = stack();
    let subject = student();
    let now = UnixMillis::now();
    let today = now.date();
    for offset in 0..6_i64 {
        let date = today.minus_days(5 - offset);
        let score = 0.50 + 0.02 * offset as f64;
        seed_daily(&store, &subject, date, score);
    }

    let prediction = predictor.predict(&self_identity(), &subject, 7, now).unwrap();
    assert!(
        (prediction.predicted_score - 0.74).abs() <= 0.02,
        "predicted {}",
        prediction.predicted_score
    );
    assert_eq!(prediction.trend, Trend::Improving);
    assert!(!prediction.intervention_flag);
    assert_eq!(prediction.horizon_days, 7);
    // A perfect linear fit scaled by 6 of 14 sample days.
    assert!((prediction.confidence - 0.429).abs() < 0.01);
}

/// A declining projection under 0.5 with non-positive slope sets the
/// intervention flag.
#[tokio::test(start_paused = true)]
async fn test_prediction_flags_intervention() {
    let (store, _query, predictor) = stack();
    let subject = student();
    let now = UnixMillis::now();
    let today = now.date();
    for offset in 0..6_i64 {
        let date = today.minus_days(5 - offset);
        let score = 0.60 - 0.03 * offset as f64;
        seed_daily(&store, &subject, date, score);
    }

    let prediction = predictor.predict(&self_identity(), &subject, 7, now).unwrap();
    assert_eq!(prediction.trend, Trend::Declining);
    assert!(prediction.predicted_score < 0.5);
    assert!(prediction.intervention_flag);
}

/// Predictions are cached and the cached entry is returned on re-request.
#[tokio::test(start_paused = true)]
async fn test_prediction_is_cached() {
    let (store, _query, predictor) = stack();
    let subject = student();
    let now = UnixMillis::now();
    let today = now.date();
    for offset in 0..3_i64 {
        seed_daily(&store, &subject, today.minus_days(2 - offset), 0.5);
    }

    let first = predictor.predict(&self_identity(), &subject, 7, now).unwrap();
    assert!(store.get(&keys::prediction_key(&subject)).unwrap().is_some());

    // More history appears, but the cached projection is served until the
    // aggregator invalidates it.
    seed_daily(&store, &subject, today.minus_days(10), 0.1);
    let second = predictor.predict(&self_identity(), &subject, 7, now).unwrap();
    assert_eq!(first, second);
}

/// A flat series is stable with a perfect fit.
#[tokio::test(start_paused = true)]
async fn test_flat_series_is_stable() {
    let (store, _query, predictor) = stack();
    let subject = student();
    let now = UnixMillis::now();
    let today = now.date();
    for offset in 0..5_i64 {
        seed_daily(&store, &subject, today.minus_days(4 - offset), 0.7);
    }

    let prediction = predictor.predict(&self_identity(), &subject, 7, now).unwrap();
    assert_eq!(prediction.trend, Trend::Stable);
    assert!((prediction.predicted_score - 0.7).abs() < 1e-9);
}
