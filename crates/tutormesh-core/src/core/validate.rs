// tutormesh-core/src/core/validate.rs
// ============================================================================
// Module: Tutormesh Schema Validation
// Description: Fail-closed validation for triage requests and learning events.
// Purpose: Enforce bounds, patterns, and skew windows at the boundaries.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! Requests and events are deserialized into typed structs first; this module
//! then enforces the domain rules serde cannot express: numeric bounds,
//! identifier patterns, string caps, and timestamp skew windows. Violations
//! are collected into a report so event payloads can be dead-lettered with
//! the full violation list rather than just the first failure.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::identifiers::IdempotencyKey;
use crate::core::progress::LearningEvent;
use crate::core::progress::ProgressSnapshot;
use crate::core::time::UnixMillis;
use crate::core::triage::TriageRequest;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Minimum triage query length in characters.
pub const MIN_QUERY_CHARS: usize = 1;
/// Maximum triage query length in characters.
pub const MAX_QUERY_CHARS: usize = 5_000;
/// Ingress clock-skew window (client timestamps), milliseconds.
pub const INGRESS_SKEW_MS: u64 = 5 * 60 * 1_000;
/// Event-processing clock-skew window (server timestamps), milliseconds.
pub const EVENT_SKEW_MS: u64 = 60 * 1_000;
/// Required student identifier prefix.
const STUDENT_ID_PREFIX: &str = "student_";
/// Required exercise identifier prefix.
const EXERCISE_ID_PREFIX: &str = "ex_";
/// Maximum identifier suffix length after the pattern prefix.
const MAX_ID_SUFFIX_CHARS: usize = 64;
/// Maximum conversation identifier length.
const MAX_CONVERSATION_ID_CHARS: usize = 128;

// ============================================================================
// SECTION: Report
// ============================================================================

/// Accumulated validation violations for one payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Violation descriptions, in evaluation order.
    pub errors: Vec<String>,
}

impl ValidationReport {
    /// Returns true when no violations were recorded.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Records a violation.
    fn push(&mut self, violation: impl Into<String>) {
        self.errors.push(violation.into());
    }
}

// ============================================================================
// SECTION: Identifier Patterns
// ============================================================================

/// Returns true when the value matches the student identifier pattern.
#[must_use]
pub fn is_valid_student_identity(value: &str) -> bool {
    matches_prefixed_pattern(value, STUDENT_ID_PREFIX)
}

/// Returns true when the value matches the exercise identifier pattern.
#[must_use]
pub fn is_valid_exercise_identifier(value: &str) -> bool {
    matches_prefixed_pattern(value, EXERCISE_ID_PREFIX)
}

/// Checks a `prefix_suffix` identifier: a fixed prefix followed by 1..=64
/// lowercase alphanumeric, hyphen, or underscore characters.
fn matches_prefixed_pattern(value: &str, prefix: &str) -> bool {
    let Some(suffix) = value.strip_prefix(prefix) else {
        return false;
    };
    !suffix.is_empty()
        && suffix.len() <= MAX_ID_SUFFIX_CHARS
        && suffix
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_')
}

// ============================================================================
// SECTION: Triage Request Validation
// ============================================================================

/// Validates an inbound triage request against the declared shape.
#[must_use]
pub fn validate_triage_request(request: &TriageRequest, now: UnixMillis) -> ValidationReport {
    let mut report = ValidationReport::default();

    let query_chars = request.query.chars().count();
    if query_chars < MIN_QUERY_CHARS {
        report.push("query must not be empty");
    }
    if query_chars > MAX_QUERY_CHARS {
        report.push(format!("query exceeds {MAX_QUERY_CHARS} characters ({query_chars})"));
    }

    if !is_valid_student_identity(request.student_identity.as_str()) {
        report.push("student_identity does not match the required pattern");
    }

    if request.client_timestamp.abs_diff(now) > INGRESS_SKEW_MS {
        report.push(format!(
            "client_timestamp outside the ±{INGRESS_SKEW_MS} ms skew window"
        ));
    }

    if let Some(context) = &request.conversation_context
        && context.conversation_id.chars().count() > MAX_CONVERSATION_ID_CHARS
    {
        report.push(format!("conversation_id exceeds {MAX_CONVERSATION_ID_CHARS} characters"));
    }

    validate_snapshot_fields(&request.progress_snapshot, &mut report);
    report
}

// ============================================================================
// SECTION: Event Validation
// ============================================================================

/// Validates a learning event prior to application.
#[must_use]
pub fn validate_event(event: &LearningEvent, now: UnixMillis) -> ValidationReport {
    let mut report = ValidationReport::default();

    if !IdempotencyKey::is_well_formed(&event.idempotency_key) {
        report.push("idempotency_key must be exactly 32 lowercase hex characters");
    }

    if event.snapshot.server_timestamp.abs_diff(now) > EVENT_SKEW_MS {
        report.push(format!(
            "server_timestamp outside the ±{EVENT_SKEW_MS} ms skew window"
        ));
    }

    validate_snapshot_fields(&event.snapshot, &mut report);
    report
}

/// Validates the fields shared by snapshots on both ingress paths.
fn validate_snapshot_fields(snapshot: &ProgressSnapshot, report: &mut ValidationReport) {
    if !is_valid_student_identity(snapshot.student_identity.as_str()) {
        report.push("snapshot student_identity does not match the required pattern");
    }
    if !is_valid_exercise_identifier(snapshot.exercise_identifier.as_str()) {
        report.push("exercise_identifier does not match the required pattern");
    }

    check_score(snapshot.completion_score, "completion_score", report);
    check_score(snapshot.quiz_score, "quiz_score", report);
    check_score(snapshot.quality_score, "quality_score", report);
    check_score(snapshot.consistency_score, "consistency_score", report);
}

/// Rejects component scores outside the unit interval or non-finite.
fn check_score(score: Option<f64>, field: &str, report: &mut ValidationReport) {
    if let Some(value) = score
        && !(value.is_finite() && (0.0..=1.0).contains(&value))
    {
        report.push(format!("{field} must be a real number in [0, 1]"));
    }
}
