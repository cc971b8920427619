// tutormesh-core/src/runtime/keys.rs
// ============================================================================
// Module: Tutormesh Store Keys
// Description: Composite-key builders and TTL policy for the state store.
// Purpose: Keep every key pattern and retention horizon in one place.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! All state-store keys follow the `student:{id}:...` composite patterns so
//! per-student data can be scanned, exported, and erased by prefix. TTLs are
//! associated at write time; this module is the single source of truth for
//! both the patterns and the retention horizons.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use crate::core::identifiers::StudentId;
use crate::core::mastery::ComponentName;
use crate::core::time::EventDate;

// ============================================================================
// SECTION: TTL Policy
// ============================================================================

/// Retention for daily mastery aggregates and component records.
pub const TTL_MASTERY: Duration = Duration::from_secs(90 * 24 * 60 * 60);
/// Retention for request-level idempotency records.
pub const TTL_IDEMPOTENCY: Duration = Duration::from_secs(24 * 60 * 60);
/// Retention for cached predictions.
pub const TTL_PREDICTION: Duration = Duration::from_secs(60 * 60);
/// Retention for cached recommendation sets.
pub const TTL_RECOMMENDATION: Duration = Duration::from_secs(5 * 60);
/// Retention for the rolling recent-activity list.
pub const TTL_RECENT_ACTIVITY: Duration = Duration::from_secs(30 * 24 * 60 * 60);
/// Retention for event-level deduplication markers.
pub const TTL_PROCESSED_MARKER: Duration = Duration::from_secs(7 * 24 * 60 * 60);

// ============================================================================
// SECTION: Key Builders
// ============================================================================

/// Key of the daily mastery aggregate for a (student, date) pair.
#[must_use]
pub fn mastery_key(student: &StudentId, date: EventDate) -> String {
    format!("student:{student}:mastery:{date}")
}

/// Key of a per-(student, date, component) record.
#[must_use]
pub fn component_key(student: &StudentId, date: EventDate, component: ComponentName) -> String {
    format!("student:{student}:mastery:{date}:{}", component.as_str())
}

/// Key of a request-level idempotency record.
#[must_use]
pub fn idempotency_key(student: &StudentId, request_key: &str) -> String {
    format!("student:{student}:idempotency:{request_key}")
}

/// Key of the cached prediction for a student.
#[must_use]
pub fn prediction_key(student: &StudentId) -> String {
    format!("student:{student}:prediction:cache")
}

/// Key of the cached recommendation set for a student.
#[must_use]
pub fn recommendation_key(student: &StudentId) -> String {
    format!("student:{student}:recommendation:cache")
}

/// Key of the pointer to a student's latest aggregate.
#[must_use]
pub fn profile_key(student: &StudentId) -> String {
    format!("student:{student}:profile:current")
}

/// Key of the rolling recent-activity list for a student.
#[must_use]
pub fn activity_key(student: &StudentId) -> String {
    format!("student:{student}:activity:recent")
}

/// Key of an event-level deduplication marker.
#[must_use]
pub fn processed_key(event_idempotency_key: &str) -> String {
    format!("processed:{event_idempotency_key}")
}

/// Prefix covering every record owned by a student.
#[must_use]
pub fn student_prefix(student: &StudentId) -> String {
    format!("student:{student}:")
}

/// Prefix covering a student's daily mastery keys (aggregates and
/// per-component records).
#[must_use]
pub fn mastery_prefix(student: &StudentId) -> String {
    format!("student:{student}:mastery:")
}

/// Returns the TTL that applies to a key, derived from its pattern. Used by
/// compliance re-import so restored records keep their retention class.
#[must_use]
pub fn ttl_for_key(key: &str) -> Option<Duration> {
    let suffix = key.split(':').skip(2).collect::<Vec<_>>().join(":");
    if key.starts_with("processed:") {
        Some(TTL_PROCESSED_MARKER)
    } else if suffix.starts_with("mastery:") {
        Some(TTL_MASTERY)
    } else if suffix.starts_with("idempotency:") {
        Some(TTL_IDEMPOTENCY)
    } else if suffix.starts_with("prediction:") {
        Some(TTL_PREDICTION)
    } else if suffix.starts_with("recommendation:") {
        Some(TTL_RECOMMENDATION)
    } else if suffix.starts_with("activity:") {
        Some(TTL_RECENT_ACTIVITY)
    } else if suffix.starts_with("profile:") {
        Some(TTL_MASTERY)
    } else {
        None
    }
}
