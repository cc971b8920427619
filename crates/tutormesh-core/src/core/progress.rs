// tutormesh-core/src/core/progress.rs
// ============================================================================
// Module: Tutormesh Progress Events
// Description: Canonical learning-progress snapshot and event payloads.
// Purpose: Define the event shape consumed by the mastery engine.
// Dependencies: serde, crate::core
// ============================================================================

//! ## Overview
//! Progress snapshots are emitted by downstream tutor agents after each
//! interaction and carried on the learning-events log. Any subset of the four
//! component scores may be present; absent components are not updated by the
//! aggregator. Events additionally carry a 32-hex idempotency key so
//! at-least-once delivery yields exactly-once effects.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::ExerciseId;
use crate::core::identifiers::StudentId;
use crate::core::mastery::ComponentName;
use crate::core::time::UnixMillis;

// ============================================================================
// SECTION: Agent Source
// ============================================================================

/// Downstream agent that produced a progress snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentSource {
    /// Concept-explanation agent.
    Concepts,
    /// Review/fallback agent.
    Review,
    /// Debugging agent.
    Debug,
    /// Exercise agent.
    Exercise,
    /// Progress-tracking agent.
    Progress,
}

impl AgentSource {
    /// Returns a stable label for the source.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Concepts => "concepts",
            Self::Review => "review",
            Self::Debug => "debug",
            Self::Exercise => "exercise",
            Self::Progress => "progress",
        }
    }
}

// ============================================================================
// SECTION: Progress Snapshot
// ============================================================================

/// Canonical learning-progress snapshot.
///
/// # Invariants
/// - Present component scores are real numbers in `[0, 1]`.
/// - `server_timestamp` is assigned by the producing agent, not the consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Student the snapshot belongs to.
    pub student_identity: StudentId,
    /// Exercise the snapshot was produced for.
    pub exercise_identifier: ExerciseId,
    /// Completion component score, when measured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_score: Option<f64>,
    /// Quiz component score, when measured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiz_score: Option<f64>,
    /// Code-quality component score, when measured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,
    /// Consistency component score, when measured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consistency_score: Option<f64>,
    /// Producer-assigned timestamp.
    pub server_timestamp: UnixMillis,
    /// Agent that produced the snapshot.
    pub agent_source: AgentSource,
}

impl ProgressSnapshot {
    /// Returns the component scores present on this snapshot, in canonical
    /// component order.
    #[must_use]
    pub fn present_components(&self) -> Vec<(ComponentName, f64)> {
        let mut present = Vec::with_capacity(4);
        if let Some(value) = self.completion_score {
            present.push((ComponentName::Completion, value));
        }
        if let Some(value) = self.quiz_score {
            present.push((ComponentName::Quiz, value));
        }
        if let Some(value) = self.quality_score {
            present.push((ComponentName::Quality, value));
        }
        if let Some(value) = self.consistency_score {
            present.push((ComponentName::Consistency, value));
        }
        present
    }
}

// ============================================================================
// SECTION: Learning Event
// ============================================================================

/// Message shape carried on the learning-events topic.
///
/// # Invariants
/// - `idempotency_key` is validated as 32 lowercase hex characters before the
///   event is applied; malformed keys divert the event to the dead-letter
///   topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningEvent {
    /// Producer-supplied deduplication key.
    pub idempotency_key: String,
    /// Progress snapshot payload.
    #[serde(flatten)]
    pub snapshot: ProgressSnapshot,
}

// ============================================================================
// SECTION: Recent Activity
// ============================================================================

/// Rolling recent-activity entry retained per student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    /// Exercise the activity refers to.
    pub exercise_identifier: ExerciseId,
    /// Agent that produced the underlying snapshot.
    pub agent_source: AgentSource,
    /// Producer-assigned timestamp.
    pub server_timestamp: UnixMillis,
}
