// tutormesh-core/src/core/mastery.rs
// ============================================================================
// Module: Tutormesh Mastery Model
// Description: Per-day mastery aggregates and the weighted scoring formula.
// Purpose: Define component records, aggregates, and deterministic math.
// Dependencies: serde, crate::core
// ============================================================================

//! ## Overview
//! Mastery is tracked per (student, day) as four component running means and
//! a derived final score. The final score is the fixed weighted combination
//! `0.40·completion + 0.30·quiz + 0.20·quality + 0.10·consistency`, rounded
//! to three decimals. Whenever any component changes, the final score and the
//! aggregate version are recomputed in the same atomic store write.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::StudentId;
use crate::core::time::EventDate;
use crate::core::time::UnixMillis;

// ============================================================================
// SECTION: Components
// ============================================================================

/// Mastery component dimension.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ComponentName {
    /// Exercise completion.
    Completion,
    /// Quiz performance.
    Quiz,
    /// Code quality.
    Quality,
    /// Practice consistency.
    Consistency,
}

impl ComponentName {
    /// All components in canonical order.
    pub const ALL: [Self; 4] = [Self::Completion, Self::Quiz, Self::Quality, Self::Consistency];

    /// Returns a stable label for the component.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completion => "completion",
            Self::Quiz => "quiz",
            Self::Quality => "quality",
            Self::Consistency => "consistency",
        }
    }

    /// Returns the fixed weight of the component in the final score.
    #[must_use]
    pub const fn weight(self) -> f64 {
        match self {
            Self::Completion => 0.40,
            Self::Quiz => 0.30,
            Self::Quality => 0.20,
            Self::Consistency => 0.10,
        }
    }
}

// ============================================================================
// SECTION: Rounding
// ============================================================================

/// Rounds a score to three decimal places.
#[must_use]
pub fn round3(value: f64) -> f64 {
    (value * 1_000.0).round() / 1_000.0
}

/// Clamps a score to the unit interval.
#[must_use]
pub fn clamp_unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

// ============================================================================
// SECTION: Component Record
// ============================================================================

/// Per-(student, date, component) running mean.
///
/// # Invariants
/// - `value` is the unweighted mean of the last `sample_count` contributions
///   observed for the component that day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasteryComponentRecord {
    /// Current running mean in `[0, 1]`.
    pub value: f64,
    /// Number of contributions folded into the mean.
    pub sample_count: u64,
    /// Timestamp of the most recent contribution.
    pub last_updated: UnixMillis,
}

impl MasteryComponentRecord {
    /// Creates an empty record with no contributions.
    #[must_use]
    pub const fn empty(at: UnixMillis) -> Self {
        Self {
            value: 0.0,
            sample_count: 0,
            last_updated: at,
        }
    }

    /// Folds a new contribution into the running mean.
    pub fn observe(&mut self, contribution: f64, at: UnixMillis) {
        let previous = self.value * precise(self.sample_count);
        self.sample_count = self.sample_count.saturating_add(1);
        self.value = (previous + contribution) / precise(self.sample_count);
        self.last_updated = at;
    }
}

/// Converts a sample count to the float domain for mean arithmetic.
#[allow(clippy::cast_precision_loss, reason = "Sample counts stay far below 2^52.")]
fn precise(count: u64) -> f64 {
    count as f64
}

// ============================================================================
// SECTION: Aggregate
// ============================================================================

/// Per-(student, date) mastery aggregate.
///
/// # Invariants
/// - `final_score` equals the weighted component combination rounded to three
///   decimals at all times after [`MasteryAggregate::finalize`].
/// - `version` is monotone non-decreasing across store writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasteryAggregate {
    /// Student the aggregate belongs to.
    pub student_identity: StudentId,
    /// UTC calendar day the aggregate covers.
    pub date: EventDate,
    /// Component running means present for the day.
    pub components: BTreeMap<ComponentName, MasteryComponentRecord>,
    /// Weighted final score rounded to three decimals.
    pub final_score: f64,
    /// Timestamp of the last recomputation.
    pub calculated_at: UnixMillis,
    /// Optimistic-concurrency version, bumped on every write.
    pub version: u64,
}

impl MasteryAggregate {
    /// Creates an empty aggregate for a (student, date) pair.
    #[must_use]
    pub fn new(student_identity: StudentId, date: EventDate, at: UnixMillis) -> Self {
        Self {
            student_identity,
            date,
            components: BTreeMap::new(),
            final_score: 0.0,
            calculated_at: at,
            version: 0,
        }
    }

    /// Folds a component contribution into the aggregate.
    pub fn observe(&mut self, component: ComponentName, contribution: f64, at: UnixMillis) {
        self.components
            .entry(component)
            .or_insert_with(|| MasteryComponentRecord::empty(at))
            .observe(contribution, at);
    }

    /// Returns the current value of a component, zero when absent.
    #[must_use]
    pub fn component_value(&self, component: ComponentName) -> f64 {
        self.components.get(&component).map_or(0.0, |record| record.value)
    }

    /// Recomputes the weighted final score and stamps the recomputation time.
    /// The caller bumps `version` as part of the same atomic store write.
    pub fn finalize(&mut self, at: UnixMillis) {
        let weighted: f64 = ComponentName::ALL
            .iter()
            .map(|component| component.weight() * self.component_value(*component))
            .sum();
        self.final_score = round3(weighted);
        self.calculated_at = at;
    }
}
