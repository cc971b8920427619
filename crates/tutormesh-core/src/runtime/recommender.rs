// tutormesh-core/src/runtime/recommender.rs
// ============================================================================
// Module: Tutormesh Recommender
// Description: Threshold-driven rule engine producing ranked action items.
// Purpose: Turn weak mastery components into concrete next actions.
// Dependencies: crate::core, crate::interfaces, crate::runtime
// ============================================================================

//! ## Overview
//! Components below the 0.70 mastery threshold become candidates, ranked by
//! `weight · (0.70 − value)` descending so heavily weighted gaps surface
//! first. Each candidate maps to an action by component; when two candidates
//! carry the same score the later one downgrades to a review action as the
//! tie-breaker. Priorities bucket on the same score. Recommendation sets are
//! derived data, cached briefly, and invalidated on aggregate writes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use crate::core::errors::PlaneError;
use crate::core::identifiers::StudentId;
use crate::core::identity::IdentityContext;
use crate::core::mastery::ComponentName;
use crate::core::mastery::MasteryAggregate;
use crate::core::mastery::round3;
use crate::core::progress::ActivityEntry;
use crate::core::time::UnixMillis;
use crate::core::triage::Priority;
use crate::interfaces::StateStore;
use crate::runtime::keys;
use crate::runtime::query::QueryService;
use crate::runtime::query::authorize_read;
use crate::runtime::store::SharedStateStore;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Mastery threshold below which a component becomes a candidate.
pub const MASTERY_THRESHOLD: f64 = 0.70;
/// Maximum items emitted per recommendation set.
const MAX_ITEMS: usize = 10;
/// Gap score at or above which a candidate is high priority.
const HIGH_PRIORITY_SCORE: f64 = 0.12;
/// Gap score at or above which a candidate is medium priority.
const MEDIUM_PRIORITY_SCORE: f64 = 0.06;
/// Recent exercises attached as resource references per item.
const MAX_RESOURCE_REFS: usize = 3;

// ============================================================================
// SECTION: Recommendation Types
// ============================================================================

/// Recommended student action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    /// Targeted practice on the weak area.
    Practice,
    /// Guided review with the review agent.
    Review,
    /// Refactoring work on past solutions.
    Refactor,
    /// Scheduling a regular practice cadence.
    Schedule,
}

impl RecommendedAction {
    /// Returns the action bound to a component.
    #[must_use]
    pub const fn for_component(component: ComponentName) -> Self {
        match component {
            ComponentName::Completion | ComponentName::Quiz => Self::Practice,
            ComponentName::Quality => Self::Refactor,
            ComponentName::Consistency => Self::Schedule,
        }
    }

    /// Returns the estimated effort for the action in minutes.
    #[must_use]
    pub const fn estimated_minutes(self) -> u32 {
        match self {
            Self::Practice => 20,
            Self::Review => 15,
            Self::Refactor => 25,
            Self::Schedule => 10,
        }
    }
}

/// One ranked recommendation item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationItem {
    /// Recommended action.
    pub action: RecommendedAction,
    /// Component the action targets.
    pub target_area: ComponentName,
    /// Priority bucket derived from the gap score.
    pub priority: Priority,
    /// Estimated effort in minutes.
    pub estimated_minutes: u32,
    /// Recent exercise references supporting the action.
    pub resource_refs: Vec<String>,
}

/// Ranked recommendation set for a student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationSet {
    /// Student the set was produced for.
    pub student_identity: StudentId,
    /// Ranked items, strongest gap first.
    pub items: Vec<RecommendationItem>,
    /// Timestamp the set was generated.
    pub generated_at: UnixMillis,
}

// ============================================================================
// SECTION: Recommender
// ============================================================================

/// Threshold-driven recommender.
pub struct Recommender {
    /// Backing state store for the recommendation cache.
    store: SharedStateStore,
    /// Query service supplying the current aggregate.
    query: Arc<QueryService>,
}

impl Recommender {
    /// Creates a recommender over the shared store and query service.
    #[must_use]
    pub const fn new(store: SharedStateStore, query: Arc<QueryService>) -> Self {
        Self {
            store,
            query,
        }
    }

    /// Produces the ranked recommendation set for a student.
    ///
    /// # Errors
    ///
    /// Returns [`PlaneError::Authorization`] on access violations or
    /// [`PlaneError::Internal`] on store failure.
    pub async fn recommend(
        &self,
        identity: &IdentityContext,
        subject: &StudentId,
        now: UnixMillis,
    ) -> Result<RecommendationSet, PlaneError> {
        let cache_key = keys::recommendation_key(subject);
        let cached = self
            .store
            .get(&cache_key)
            .map_err(|error| PlaneError::internal(format!("recommendation cache: {error}")))?;
        if let Some(versioned) = cached
            && let Ok(set) = serde_json::from_value::<RecommendationSet>(versioned.value)
        {
            // Authorization still applies to cached sets.
            authorize_read(identity, subject)?;
            return Ok(set);
        }

        let aggregate = self.query.current_mastery(identity, subject, now).await?;
        let recent = self.recent_activity(subject)?;
        let set = build_set(&aggregate, &recent, now);

        let payload = serde_json::to_value(&set)
            .map_err(|error| PlaneError::internal(format!("recommendation encode: {error}")))?;
        self.store
            .put(&cache_key, &payload, Some(keys::TTL_RECOMMENDATION))
            .map_err(|error| PlaneError::internal(format!("recommendation cache: {error}")))?;
        Ok(set)
    }

    /// Reads the rolling recent-activity list for resource references.
    fn recent_activity(&self, subject: &StudentId) -> Result<Vec<ActivityEntry>, PlaneError> {
        let stored = self
            .store
            .get(&keys::activity_key(subject))
            .map_err(|error| PlaneError::internal(format!("recent activity: {error}")))?;
        Ok(stored
            .and_then(|versioned| serde_json::from_value(versioned.value).ok())
            .unwrap_or_default())
    }
}

// ============================================================================
// SECTION: Rule Engine
// ============================================================================

/// Builds the ranked set from an aggregate and recent activity.
#[must_use]
pub fn build_set(
    aggregate: &MasteryAggregate,
    recent: &[ActivityEntry],
    now: UnixMillis,
) -> RecommendationSet {
    let mut candidates: Vec<(ComponentName, f64)> = ComponentName::ALL
        .into_iter()
        .filter_map(|component| {
            let value = aggregate.component_value(component);
            (value < MASTERY_THRESHOLD)
                .then(|| (component, round3(component.weight() * (MASTERY_THRESHOLD - value))))
        })
        .collect();
    candidates.sort_by(|(_, left), (_, right)| {
        right.partial_cmp(left).unwrap_or(std::cmp::Ordering::Equal)
    });

    let resource_refs: Vec<String> = recent
        .iter()
        .take(MAX_RESOURCE_REFS)
        .map(|entry| entry.exercise_identifier.to_string())
        .collect();

    let mut items = Vec::with_capacity(candidates.len().min(MAX_ITEMS));
    let mut previous_score: Option<f64> = None;
    for (component, score) in candidates.into_iter().take(MAX_ITEMS) {
        let tied = previous_score.is_some_and(|prior| (prior - score).abs() < f64::EPSILON);
        let action = if tied {
            RecommendedAction::Review
        } else {
            RecommendedAction::for_component(component)
        };
        items.push(RecommendationItem {
            action,
            target_area: component,
            priority: bucket_priority(score),
            estimated_minutes: action.estimated_minutes(),
            resource_refs: resource_refs.clone(),
        });
        previous_score = Some(score);
    }

    RecommendationSet {
        student_identity: aggregate.student_identity.clone(),
        items,
        generated_at: now,
    }
}

/// Buckets a gap score into a priority.
fn bucket_priority(score: f64) -> Priority {
    if score >= HIGH_PRIORITY_SCORE {
        Priority::High
    } else if score >= MEDIUM_PRIORITY_SCORE {
        Priority::Medium
    } else {
        Priority::Low
    }
}
