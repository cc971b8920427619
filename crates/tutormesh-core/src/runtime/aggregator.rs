// tutormesh-core/src/runtime/aggregator.rs
// ============================================================================
// Module: Tutormesh Mastery Aggregator
// Description: Applies progress snapshots to per-day mastery aggregates.
// Purpose: Update running means and final scores with optimistic writes.
// Dependencies: crate::core, crate::interfaces, crate::runtime
// ============================================================================

//! ## Overview
//! The aggregator folds each present component of an incoming snapshot into
//! the (student, event-date) aggregate, recomputes the weighted final score,
//! bumps the version, and stores the result with compare-and-swap. Conflicts
//! retry up to five times before surfacing. Component records, the
//! profile pointer, and the recent-activity list are written under their
//! daily keys so historical queries stay O(1) per day, and the prediction
//! cache for the student is invalidated on every aggregate write.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::errors::PlaneError;
use crate::core::identifiers::StudentId;
use crate::core::mastery::MasteryAggregate;
use crate::core::mastery::clamp_unit;
use crate::core::mastery::round3;
use crate::core::progress::ActivityEntry;
use crate::core::progress::ProgressSnapshot;
use crate::core::time::EventDate;
use crate::core::time::UnixMillis;
use crate::interfaces::CasOutcome;
use crate::interfaces::StateStore;
use crate::interfaces::StoreError;
use crate::runtime::cache::HotCache;
use crate::runtime::keys;
use crate::runtime::store::SharedStateStore;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Compare-and-swap attempts before surfacing a conflict.
const MAX_CAS_ATTEMPTS: u32 = 5;
/// Entries retained in the rolling recent-activity list.
const MAX_ACTIVITY_ENTRIES: usize = 20;

// ============================================================================
// SECTION: Profile Pointer
// ============================================================================

/// Pointer to a student's latest aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfilePointer {
    /// Date of the latest aggregate.
    pub date: EventDate,
    /// Version of the latest aggregate.
    pub version: u64,
    /// Timestamp of the pointer update.
    pub updated_at: UnixMillis,
}

// ============================================================================
// SECTION: Aggregator
// ============================================================================

/// Mastery aggregator owned by the event-consumer workers.
pub struct MasteryAggregator {
    /// Backing state store.
    store: SharedStateStore,
    /// Hot cache fronting current-mastery reads; invalidated before writes.
    cache: Arc<HotCache>,
}

impl MasteryAggregator {
    /// Creates an aggregator over the shared store and hot cache.
    #[must_use]
    pub const fn new(store: SharedStateStore, cache: Arc<HotCache>) -> Self {
        Self {
            store,
            cache,
        }
    }

    /// Applies a snapshot to the (student, event-date) aggregate.
    ///
    /// # Errors
    ///
    /// Returns [`PlaneError::Conflict`] when optimistic writes stay
    /// contended, or [`PlaneError::Internal`] on store failure.
    pub fn apply_snapshot(
        &self,
        snapshot: &ProgressSnapshot,
        now: UnixMillis,
        correlation: &str,
    ) -> Result<MasteryAggregate, PlaneError> {
        let student = snapshot.student_identity.clone();
        let date = snapshot.server_timestamp.date();
        let key = keys::mastery_key(&student, date);

        let mut attempts = 0_u32;
        let aggregate = loop {
            attempts += 1;
            let current = self
                .store
                .get(&key)
                .map_err(|error| internal(correlation, &error))?;
            let expected = current.as_ref().map(|versioned| versioned.version);
            let mut aggregate = match current {
                Some(versioned) => parse_aggregate(&versioned.value, correlation)?,
                None => MasteryAggregate::new(student.clone(), date, now),
            };

            for (component, value) in snapshot.present_components() {
                aggregate.observe(component, round3(clamp_unit(value)), now);
            }
            aggregate.finalize(now);
            aggregate.version = expected.unwrap_or(0) + 1;

            let payload = encode(&aggregate, correlation)?;
            // Invalidate before the write is acknowledged upward so no stale
            // read survives the write.
            self.cache.invalidate(&key);
            match self
                .store
                .compare_and_swap(&key, expected, &payload, Some(keys::TTL_MASTERY))
                .map_err(|error| internal(correlation, &error))?
            {
                CasOutcome::Stored {
                    ..
                } => break aggregate,
                CasOutcome::Conflict {
                    ..
                } => {
                    if attempts >= MAX_CAS_ATTEMPTS {
                        return Err(PlaneError::Conflict {
                            attempts,
                        });
                    }
                }
            }
        };

        self.write_daily_records(&aggregate, correlation)?;
        self.record_activity(snapshot, correlation)?;
        self.invalidate_derived(&student, correlation)?;
        Ok(aggregate)
    }

    /// Writes per-component records and the profile pointer under their
    /// daily keys.
    fn write_daily_records(
        &self,
        aggregate: &MasteryAggregate,
        correlation: &str,
    ) -> Result<(), PlaneError> {
        for (component, record) in &aggregate.components {
            let key = keys::component_key(&aggregate.student_identity, aggregate.date, *component);
            let payload = serde_json::to_value(record)
                .map_err(|error| PlaneError::internal(format!("{correlation}: {error}")))?;
            self.store
                .put(&key, &payload, Some(keys::TTL_MASTERY))
                .map_err(|error| internal(correlation, &error))?;
        }

        let pointer = ProfilePointer {
            date: aggregate.date,
            version: aggregate.version,
            updated_at: aggregate.calculated_at,
        };
        let payload = serde_json::to_value(&pointer)
            .map_err(|error| PlaneError::internal(format!("{correlation}: {error}")))?;
        self.store
            .put(
                &keys::profile_key(&aggregate.student_identity),
                &payload,
                Some(keys::TTL_MASTERY),
            )
            .map_err(|error| internal(correlation, &error))?;
        Ok(())
    }

    /// Prepends the snapshot to the rolling recent-activity list.
    fn record_activity(
        &self,
        snapshot: &ProgressSnapshot,
        correlation: &str,
    ) -> Result<(), PlaneError> {
        let key = keys::activity_key(&snapshot.student_identity);
        let mut entries: Vec<ActivityEntry> = self
            .store
            .get(&key)
            .map_err(|error| internal(correlation, &error))?
            .and_then(|versioned| serde_json::from_value(versioned.value).ok())
            .unwrap_or_default();
        entries.insert(
            0,
            ActivityEntry {
                exercise_identifier: snapshot.exercise_identifier.clone(),
                agent_source: snapshot.agent_source,
                server_timestamp: snapshot.server_timestamp,
            },
        );
        entries.truncate(MAX_ACTIVITY_ENTRIES);
        let payload = serde_json::to_value(&entries)
            .map_err(|error| PlaneError::internal(format!("{correlation}: {error}")))?;
        self.store
            .put(&key, &payload, Some(keys::TTL_RECENT_ACTIVITY))
            .map_err(|error| internal(correlation, &error))?;
        Ok(())
    }

    /// Invalidates derived per-student caches after an aggregate write.
    fn invalidate_derived(&self, student: &StudentId, correlation: &str) -> Result<(), PlaneError> {
        self.store
            .delete(&keys::prediction_key(student))
            .map_err(|error| internal(correlation, &error))?;
        self.store
            .delete(&keys::recommendation_key(student))
            .map_err(|error| internal(correlation, &error))?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Parses a stored aggregate payload.
fn parse_aggregate(value: &Value, correlation: &str) -> Result<MasteryAggregate, PlaneError> {
    serde_json::from_value(value.clone())
        .map_err(|error| PlaneError::internal(format!("{correlation}: corrupt aggregate: {error}")))
}

/// Encodes an aggregate for storage.
fn encode(aggregate: &MasteryAggregate, correlation: &str) -> Result<Value, PlaneError> {
    serde_json::to_value(aggregate)
        .map_err(|error| PlaneError::internal(format!("{correlation}: {error}")))
}

/// Maps a store error to an internal plane error.
fn internal(correlation: &str, error: &StoreError) -> PlaneError {
    PlaneError::internal(format!("{correlation}: {error}"))
}
