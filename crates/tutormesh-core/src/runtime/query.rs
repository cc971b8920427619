// tutormesh-core/src/runtime/query.rs
// ============================================================================
// Module: Tutormesh Query Service
// Description: Read endpoints for current mastery and history series.
// Purpose: Serve eventually consistent mastery reads without writes.
// Dependencies: crate::core, crate::interfaces, crate::runtime
// ============================================================================

//! ## Overview
//! Reads never write. Current mastery flows cache → store → synthesized
//! aggregate view; history prefix-scans the daily keys and groups them by the
//! requested granularity. A student identity can only read its own records;
//! teacher and admin roles may read any. Authorization failures return the
//! same error whether or not the subject exists, so denials leak nothing.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use crate::core::errors::PlaneError;
use crate::core::identifiers::StudentId;
use crate::core::identity::IdentityContext;
use crate::core::mastery::ComponentName;
use crate::core::mastery::MasteryAggregate;
use crate::core::mastery::round3;
use crate::core::time::EventDate;
use crate::core::time::UnixMillis;
use crate::interfaces::StateStore;
use crate::interfaces::VersionedValue;
use crate::runtime::aggregator::ProfilePointer;
use crate::runtime::cache::HotCache;
use crate::runtime::keys;
use crate::runtime::store::SharedStateStore;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum history span in days.
pub const MAX_HISTORY_SPAN_DAYS: i64 = 90;

// ============================================================================
// SECTION: Authorization
// ============================================================================

/// Checks read access for a subject student without leaking existence.
///
/// # Errors
///
/// Returns [`PlaneError::Authorization`] when the caller may not read the
/// subject's records.
pub fn authorize_read(identity: &IdentityContext, subject: &StudentId) -> Result<(), PlaneError> {
    if identity.may_read(subject) {
        Ok(())
    } else {
        Err(PlaneError::Authorization)
    }
}

// ============================================================================
// SECTION: History Types
// ============================================================================

/// History aggregation granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    /// One point per day.
    Daily,
    /// One point per ISO week.
    Weekly,
    /// One point per calendar month.
    Monthly,
}

/// One aggregated history point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    /// Bucket label (date, ISO week, or month).
    pub bucket: String,
    /// Mean final score across the bucket's days.
    pub final_score: f64,
    /// Mean component values across the bucket's days.
    pub components: BTreeMap<ComponentName, f64>,
    /// Number of daily aggregates folded into the point.
    pub days: u32,
}

/// Aggregated history series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySeries {
    /// Student the series covers.
    pub student_identity: StudentId,
    /// Requested granularity.
    pub granularity: Granularity,
    /// Points in bucket order.
    pub points: Vec<HistoryPoint>,
    /// Highest aggregate version observed at read time.
    pub version: u64,
}

// ============================================================================
// SECTION: Query Service
// ============================================================================

/// Read-only mastery query service.
pub struct QueryService {
    /// Backing state store.
    store: SharedStateStore,
    /// Hot cache fronting current-mastery keys.
    cache: Arc<HotCache>,
}

impl QueryService {
    /// Creates a query service over the shared store and hot cache.
    #[must_use]
    pub const fn new(store: SharedStateStore, cache: Arc<HotCache>) -> Self {
        Self {
            store,
            cache,
        }
    }

    /// Returns the current mastery aggregate for a student.
    ///
    /// Falls back from today's aggregate to the profile pointer; when the
    /// student has no stored aggregates an empty view at version 0 is
    /// synthesized.
    ///
    /// # Errors
    ///
    /// Returns [`PlaneError::Authorization`] on access violations or
    /// [`PlaneError::Internal`] on store failure.
    pub async fn current_mastery(
        &self,
        identity: &IdentityContext,
        subject: &StudentId,
        now: UnixMillis,
    ) -> Result<MasteryAggregate, PlaneError> {
        authorize_read(identity, subject)?;

        let key = keys::mastery_key(subject, now.date());
        let cached = self
            .cache
            .fetch(&key, || self.store.get(&key))
            .await
            .map_err(|error| PlaneError::internal(format!("current mastery: {error}")))?;
        if let Some(versioned) = cached {
            return parse_aggregate(&versioned);
        }

        if let Some(pointer) = self.profile_pointer(subject)? {
            let dated_key = keys::mastery_key(subject, pointer.date);
            let stored = self
                .store
                .get(&dated_key)
                .map_err(|error| PlaneError::internal(format!("current mastery: {error}")))?;
            if let Some(versioned) = stored {
                return parse_aggregate(&versioned);
            }
        }

        Ok(MasteryAggregate::new(subject.clone(), now.date(), now))
    }

    /// Reads the profile pointer for a student.
    fn profile_pointer(&self, subject: &StudentId) -> Result<Option<ProfilePointer>, PlaneError> {
        let stored = self
            .store
            .get(&keys::profile_key(subject))
            .map_err(|error| PlaneError::internal(format!("profile pointer: {error}")))?;
        Ok(stored.and_then(|versioned| serde_json::from_value(versioned.value).ok()))
    }

    /// Returns the aggregated history series for a date range.
    ///
    /// # Errors
    ///
    /// Returns [`PlaneError::Validation`] when the range is inverted or spans
    /// more than 90 days, [`PlaneError::Authorization`] on access violations,
    /// or [`PlaneError::Internal`] on store failure.
    pub fn history(
        &self,
        identity: &IdentityContext,
        subject: &StudentId,
        start_date: EventDate,
        end_date: EventDate,
        granularity: Granularity,
    ) -> Result<HistorySeries, PlaneError> {
        authorize_read(identity, subject)?;

        let span = end_date.days_since(start_date);
        if span < 0 {
            return Err(PlaneError::validation(vec![
                "start_date must not be after end_date".to_string(),
            ]));
        }
        if span > MAX_HISTORY_SPAN_DAYS {
            return Err(PlaneError::validation(vec![format!(
                "history span exceeds {MAX_HISTORY_SPAN_DAYS} days ({span})"
            )]));
        }

        let dailies = self.daily_aggregates(subject, start_date, end_date)?;
        let version = dailies.iter().map(|aggregate| aggregate.version).max().unwrap_or(0);

        let mut buckets: BTreeMap<String, Vec<&MasteryAggregate>> = BTreeMap::new();
        for aggregate in &dailies {
            let bucket = match granularity {
                Granularity::Daily => aggregate.date.to_string(),
                Granularity::Weekly => aggregate.date.week_bucket(),
                Granularity::Monthly => aggregate.date.month_bucket(),
            };
            buckets.entry(bucket).or_default().push(aggregate);
        }

        let points = buckets
            .into_iter()
            .map(|(bucket, aggregates)| bucket_point(bucket, &aggregates))
            .collect();
        Ok(HistorySeries {
            student_identity: subject.clone(),
            granularity,
            points,
            version,
        })
    }

    /// Reads the daily aggregates inside a date range, in date order.
    pub(crate) fn daily_aggregates(
        &self,
        subject: &StudentId,
        start_date: EventDate,
        end_date: EventDate,
    ) -> Result<Vec<MasteryAggregate>, PlaneError> {
        let prefix = keys::mastery_prefix(subject);
        let entries = self
            .store
            .scan_by_prefix(&prefix)
            .map_err(|error| PlaneError::internal(format!("history scan: {error}")))?;

        let mut dailies = Vec::new();
        for (key, versioned) in entries {
            // Per-component keys carry a component suffix and fail the date
            // parse, which filters them out of the aggregate series.
            let Some(suffix) = key.strip_prefix(&prefix) else {
                continue;
            };
            let Ok(date) = EventDate::parse(suffix) else {
                continue;
            };
            if date < start_date || date > end_date {
                continue;
            }
            dailies.push(parse_aggregate(&versioned)?);
        }
        dailies.sort_by_key(|aggregate| aggregate.date);
        Ok(dailies)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Parses a stored aggregate payload.
fn parse_aggregate(versioned: &VersionedValue) -> Result<MasteryAggregate, PlaneError> {
    serde_json::from_value(versioned.value.clone())
        .map_err(|error| PlaneError::internal(format!("corrupt aggregate: {error}")))
}

/// Folds a bucket of daily aggregates into one history point. Absent
/// components contribute zero, matching the final-score formula.
fn bucket_point(bucket: String, aggregates: &[&MasteryAggregate]) -> HistoryPoint {
    let days = aggregates.len();
    let day_count = if days == 0 { 1.0 } else { to_f64(days) };
    let final_score =
        round3(aggregates.iter().map(|aggregate| aggregate.final_score).sum::<f64>() / day_count);
    let mut components = BTreeMap::new();
    for component in ComponentName::ALL {
        let mean = aggregates
            .iter()
            .map(|aggregate| aggregate.component_value(component))
            .sum::<f64>()
            / day_count;
        components.insert(component, round3(mean));
    }
    HistoryPoint {
        bucket,
        final_score,
        components,
        days: u32::try_from(days).unwrap_or(u32::MAX),
    }
}

/// Converts a small count to the float domain.
#[allow(clippy::cast_precision_loss, reason = "Bucket sizes stay below 2^52.")]
fn to_f64(count: usize) -> f64 {
    count as f64
}
