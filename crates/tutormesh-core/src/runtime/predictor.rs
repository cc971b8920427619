// tutormesh-core/src/runtime/predictor.rs
// ============================================================================
// Module: Tutormesh Predictor
// Description: Least-squares mastery projection with cached results.
// Purpose: Project the final score a horizon of days ahead.
// Dependencies: crate::core, crate::interfaces, crate::runtime
// ============================================================================

//! ## Overview
//! The predictor fits an ordinary least-squares line to (day index, final
//! score) over the most recent daily aggregates and projects the configured
//! horizon ahead. Confidence is the clamped R² scaled by how much of the
//! two-week sample target is available. The trend label applies a dead band
//! around zero slope, and the intervention flag marks projections that fall
//! below 0.5 while the slope is non-positive. Results are cached per student
//! for an hour and invalidated on every aggregate write.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use crate::core::errors::PlaneError;
use crate::core::identifiers::StudentId;
use crate::core::identity::IdentityContext;
use crate::core::mastery::MasteryAggregate;
use crate::core::mastery::clamp_unit;
use crate::core::mastery::round3;
use crate::core::time::UnixMillis;
use crate::interfaces::StateStore;
use crate::runtime::keys;
use crate::runtime::query::QueryService;
use crate::runtime::query::authorize_read;
use crate::runtime::store::SharedStateStore;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default projection horizon in days.
pub const DEFAULT_HORIZON_DAYS: u32 = 7;
/// Minimum daily points required to fit a line.
pub const MIN_POINTS: usize = 3;
/// Maximum daily points consumed by a fit.
pub const MAX_POINTS: usize = 30;
/// Slope dead band (score per day) inside which the trend is stable.
const TREND_DEAD_BAND: f64 = 0.005;
/// Projection floor below which intervention is flagged.
const INTERVENTION_FLOOR: f64 = 0.5;
/// Sample count at which confidence scaling saturates.
const CONFIDENCE_SATURATION_POINTS: f64 = 14.0;

// ============================================================================
// SECTION: Prediction Types
// ============================================================================

/// Direction of the fitted trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    /// Slope above the dead band.
    Improving,
    /// Slope below the negative dead band.
    Declining,
    /// Slope inside the dead band.
    Stable,
}

/// Cached prediction for a student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Projected final score at the horizon, clamped to `[0, 1]`.
    pub predicted_score: f64,
    /// Fit confidence in `[0, 1]`.
    pub confidence: f64,
    /// Trend label derived from the slope.
    pub trend: Trend,
    /// Whether the projection warrants intervention.
    pub intervention_flag: bool,
    /// Projection horizon in days.
    pub horizon_days: u32,
    /// Timestamp the prediction was generated.
    pub generated_at: UnixMillis,
}

// ============================================================================
// SECTION: Predictor
// ============================================================================

/// Least-squares mastery predictor.
pub struct Predictor {
    /// Backing state store for the prediction cache.
    store: SharedStateStore,
    /// Query service supplying daily aggregates.
    query: Arc<QueryService>,
}

impl Predictor {
    /// Creates a predictor over the shared store and query service.
    #[must_use]
    pub const fn new(store: SharedStateStore, query: Arc<QueryService>) -> Self {
        Self {
            store,
            query,
        }
    }

    /// Projects a student's final score `horizon_days` ahead.
    ///
    /// # Errors
    ///
    /// Returns [`PlaneError::InsufficientHistory`] with fewer than three
    /// daily points, [`PlaneError::Authorization`] on access violations, or
    /// [`PlaneError::Internal`] on store failure.
    pub fn predict(
        &self,
        identity: &IdentityContext,
        subject: &StudentId,
        horizon_days: u32,
        now: UnixMillis,
    ) -> Result<Prediction, PlaneError> {
        authorize_read(identity, subject)?;

        let cache_key = keys::prediction_key(subject);
        let cached = self
            .store
            .get(&cache_key)
            .map_err(|error| PlaneError::internal(format!("prediction cache: {error}")))?;
        if let Some(versioned) = cached
            && let Ok(prediction) = serde_json::from_value::<Prediction>(versioned.value)
            && prediction.horizon_days == horizon_days
        {
            return Ok(prediction);
        }

        let end = now.date();
        let start = end.minus_days(i64::try_from(MAX_POINTS).unwrap_or(30));
        let mut dailies = self.query.daily_aggregates(subject, start, end)?;
        if dailies.len() > MAX_POINTS {
            dailies.drain(..dailies.len() - MAX_POINTS);
        }
        if dailies.len() < MIN_POINTS {
            return Err(PlaneError::InsufficientHistory {
                points: dailies.len(),
                minimum: MIN_POINTS,
            });
        }

        let prediction = fit_projection(&dailies, horizon_days, now);
        let payload = serde_json::to_value(&prediction)
            .map_err(|error| PlaneError::internal(format!("prediction encode: {error}")))?;
        self.store
            .put(&cache_key, &payload, Some(keys::TTL_PREDICTION))
            .map_err(|error| PlaneError::internal(format!("prediction cache: {error}")))?;
        Ok(prediction)
    }
}

// ============================================================================
// SECTION: Fit
// ============================================================================

/// Fits the OLS line and assembles the prediction.
fn fit_projection(dailies: &[MasteryAggregate], horizon_days: u32, now: UnixMillis) -> Prediction {
    let base = dailies.first().map_or_else(|| now.date(), |aggregate| aggregate.date);
    let points: Vec<(f64, f64)> = dailies
        .iter()
        .map(|aggregate| (day_index(aggregate.date.days_since(base)), aggregate.final_score))
        .collect();

    let (slope, intercept, r_squared) = least_squares(&points);
    let last_index = points.last().map_or(0.0, |(x, _)| *x);
    let projected = intercept + slope * (last_index + f64::from(horizon_days));
    let predicted_score = round3(clamp_unit(projected));

    let sample_scale = (count_f64(points.len()) / CONFIDENCE_SATURATION_POINTS).min(1.0);
    let confidence = round3(r_squared.clamp(0.0, 1.0) * sample_scale);

    let trend = if slope > TREND_DEAD_BAND {
        Trend::Improving
    } else if slope < -TREND_DEAD_BAND {
        Trend::Declining
    } else {
        Trend::Stable
    };

    Prediction {
        predicted_score,
        confidence,
        trend,
        intervention_flag: predicted_score < INTERVENTION_FLOOR && slope <= 0.0,
        horizon_days,
        generated_at: now,
    }
}

/// Ordinary least squares over (x, y) points: returns (slope, intercept, R²).
fn least_squares(points: &[(f64, f64)]) -> (f64, f64, f64) {
    let n = count_f64(points.len());
    let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;

    let covariance = points.iter().map(|(x, y)| (x - mean_x) * (y - mean_y)).sum::<f64>();
    let variance_x = points.iter().map(|(x, _)| (x - mean_x).powi(2)).sum::<f64>();
    let slope = if variance_x == 0.0 { 0.0 } else { covariance / variance_x };
    let intercept = mean_y - slope * mean_x;

    let ss_res = points.iter().map(|(x, y)| (y - (intercept + slope * x)).powi(2)).sum::<f64>();
    let ss_tot = points.iter().map(|(_, y)| (y - mean_y).powi(2)).sum::<f64>();
    let r_squared = if ss_tot == 0.0 {
        if ss_res == 0.0 { 1.0 } else { 0.0 }
    } else {
        1.0 - ss_res / ss_tot
    };
    (slope, intercept, r_squared)
}

/// Converts a day offset to the fit domain.
#[allow(clippy::cast_precision_loss, reason = "Day offsets stay below 2^52.")]
fn day_index(days: i64) -> f64 {
    days as f64
}

/// Converts a point count to the fit domain.
#[allow(clippy::cast_precision_loss, reason = "Point counts stay below 2^52.")]
fn count_f64(count: usize) -> f64 {
    count as f64
}
