// tutormesh-core/src/core/errors.rs
// ============================================================================
// Module: Tutormesh Error Taxonomy
// Description: Closed error-kind enum shared across the control plane.
// Purpose: Give every failure a stable code for responses, audits, metrics.
// Dependencies: thiserror, crate::runtime::breaker
// ============================================================================

//! ## Overview
//! The control plane surfaces failures through a small closed enum rather
//! than exception-style control flow. Each variant carries the data a caller
//! needs and maps to a stable string code used in HTTP bodies, audit records,
//! and metric labels. Messages never contain sensitive payload data.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::runtime::breaker::BreakerState;

// ============================================================================
// SECTION: Plane Error
// ============================================================================

/// Closed failure taxonomy for the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaneError {
    /// Request or event payload failed schema validation.
    #[error("request validation failed ({} violation(s))", errors.len())]
    Validation {
        /// Violation descriptions.
        errors: Vec<String>,
    },
    /// Caller identity headers are missing or malformed.
    #[error("missing or malformed caller identity: {reason}")]
    Authentication {
        /// Short reason label; never echoes header contents.
        reason: String,
    },
    /// Caller role does not permit the operation.
    #[error("caller is not permitted to access this record")]
    Authorization,
    /// Caller exceeded the per-student sliding window.
    #[error("rate limit exceeded; retry after {retry_after_ms} ms")]
    RateLimit {
        /// Milliseconds until the window admits another request.
        retry_after_ms: u64,
    },
    /// Retries exhausted or upstream rejected the invocation.
    #[error("upstream agent unavailable after {attempts} attempt(s)")]
    UpstreamUnavailable {
        /// Upstream attempts performed.
        attempts: u32,
        /// Breaker state observed at failure time.
        breaker_state: BreakerState,
    },
    /// Circuit breaker is open; the invocation was not attempted.
    #[error("circuit breaker open for target {target}")]
    BreakerOpen {
        /// Target agent identifier.
        target: String,
    },
    /// Optimistic concurrency exhausted its retry budget.
    #[error("optimistic write conflict persisted across {attempts} attempt(s)")]
    Conflict {
        /// Compare-and-swap attempts performed.
        attempts: u32,
    },
    /// Predictor lacks the minimum daily history.
    #[error("insufficient history: {points} daily point(s), minimum {minimum}")]
    InsufficientHistory {
        /// Daily points available.
        points: usize,
        /// Minimum points required.
        minimum: usize,
    },
    /// Request or dependency deadline expired.
    #[error("deadline exceeded")]
    Timeout,
    /// Unexpected failure; details stay in server logs only.
    #[error("internal error (correlation {correlation})")]
    Internal {
        /// Correlation identifier for operator lookup.
        correlation: String,
    },
}

impl PlaneError {
    /// Returns the stable string code for the error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::Authentication { .. } => "authentication_error",
            Self::Authorization => "authorization_error",
            Self::RateLimit { .. } => "rate_limit_error",
            Self::UpstreamUnavailable { .. } => "upstream_unavailable",
            Self::BreakerOpen { .. } => "breaker_open",
            Self::Conflict { .. } => "conflict_error",
            Self::InsufficientHistory { .. } => "insufficient_history",
            Self::Timeout => "timeout_error",
            Self::Internal { .. } => "internal_error",
        }
    }

    /// Builds a validation error from a violation list.
    #[must_use]
    pub fn validation(errors: Vec<String>) -> Self {
        Self::Validation {
            errors,
        }
    }

    /// Builds an internal error with the given correlation identifier.
    #[must_use]
    pub fn internal(correlation: impl Into<String>) -> Self {
        Self::Internal {
            correlation: correlation.into(),
        }
    }
}
