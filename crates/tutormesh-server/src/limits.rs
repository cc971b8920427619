// tutormesh-server/src/limits.rs
// ============================================================================
// Module: Server Rate Limits
// Description: Per-student sliding-window rate limiter.
// Purpose: Reject excess triage traffic before invocation.
// Dependencies: tokio, tutormesh-config
// ============================================================================

//! ## Overview
//! A true sliding window: each key holds the timestamps of its admitted
//! requests inside the window, pruned on every check. Excess requests are
//! rejected with the delay after which the window admits another request.
//! The bucket map is bounded; when it overflows, empty buckets are evicted
//! first and the limiter fails closed if pressure persists.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tutormesh_config::RateLimitConfig;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum tracked rate-limit keys.
const MAX_TRACKED_KEYS: usize = 65_536;

// ============================================================================
// SECTION: Limiter
// ============================================================================

/// Decision returned by the rate limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Admit the request.
    Allow,
    /// Reject the request with a retry delay.
    Limited {
        /// Milliseconds before the window admits another request.
        retry_after_ms: u64,
    },
    /// Reject because the limiter is over capacity.
    OverCapacity,
}

/// Sliding-window rate limiter keyed by student identity.
pub struct SlidingWindowLimiter {
    /// Requests admitted per window.
    max_requests: usize,
    /// Window length.
    window: Duration,
    /// Admission timestamps per key.
    buckets: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl SlidingWindowLimiter {
    /// Creates a limiter from configuration.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            max_requests: config.max_requests as usize,
            window: config.window,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Checks the limiter for a key and records the admission.
    #[must_use]
    pub fn check(&self, key: &str) -> RateDecision {
        let now = Instant::now();
        let Ok(mut buckets) = self.buckets.lock() else {
            return RateDecision::OverCapacity;
        };

        if buckets.len() >= MAX_TRACKED_KEYS && !buckets.contains_key(key) {
            let window = self.window;
            buckets.retain(|_, stamps| {
                stamps.front().is_some_and(|oldest| now.duration_since(*oldest) < window)
            });
            if buckets.len() >= MAX_TRACKED_KEYS {
                return RateDecision::OverCapacity;
            }
        }

        let stamps = buckets.entry(key.to_string()).or_default();
        while stamps.front().is_some_and(|oldest| now.duration_since(*oldest) >= self.window) {
            stamps.pop_front();
        }

        if stamps.len() >= self.max_requests {
            let retry_after = stamps.front().map_or(self.window, |oldest| {
                self.window.saturating_sub(now.duration_since(*oldest))
            });
            return RateDecision::Limited {
                retry_after_ms: u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX),
            };
        }
        stamps.push_back(now);
        RateDecision::Allow
    }
}
