// tutormesh-core/src/runtime/breaker.rs
// ============================================================================
// Module: Tutormesh Circuit Breaker
// Description: Shared per-target breaker with closed/open/half-open states.
// Purpose: Short-circuit calls to failing downstream agents.
// Dependencies: serde, tokio
// ============================================================================

//! ## Overview
//! One breaker instance is shared per downstream target across all
//! request-handling workers. Transitions happen under a single lock so the
//! observed state sequence is always a prefix of
//! `closed → open → half_open → (closed | open)`. A logical invocation
//! (after its internal retries) counts as one success or one failure.
//! Invariants:
//! - Five consecutive failures open the breaker.
//! - An open breaker fast-fails for 30 seconds, then admits exactly one
//!   half-open probe.
//! - No lock is held across a suspension point.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Mutex;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use tokio::time::Instant;

// ============================================================================
// SECTION: State
// ============================================================================

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    /// Requests flow; consecutive failures are counted.
    Closed,
    /// Requests fail immediately without an upstream attempt.
    Open,
    /// Exactly one probe request is admitted.
    HalfOpen,
}

impl BreakerState {
    /// Returns a stable label for the state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

// ============================================================================
// SECTION: Config
// ============================================================================

/// Breaker thresholds and timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Consecutive failures required to open the breaker.
    pub failure_threshold: u32,
    /// Duration an open breaker fast-fails before admitting a probe.
    pub open_duration: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_duration: Duration::from_secs(30),
        }
    }
}

// ============================================================================
// SECTION: Breaker
// ============================================================================

/// Mutable breaker bookkeeping guarded by the breaker lock.
#[derive(Debug)]
struct BreakerInner {
    /// Current state.
    state: BreakerState,
    /// Consecutive failed invocations while closed.
    consecutive_failures: u32,
    /// Instant the breaker last opened.
    opened_at: Option<Instant>,
    /// Whether the single half-open probe is outstanding.
    probe_inflight: bool,
}

/// Decision returned when the breaker admits or rejects an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerDecision {
    /// The invocation may proceed.
    Admit,
    /// The invocation must fail fast without an upstream attempt.
    FastFail {
        /// State observed at rejection time.
        state: BreakerState,
    },
}

/// Shared per-target circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Thresholds and timers.
    config: BreakerConfig,
    /// Guarded transition state.
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Creates a closed breaker with the provided thresholds.
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_inflight: false,
            }),
        }
    }

    /// Returns the current observable state without transitioning.
    #[must_use]
    pub fn state(&self) -> BreakerState {
        self.inner.lock().map_or(BreakerState::Open, |inner| inner.state)
    }

    /// Decides whether an invocation may proceed, transitioning open →
    /// half-open once the open window has elapsed.
    #[must_use]
    pub fn admit(&self) -> BreakerDecision {
        let Ok(mut inner) = self.inner.lock() else {
            return BreakerDecision::FastFail {
                state: BreakerState::Open,
            };
        };
        match inner.state {
            BreakerState::Closed => BreakerDecision::Admit,
            BreakerState::Open => {
                let elapsed = inner.opened_at.map_or(Duration::ZERO, |at| at.elapsed());
                if elapsed >= self.config.open_duration {
                    inner.state = BreakerState::HalfOpen;
                    inner.probe_inflight = true;
                    BreakerDecision::Admit
                } else {
                    BreakerDecision::FastFail {
                        state: BreakerState::Open,
                    }
                }
            }
            BreakerState::HalfOpen => {
                if inner.probe_inflight {
                    BreakerDecision::FastFail {
                        state: BreakerState::HalfOpen,
                    }
                } else {
                    inner.probe_inflight = true;
                    BreakerDecision::Admit
                }
            }
        }
    }

    /// Records a successful invocation: closes the breaker and resets
    /// counters.
    pub fn record_success(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.state = BreakerState::Closed;
            inner.consecutive_failures = 0;
            inner.opened_at = None;
            inner.probe_inflight = false;
        }
    }

    /// Records a failed invocation: counts toward the open threshold while
    /// closed, and re-opens immediately from half-open.
    pub fn record_failure(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            match inner.state {
                BreakerState::Closed => {
                    inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
                    if inner.consecutive_failures >= self.config.failure_threshold {
                        inner.state = BreakerState::Open;
                        inner.opened_at = Some(Instant::now());
                    }
                }
                BreakerState::HalfOpen | BreakerState::Open => {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(Instant::now());
                    inner.probe_inflight = false;
                    inner.consecutive_failures = self.config.failure_threshold;
                }
            }
        }
    }
}
