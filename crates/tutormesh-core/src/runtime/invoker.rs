// tutormesh-core/src/runtime/invoker.rs
// ============================================================================
// Module: Tutormesh Invocation Client
// Description: Retrying, breaker-guarded wrapper over the sidecar invoker.
// Purpose: Apply timeout, backoff, and failure isolation per target.
// Dependencies: crate::interfaces, crate::runtime::breaker, tokio
// ============================================================================

//! ## Overview
//! The invocation client wraps the sidecar [`AgentInvoker`] with client-side
//! policy: a per-attempt deadline, exponential backoff for transient
//! failures, and a shared circuit breaker per downstream target. Policies are
//! also declared as sidecar configuration; enforcing them here keeps the core
//! robust against sidecar misconfiguration. Cancellation propagates through
//! dropped futures, so an expired request deadline abandons in-flight
//! attempts rather than leaking them.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use serde_json::Value;

use crate::core::errors::PlaneError;
use crate::core::identifiers::AgentId;
use crate::interfaces::AgentInvoker;
use crate::interfaces::InvokeError;
use crate::interfaces::MetricsSink;
use crate::runtime::breaker::BreakerConfig;
use crate::runtime::breaker::BreakerDecision;
use crate::runtime::breaker::BreakerState;
use crate::runtime::breaker::CircuitBreaker;

// ============================================================================
// SECTION: Retry Policy
// ============================================================================

/// Retry policy for one logical invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum attempts per logical invocation.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles per subsequent retry.
    pub base_delay: Duration,
    /// Deadline applied to each attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            attempt_timeout: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Returns the backoff delay preceding `attempt` (attempts start at 1).
    #[must_use]
    pub fn backoff_before(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(2).min(16);
        self.base_delay.saturating_mul(2_u32.saturating_pow(exponent))
    }
}

// ============================================================================
// SECTION: Reports
// ============================================================================

/// Successful invocation report.
#[derive(Debug, Clone)]
pub struct InvocationSuccess {
    /// Response payload from the downstream agent.
    pub response: Value,
    /// Attempts performed, including the successful one.
    pub attempts: u32,
    /// Breaker state after the invocation.
    pub breaker_state: BreakerState,
}

/// Terminal invocation failure report.
#[derive(Debug, Clone)]
pub struct InvocationFailure {
    /// Attempts performed before giving up.
    pub attempts: u32,
    /// Breaker state after the invocation.
    pub breaker_state: BreakerState,
    /// Whether the breaker short-circuited the invocation.
    pub breaker_tripped: bool,
    /// Terminal error mapped into the plane taxonomy.
    pub error: PlaneError,
    /// Operator-facing failure message.
    pub message: String,
}

// ============================================================================
// SECTION: Invocation Client
// ============================================================================

/// Breaker-guarded retrying invocation client.
pub struct InvocationClient {
    /// Sidecar invocation plane.
    invoker: Arc<dyn AgentInvoker>,
    /// Shared breakers, one per downstream target.
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
    /// Breaker thresholds applied to new targets.
    breaker_config: BreakerConfig,
    /// Retry policy for logical invocations.
    retry: RetryPolicy,
    /// Metrics sink for breaker state gauges.
    metrics: Arc<dyn MetricsSink>,
}

impl InvocationClient {
    /// Creates an invocation client with the provided policies.
    #[must_use]
    pub fn new(
        invoker: Arc<dyn AgentInvoker>,
        breaker_config: BreakerConfig,
        retry: RetryPolicy,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            invoker,
            breakers: Mutex::new(HashMap::new()),
            breaker_config,
            retry,
            metrics,
        }
    }

    /// Returns the shared breaker for a target, creating it when first seen.
    fn breaker_for(&self, target: &AgentId) -> Arc<CircuitBreaker> {
        let mut breakers = match self.breakers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(
            breakers
                .entry(target.as_str().to_string())
                .or_insert_with(|| Arc::new(CircuitBreaker::new(self.breaker_config))),
        )
    }

    /// Returns the current breaker state for a target without invoking.
    #[must_use]
    pub fn breaker_state(&self, target: &AgentId) -> BreakerState {
        self.breaker_for(target).state()
    }

    /// Performs one logical invocation with retries and breaker admission.
    ///
    /// # Errors
    ///
    /// Returns [`InvocationFailure`] when the breaker rejects the call or all
    /// attempts are exhausted.
    pub async fn invoke(
        &self,
        target: &AgentId,
        method: &str,
        body: &Value,
    ) -> Result<InvocationSuccess, InvocationFailure> {
        let breaker = self.breaker_for(target);
        if let BreakerDecision::FastFail {
            state,
        } = breaker.admit()
        {
            self.metrics.set_breaker_state(target, state);
            return Err(InvocationFailure {
                attempts: 0,
                breaker_state: state,
                breaker_tripped: true,
                error: PlaneError::BreakerOpen {
                    target: target.as_str().to_string(),
                },
                message: format!("breaker rejected invocation of {target}"),
            });
        }

        let mut last_message = String::new();
        let mut attempts = 0;
        for attempt in 1..=self.retry.max_attempts {
            if attempt > 1 {
                tokio::time::sleep(self.retry.backoff_before(attempt)).await;
            }
            attempts = attempt;
            let outcome = tokio::time::timeout(
                self.retry.attempt_timeout,
                self.invoker.invoke(target, method, body, self.retry.attempt_timeout),
            )
            .await;
            match outcome {
                Ok(Ok(response)) => {
                    breaker.record_success();
                    self.metrics.set_breaker_state(target, breaker.state());
                    return Ok(InvocationSuccess {
                        response,
                        attempts,
                        breaker_state: breaker.state(),
                    });
                }
                Ok(Err(error)) => {
                    last_message = error.to_string();
                    if !error.is_retryable() {
                        break;
                    }
                    tracing::debug!(
                        target_agent = target.as_str(),
                        attempt,
                        "transient upstream failure"
                    );
                }
                Err(_elapsed) => {
                    last_message = InvokeError::Timeout.to_string();
                    tracing::debug!(
                        target_agent = target.as_str(),
                        attempt,
                        "upstream attempt deadline expired"
                    );
                }
            }
        }

        breaker.record_failure();
        let state = breaker.state();
        self.metrics.set_breaker_state(target, state);
        Err(InvocationFailure {
            attempts,
            breaker_state: state,
            breaker_tripped: false,
            error: PlaneError::UpstreamUnavailable {
                attempts,
                breaker_state: state,
            },
            message: last_message,
        })
    }
}
