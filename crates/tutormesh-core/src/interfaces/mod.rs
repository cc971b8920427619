// tutormesh-core/src/interfaces/mod.rs
// ============================================================================
// Module: Tutormesh Interfaces
// Description: Backend-agnostic interfaces for storage, invocation, and logs.
// Purpose: Define the contract surfaces used by the Tutormesh runtime.
// Dependencies: crate::core, crate::runtime::breaker
// ============================================================================

//! ## Overview
//! Interfaces define how the control plane integrates with external systems
//! without embedding backend-specific details. Implementations must fail
//! closed on missing or invalid data. Stores are synchronous (local adapters
//! front fast embedded or sidecar-local backends); the invocation plane and
//! the event log are asynchronous with explicit deadlines.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::identifiers::AgentId;
use crate::core::intent::Classification;
use crate::core::intent::IntentTag;
use crate::core::time::UnixMillis;
use crate::core::triage::TriageAudit;
use crate::runtime::breaker::BreakerState;

// ============================================================================
// SECTION: State Store
// ============================================================================

/// State store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("state store io error: {0}")]
    Io(String),
    /// Stored payload failed to serialize or deserialize.
    #[error("state store serialization error: {0}")]
    Serialization(String),
    /// Store reported an error.
    #[error("state store error: {0}")]
    Store(String),
}

/// Value read from the state store with its write version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedValue {
    /// Stored JSON value.
    pub value: Value,
    /// Store-assigned write version, starting at 1.
    pub version: u64,
}

/// Outcome of a compare-and-swap write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasOutcome {
    /// The write was applied at the returned version.
    Stored {
        /// Version assigned to the stored value.
        version: u64,
    },
    /// The expected version did not match the stored version.
    Conflict {
        /// Version currently stored, `None` when the key is absent.
        found: Option<u64>,
    },
}

/// Composite-key state store with TTL semantics.
///
/// # Invariants
/// - Versions are per-key monotone counters starting at 1.
/// - Expired entries behave as absent for every operation.
pub trait StateStore: Send + Sync {
    /// Reads a key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn get(&self, key: &str) -> Result<Option<VersionedValue>, StoreError>;

    /// Writes a key unconditionally, returning the new version.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn put(&self, key: &str, value: &Value, ttl: Option<Duration>) -> Result<u64, StoreError>;

    /// Writes a key only when the stored version matches `expected`
    /// (`None` requires the key to be absent).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails; a version mismatch is a
    /// normal [`CasOutcome::Conflict`], not an error.
    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<u64>,
        value: &Value,
        ttl: Option<Duration>,
    ) -> Result<CasOutcome, StoreError>;

    /// Deletes a key, returning true when a live entry was removed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the delete fails.
    fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Reads several keys, preserving request order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when any read fails.
    fn multi_get(&self, keys: &[String]) -> Result<Vec<Option<VersionedValue>>, StoreError>;

    /// Returns all live entries whose key starts with `prefix`, in key order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the scan fails.
    fn scan_by_prefix(&self, prefix: &str) -> Result<Vec<(String, VersionedValue)>, StoreError>;

    /// Probes store reachability for readiness checks.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store is unreachable.
    fn probe(&self) -> Result<(), StoreError> {
        self.get("__probe__").map(|_| ())
    }
}

// ============================================================================
// SECTION: Agent Invoker
// ============================================================================

/// Invocation-plane errors, classified for retry decisions.
#[derive(Debug, Error)]
pub enum InvokeError {
    /// Transient failure (network error or 5xx-equivalent); retryable.
    #[error("transient upstream failure: {0}")]
    Transient(String),
    /// Permanent failure (validation or 4xx-equivalent); not retryable.
    #[error("permanent upstream failure: {0}")]
    Permanent(String),
    /// The per-attempt deadline expired; retryable.
    #[error("upstream deadline exceeded")]
    Timeout,
}

impl InvokeError {
    /// Returns true when the retry policy may re-attempt after this error.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Timeout)
    }
}

/// Sidecar-mediated service invocation primitive.
///
/// The core never opens direct connections to peer agents; every call goes
/// through the local sidecar, and the deadline is enforced on both sides.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    /// Invokes `method` on the downstream target with a JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`InvokeError`] classified by retryability.
    async fn invoke(
        &self,
        target: &AgentId,
        method: &str,
        body: &Value,
        deadline: Duration,
    ) -> Result<Value, InvokeError>;

    /// Probes sidecar reachability for readiness checks.
    ///
    /// # Errors
    ///
    /// Returns [`InvokeError`] when the sidecar is unreachable.
    async fn probe(&self, deadline: Duration) -> Result<(), InvokeError>;
}

// ============================================================================
// SECTION: Audit Sink
// ============================================================================

/// Sink for triage audit records.
///
/// Implementations must never block or fail the request path; buffering and
/// spill behavior live behind this seam.
pub trait AuditSink: Send + Sync {
    /// Records an audit event.
    fn record(&self, audit: &TriageAudit);
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _audit: &TriageAudit) {}
}

// ============================================================================
// SECTION: Dead-Letter Sink
// ============================================================================

/// Dead-letter record published for undeliverable payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    /// Payload exactly as received.
    pub original_payload: Value,
    /// Stable error-kind label.
    pub error_kind: String,
    /// Violation or failure details.
    pub error_details: Vec<String>,
    /// Timestamp of the first failure.
    pub first_failure_timestamp: UnixMillis,
    /// Processing attempts performed before diversion.
    pub attempts: u32,
}

/// Dead-letter sink errors.
#[derive(Debug, Error)]
pub enum DeadLetterError {
    /// The sink failed to persist the entry.
    #[error("dead-letter publish failed: {0}")]
    Publish(String),
}

/// Sink for poison payloads.
pub trait DeadLetterSink: Send + Sync {
    /// Diverts a poison payload with full context.
    ///
    /// # Errors
    ///
    /// Returns [`DeadLetterError`] when the entry cannot be persisted; the
    /// consumer holds its offset in that case.
    fn divert(&self, entry: &DeadLetterEntry) -> Result<(), DeadLetterError>;
}

// ============================================================================
// SECTION: Event Log
// ============================================================================

/// Event-log errors.
#[derive(Debug, Error)]
pub enum EventLogError {
    /// The log rejected or failed the operation.
    #[error("event log error: {0}")]
    Log(String),
    /// The requested partition does not exist.
    #[error("unknown partition: {0}")]
    UnknownPartition(u32),
}

/// Batch of raw event payloads pulled from one partition.
#[derive(Debug, Clone, PartialEq)]
pub struct EventBatch {
    /// Partition the batch was pulled from.
    pub partition: u32,
    /// Offset of the first payload in the batch.
    pub base_offset: u64,
    /// Raw payloads in log order.
    pub events: Vec<Value>,
}

/// Consumer-side view of the partitioned learning-events log.
///
/// # Invariants
/// - Payloads within one partition are returned in log order.
/// - `poll` resumes from the committed offset; offsets are committed only by
///   the consumer after application or dead-letter routing.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Returns the partition count of the subscribed topic.
    fn partitions(&self) -> u32;

    /// Pulls up to `max` payloads from the committed offset onward.
    ///
    /// # Errors
    ///
    /// Returns [`EventLogError`] when the pull fails.
    async fn poll(&self, partition: u32, max: usize) -> Result<EventBatch, EventLogError>;

    /// Commits the consumer offset for a partition.
    ///
    /// # Errors
    ///
    /// Returns [`EventLogError`] when the commit fails.
    fn commit(&self, partition: u32, offset: u64) -> Result<(), EventLogError>;

    /// Returns the uncommitted backlog length for a partition.
    ///
    /// # Errors
    ///
    /// Returns [`EventLogError`] when the partition is unknown.
    fn lag(&self, partition: u32) -> Result<u64, EventLogError>;
}

/// Producer-side view of the event log.
pub trait EventPublisher: Send + Sync {
    /// Publishes a payload to a topic, partitioned by `key`.
    ///
    /// # Errors
    ///
    /// Returns [`EventLogError`] when the publish fails.
    fn publish(&self, topic: &str, key: &str, payload: &Value) -> Result<(), EventLogError>;

    /// Probes log reachability for readiness checks.
    ///
    /// # Errors
    ///
    /// Returns [`EventLogError`] when the log is unreachable.
    fn probe(&self) -> Result<(), EventLogError>;
}

// ============================================================================
// SECTION: LLM Classifier
// ============================================================================

/// Optional LLM classifier errors.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The classifier endpoint failed or returned an unusable payload.
    #[error("llm classifier error: {0}")]
    Classifier(String),
}

/// Optional LLM-backed intent classifier consulted under configuration.
///
/// The LLM path is never authoritative on failure: the deterministic result
/// is returned whenever this trait errors or exceeds its budget.
#[async_trait]
pub trait LlmClassifier: Send + Sync {
    /// Classifies a query.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError`] when classification fails.
    async fn classify(&self, query: &str) -> Result<Classification, LlmError>;
}

// ============================================================================
// SECTION: Metrics
// ============================================================================

/// Request outcome label for metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Successful request.
    Ok,
    /// Failed request.
    Error,
}

impl RequestOutcome {
    /// Returns a stable label for the outcome.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
        }
    }
}

/// Metrics sink for counters, histograms, and gauges.
///
/// Intentionally dependency-light so deployments can plug in Prometheus or
/// OpenTelemetry without redesign.
pub trait MetricsSink: Send + Sync {
    /// Records a triage request with its intent, outcome, and latency.
    fn record_triage(&self, intent: IntentTag, outcome: RequestOutcome, latency: Duration);

    /// Records a mastery read with its endpoint label, outcome, and latency.
    fn record_mastery(&self, endpoint: &'static str, outcome: RequestOutcome, latency: Duration);

    /// Updates the breaker state gauge for a target.
    fn set_breaker_state(&self, target: &AgentId, state: BreakerState);

    /// Updates the consumer lag gauge for a partition.
    fn set_consumer_lag(&self, partition: u32, lag: u64);

    /// Counts a dead-lettered payload.
    fn incr_dead_letter(&self);

    /// Counts a dropped audit record.
    fn incr_audit_drop(&self);
}

/// No-op metrics sink.
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record_triage(&self, _intent: IntentTag, _outcome: RequestOutcome, _latency: Duration) {}

    fn record_mastery(&self, _endpoint: &'static str, _outcome: RequestOutcome, _latency: Duration) {
    }

    fn set_breaker_state(&self, _target: &AgentId, _state: BreakerState) {}

    fn set_consumer_lag(&self, _partition: u32, _lag: u64) {}

    fn incr_dead_letter(&self) {}

    fn incr_audit_drop(&self) {}
}
