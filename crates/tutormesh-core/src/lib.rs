// tutormesh-core/src/lib.rs
// ============================================================================
// Module: Tutormesh Core Library
// Description: Public API surface for the Tutormesh control plane core.
// Purpose: Expose domain types, interfaces, and runtime helpers.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Tutormesh core implements the request-routing and mastery-tracking control
//! plane of a multi-agent tutoring backend: deterministic triage of student
//! queries to downstream tutor agents, and idempotent aggregation of
//! learning-progress events into per-day mastery scores. It is
//! backend-agnostic and integrates through explicit interfaces rather than
//! embedding into transport or storage frameworks.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use interfaces::AgentInvoker;
pub use interfaces::AuditSink;
pub use interfaces::CasOutcome;
pub use interfaces::DeadLetterEntry;
pub use interfaces::DeadLetterError;
pub use interfaces::DeadLetterSink;
pub use interfaces::EventBatch;
pub use interfaces::EventLogError;
pub use interfaces::EventPublisher;
pub use interfaces::EventSource;
pub use interfaces::InvokeError;
pub use interfaces::LlmClassifier;
pub use interfaces::LlmError;
pub use interfaces::MetricsSink;
pub use interfaces::NoopAuditSink;
pub use interfaces::NoopMetrics;
pub use interfaces::RequestOutcome;
pub use interfaces::StateStore;
pub use interfaces::StoreError;
pub use interfaces::VersionedValue;
pub use runtime::BreakerConfig;
pub use runtime::BreakerState;
pub use runtime::CircuitBreaker;
pub use runtime::ComplianceService;
pub use runtime::ConsumerConfig;
pub use runtime::EventConsumer;
pub use runtime::Granularity;
pub use runtime::HistorySeries;
pub use runtime::HotCache;
pub use runtime::InMemoryStateStore;
pub use runtime::IntentClassifier;
pub use runtime::InvocationClient;
pub use runtime::MasteryAggregator;
pub use runtime::Prediction;
pub use runtime::Predictor;
pub use runtime::QueryService;
pub use runtime::RecommendationSet;
pub use runtime::Recommender;
pub use runtime::RetryPolicy;
pub use runtime::SharedStateStore;
pub use runtime::TriageRouter;
pub use runtime::Trend;
