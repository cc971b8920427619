// tutormesh-core/src/runtime/mod.rs
// ============================================================================
// Module: Tutormesh Runtime
// Description: Control-plane machinery for triage and mastery tracking.
// Purpose: Group the classifier, breaker, router, consumer, and read paths.
// Dependencies: crate submodules
// ============================================================================

//! ## Overview
//! The runtime binds the domain model to behavior: deterministic intent
//! classification, breaker-guarded invocation, the stateless triage router,
//! the partitioned event consumer with its aggregator, and the read-side
//! services (queries, predictions, recommendations, compliance) over the
//! composite-key state store.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod aggregator;
pub mod breaker;
pub mod cache;
pub mod classifier;
pub mod compliance;
pub mod consumer;
pub mod invoker;
pub mod keys;
pub mod predictor;
pub mod query;
pub mod recommender;
pub mod router;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use aggregator::MasteryAggregator;
pub use aggregator::ProfilePointer;
pub use breaker::BreakerConfig;
pub use breaker::BreakerDecision;
pub use breaker::BreakerState;
pub use breaker::CircuitBreaker;
pub use cache::HotCache;
pub use classifier::CLASSIFIER_VERSION;
pub use classifier::CONFIDENCE_FLOOR;
pub use classifier::FALLBACK_CONFIDENCE;
pub use classifier::IntentClassifier;
pub use compliance::ComplianceService;
pub use compliance::EraseSummary;
pub use compliance::ExportDocument;
pub use consumer::ConsumerConfig;
pub use consumer::EventConsumer;
pub use consumer::ProcessedMarker;
pub use invoker::InvocationClient;
pub use invoker::InvocationFailure;
pub use invoker::InvocationSuccess;
pub use invoker::RetryPolicy;
pub use predictor::DEFAULT_HORIZON_DAYS;
pub use predictor::Prediction;
pub use predictor::Predictor;
pub use predictor::Trend;
pub use query::Granularity;
pub use query::HistoryPoint;
pub use query::HistorySeries;
pub use query::MAX_HISTORY_SPAN_DAYS;
pub use query::QueryService;
pub use query::authorize_read;
pub use recommender::RecommendationItem;
pub use recommender::RecommendationSet;
pub use recommender::Recommender;
pub use recommender::RecommendedAction;
pub use router::INVOKE_METHOD;
pub use router::TriageRouter;
pub use store::InMemoryStateStore;
pub use store::SharedStateStore;
