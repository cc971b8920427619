// tutormesh-core/tests/consumer.rs
// ============================================================================
// Module: Event Consumer Tests
// Description: Tests for idempotent application and dead-letter routing.
// ============================================================================
//! ## Overview
//! Drives the consumer against an in-test partitioned source: duplicate
//! deliveries apply once, poison events divert with full context and the
//! consumer advances, and offsets commit only after handling.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod common;

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use common::CapturingDeadLetterSink;
use common::STUDENT;
use common::snapshot_for;
use serde_json::Value;
use serde_json::json;
use tokio::sync::watch;
use tutormesh_core::ComponentName;
use tutormesh_core::ConsumerConfig;
use tutormesh_core::EventConsumer;
use tutormesh_core::HotCache;
use tutormesh_core::InMemoryStateStore;
use tutormesh_core::LearningEvent;
use tutormesh_core::MasteryAggregate;
use tutormesh_core::MasteryAggregator;
use tutormesh_core::NoopMetrics;
use tutormesh_core::StateStore;
use tutormesh_core::StudentId;
use tutormesh_core::UnixMillis;
use tutormesh_core::interfaces::EventBatch;
use tutormesh_core::interfaces::EventLogError;
use tutormesh_core::interfaces::EventSource;
use tutormesh_core::runtime::SharedStateStore;
use tutormesh_core::runtime::keys;

// ============================================================================
// SECTION: Test Source
// ============================================================================

/// Single-partition in-test event source.
struct VecSource {
    /// Records in log order.
    records: Mutex<Vec<Value>>,
    /// Committed offset.
    committed: Mutex<u64>,
}

impl VecSource {
    /// Creates a source over the given records.
    fn new(records: Vec<Value>) -> Arc<Self> {
        Arc::new(Self {
            records: Mutex::new(records),
            committed: Mutex::new(0),
        })
    }

    /// Returns the committed offset.
    fn committed(&self) -> u64 {
        *self.committed.lock().unwrap()
    }
}

#[async_trait]
impl EventSource for VecSource {
    fn partitions(&self) -> u32 {
        1
    }

    async fn poll(&self, partition: u32, max: usize) -> Result<EventBatch, EventLogError> {
        let committed = *self.committed.lock().unwrap();
        let records = self.records.lock().unwrap();
        let from = usize::try_from(committed).unwrap();
        Ok(EventBatch {
            partition,
            base_offset: committed,
            events: records.iter().skip(from).take(max).cloned().collect(),
        })
    }

    fn commit(&self, _partition: u32, offset: u64) -> Result<(), EventLogError> {
        let mut committed = self.committed.lock().unwrap();
        *committed = committed.max(offset);
        Ok(())
    }

    fn lag(&self, _partition: u32) -> Result<u64, EventLogError> {
        let committed = *self.committed.lock().unwrap();
        Ok((self.records.lock().unwrap().len() as u64).saturating_sub(committed))
    }
}

// ============================================================================
// SECTION: Harness
// ============================================================================

/// Runs the consumer over the records until the source drains.
async fn run_consumer(
    records: Vec<Value>,
    store: SharedStateStore,
    dead_letter: Arc<CapturingDeadLetterSink>,
) -> Arc<VecSource> {
    let source = VecSource::new(records.clone());
    let cache = Arc::new(HotCache::default());
    let aggregator = Arc::new(MasteryAggregator::new(store.clone(), cache));
    let consumer = Arc::new(EventConsumer::new(
        Arc::clone(&source) as Arc<dyn EventSource>,
        store,
        aggregator,
        dead_letter,
        Arc::new(NoopMetrics),
        ConsumerConfig::default(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = consumer.spawn(&shutdown_rx);

    let expected = records.len() as u64;
    for _ in 0..200 {
        if source.committed() >= expected {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    let _ = shutdown_tx.send(true);
    for handle in handles {
        let _ = handle.await;
    }
    source
}

/// Encodes a learning event for the wire.
fn encoded_event(key: &str, completion: f64) -> Value {
    let event = LearningEvent {
        idempotency_key: key.to_string(),
        snapshot: snapshot_for(STUDENT, completion, UnixMillis::now()),
    };
    serde_json::to_value(&event).unwrap()
}

/// Loads the stored aggregate for today's date.
fn stored_aggregate(store: &SharedStateStore) -> Option<MasteryAggregate> {
    let key = keys::mastery_key(&StudentId::new(STUDENT), UnixMillis::now().date());
    store
        .get(&key)
        .unwrap()
        .map(|versioned| serde_json::from_value(versioned.value).unwrap())
}

// ============================================================================
// SECTION: Idempotency
// ============================================================================

/// Delivering the same event three times applies it once and ACKs all
/// three deliveries without dead-lettering.
#[tokio::test(start_paused = true)]
async fn test_duplicate_event_applies_once() {
    let store = SharedStateStore::from_store(InMemoryStateStore::new());
    let dead_letter = CapturingDeadLetterSink::new();
    let key = "0123456789abcdef0123456789abcdef";
    let records = vec![
        encoded_event(key, 0.75),
        encoded_event(key, 0.75),
        encoded_event(key, 0.75),
    ];

    let source = run_consumer(records, store.clone(), Arc::clone(&dead_letter)).await;
    assert_eq!(source.committed(), 3);
    assert!(dead_letter.captured().is_empty());

    let aggregate = stored_aggregate(&store).unwrap();
    let record = aggregate.components.get(&ComponentName::Completion).unwrap();
    assert_eq!(record.sample_count, 1);
    assert!((record.value - 0.75).abs() < 1e-9);
    assert_eq!(aggregate.version, 1);

    // The deduplication marker is present under the processed key.
    assert!(store.get(&keys::processed_key(key)).unwrap().is_some());
}

/// Distinct events for the same component fold into the running mean.
#[tokio::test(start_paused = true)]
async fn test_distinct_events_fold_into_mean() {
    let store = SharedStateStore::from_store(InMemoryStateStore::new());
    let dead_letter = CapturingDeadLetterSink::new();
    let records = vec![
        encoded_event("11111111111111111111111111111111", 0.60),
        encoded_event("22222222222222222222222222222222", 0.80),
    ];

    run_consumer(records, store.clone(), dead_letter).await;

    let aggregate = stored_aggregate(&store).unwrap();
    let record = aggregate.components.get(&ComponentName::Completion).unwrap();
    assert_eq!(record.sample_count, 2);
    assert!((record.value - 0.70).abs() < 1e-9);
    assert_eq!(aggregate.version, 2);
}

// ============================================================================
// SECTION: Dead-Letter Routing
// ============================================================================

/// Events that fail validation divert with the violation list and the
/// consumer advances past them.
#[tokio::test(start_paused = true)]
async fn test_poison_event_is_dead_lettered_and_skipped() {
    let store = SharedStateStore::from_store(InMemoryStateStore::new());
    let dead_letter = CapturingDeadLetterSink::new();
    let records = vec![
        json!({ "not": "an event" }),
        encoded_event("33333333333333333333333333333333", 0.90),
    ];

    let source = run_consumer(records, store.clone(), Arc::clone(&dead_letter)).await;
    assert_eq!(source.committed(), 2);

    let captured = dead_letter.captured();
    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0].error_kind, "validation_error");
    assert_eq!(captured[0].original_payload, json!({ "not": "an event" }));

    // The healthy event behind the poison one still applied.
    let aggregate = stored_aggregate(&store).unwrap();
    assert_eq!(aggregate.components.get(&ComponentName::Completion).unwrap().sample_count, 1);
}

/// A malformed idempotency key is a validation failure, not a crash.
#[tokio::test(start_paused = true)]
async fn test_malformed_key_diverts_with_violations() {
    let store = SharedStateStore::from_store(InMemoryStateStore::new());
    let dead_letter = CapturingDeadLetterSink::new();
    let records = vec![encoded_event("not-hex", 0.5)];

    run_consumer(records, store.clone(), Arc::clone(&dead_letter)).await;

    let captured = dead_letter.captured();
    assert_eq!(captured.len(), 1);
    assert!(
        captured[0]
            .error_details
            .iter()
            .any(|violation| violation.contains("idempotency_key"))
    );
    assert!(stored_aggregate(&store).is_none());
}
