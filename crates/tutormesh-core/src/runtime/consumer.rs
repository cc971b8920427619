// tutormesh-core/src/runtime/consumer.rs
// ============================================================================
// Module: Tutormesh Event Consumer
// Description: Partitioned, idempotent consumer of learning-progress events.
// Purpose: Apply events exactly once with offset discipline and dead-letters.
// Dependencies: crate::core, crate::interfaces, crate::runtime, tokio
// ============================================================================

//! ## Overview
//! The consumer runs one worker task per partition; all events for a student
//! land on one partition, so per-student application is serialized while
//! distinct partitions progress in parallel. Each event is validated,
//! deduplicated against its idempotency marker, applied through the
//! aggregator, and only then committed. Poison events (validation failures,
//! or three consecutive processing errors) are diverted to the dead-letter
//! sink with full context and the consumer advances. The commit-after-apply
//! discipline provides natural backpressure when store latency rises.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::core::errors::PlaneError;
use crate::core::progress::LearningEvent;
use crate::core::time::UnixMillis;
use crate::core::validate::validate_event;
use crate::interfaces::DeadLetterEntry;
use crate::interfaces::DeadLetterSink;
use crate::interfaces::EventSource;
use crate::interfaces::MetricsSink;
use crate::interfaces::StateStore;
use crate::runtime::aggregator::MasteryAggregator;
use crate::runtime::keys;
use crate::runtime::store::SharedStateStore;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Consumer tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerConfig {
    /// Maximum events pulled per poll; also caps in-flight events per
    /// partition since application is serial.
    pub batch_size: usize,
    /// Idle delay between polls of an empty partition.
    pub poll_interval: Duration,
    /// Consecutive processing attempts before an event is dead-lettered.
    pub max_event_attempts: u32,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            poll_interval: Duration::from_millis(200),
            max_event_attempts: 3,
        }
    }
}

/// Delay between processing attempts for the same event.
const RETRY_DELAY: Duration = Duration::from_millis(50);

// ============================================================================
// SECTION: Idempotency Marker
// ============================================================================

/// Marker stored per processed event idempotency key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedMarker {
    /// Timestamp the event was applied.
    pub processed_at: UnixMillis,
    /// Short application summary for operator inspection.
    pub result_summary: String,
}

// ============================================================================
// SECTION: Consumer
// ============================================================================

/// Signal that the current offset must be held and the event re-polled.
#[derive(Debug)]
struct HoldOffset;

/// Partitioned learning-events consumer.
pub struct EventConsumer {
    /// Consumer-side view of the event log.
    source: Arc<dyn EventSource>,
    /// Backing state store for idempotency markers.
    store: SharedStateStore,
    /// Aggregator applying snapshots.
    aggregator: Arc<MasteryAggregator>,
    /// Dead-letter sink for poison events.
    dead_letter: Arc<dyn DeadLetterSink>,
    /// Metrics sink for lag and dead-letter counters.
    metrics: Arc<dyn MetricsSink>,
    /// Tuning knobs.
    config: ConsumerConfig,
}

impl EventConsumer {
    /// Creates a consumer over the provided seams.
    #[must_use]
    pub fn new(
        source: Arc<dyn EventSource>,
        store: SharedStateStore,
        aggregator: Arc<MasteryAggregator>,
        dead_letter: Arc<dyn DeadLetterSink>,
        metrics: Arc<dyn MetricsSink>,
        config: ConsumerConfig,
    ) -> Self {
        Self {
            source,
            store,
            aggregator,
            dead_letter,
            metrics,
            config,
        }
    }

    /// Spawns one worker task per partition. Workers drain until the
    /// shutdown signal flips.
    #[must_use]
    pub fn spawn(self: &Arc<Self>, shutdown: &watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        (0..self.source.partitions())
            .map(|partition| {
                let consumer = Arc::clone(self);
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    consumer.run_partition(partition, shutdown).await;
                })
            })
            .collect()
    }

    /// Drives one partition until shutdown.
    async fn run_partition(&self, partition: u32, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }
            let batch = match self.source.poll(partition, self.config.batch_size).await {
                Ok(batch) => batch,
                Err(error) => {
                    tracing::warn!(partition, %error, "event poll failed");
                    self.idle(&mut shutdown).await;
                    continue;
                }
            };
            if batch.events.is_empty() {
                self.publish_lag(partition);
                self.idle(&mut shutdown).await;
                continue;
            }

            let mut offset = batch.base_offset;
            for raw in &batch.events {
                offset += 1;
                if self.handle_event(raw).await.is_err() {
                    // Dead-letter routing itself failed: hold the offset and
                    // re-poll this event later.
                    self.idle(&mut shutdown).await;
                    break;
                }
                if let Err(error) = self.source.commit(partition, offset) {
                    tracing::warn!(partition, offset, %error, "offset commit failed");
                    self.idle(&mut shutdown).await;
                    break;
                }
            }
            self.publish_lag(partition);
        }
    }

    /// Sleeps for the poll interval or until shutdown flips.
    async fn idle(&self, shutdown: &mut watch::Receiver<bool>) {
        tokio::select! {
            _ = shutdown.changed() => {}
            () = tokio::time::sleep(self.config.poll_interval) => {}
        }
    }

    /// Publishes the current lag gauge for a partition.
    fn publish_lag(&self, partition: u32) {
        if let Ok(lag) = self.source.lag(partition) {
            self.metrics.set_consumer_lag(partition, lag);
        }
    }

    /// Processes one raw event payload to completion: applied, deduplicated,
    /// or dead-lettered.
    async fn handle_event(&self, raw: &Value) -> Result<(), HoldOffset> {
        let now = UnixMillis::now();
        let event: LearningEvent = match serde_json::from_value(raw.clone()) {
            Ok(event) => event,
            Err(error) => {
                return self.divert(raw, "validation_error", vec![error.to_string()], now, 1);
            }
        };

        let report = validate_event(&event, now);
        if !report.is_ok() {
            return self.divert(raw, "validation_error", report.errors, now, 1);
        }

        let marker_key = keys::processed_key(&event.idempotency_key);
        match self.store.get(&marker_key) {
            Ok(Some(_)) => return Ok(()),
            Ok(None) => {}
            Err(error) => {
                tracing::warn!(%error, "idempotency lookup failed");
                return Err(HoldOffset);
            }
        }

        let mut last_error = String::new();
        for attempt in 1..=self.config.max_event_attempts {
            match self.aggregator.apply_snapshot(&event.snapshot, now, &event.idempotency_key) {
                Ok(aggregate) => {
                    let marker = ProcessedMarker {
                        processed_at: now,
                        result_summary: format!(
                            "applied to {} v{}",
                            aggregate.date, aggregate.version
                        ),
                    };
                    return self.write_marker(&marker_key, &marker);
                }
                Err(error) => {
                    last_error = error.to_string();
                    tracing::warn!(
                        attempt,
                        idempotency_key = %event.idempotency_key,
                        %error,
                        "event application failed"
                    );
                    if attempt < self.config.max_event_attempts {
                        tokio::time::sleep(RETRY_DELAY).await;
                    }
                }
            }
        }

        self.divert(
            raw,
            PlaneError::internal("event application").code(),
            vec![last_error],
            now,
            self.config.max_event_attempts,
        )
    }

    /// Writes the idempotency marker ahead of the offset commit.
    fn write_marker(&self, marker_key: &str, marker: &ProcessedMarker) -> Result<(), HoldOffset> {
        let payload = serde_json::to_value(marker).map_err(|_| HoldOffset)?;
        match self.store.put(marker_key, &payload, Some(keys::TTL_PROCESSED_MARKER)) {
            Ok(_) => Ok(()),
            Err(error) => {
                tracing::warn!(%error, "idempotency marker write failed");
                Err(HoldOffset)
            }
        }
    }

    /// Routes a poison event to the dead-letter sink.
    fn divert(
        &self,
        raw: &Value,
        error_kind: &str,
        error_details: Vec<String>,
        now: UnixMillis,
        attempts: u32,
    ) -> Result<(), HoldOffset> {
        let entry = DeadLetterEntry {
            original_payload: raw.clone(),
            error_kind: error_kind.to_string(),
            error_details,
            first_failure_timestamp: now,
            attempts,
        };
        match self.dead_letter.divert(&entry) {
            Ok(()) => {
                self.metrics.incr_dead_letter();
                Ok(())
            }
            Err(error) => {
                tracing::warn!(%error, "dead-letter divert failed");
                Err(HoldOffset)
            }
        }
    }
}
