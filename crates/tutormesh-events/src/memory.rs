// tutormesh-events/src/memory.rs
// ============================================================================
// Module: Tutormesh In-Memory Event Log
// Description: Partitioned in-process event log for tests and local runs.
// Purpose: Provide publish/subscribe semantics without external brokers.
// Dependencies: tutormesh-core, serde_json
// ============================================================================

//! ## Overview
//! The in-memory log models topics as vectors of partitions, each an ordered
//! record list with a committed consumer offset. Publishes partition by key
//! hash; polls resume from the committed offset, so the consumer's
//! commit-after-apply discipline behaves exactly as against an external log.
//! Invariants:
//! - Records within one partition are returned in publish order.
//! - Lag is the distance between the partition head and the committed offset.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use async_trait::async_trait;
use serde_json::Value;
use tutormesh_core::EventBatch;
use tutormesh_core::EventLogError;
use tutormesh_core::EventPublisher;
use tutormesh_core::EventSource;

use crate::topics::partition_for;

// ============================================================================
// SECTION: Log State
// ============================================================================

/// One partition's records and committed offset.
#[derive(Debug, Default)]
struct PartitionState {
    /// Records in publish order.
    records: Vec<Value>,
    /// Committed consumer offset.
    committed: u64,
}

/// One topic's partitions.
#[derive(Debug)]
struct TopicState {
    /// Partition states.
    partitions: Vec<PartitionState>,
}

impl TopicState {
    /// Creates a topic with the given partition count.
    fn new(partitions: u32) -> Self {
        Self {
            partitions: (0..partitions).map(|_| PartitionState::default()).collect(),
        }
    }
}

// ============================================================================
// SECTION: In-Memory Log
// ============================================================================

/// In-process partitioned event log.
pub struct InMemoryEventLog {
    /// Partition count applied to every topic.
    partitions: u32,
    /// Topic states keyed by topic name.
    topics: Mutex<HashMap<String, TopicState>>,
}

impl InMemoryEventLog {
    /// Creates a log with the given partition count per topic.
    #[must_use]
    pub fn new(partitions: u32) -> Self {
        Self {
            partitions: partitions.max(1),
            topics: Mutex::new(HashMap::new()),
        }
    }

    /// Locks the topic map.
    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, TopicState>>, EventLogError> {
        self.topics
            .lock()
            .map_err(|_| EventLogError::Log("event log mutex poisoned".to_string()))
    }

    /// Returns all records currently held by a topic, across partitions.
    ///
    /// # Errors
    ///
    /// Returns [`EventLogError`] when the log state is unavailable.
    pub fn topic_records(&self, topic: &str) -> Result<Vec<Value>, EventLogError> {
        let mut topics = self.lock()?;
        let state = topics.entry(topic.to_string()).or_insert_with(|| TopicState::new(self.partitions));
        Ok(state.partitions.iter().flat_map(|partition| partition.records.clone()).collect())
    }

    /// Builds a consumer-side source over one topic of this log.
    #[must_use]
    pub fn source(self: &Arc<Self>, topic: impl Into<String>) -> TopicSource {
        TopicSource {
            log: Arc::clone(self),
            topic: topic.into(),
        }
    }
}

impl EventPublisher for InMemoryEventLog {
    fn publish(&self, topic: &str, key: &str, payload: &Value) -> Result<(), EventLogError> {
        let partition = partition_for(key, self.partitions);
        let mut topics = self.lock()?;
        let state =
            topics.entry(topic.to_string()).or_insert_with(|| TopicState::new(self.partitions));
        let slot = state
            .partitions
            .get_mut(partition as usize)
            .ok_or(EventLogError::UnknownPartition(partition))?;
        slot.records.push(payload.clone());
        Ok(())
    }

    fn probe(&self) -> Result<(), EventLogError> {
        self.lock().map(|_| ())
    }
}

// ============================================================================
// SECTION: Topic Source
// ============================================================================

/// Consumer-side source over one topic of the in-memory log.
pub struct TopicSource {
    /// Backing log.
    log: Arc<InMemoryEventLog>,
    /// Topic consumed by this source.
    topic: String,
}

impl TopicSource {
    /// Reads a partition state, creating the topic lazily.
    fn with_partition<T>(
        &self,
        partition: u32,
        read: impl FnOnce(&mut PartitionState) -> T,
    ) -> Result<T, EventLogError> {
        let mut topics = self.log.lock()?;
        let state = topics
            .entry(self.topic.clone())
            .or_insert_with(|| TopicState::new(self.log.partitions));
        state
            .partitions
            .get_mut(partition as usize)
            .map(read)
            .ok_or(EventLogError::UnknownPartition(partition))
    }
}

#[async_trait]
impl EventSource for TopicSource {
    fn partitions(&self) -> u32 {
        self.log.partitions
    }

    async fn poll(&self, partition: u32, max: usize) -> Result<EventBatch, EventLogError> {
        self.with_partition(partition, |state| {
            let from = usize::try_from(state.committed).unwrap_or(usize::MAX);
            let events: Vec<Value> =
                state.records.iter().skip(from).take(max).cloned().collect();
            EventBatch {
                partition,
                base_offset: state.committed,
                events,
            }
        })
    }

    fn commit(&self, partition: u32, offset: u64) -> Result<(), EventLogError> {
        self.with_partition(partition, |state| {
            state.committed = state.committed.max(offset);
        })
    }

    fn lag(&self, partition: u32) -> Result<u64, EventLogError> {
        self.with_partition(partition, |state| {
            (state.records.len() as u64).saturating_sub(state.committed)
        })
    }
}
