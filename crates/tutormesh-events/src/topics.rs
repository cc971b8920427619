// tutormesh-events/src/topics.rs
// ============================================================================
// Module: Tutormesh Topics
// Description: Topic names, retention horizons, and key partitioning.
// Purpose: Keep the event-log surface contract in one place.
// Dependencies: sha2
// ============================================================================

//! ## Overview
//! Three topics carry the control plane's event traffic: learning events
//! partitioned by student identity, triage audits, and dead letters. The
//! partition function hashes the message key so all events for one student
//! serialize onto one partition while distinct students spread across the
//! log.

// ============================================================================
// SECTION: Imports
// ============================================================================

use sha2::Digest;
use sha2::Sha256;

// ============================================================================
// SECTION: Topic Names
// ============================================================================

/// Learning-progress events, partitioned by student identity hash.
pub const TOPIC_LEARNING_EVENTS: &str = "learning.events";
/// Triage audit records, one per decision.
pub const TOPIC_AUDITS: &str = "learning.audits";
/// Undeliverable payloads with failure context.
pub const TOPIC_DEADLETTER: &str = "learning.deadletter";

/// Retention for the learning-events topic in days.
pub const LEARNING_EVENTS_RETENTION_DAYS: u32 = 7;
/// Retention for the dead-letter topic in days.
pub const DEADLETTER_RETENTION_DAYS: u32 = 30;
/// Minimum recommended audit retention in days; the exact horizon is an
/// operator deployment choice.
pub const MIN_AUDIT_RETENTION_DAYS: u32 = 30;
/// Replication factor declared for the learning-events topic.
pub const REPLICATION_FACTOR: u32 = 3;

// ============================================================================
// SECTION: Partitioning
// ============================================================================

/// Maps a message key onto a partition index.
#[must_use]
pub fn partition_for(key: &str, partitions: u32) -> u32 {
    if partitions == 0 {
        return 0;
    }
    let digest = Sha256::digest(key.as_bytes());
    let mut prefix = [0_u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let hashed = u64::from_be_bytes(prefix);
    u32::try_from(hashed % u64::from(partitions)).unwrap_or(0)
}
