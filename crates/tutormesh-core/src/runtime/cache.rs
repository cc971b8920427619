// tutormesh-core/src/runtime/cache.rs
// ============================================================================
// Module: Tutormesh Hot Cache
// Description: Short-TTL read cache with single-flight fetch deduplication.
// Purpose: Front the state store for current-mastery reads.
// Dependencies: crate::interfaces, tokio
// ============================================================================

//! ## Overview
//! The hot cache fronts the state store for current-mastery keys with a
//! 30-second TTL. Writers invalidate the matching entry before the store
//! write is acknowledged upward, so a read that races a write never revives
//! a stale value past the write acknowledgment. Identical concurrent fetches
//! collapse onto one loader call via per-key single-flight locks; independent
//! keys proceed without contention.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

use crate::interfaces::StoreError;
use crate::interfaces::VersionedValue;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default entry TTL.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30);
/// Entry-count bound before expired entries are evicted.
const MAX_ENTRIES: usize = 16_384;

// ============================================================================
// SECTION: Hot Cache
// ============================================================================

/// Cached value with its insertion instant.
#[derive(Debug, Clone)]
struct CacheEntry {
    /// Cached store read (`None` caches key absence).
    value: Option<VersionedValue>,
    /// Instant the entry was inserted.
    inserted_at: Instant,
}

/// Thread-safe read cache with single-flight deduplication.
pub struct HotCache {
    /// Entry TTL.
    ttl: Duration,
    /// Cached entries.
    entries: Mutex<HashMap<String, CacheEntry>>,
    /// Per-key single-flight locks.
    flights: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Default for HotCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

impl HotCache {
    /// Creates a cache with the provided entry TTL.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
            flights: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached value for a key when fresh.
    fn fresh_entry(&self, key: &str) -> Option<Option<VersionedValue>> {
        let entries = self.entries.lock().ok()?;
        let entry = entries.get(key)?;
        (entry.inserted_at.elapsed() < self.ttl).then(|| entry.value.clone())
    }

    /// Inserts a loaded value, evicting expired entries past the size bound.
    fn insert(&self, key: &str, value: Option<VersionedValue>) {
        if let Ok(mut entries) = self.entries.lock() {
            if entries.len() >= MAX_ENTRIES {
                let ttl = self.ttl;
                entries.retain(|_, entry| entry.inserted_at.elapsed() < ttl);
            }
            entries.insert(
                key.to_string(),
                CacheEntry {
                    value,
                    inserted_at: Instant::now(),
                },
            );
        }
    }

    /// Removes the cached entry for a key. Called by writers before the store
    /// write is acknowledged upward.
    pub fn invalidate(&self, key: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(key);
        }
    }

    /// Returns the per-key single-flight lock, creating it when first seen.
    fn flight_for(&self, key: &str) -> Option<Arc<tokio::sync::Mutex<()>>> {
        let mut flights = self.flights.lock().ok()?;
        Some(Arc::clone(
            flights.entry(key.to_string()).or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        ))
    }

    /// Reads through the cache, deduplicating concurrent loads of the same
    /// key onto one `loader` call.
    ///
    /// # Errors
    ///
    /// Propagates [`StoreError`] from the loader.
    pub async fn fetch<F>(
        &self,
        key: &str,
        loader: F,
    ) -> Result<Option<VersionedValue>, StoreError>
    where
        F: FnOnce() -> Result<Option<VersionedValue>, StoreError>,
    {
        if let Some(cached) = self.fresh_entry(key) {
            return Ok(cached);
        }
        let Some(flight) = self.flight_for(key) else {
            return loader();
        };
        let _guard = flight.lock().await;
        // A concurrent flight may have populated the entry while waiting.
        if let Some(cached) = self.fresh_entry(key) {
            return Ok(cached);
        }
        let loaded = loader()?;
        self.insert(key, loaded.clone());
        Ok(loaded)
    }
}
