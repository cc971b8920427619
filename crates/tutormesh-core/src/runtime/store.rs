// tutormesh-core/src/runtime/store.rs
// ============================================================================
// Module: Tutormesh In-Memory Store
// Description: In-memory state store with TTL and CAS for tests and demos.
// Purpose: Provide a deterministic store implementation without external deps.
// Dependencies: crate::interfaces, serde_json, tokio
// ============================================================================

//! ## Overview
//! This module provides an in-memory implementation of [`StateStore`] with
//! full TTL and compare-and-swap semantics, plus the shared wrapper used to
//! pass one store through the dependency graph. Expiry uses the tokio clock
//! so paused-time tests can drive TTL behavior deterministically. It is not
//! intended for production use.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use crate::interfaces::CasOutcome;
use crate::interfaces::StateStore;
use crate::interfaces::StoreError;
use crate::interfaces::VersionedValue;

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// Stored entry with version and optional expiry.
#[derive(Debug, Clone)]
struct StoredEntry {
    /// Stored JSON value.
    value: Value,
    /// Per-key write version.
    version: u64,
    /// Expiry instant, `None` for unbounded retention.
    expires_at: Option<Instant>,
}

impl StoredEntry {
    /// Returns true when the entry has expired.
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-memory state store for tests and local runs.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStateStore {
    /// Entry map protected by a mutex; `BTreeMap` gives ordered prefix scans.
    entries: Arc<Mutex<BTreeMap<String, StoredEntry>>>,
}

impl InMemoryStateStore {
    /// Creates an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the entry map.
    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, StoredEntry>>, StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Store("state store mutex poisoned".to_string()))
    }

    /// Reads a live entry, pruning it when expired.
    fn live_entry(
        entries: &mut BTreeMap<String, StoredEntry>,
        key: &str,
        now: Instant,
    ) -> Option<StoredEntry> {
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                None
            }
            Some(entry) => Some(entry.clone()),
            None => None,
        }
    }
}

impl StateStore for InMemoryStateStore {
    fn get(&self, key: &str) -> Result<Option<VersionedValue>, StoreError> {
        let mut entries = self.lock()?;
        let now = Instant::now();
        Ok(Self::live_entry(&mut entries, key, now).map(|entry| VersionedValue {
            value: entry.value,
            version: entry.version,
        }))
    }

    fn put(&self, key: &str, value: &Value, ttl: Option<Duration>) -> Result<u64, StoreError> {
        let mut entries = self.lock()?;
        let now = Instant::now();
        let version =
            Self::live_entry(&mut entries, key, now).map_or(1, |entry| entry.version + 1);
        entries.insert(
            key.to_string(),
            StoredEntry {
                value: value.clone(),
                version,
                expires_at: ttl.map(|ttl| now + ttl),
            },
        );
        Ok(version)
    }

    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<u64>,
        value: &Value,
        ttl: Option<Duration>,
    ) -> Result<CasOutcome, StoreError> {
        let mut entries = self.lock()?;
        let now = Instant::now();
        let found = Self::live_entry(&mut entries, key, now).map(|entry| entry.version);
        if found != expected {
            return Ok(CasOutcome::Conflict {
                found,
            });
        }
        let version = found.map_or(1, |current| current + 1);
        entries.insert(
            key.to_string(),
            StoredEntry {
                value: value.clone(),
                version,
                expires_at: ttl.map(|ttl| now + ttl),
            },
        );
        Ok(CasOutcome::Stored {
            version,
        })
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut entries = self.lock()?;
        let now = Instant::now();
        let live = Self::live_entry(&mut entries, key, now).is_some();
        entries.remove(key);
        Ok(live)
    }

    fn multi_get(&self, keys: &[String]) -> Result<Vec<Option<VersionedValue>>, StoreError> {
        keys.iter().map(|key| self.get(key)).collect()
    }

    fn scan_by_prefix(&self, prefix: &str) -> Result<Vec<(String, VersionedValue)>, StoreError> {
        let mut entries = self.lock()?;
        let now = Instant::now();
        let range: Vec<String> = entries
            .range::<String, _>((Bound::Included(prefix.to_string()), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect();
        let mut live = Vec::with_capacity(range.len());
        for key in range {
            if let Some(entry) = Self::live_entry(&mut entries, &key, now) {
                live.push((
                    key,
                    VersionedValue {
                        value: entry.value,
                        version: entry.version,
                    },
                ));
            }
        }
        Ok(live)
    }
}

// ============================================================================
// SECTION: Shared Store Wrapper
// ============================================================================

/// Shared state store backed by an `Arc` trait object.
#[derive(Clone)]
pub struct SharedStateStore {
    /// Inner store implementation.
    inner: Arc<dyn StateStore>,
}

impl SharedStateStore {
    /// Wraps a state store in a shared, clonable wrapper.
    #[must_use]
    pub fn from_store(store: impl StateStore + 'static) -> Self {
        Self {
            inner: Arc::new(store),
        }
    }

    /// Wraps an existing shared store.
    #[must_use]
    pub const fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            inner: store,
        }
    }
}

impl StateStore for SharedStateStore {
    fn get(&self, key: &str) -> Result<Option<VersionedValue>, StoreError> {
        self.inner.get(key)
    }

    fn put(&self, key: &str, value: &Value, ttl: Option<Duration>) -> Result<u64, StoreError> {
        self.inner.put(key, value, ttl)
    }

    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<u64>,
        value: &Value,
        ttl: Option<Duration>,
    ) -> Result<CasOutcome, StoreError> {
        self.inner.compare_and_swap(key, expected, value, ttl)
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.delete(key)
    }

    fn multi_get(&self, keys: &[String]) -> Result<Vec<Option<VersionedValue>>, StoreError> {
        self.inner.multi_get(keys)
    }

    fn scan_by_prefix(&self, prefix: &str) -> Result<Vec<(String, VersionedValue)>, StoreError> {
        self.inner.scan_by_prefix(prefix)
    }

    fn probe(&self) -> Result<(), StoreError> {
        self.inner.probe()
    }
}
