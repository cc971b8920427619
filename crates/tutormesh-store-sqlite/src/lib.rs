// tutormesh-store-sqlite/src/lib.rs
// ============================================================================
// Module: Tutormesh SQLite Store Library
// Description: Durable composite-key state store backed by SQLite.
// Purpose: Persist mastery records with TTL and optimistic versioning.
// Dependencies: tutormesh-core, rusqlite
// ============================================================================

//! ## Overview
//! Durable [`tutormesh_core::StateStore`] implementation over `SQLite` WAL,
//! with per-key version counters for compare-and-swap, lazy TTL expiry, and
//! ordered prefix scans for history, export, and erasure.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::SqliteStateStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
