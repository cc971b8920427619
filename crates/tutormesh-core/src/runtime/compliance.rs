// tutormesh-core/src/runtime/compliance.rs
// ============================================================================
// Module: Tutormesh Compliance Service
// Description: Per-student export and erasure over the composite key space.
// Purpose: Serve data-subject requests with auditable summaries.
// Dependencies: crate::core, crate::interfaces, crate::runtime
// ============================================================================

//! ## Overview
//! Every record a student owns lives under the `student:{id}:` prefix, so
//! export and erasure are prefix scans. Export produces a document keyed by
//! store key; re-importing that document (test harnesses and migrations)
//! restores each record under its original retention class. Event-level
//! `processed:` markers are keyed by idempotency key, carry no student data,
//! and expire on their own seven-day horizon, so erasure leaves them alone.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::errors::PlaneError;
use crate::core::identifiers::StudentId;
use crate::core::identity::IdentityContext;
use crate::core::time::UnixMillis;
use crate::interfaces::StateStore;
use crate::runtime::cache::HotCache;
use crate::runtime::keys;
use crate::runtime::store::SharedStateStore;

// ============================================================================
// SECTION: Documents
// ============================================================================

/// Summary returned after an erasure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EraseSummary {
    /// Student whose records were erased.
    pub student_identity: StudentId,
    /// Number of records deleted.
    pub deleted_records: usize,
    /// Timestamp of the erasure.
    pub erased_at: UnixMillis,
}

/// Export document containing every record a student owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportDocument {
    /// Student the export covers.
    pub student_identity: StudentId,
    /// Timestamp of the export.
    pub exported_at: UnixMillis,
    /// Records keyed by their store key.
    pub records: BTreeMap<String, Value>,
}

// ============================================================================
// SECTION: Compliance Service
// ============================================================================

/// Per-student export and erasure service.
pub struct ComplianceService {
    /// Backing state store.
    store: SharedStateStore,
    /// Hot cache invalidated on erasure.
    cache: Arc<HotCache>,
}

impl ComplianceService {
    /// Creates a compliance service over the shared store and hot cache.
    #[must_use]
    pub const fn new(store: SharedStateStore, cache: Arc<HotCache>) -> Self {
        Self {
            store,
            cache,
        }
    }

    /// Exports every record a student owns.
    ///
    /// # Errors
    ///
    /// Returns [`PlaneError::Authorization`] unless the caller is an
    /// administrator or the subject themself, or [`PlaneError::Internal`] on
    /// store failure.
    pub fn export(
        &self,
        identity: &IdentityContext,
        subject: &StudentId,
        now: UnixMillis,
    ) -> Result<ExportDocument, PlaneError> {
        if !identity.may_export(subject) {
            return Err(PlaneError::Authorization);
        }
        let entries = self
            .store
            .scan_by_prefix(&keys::student_prefix(subject))
            .map_err(|error| PlaneError::internal(format!("export scan: {error}")))?;
        let records = entries.into_iter().map(|(key, versioned)| (key, versioned.value)).collect();
        Ok(ExportDocument {
            student_identity: subject.clone(),
            exported_at: now,
            records,
        })
    }

    /// Erases every record a student owns, returning a summary.
    ///
    /// # Errors
    ///
    /// Returns [`PlaneError::Authorization`] unless the caller is an
    /// administrator, or [`PlaneError::Internal`] on store failure.
    pub fn erase(
        &self,
        identity: &IdentityContext,
        subject: &StudentId,
        now: UnixMillis,
    ) -> Result<EraseSummary, PlaneError> {
        if !identity.may_erase() {
            return Err(PlaneError::Authorization);
        }
        let entries = self
            .store
            .scan_by_prefix(&keys::student_prefix(subject))
            .map_err(|error| PlaneError::internal(format!("erase scan: {error}")))?;
        let mut deleted_records = 0_usize;
        for (key, _) in entries {
            self.cache.invalidate(&key);
            if self
                .store
                .delete(&key)
                .map_err(|error| PlaneError::internal(format!("erase delete: {error}")))?
            {
                deleted_records += 1;
            }
        }
        Ok(EraseSummary {
            student_identity: subject.clone(),
            deleted_records,
            erased_at: now,
        })
    }

    /// Re-imports an export document, restoring each record under its
    /// original retention class. Used by test harnesses and migrations.
    ///
    /// # Errors
    ///
    /// Returns [`PlaneError::Internal`] on store failure.
    pub fn import(&self, document: &ExportDocument) -> Result<usize, PlaneError> {
        let mut restored = 0_usize;
        for (key, value) in &document.records {
            self.cache.invalidate(key);
            self.store
                .put(key, value, keys::ttl_for_key(key))
                .map_err(|error| PlaneError::internal(format!("import put: {error}")))?;
            restored += 1;
        }
        Ok(restored)
    }
}
