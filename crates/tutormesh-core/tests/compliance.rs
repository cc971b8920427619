// tutormesh-core/tests/compliance.rs
// ============================================================================
// Module: Compliance Tests
// Description: Tests for export, erasure, and re-import round trips.
// ============================================================================
//! ## Overview
//! Validates access rules for the compliance surface, erasure summaries, and
//! the export→import round trip reproducing query responses.

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

use common::STUDENT;
use common::snapshot_for;
use tutormesh_core::ComplianceService;
use tutormesh_core::HotCache;
use tutormesh_core::IdentityContext;
use tutormesh_core::InMemoryStateStore;
use tutormesh_core::MasteryAggregator;
use tutormesh_core::PlaneError;
use tutormesh_core::QueryService;
use tutormesh_core::Role;
use tutormesh_core::StateStore;
use tutormesh_core::StudentId;
use tutormesh_core::UnixMillis;
use tutormesh_core::runtime::SharedStateStore;
use tutormesh_core::runtime::keys;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Store with one applied snapshot for the subject student.
fn seeded_stack() -> (SharedStateStore, ComplianceService, Arc<QueryService>) {
    let store = SharedStateStore::from_store(InMemoryStateStore::new());
    let cache = Arc::new(HotCache::default());
    let aggregator = MasteryAggregator::new(store.clone(), Arc::clone(&cache));
    let now = UnixMillis::now();
    aggregator.apply_snapshot(&snapshot_for(STUDENT, 0.75, now), now, "seed").unwrap();

    let compliance = ComplianceService::new(store.clone(), Arc::clone(&cache));
    let query = Arc::new(QueryService::new(store.clone(), cache));
    (store, compliance, query)
}

/// Administrator identity.
fn admin() -> IdentityContext {
    IdentityContext::new(StudentId::new("admin-1"), Role::Admin)
}

/// The subject student reading their own data.
fn subject_identity() -> IdentityContext {
    IdentityContext::new(StudentId::new(STUDENT), Role::Student)
}

// ============================================================================
// SECTION: Access Rules
// ============================================================================

/// Erasure is administrator-only.
#[tokio::test(start_paused = true)]
async fn test_erase_requires_admin() {
    let (_store, compliance, _query) = seeded_stack();
    let error = compliance
        .erase(&subject_identity(), &StudentId::new(STUDENT), UnixMillis::now())
        .unwrap_err();
    assert!(matches!(error, PlaneError::Authorization));

    let teacher = IdentityContext::new(StudentId::new("teacher-1"), Role::Teacher);
    assert!(compliance.erase(&teacher, &StudentId::new(STUDENT), UnixMillis::now()).is_err());
}

/// Export is allowed for administrators and for the subject themself.
#[tokio::test(start_paused = true)]
async fn test_export_access() {
    let (_store, compliance, _query) = seeded_stack();
    let subject = StudentId::new(STUDENT);

    assert!(compliance.export(&admin(), &subject, UnixMillis::now()).is_ok());
    assert!(compliance.export(&subject_identity(), &subject, UnixMillis::now()).is_ok());

    let other = IdentityContext::new(
        StudentId::new("student_bbbbbbbb-bbbb-bbbb-bbbb-bbbbbbbbbbbb"),
        Role::Student,
    );
    assert!(compliance.export(&other, &subject, UnixMillis::now()).is_err());
}

// ============================================================================
// SECTION: Erasure
// ============================================================================

/// Erasure removes every record the student owns and reports the count.
#[tokio::test(start_paused = true)]
async fn test_erase_removes_all_student_records() {
    let (store, compliance, _query) = seeded_stack();
    let subject = StudentId::new(STUDENT);
    let before = store.scan_by_prefix(&keys::student_prefix(&subject)).unwrap();
    assert!(!before.is_empty());

    let summary = compliance.erase(&admin(), &subject, UnixMillis::now()).unwrap();
    assert_eq!(summary.deleted_records, before.len());

    let after = store.scan_by_prefix(&keys::student_prefix(&subject)).unwrap();
    assert!(after.is_empty());
}

// ============================================================================
// SECTION: Round Trip
// ============================================================================

/// Export followed by erasure and re-import reproduces the same query
/// response.
#[tokio::test(start_paused = true)]
async fn test_export_import_round_trip() {
    let (_store, compliance, query) = seeded_stack();
    let subject = StudentId::new(STUDENT);
    let now = UnixMillis::now();

    let original = query.current_mastery(&subject_identity(), &subject, now).await.unwrap();
    let document = compliance.export(&admin(), &subject, now).unwrap();
    assert!(!document.records.is_empty());

    compliance.erase(&admin(), &subject, now).unwrap();
    let restored_count = compliance.import(&document).unwrap();
    assert_eq!(restored_count, document.records.len());

    let restored = query.current_mastery(&subject_identity(), &subject, now).await.unwrap();
    assert_eq!(restored.final_score, original.final_score);
    assert_eq!(restored.components, original.components);
    assert_eq!(restored.version, original.version);
}
