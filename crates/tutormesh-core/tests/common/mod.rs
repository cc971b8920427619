// tutormesh-core/tests/common/mod.rs
// ============================================================================
// Module: Core Test Support
// Description: Scripted invoker, capturing sinks, and fixture builders.
// ============================================================================
//! ## Overview
//! Shared doubles for the core integration tests: an invoker that replays a
//! scripted outcome list, sinks that capture audits and dead letters, and
//! snapshot fixtures.

#![allow(
    dead_code,
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only helpers; not every test uses every double."
)]

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use serde_json::json;
use tutormesh_core::AgentId;
use tutormesh_core::AgentInvoker;
use tutormesh_core::AgentSource;
use tutormesh_core::AuditSink;
use tutormesh_core::DeadLetterEntry;
use tutormesh_core::DeadLetterError;
use tutormesh_core::DeadLetterSink;
use tutormesh_core::ExerciseId;
use tutormesh_core::InvokeError;
use tutormesh_core::ProgressSnapshot;
use tutormesh_core::StudentId;
use tutormesh_core::TriageAudit;
use tutormesh_core::TriageRequest;
use tutormesh_core::UnixMillis;

// ============================================================================
// SECTION: Scripted Invoker
// ============================================================================

/// One scripted invocation outcome.
pub enum ScriptedOutcome {
    /// Answer with the canned payload.
    Ok(Value),
    /// Fail with a transient error.
    Transient,
    /// Fail with a permanent error.
    Permanent,
    /// Sleep past any per-attempt deadline.
    Hang,
}

/// Invoker that replays a scripted outcome list and counts attempts.
pub struct ScriptedInvoker {
    /// Remaining outcomes, consumed front-first.
    script: Mutex<Vec<ScriptedOutcome>>,
    /// Attempts observed.
    pub attempts: AtomicU32,
}

impl ScriptedInvoker {
    /// Creates an invoker over the given script. Once the script is
    /// exhausted every further attempt succeeds with an empty object.
    pub fn new(script: Vec<ScriptedOutcome>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script),
            attempts: AtomicU32::new(0),
        })
    }

    /// Returns the number of attempts observed.
    pub fn attempt_count(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentInvoker for ScriptedInvoker {
    async fn invoke(
        &self,
        _target: &AgentId,
        _method: &str,
        _body: &Value,
        deadline: Duration,
    ) -> Result<Value, InvokeError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let next = {
            let mut script = self.script.lock().unwrap();
            if script.is_empty() { None } else { Some(script.remove(0)) }
        };
        match next {
            Some(ScriptedOutcome::Ok(value)) => Ok(value),
            Some(ScriptedOutcome::Transient) => {
                Err(InvokeError::Transient("scripted failure".to_string()))
            }
            Some(ScriptedOutcome::Permanent) => {
                Err(InvokeError::Permanent("scripted rejection".to_string()))
            }
            Some(ScriptedOutcome::Hang) => {
                tokio::time::sleep(deadline.saturating_mul(4)).await;
                Ok(json!({}))
            }
            None => Ok(json!({})),
        }
    }

    async fn probe(&self, _deadline: Duration) -> Result<(), InvokeError> {
        Ok(())
    }
}

// ============================================================================
// SECTION: Capturing Sinks
// ============================================================================

/// Audit sink capturing records in memory.
#[derive(Default)]
pub struct CapturingAuditSink {
    /// Recorded audits.
    pub audits: Mutex<Vec<TriageAudit>>,
}

impl CapturingAuditSink {
    /// Creates an empty capturing sink.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns a snapshot of the recorded audits.
    pub fn recorded(&self) -> Vec<TriageAudit> {
        self.audits.lock().unwrap().clone()
    }
}

impl AuditSink for CapturingAuditSink {
    fn record(&self, audit: &TriageAudit) {
        self.audits.lock().unwrap().push(audit.clone());
    }
}

/// Dead-letter sink capturing entries in memory.
#[derive(Default)]
pub struct CapturingDeadLetterSink {
    /// Captured entries.
    pub entries: Mutex<Vec<DeadLetterEntry>>,
}

impl CapturingDeadLetterSink {
    /// Creates an empty capturing sink.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns a snapshot of the captured entries.
    pub fn captured(&self) -> Vec<DeadLetterEntry> {
        self.entries.lock().unwrap().clone()
    }
}

impl DeadLetterSink for CapturingDeadLetterSink {
    fn divert(&self, entry: &DeadLetterEntry) -> Result<(), DeadLetterError> {
        self.entries.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Canonical test student.
pub const STUDENT: &str = "student_aaaaaaaa-aaaa-aaaa-aaaa-aaaaaaaaaaaa";

/// Snapshot fixture for the given student with one completion score.
pub fn snapshot_for(student: &str, completion: f64, at: UnixMillis) -> ProgressSnapshot {
    ProgressSnapshot {
        student_identity: StudentId::new(student),
        exercise_identifier: ExerciseId::new("ex_recursion-01"),
        completion_score: Some(completion),
        quiz_score: None,
        quality_score: None,
        consistency_score: None,
        server_timestamp: at,
        agent_source: AgentSource::Exercise,
    }
}

/// Triage request fixture for the given student and query.
pub fn triage_request(student: &str, query: &str) -> TriageRequest {
    let now = UnixMillis::now();
    TriageRequest {
        query: query.to_string(),
        student_identity: StudentId::new(student),
        progress_snapshot: ProgressSnapshot {
            student_identity: StudentId::new(student),
            exercise_identifier: ExerciseId::new("ex_recursion-01"),
            completion_score: Some(0.75),
            quiz_score: Some(0.80),
            quality_score: Some(0.90),
            consistency_score: Some(0.85),
            server_timestamp: now,
            agent_source: AgentSource::Exercise,
        },
        conversation_context: None,
        client_timestamp: now,
    }
}
