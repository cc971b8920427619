// tutormesh-events/src/emitter.rs
// ============================================================================
// Module: Tutormesh Audit Emitter
// Description: Buffered, non-blocking audit publisher with disk spill.
// Purpose: Publish triage audits without ever blocking the request path.
// Dependencies: tutormesh-core, serde_json, tokio
// ============================================================================

//! ## Overview
//! The emitter accepts audits through the [`AuditSink`] capability and hands
//! them to a background drain task over a bounded in-memory queue. When the
//! queue fills, the oldest entries are dropped and the drop is counted.
//! When the event log is unavailable, audits spill to a bounded local disk
//! queue that drains ahead of fresh audits once the log recovers. Emission
//! failures are never propagated to the caller.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::VecDeque;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Notify;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tutormesh_core::AuditSink;
use tutormesh_core::EventPublisher;
use tutormesh_core::MetricsSink;
use tutormesh_core::TriageAudit;

use crate::topics::TOPIC_AUDITS;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Emitter tuning knobs.
#[derive(Debug, Clone)]
pub struct AuditEmitterConfig {
    /// In-memory queue bound; the oldest audit is dropped past this size.
    pub queue_capacity: usize,
    /// Disk spill file, `None` disables spilling.
    pub spill_path: Option<PathBuf>,
    /// Spill-queue bound; the oldest spilled line is dropped past this size.
    pub spill_max_entries: usize,
    /// Drain pass interval when the queue stays quiet.
    pub flush_interval: Duration,
}

impl Default for AuditEmitterConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1_024,
            spill_path: None,
            spill_max_entries: 4_096,
            flush_interval: Duration::from_millis(100),
        }
    }
}

// ============================================================================
// SECTION: Spill Queue
// ============================================================================

/// Bounded on-disk JSONL queue with drop-oldest semantics.
struct SpillQueue {
    /// Backing file path.
    path: PathBuf,
    /// Entry bound.
    max_entries: usize,
    /// In-memory mirror of the file contents.
    lines: Mutex<VecDeque<String>>,
}

impl SpillQueue {
    /// Opens a spill queue, restoring the newest surviving lines.
    fn open(path: PathBuf, max_entries: usize) -> Self {
        let mut lines: VecDeque<String> = fs::read_to_string(&path)
            .map(|contents| contents.lines().map(str::to_string).collect())
            .unwrap_or_default();
        while lines.len() > max_entries {
            lines.pop_front();
        }
        Self {
            path,
            max_entries,
            lines: Mutex::new(lines),
        }
    }

    /// Appends a line, dropping the oldest past the bound. Returns the
    /// number of dropped lines.
    fn push(&self, line: String) -> usize {
        let Ok(mut lines) = self.lines.lock() else {
            return 0;
        };
        lines.push_back(line);
        let mut dropped = 0;
        while lines.len() > self.max_entries {
            lines.pop_front();
            dropped += 1;
        }
        Self::persist(&self.path, &lines);
        dropped
    }

    /// Removes and returns the oldest line.
    fn pop(&self) -> Option<String> {
        let mut lines = self.lines.lock().ok()?;
        let line = lines.pop_front();
        if line.is_some() {
            Self::persist(&self.path, &lines);
        }
        line
    }

    /// Restores a line that failed to publish to the front of the queue.
    fn restore(&self, line: String) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push_front(line);
            Self::persist(&self.path, &lines);
        }
    }

    /// Rewrites the backing file; the queue is bounded, so a full rewrite
    /// stays cheap.
    fn persist(path: &PathBuf, lines: &VecDeque<String>) {
        let write = || -> std::io::Result<()> {
            let mut file = fs::File::create(path)?;
            for line in lines {
                writeln!(file, "{line}")?;
            }
            file.flush()
        };
        if let Err(error) = write() {
            tracing::warn!(%error, "audit spill persist failed");
        }
    }
}

// ============================================================================
// SECTION: Emitter
// ============================================================================

/// Shared queue state between the sink handle and the drain task.
struct EmitterInner {
    /// Pending audits.
    queue: Mutex<VecDeque<TriageAudit>>,
    /// Queue bound.
    capacity: usize,
    /// Drain wake-up signal.
    notify: Notify,
    /// Metrics sink counting drops.
    metrics: Arc<dyn MetricsSink>,
}

/// Buffered audit emitter handle implementing [`AuditSink`].
#[derive(Clone)]
pub struct BufferedAuditEmitter {
    /// Shared queue state.
    inner: Arc<EmitterInner>,
}

impl BufferedAuditEmitter {
    /// Creates the emitter and spawns its drain task.
    #[must_use]
    pub fn spawn(
        publisher: Arc<dyn EventPublisher>,
        metrics: Arc<dyn MetricsSink>,
        config: AuditEmitterConfig,
        shutdown: watch::Receiver<bool>,
    ) -> (Self, JoinHandle<()>) {
        let inner = Arc::new(EmitterInner {
            queue: Mutex::new(VecDeque::new()),
            capacity: config.queue_capacity.max(1),
            notify: Notify::new(),
            metrics: Arc::clone(&metrics),
        });
        let spill = config
            .spill_path
            .clone()
            .map(|path| SpillQueue::open(path, config.spill_max_entries.max(1)));
        let drain = DrainTask {
            inner: Arc::clone(&inner),
            publisher,
            metrics,
            spill,
            flush_interval: config.flush_interval,
        };
        let handle = tokio::spawn(drain.run(shutdown));
        (
            Self {
                inner,
            },
            handle,
        )
    }
}

impl AuditSink for BufferedAuditEmitter {
    fn record(&self, audit: &TriageAudit) {
        if let Ok(mut queue) = self.inner.queue.lock() {
            queue.push_back(audit.clone());
            while queue.len() > self.inner.capacity {
                queue.pop_front();
                self.inner.metrics.incr_audit_drop();
            }
        }
        self.inner.notify.notify_one();
    }
}

// ============================================================================
// SECTION: Drain Task
// ============================================================================

/// Background task publishing queued audits.
struct DrainTask {
    /// Shared queue state.
    inner: Arc<EmitterInner>,
    /// Event-log publisher.
    publisher: Arc<dyn EventPublisher>,
    /// Metrics sink counting spill drops.
    metrics: Arc<dyn MetricsSink>,
    /// Optional disk spill queue.
    spill: Option<SpillQueue>,
    /// Idle drain interval.
    flush_interval: Duration,
}

impl DrainTask {
    /// Drains until shutdown flips, then makes a final pass.
    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                self.drain_pass();
                break;
            }
            tokio::select! {
                () = self.inner.notify.notified() => {}
                _ = shutdown.changed() => {}
                () = tokio::time::sleep(self.flush_interval) => {}
            }
            self.drain_pass();
        }
    }

    /// Publishes spilled audits first, then the live queue.
    fn drain_pass(&self) {
        if let Some(spill) = &self.spill {
            while let Some(line) = spill.pop() {
                let Ok(payload) = serde_json::from_str::<Value>(&line) else {
                    continue;
                };
                let key = audit_key(&payload);
                if self.publisher.publish(TOPIC_AUDITS, &key, &payload).is_err() {
                    spill.restore(line);
                    return;
                }
            }
        }

        while let Some(audit) = self.pop_queued() {
            let Ok(payload) = serde_json::to_value(&audit) else {
                continue;
            };
            let key = audit.student_identity.to_string();
            if self.publisher.publish(TOPIC_AUDITS, &key, &payload).is_err() {
                match &self.spill {
                    Some(spill) => {
                        if let Ok(line) = serde_json::to_string(&payload) {
                            let dropped = spill.push(line);
                            for _ in 0..dropped {
                                self.metrics.incr_audit_drop();
                            }
                        }
                    }
                    None => self.metrics.incr_audit_drop(),
                }
            }
        }
    }

    /// Pops the next queued audit.
    fn pop_queued(&self) -> Option<TriageAudit> {
        self.inner.queue.lock().ok()?.pop_front()
    }
}

/// Extracts the partition key from a spilled audit payload.
fn audit_key(payload: &Value) -> String {
    payload
        .get("student_identity")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string()
}
