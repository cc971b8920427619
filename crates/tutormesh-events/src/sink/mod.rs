// tutormesh-events/src/sink/mod.rs
// ============================================================================
// Module: Tutormesh Event Sinks
// Description: Reference audit and dead-letter sink implementations.
// Purpose: Deliver records to stderr, files, channels, and topics.
// Dependencies: tutormesh-core, serde_json, tokio
// ============================================================================

//! ## Overview
//! Reference sinks for deployments that route audits and dead letters to
//! their own pipelines: JSONL on stderr, an append-only file, a bounded
//! channel for tests, and topic-backed publication for the dead-letter path.
//! Audit sinks never fail the caller; dead-letter sinks report failures so
//! the consumer can hold its offset.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;

use tokio::sync::mpsc::Sender;
use tutormesh_core::AuditSink;
use tutormesh_core::DeadLetterEntry;
use tutormesh_core::DeadLetterError;
use tutormesh_core::DeadLetterSink;
use tutormesh_core::EventPublisher;
use tutormesh_core::TriageAudit;

use crate::topics::TOPIC_DEADLETTER;

// ============================================================================
// SECTION: Audit Sinks
// ============================================================================

/// Audit sink writing JSON lines to stderr.
pub struct StderrAuditSink;

impl AuditSink for StderrAuditSink {
    fn record(&self, audit: &TriageAudit) {
        if let Ok(payload) = serde_json::to_string(audit) {
            let _ = writeln!(io::stderr(), "{payload}");
        }
    }
}

/// Audit sink appending JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl AuditSink for FileAuditSink {
    fn record(&self, audit: &TriageAudit) {
        if let Ok(payload) = serde_json::to_string(audit)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// Audit sink delivering into a bounded channel; used by tests.
pub struct ChannelAuditSink {
    /// Sender for recorded audits.
    sender: Sender<TriageAudit>,
}

impl ChannelAuditSink {
    /// Creates a channel sink over the provided sender.
    #[must_use]
    pub const fn new(sender: Sender<TriageAudit>) -> Self {
        Self {
            sender,
        }
    }
}

impl AuditSink for ChannelAuditSink {
    fn record(&self, audit: &TriageAudit) {
        let _ = self.sender.try_send(audit.clone());
    }
}

// ============================================================================
// SECTION: Dead-Letter Sinks
// ============================================================================

/// Dead-letter sink publishing to the dead-letter topic.
pub struct TopicDeadLetterSink {
    /// Event-log publisher.
    publisher: Arc<dyn EventPublisher>,
}

impl TopicDeadLetterSink {
    /// Creates a topic-backed dead-letter sink.
    #[must_use]
    pub fn new(publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            publisher,
        }
    }
}

impl DeadLetterSink for TopicDeadLetterSink {
    fn divert(&self, entry: &DeadLetterEntry) -> Result<(), DeadLetterError> {
        let payload = serde_json::to_value(entry)
            .map_err(|error| DeadLetterError::Publish(error.to_string()))?;
        self.publisher
            .publish(TOPIC_DEADLETTER, &entry.error_kind, &payload)
            .map_err(|error| DeadLetterError::Publish(error.to_string()))
    }
}

/// Dead-letter sink writing JSON lines to stderr; local runs only.
pub struct StderrDeadLetterSink;

impl DeadLetterSink for StderrDeadLetterSink {
    fn divert(&self, entry: &DeadLetterEntry) -> Result<(), DeadLetterError> {
        let payload = serde_json::to_string(entry)
            .map_err(|error| DeadLetterError::Publish(error.to_string()))?;
        writeln!(io::stderr(), "{payload}")
            .map_err(|error| DeadLetterError::Publish(error.to_string()))
    }
}
