// tutormesh-events/src/lib.rs
// ============================================================================
// Module: Tutormesh Events Library
// Description: Event-log abstraction, audit emitter, and reference sinks.
// Purpose: Carry learning events, audits, and dead letters between seams.
// Dependencies: tutormesh-core, serde_json, sha2, tokio
// ============================================================================

//! ## Overview
//! Tutormesh events provides the topic contract of the control plane, an
//! in-process partitioned log for tests and local runs, the buffered audit
//! emitter with disk spill, and reference audit/dead-letter sinks.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod emitter;
pub mod memory;
pub mod sink;
pub mod topics;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use emitter::AuditEmitterConfig;
pub use emitter::BufferedAuditEmitter;
pub use memory::InMemoryEventLog;
pub use memory::TopicSource;
pub use sink::ChannelAuditSink;
pub use sink::FileAuditSink;
pub use sink::StderrAuditSink;
pub use sink::StderrDeadLetterSink;
pub use sink::TopicDeadLetterSink;
pub use topics::TOPIC_AUDITS;
pub use topics::TOPIC_DEADLETTER;
pub use topics::TOPIC_LEARNING_EVENTS;
pub use topics::partition_for;
