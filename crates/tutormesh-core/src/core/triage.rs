// tutormesh-core/src/core/triage.rs
// ============================================================================
// Module: Tutormesh Triage Records
// Description: Request, decision, and audit payloads for the triage path.
// Purpose: Define the request-scoped records serialized into audits.
// Dependencies: serde, serde_json, crate::core
// ============================================================================

//! ## Overview
//! Triage records are request-scoped: a request is classified, routed, and
//! answered, and exactly one audit record is published per decision. Nothing
//! in this module is persisted directly; audits flow to the event log and
//! responses back to the caller.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::AgentId;
use crate::core::identifiers::RequestId;
use crate::core::identifiers::StudentId;
use crate::core::intent::Classification;
use crate::core::intent::IntentTag;
use crate::core::progress::ProgressSnapshot;
use crate::core::time::UnixMillis;

// ============================================================================
// SECTION: Request
// ============================================================================

/// Prior-turn context attached to a triage request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationContext {
    /// Conversation identifier.
    pub conversation_id: String,
    /// Zero-based turn index within the conversation.
    pub turn_index: u32,
    /// Intent tag assigned to the previous turn, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_intent_tag: Option<IntentTag>,
}

/// Inbound triage request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageRequest {
    /// Student query text.
    pub query: String,
    /// Student the query concerns.
    pub student_identity: StudentId,
    /// Progress snapshot accompanying the query.
    pub progress_snapshot: ProgressSnapshot,
    /// Optional prior-turn context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_context: Option<ConversationContext>,
    /// Client-assigned timestamp, bounded to ±5 minutes of receipt.
    pub client_timestamp: UnixMillis,
}

// ============================================================================
// SECTION: Decision
// ============================================================================

/// Routing priority bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Confident classification; route first.
    High,
    /// Ordinary classification.
    Medium,
    /// Fallback or low-confidence classification.
    Low,
}

impl Priority {
    /// Buckets a classification confidence into a routing priority.
    #[must_use]
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.9 {
            Self::High
        } else if confidence >= 0.6 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Returns a stable label for the priority.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// Metadata recorded alongside a routing decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionMetadata {
    /// Routing priority bucket.
    pub priority: Priority,
    /// Retries consumed by the invocation (0..=3).
    pub retry_count: u32,
    /// Breaker state observed for the target at decision time.
    pub breaker_state: crate::runtime::breaker::BreakerState,
}

/// Routing decision produced per request and serialized into the audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// Downstream agent chosen for the request.
    pub target_agent_id: AgentId,
    /// Intent tag that drove the choice.
    pub intent_tag: IntentTag,
    /// Classification confidence.
    pub confidence: f64,
    /// Student the decision concerns.
    pub student_identity: StudentId,
    /// Decision metadata.
    pub decision_metadata: DecisionMetadata,
    /// Timestamp of the decision.
    pub decision_timestamp: UnixMillis,
}

// ============================================================================
// SECTION: Audit
// ============================================================================

/// Validation summary recorded in the audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    /// Whether the request body passed schema validation.
    pub schema_ok: bool,
    /// Whether the caller was authorized for the subject student.
    pub auth_ok: bool,
    /// Violation descriptions when validation failed.
    pub errors: Vec<String>,
}

impl ValidationOutcome {
    /// Returns a passing outcome.
    #[must_use]
    pub const fn passed() -> Self {
        Self {
            schema_ok: true,
            auth_ok: true,
            errors: Vec::new(),
        }
    }
}

/// Invocation summary recorded in the audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationOutcome {
    /// Whether the downstream agent answered.
    pub success: bool,
    /// Upstream attempts performed.
    pub attempts: u32,
    /// Whether the circuit breaker short-circuited the invocation.
    pub breaker_tripped: bool,
    /// Terminal error message, when the invocation failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Audit record published once per triage decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageAudit {
    /// Request identifier issued at ingress.
    pub request_id: RequestId,
    /// Student the request concerned.
    pub student_identity: StudentId,
    /// Original query text.
    pub original_query: String,
    /// Final classification, recorded regardless of outcome.
    pub classification: Classification,
    /// Routing decision.
    pub decision: RoutingDecision,
    /// Validation summary.
    pub validation_result: ValidationOutcome,
    /// Invocation summary.
    pub invocation_result: InvocationOutcome,
    /// End-to-end processing time in milliseconds.
    pub processing_time_millis: u64,
    /// Timestamp at which the audit was assembled.
    pub emit_timestamp: UnixMillis,
}

// ============================================================================
// SECTION: Response
// ============================================================================

/// Response returned to the caller after a successful triage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageResponse {
    /// Downstream agent that answered.
    pub target_agent_id: AgentId,
    /// Intent tag assigned to the query.
    pub intent_tag: IntentTag,
    /// Classification confidence.
    pub confidence: f64,
    /// Raw agent response payload.
    pub agent_response: Value,
    /// Request identifier for correlation with the audit.
    pub request_id: RequestId,
}
