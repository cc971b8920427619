// tutormesh-core/src/runtime/router.rs
// ============================================================================
// Module: Tutormesh Triage Router
// Description: Stateless per-request orchestration of the triage path.
// Purpose: Validate, classify, route, invoke, and audit each query.
// Dependencies: crate::core, crate::interfaces, crate::runtime
// ============================================================================

//! ## Overview
//! The router binds the triage pipeline: obtain identity, validate the
//! request, classify intent, map intent to a target through the constant
//! table, invoke the target through the invocation client, assemble the
//! routing decision, and emit the audit. The router holds no per-request
//! state between calls; rate limiting lives in the HTTP adapter's middleware
//! chain, and audit emission never blocks the response path. Exactly one
//! audit is recorded per decision, regardless of outcome.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

use crate::core::errors::PlaneError;
use crate::core::identifiers::RequestId;
use crate::core::identity::IdentityContext;
use crate::core::intent::Classification;
use crate::core::time::UnixMillis;
use crate::core::triage::DecisionMetadata;
use crate::core::triage::InvocationOutcome;
use crate::core::triage::Priority;
use crate::core::triage::RoutingDecision;
use crate::core::triage::TriageAudit;
use crate::core::triage::TriageRequest;
use crate::core::triage::TriageResponse;
use crate::core::triage::ValidationOutcome;
use crate::core::validate::validate_triage_request;
use crate::interfaces::AuditSink;
use crate::interfaces::MetricsSink;
use crate::interfaces::RequestOutcome;
use crate::runtime::classifier::IntentClassifier;
use crate::runtime::invoker::InvocationClient;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Method name invoked on every downstream tutor agent.
pub const INVOKE_METHOD: &str = "handle_query";

// ============================================================================
// SECTION: Router
// ============================================================================

/// Stateless triage router.
pub struct TriageRouter {
    /// Intent classifier.
    classifier: IntentClassifier,
    /// Breaker-guarded invocation client.
    invoker: Arc<InvocationClient>,
    /// Audit sink capability; the concrete emitter is wired at the
    /// composition root.
    audit: Arc<dyn AuditSink>,
    /// Metrics sink.
    metrics: Arc<dyn MetricsSink>,
}

impl TriageRouter {
    /// Creates a router over the provided seams.
    #[must_use]
    pub fn new(
        classifier: IntentClassifier,
        invoker: Arc<InvocationClient>,
        audit: Arc<dyn AuditSink>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            classifier,
            invoker,
            audit,
            metrics,
        }
    }

    /// Runs the triage pipeline for one request.
    ///
    /// # Errors
    ///
    /// Returns [`PlaneError`] per the failure taxonomy; validation and
    /// authorization failures are terminal and still audited.
    pub async fn triage(
        &self,
        identity: &IdentityContext,
        request: TriageRequest,
        request_id: RequestId,
    ) -> Result<TriageResponse, PlaneError> {
        let started = Instant::now();
        let now = UnixMillis::now();

        let report = validate_triage_request(&request, now);
        let auth_ok = identity.may_act_for(&request.student_identity);
        // Classification is recorded in the audit regardless of outcome.
        let classification = self.classifier.classify(&request.query).await;
        let target = classification.intent_tag.target_agent_id();

        if !auth_ok || !report.is_ok() {
            let validation = ValidationOutcome {
                schema_ok: report.is_ok(),
                auth_ok,
                errors: report.errors.clone(),
            };
            let invocation = InvocationOutcome {
                success: false,
                attempts: 0,
                breaker_tripped: false,
                error_message: None,
            };
            let decision = self.build_decision(&request, &classification, 0, now);
            self.finish(
                &request_id,
                &request,
                &classification,
                decision,
                validation,
                invocation,
                started,
                RequestOutcome::Error,
            );
            if auth_ok {
                return Err(PlaneError::validation(report.errors));
            }
            return Err(PlaneError::Authorization);
        }

        let body = invocation_body(&request_id, &request)?;
        match self.invoker.invoke(&target, INVOKE_METHOD, &body).await {
            Ok(success) => {
                let decision =
                    self.build_decision(&request, &classification, success.attempts, now);
                let invocation = InvocationOutcome {
                    success: true,
                    attempts: success.attempts,
                    breaker_tripped: false,
                    error_message: None,
                };
                self.finish(
                    &request_id,
                    &request,
                    &classification,
                    decision,
                    ValidationOutcome::passed(),
                    invocation,
                    started,
                    RequestOutcome::Ok,
                );
                Ok(TriageResponse {
                    target_agent_id: target,
                    intent_tag: classification.intent_tag,
                    confidence: classification.confidence,
                    agent_response: success.response,
                    request_id,
                })
            }
            Err(failure) => {
                let decision =
                    self.build_decision(&request, &classification, failure.attempts, now);
                let invocation = InvocationOutcome {
                    success: false,
                    attempts: failure.attempts,
                    breaker_tripped: failure.breaker_tripped,
                    error_message: Some(failure.message.clone()),
                };
                self.finish(
                    &request_id,
                    &request,
                    &classification,
                    decision,
                    ValidationOutcome::passed(),
                    invocation,
                    started,
                    RequestOutcome::Error,
                );
                Err(failure.error)
            }
        }
    }

    /// Assembles the routing decision for the audit trail.
    fn build_decision(
        &self,
        request: &TriageRequest,
        classification: &Classification,
        attempts: u32,
        now: UnixMillis,
    ) -> RoutingDecision {
        let target = classification.intent_tag.target_agent_id();
        RoutingDecision {
            intent_tag: classification.intent_tag,
            confidence: classification.confidence,
            student_identity: request.student_identity.clone(),
            decision_metadata: DecisionMetadata {
                priority: Priority::from_confidence(classification.confidence),
                retry_count: attempts.saturating_sub(1),
                breaker_state: self.invoker.breaker_state(&target),
            },
            decision_timestamp: now,
            target_agent_id: target,
        }
    }

    /// Emits the audit and request metrics for a finished request.
    #[allow(clippy::too_many_arguments, reason = "One audit assembly point.")]
    fn finish(
        &self,
        request_id: &RequestId,
        request: &TriageRequest,
        classification: &Classification,
        decision: RoutingDecision,
        validation_result: ValidationOutcome,
        invocation_result: InvocationOutcome,
        started: Instant,
        outcome: RequestOutcome,
    ) {
        let elapsed = started.elapsed();
        let audit = TriageAudit {
            request_id: request_id.clone(),
            student_identity: request.student_identity.clone(),
            original_query: request.query.clone(),
            classification: classification.clone(),
            decision,
            validation_result,
            invocation_result,
            processing_time_millis: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            emit_timestamp: UnixMillis::now(),
        };
        self.audit.record(&audit);
        self.metrics.record_triage(classification.intent_tag, outcome, elapsed);
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds the downstream invocation body: the request payload plus the
/// correlation identifier.
fn invocation_body(request_id: &RequestId, request: &TriageRequest) -> Result<Value, PlaneError> {
    let mut body = serde_json::to_value(request)
        .map_err(|error| PlaneError::internal(format!("{request_id}: {error}")))?;
    if let Some(map) = body.as_object_mut() {
        map.insert("request_id".to_string(), Value::String(request_id.as_str().to_string()));
    }
    Ok(body)
}
