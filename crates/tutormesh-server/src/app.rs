// tutormesh-server/src/app.rs
// ============================================================================
// Module: Server Application
// Description: Axum routes, handlers, and error mapping for the plane.
// Purpose: Keep the HTTP layer a thin adapter over component operations.
// Dependencies: axum, tutormesh-core, tutormesh-config, serde_json
// ============================================================================

//! ## Overview
//! Every route is a thin adapter: extract identity, apply the explicit
//! middleware steps in code (inflight permit, rate limit, idempotency
//! replay, request deadline), call the component operation, and map the
//! result through the closed error taxonomy. Responses carry the request
//! identifier so operators can correlate with audits. Write-path endpoints
//! honor the `Idempotency-Key` header with byte-identical replays.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Instant;

use axum::Router;
use axum::body::Body;
use axum::body::Bytes;
use axum::extract::DefaultBodyLimit;
use axum::extract::Path;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::http::header::RETRY_AFTER;
use axum::response::Response;
use axum::routing::delete;
use axum::routing::get;
use axum::routing::post;
use serde::Deserialize;
use serde_json::Value;
use serde_json::json;
use tokio::sync::Semaphore;
use tutormesh_config::Configuration;
use tutormesh_core::AgentInvoker;
use tutormesh_core::ComplianceService;
use tutormesh_core::DeadLetterEntry;
use tutormesh_core::DeadLetterSink;
use tutormesh_core::EventPublisher;
use tutormesh_core::Granularity;
use tutormesh_core::IdempotencyKey;
use tutormesh_core::IdentityContext;
use tutormesh_core::MetricsSink;
use tutormesh_core::PlaneError;
use tutormesh_core::Predictor;
use tutormesh_core::QueryService;
use tutormesh_core::Recommender;
use tutormesh_core::RequestId;
use tutormesh_core::RequestOutcome;
use tutormesh_core::StateStore;
use tutormesh_core::StudentId;
use tutormesh_core::TriageRequest;
use tutormesh_core::TriageRouter;
use tutormesh_core::UnixMillis;
use tutormesh_core::core::time::EventDate;
use tutormesh_core::runtime::DEFAULT_HORIZON_DAYS;
use tutormesh_core::runtime::SharedStateStore;
use tutormesh_core::runtime::keys;

use crate::identity::HEADER_IDEMPOTENCY_KEY;
use crate::identity::identity_from_headers;
use crate::limits::RateDecision;
use crate::limits::SlidingWindowLimiter;
use crate::metrics::RegistryMetrics;

// ============================================================================
// SECTION: App State
// ============================================================================

/// Wired dependencies shared by every handler; constructed once at the
/// composition root and passed by reference, never as process globals.
pub struct AppState {
    /// Immutable configuration.
    pub config: Configuration,
    /// Triage router.
    pub triage: TriageRouter,
    /// Mastery query service.
    pub query: Arc<QueryService>,
    /// Predictor.
    pub predictor: Predictor,
    /// Recommender.
    pub recommender: Recommender,
    /// Compliance service.
    pub compliance: ComplianceService,
    /// Shared state store.
    pub store: SharedStateStore,
    /// Event-log publisher, probed for readiness.
    pub publisher: Arc<dyn EventPublisher>,
    /// Sidecar invoker, probed for readiness.
    pub sidecar: Arc<dyn AgentInvoker>,
    /// Dead-letter sink for failed triage dispatches.
    pub dead_letter: Arc<dyn DeadLetterSink>,
    /// Metrics registry.
    pub metrics: Arc<RegistryMetrics>,
    /// Per-student rate limiter.
    pub limiter: SlidingWindowLimiter,
    /// Inflight request limiter.
    pub inflight: Semaphore,
    /// Flips once startup completes; gates liveness.
    pub started: AtomicBool,
}

/// Builds the HTTP application over the wired state.
#[must_use]
pub fn build_app(state: Arc<AppState>) -> Router {
    let body_limit = state.config.server.max_body_bytes;
    Router::new()
        .route("/api/v1/triage", post(handle_triage))
        .route("/api/v1/mastery/query", post(handle_mastery_query))
        .route("/api/v1/mastery/history", post(handle_mastery_history))
        .route("/api/v1/predictions/next-week", post(handle_prediction))
        .route("/api/v1/recommendations/adaptive", post(handle_recommendations))
        .route("/api/v1/compliance/student/{id}", delete(handle_compliance_erase))
        .route("/api/v1/compliance/student/{id}/export", get(handle_compliance_export))
        .route("/health", get(handle_health))
        .route("/ready", get(handle_ready))
        .route("/metrics", get(handle_metrics))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

// ============================================================================
// SECTION: Request Bodies
// ============================================================================

/// Body naming the subject student.
#[derive(Debug, Deserialize)]
struct StudentBody {
    /// Subject student.
    student_identity: StudentId,
}

/// Body of a history request.
#[derive(Debug, Deserialize)]
struct HistoryBody {
    /// Subject student.
    student_identity: StudentId,
    /// Inclusive range start.
    start_date: EventDate,
    /// Inclusive range end.
    end_date: EventDate,
    /// Aggregation granularity.
    granularity: Granularity,
}

/// Body of a prediction request.
#[derive(Debug, Deserialize)]
struct PredictionBody {
    /// Subject student.
    student_identity: StudentId,
    /// Optional horizon override in days.
    #[serde(default)]
    horizon_days: Option<u32>,
}

// ============================================================================
// SECTION: Triage Handler
// ============================================================================

/// Handles `POST /api/v1/triage`.
async fn handle_triage(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = RequestId::generate();
    let Ok(_permit) = state.inflight.acquire().await else {
        return error_response(&PlaneError::internal(request_id.as_str()), &request_id, None);
    };

    let identity = match identity_from_headers(&headers) {
        Ok(identity) => identity,
        Err(error) => return error_response(&error, &request_id, None),
    };

    match state.limiter.check(identity.student_identity.as_str()) {
        RateDecision::Allow => {}
        RateDecision::Limited {
            retry_after_ms,
        } => {
            return error_response(
                &PlaneError::RateLimit {
                    retry_after_ms,
                },
                &request_id,
                None,
            );
        }
        RateDecision::OverCapacity => {
            let retry_after_ms =
                u64::try_from(state.config.rate_limit.window.as_millis()).unwrap_or(u64::MAX);
            return error_response(
                &PlaneError::RateLimit {
                    retry_after_ms,
                },
                &request_id,
                None,
            );
        }
    }

    let replay_key = match replay_storage_key(&headers, &identity) {
        Ok(key) => key,
        Err(error) => return error_response(&error, &request_id, None),
    };
    if let Some(key) = &replay_key
        && let Some(replayed) = load_replay(&state, key)
    {
        return replayed;
    }

    let request: TriageRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(error) => {
            return error_response(
                &PlaneError::validation(vec![format!("invalid request body: {error}")]),
                &request_id,
                None,
            );
        }
    };
    let request_for_deadletter = request.clone();

    let outcome = tokio::time::timeout(
        state.config.server.request_deadline,
        state.triage.triage(&identity, request, request_id.clone()),
    )
    .await
    .unwrap_or(Err(PlaneError::Timeout));

    match outcome {
        Ok(response) => {
            let body_string =
                serde_json::to_string(&response).unwrap_or_else(|_| "{}".to_string());
            if let Some(key) = &replay_key {
                store_replay(&state, key, StatusCode::OK, &body_string);
            }
            json_string_response(StatusCode::OK, body_string)
        }
        Err(error) => {
            let fallback = match &error {
                PlaneError::UpstreamUnavailable {
                    attempts, ..
                } => Some(divert_failed_triage(
                    &state,
                    &request_for_deadletter,
                    &request_id,
                    error.code(),
                    *attempts,
                )),
                PlaneError::BreakerOpen {
                    ..
                } => Some(divert_failed_triage(
                    &state,
                    &request_for_deadletter,
                    &request_id,
                    error.code(),
                    0,
                )),
                _ => None,
            };
            error_response(&error, &request_id, fallback)
        }
    }
}

/// Diverts a failed triage request to the dead-letter topic. Returns the
/// fallback label reported to the caller.
fn divert_failed_triage(
    state: &AppState,
    request: &TriageRequest,
    request_id: &RequestId,
    error_kind: &str,
    attempts: u32,
) -> &'static str {
    let Ok(mut payload) = serde_json::to_value(request) else {
        return "none";
    };
    if let Some(map) = payload.as_object_mut() {
        map.insert("request_id".to_string(), Value::String(request_id.as_str().to_string()));
    }
    let entry = DeadLetterEntry {
        original_payload: payload,
        error_kind: error_kind.to_string(),
        error_details: Vec::new(),
        first_failure_timestamp: UnixMillis::now(),
        attempts,
    };
    match state.dead_letter.divert(&entry) {
        Ok(()) => {
            state.metrics.incr_dead_letter();
            "dead_letter"
        }
        Err(_) => "none",
    }
}

// ============================================================================
// SECTION: Mastery Handlers
// ============================================================================

/// Handles `POST /api/v1/mastery/query`.
async fn handle_mastery_query(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let request_id = RequestId::generate();
    let identity = match identity_from_headers(&headers) {
        Ok(identity) => identity,
        Err(error) => return error_response(&error, &request_id, None),
    };
    let parsed: StudentBody = match serde_json::from_slice(&body) {
        Ok(parsed) => parsed,
        Err(error) => return bad_body(&state, "query", started, &request_id, &error),
    };
    let result = state
        .query
        .current_mastery(&identity, &parsed.student_identity, UnixMillis::now())
        .await;
    respond_mastery(&state, "query", started, &request_id, result)
}

/// Handles `POST /api/v1/mastery/history`.
async fn handle_mastery_history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let request_id = RequestId::generate();
    let identity = match identity_from_headers(&headers) {
        Ok(identity) => identity,
        Err(error) => return error_response(&error, &request_id, None),
    };
    let parsed: HistoryBody = match serde_json::from_slice(&body) {
        Ok(parsed) => parsed,
        Err(error) => return bad_body(&state, "history", started, &request_id, &error),
    };
    let result = state.query.history(
        &identity,
        &parsed.student_identity,
        parsed.start_date,
        parsed.end_date,
        parsed.granularity,
    );
    respond_mastery(&state, "history", started, &request_id, result)
}

/// Handles `POST /api/v1/predictions/next-week`.
async fn handle_prediction(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let request_id = RequestId::generate();
    let identity = match identity_from_headers(&headers) {
        Ok(identity) => identity,
        Err(error) => return error_response(&error, &request_id, None),
    };
    let parsed: PredictionBody = match serde_json::from_slice(&body) {
        Ok(parsed) => parsed,
        Err(error) => return bad_body(&state, "prediction", started, &request_id, &error),
    };
    let horizon = parsed.horizon_days.unwrap_or(DEFAULT_HORIZON_DAYS);
    let result = state.predictor.predict(
        &identity,
        &parsed.student_identity,
        horizon,
        UnixMillis::now(),
    );
    respond_mastery(&state, "prediction", started, &request_id, result)
}

/// Handles `POST /api/v1/recommendations/adaptive`.
async fn handle_recommendations(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let request_id = RequestId::generate();
    let identity = match identity_from_headers(&headers) {
        Ok(identity) => identity,
        Err(error) => return error_response(&error, &request_id, None),
    };
    let parsed: StudentBody = match serde_json::from_slice(&body) {
        Ok(parsed) => parsed,
        Err(error) => return bad_body(&state, "recommendation", started, &request_id, &error),
    };
    let result = state
        .recommender
        .recommend(&identity, &parsed.student_identity, UnixMillis::now())
        .await;
    respond_mastery(&state, "recommendation", started, &request_id, result)
}

// ============================================================================
// SECTION: Compliance Handlers
// ============================================================================

/// Handles `DELETE /api/v1/compliance/student/{id}`.
async fn handle_compliance_erase(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let started = Instant::now();
    let request_id = RequestId::generate();
    let identity = match identity_from_headers(&headers) {
        Ok(identity) => identity,
        Err(error) => return error_response(&error, &request_id, None),
    };
    let replay_key = match replay_storage_key(&headers, &identity) {
        Ok(key) => key,
        Err(error) => return error_response(&error, &request_id, None),
    };
    if let Some(key) = &replay_key
        && let Some(replayed) = load_replay(&state, key)
    {
        return replayed;
    }

    let subject = StudentId::new(id);
    let result = state.compliance.erase(&identity, &subject, UnixMillis::now());
    match result {
        Ok(summary) => {
            let body_string = serde_json::to_string(&summary).unwrap_or_else(|_| "{}".to_string());
            if let Some(key) = &replay_key {
                store_replay(&state, key, StatusCode::OK, &body_string);
            }
            state.metrics.record_mastery("compliance", RequestOutcome::Ok, started.elapsed());
            json_string_response(StatusCode::OK, body_string)
        }
        Err(error) => {
            state.metrics.record_mastery("compliance", RequestOutcome::Error, started.elapsed());
            error_response(&error, &request_id, None)
        }
    }
}

/// Handles `GET /api/v1/compliance/student/{id}/export`.
async fn handle_compliance_export(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let started = Instant::now();
    let request_id = RequestId::generate();
    let identity = match identity_from_headers(&headers) {
        Ok(identity) => identity,
        Err(error) => return error_response(&error, &request_id, None),
    };
    let subject = StudentId::new(id);
    let result = state.compliance.export(&identity, &subject, UnixMillis::now());
    respond_mastery(&state, "export", started, &request_id, result)
}

// ============================================================================
// SECTION: Health Handlers
// ============================================================================

/// Handles `GET /health`: OK once startup completes.
async fn handle_health(State(state): State<Arc<AppState>>) -> Response {
    if state.started.load(Ordering::Relaxed) {
        json_string_response(StatusCode::OK, json!({ "status": "ok" }).to_string())
    } else {
        json_string_response(
            StatusCode::SERVICE_UNAVAILABLE,
            json!({ "status": "starting" }).to_string(),
        )
    }
}

/// Handles `GET /ready`: OK only when every dependency answers its probe.
async fn handle_ready(State(state): State<Arc<AppState>>) -> Response {
    let store_status = state.store.probe().map_err(|error| error.to_string());
    let log_status = state.publisher.probe().map_err(|error| error.to_string());
    let sidecar_status = state
        .sidecar
        .probe(state.config.probes.budget)
        .await
        .map_err(|error| error.to_string());

    let ready = store_status.is_ok() && log_status.is_ok() && sidecar_status.is_ok();
    let body = json!({
        "status": if ready { "ready" } else { "not_ready" },
        "state_store": probe_label(&store_status),
        "event_log": probe_label(&log_status),
        "sidecar": probe_label(&sidecar_status),
    });
    let status =
        if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    json_string_response(status, body.to_string())
}

/// Renders one probe outcome.
fn probe_label(outcome: &Result<(), String>) -> String {
    match outcome {
        Ok(()) => "ok".to_string(),
        Err(error) => format!("error: {error}"),
    }
}

/// Handles `GET /metrics`.
async fn handle_metrics(State(state): State<Arc<AppState>>) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "text/plain; version=0.0.4")
        .body(Body::from(state.metrics.render()))
        .unwrap_or_default()
}

// ============================================================================
// SECTION: Idempotency Replay
// ============================================================================

/// Derives the replay storage key from the `Idempotency-Key` header.
fn replay_storage_key(
    headers: &HeaderMap,
    identity: &IdentityContext,
) -> Result<Option<String>, PlaneError> {
    let Some(raw) = headers.get(HEADER_IDEMPOTENCY_KEY) else {
        return Ok(None);
    };
    let value = raw.to_str().map_err(|_| {
        PlaneError::validation(vec!["malformed Idempotency-Key header".to_string()])
    })?;
    if !IdempotencyKey::is_well_formed(value) {
        return Err(PlaneError::validation(vec![
            "Idempotency-Key must be exactly 32 lowercase hex characters".to_string(),
        ]));
    }
    Ok(Some(keys::idempotency_key(&identity.student_identity, value)))
}

/// Loads a cached response for a replay key, byte-for-byte.
fn load_replay(state: &AppState, key: &str) -> Option<Response> {
    let versioned = state.store.get(key).ok().flatten()?;
    let status = versioned.value.get("status").and_then(Value::as_u64)?;
    let body = versioned.value.get("body").and_then(Value::as_str)?;
    let status = StatusCode::from_u16(u16::try_from(status).ok()?).ok()?;
    Some(json_string_response(status, body.to_string()))
}

/// Stores a response for future replays of the same key.
fn store_replay(state: &AppState, key: &str, status: StatusCode, body: &str) {
    let record = json!({
        "status": u64::from(status.as_u16()),
        "body": body,
        "processed_at": UnixMillis::now(),
    });
    if let Err(error) = state.store.put(key, &record, Some(keys::TTL_IDEMPOTENCY)) {
        tracing::warn!(%error, "idempotency record write failed");
    }
}

// ============================================================================
// SECTION: Response Mapping
// ============================================================================

/// Records mastery metrics and maps a component result to a response.
fn respond_mastery<T: serde::Serialize>(
    state: &AppState,
    endpoint: &'static str,
    started: Instant,
    request_id: &RequestId,
    result: Result<T, PlaneError>,
) -> Response {
    match result {
        Ok(payload) => {
            state.metrics.record_mastery(endpoint, RequestOutcome::Ok, started.elapsed());
            let body = serde_json::to_string(&payload).unwrap_or_else(|_| "{}".to_string());
            json_string_response(StatusCode::OK, body)
        }
        Err(error) => {
            state.metrics.record_mastery(endpoint, RequestOutcome::Error, started.elapsed());
            error_response(&error, request_id, None)
        }
    }
}

/// Maps a malformed body into the validation response with metrics.
fn bad_body(
    state: &AppState,
    endpoint: &'static str,
    started: Instant,
    request_id: &RequestId,
    error: &serde_json::Error,
) -> Response {
    state.metrics.record_mastery(endpoint, RequestOutcome::Error, started.elapsed());
    error_response(
        &PlaneError::validation(vec![format!("invalid request body: {error}")]),
        request_id,
        None,
    )
}

/// Maps a plane error to its HTTP response.
fn error_response(
    error: &PlaneError,
    request_id: &RequestId,
    fallback: Option<&'static str>,
) -> Response {
    let status = match error {
        PlaneError::Validation {
            ..
        } => StatusCode::BAD_REQUEST,
        PlaneError::Authentication {
            ..
        } => StatusCode::UNAUTHORIZED,
        PlaneError::Authorization => StatusCode::FORBIDDEN,
        PlaneError::RateLimit {
            ..
        } => StatusCode::TOO_MANY_REQUESTS,
        PlaneError::UpstreamUnavailable {
            ..
        }
        | PlaneError::BreakerOpen {
            ..
        } => StatusCode::BAD_GATEWAY,
        PlaneError::Conflict {
            ..
        } => StatusCode::CONFLICT,
        PlaneError::InsufficientHistory {
            ..
        } => StatusCode::UNPROCESSABLE_ENTITY,
        PlaneError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        PlaneError::Internal {
            ..
        } => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let mut body = json!({
        "error_code": error.code(),
        "message": error.to_string(),
        "request_id": request_id.as_str(),
    });
    if let Some(map) = body.as_object_mut() {
        match error {
            PlaneError::Validation {
                errors,
            } => {
                map.insert("details".to_string(), json!(errors));
            }
            PlaneError::RateLimit {
                retry_after_ms,
            } => {
                map.insert("retry_after_ms".to_string(), json!(retry_after_ms));
            }
            PlaneError::UpstreamUnavailable {
                breaker_state, ..
            } => {
                map.insert("breaker_state".to_string(), json!(breaker_state.as_str()));
                map.insert("fallback".to_string(), json!(fallback.unwrap_or("none")));
            }
            PlaneError::BreakerOpen {
                ..
            } => {
                map.insert("breaker_state".to_string(), json!("open"));
                map.insert("fallback".to_string(), json!(fallback.unwrap_or("none")));
            }
            _ => {}
        }
    }

    let mut builder = Response::builder().status(status).header(CONTENT_TYPE, "application/json");
    if let PlaneError::RateLimit {
        retry_after_ms,
    } = error
    {
        builder = builder.header(RETRY_AFTER, retry_after_ms.div_ceil(1_000).to_string());
    }
    builder.body(Body::from(body.to_string())).unwrap_or_default()
}

/// Builds a JSON response from a pre-serialized body, preserving bytes for
/// idempotent replays.
fn json_string_response(status: StatusCode, body: String) -> Response {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap_or_default()
}
