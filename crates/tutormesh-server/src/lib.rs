// tutormesh-server/src/lib.rs
// ============================================================================
// Module: Tutormesh Server Library
// Description: HTTP adapter over the control-plane core.
// Purpose: Expose routes, identity extraction, limits, and sidecar clients.
// Dependencies: axum, reqwest, tutormesh-core, tutormesh-config
// ============================================================================

//! ## Overview
//! The server crate keeps the HTTP layer a thin adapter: component
//! operations live in `tutormesh-core`, and every route extracts identity,
//! applies the explicit middleware steps, invokes the operation, and maps
//! the result through the closed error taxonomy.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod app;
pub mod identity;
pub mod limits;
pub mod metrics;
pub mod sidecar;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use app::AppState;
pub use app::build_app;
pub use identity::HEADER_IDEMPOTENCY_KEY;
pub use identity::HEADER_ROLE;
pub use identity::HEADER_USERNAME;
pub use identity::identity_from_headers;
pub use limits::RateDecision;
pub use limits::SlidingWindowLimiter;
pub use metrics::LATENCY_BUCKETS_MS;
pub use metrics::RegistryMetrics;
pub use sidecar::HttpLlmClassifier;
pub use sidecar::HttpSidecarInvoker;
