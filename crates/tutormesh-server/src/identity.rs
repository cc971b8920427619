// tutormesh-server/src/identity.rs
// ============================================================================
// Module: Server Identity Extraction
// Description: Builds the request identity from gateway-injected headers.
// Purpose: Fail closed on missing or malformed identity headers.
// Dependencies: axum, tutormesh-core
// ============================================================================

//! ## Overview
//! The gateway performs JWT validation and forwards the authenticated caller
//! as two trusted headers: `X-Consumer-Username` and `X-Consumer-Role`.
//! This module turns those headers into an [`IdentityContext`] and rejects
//! requests where either header is missing or malformed. Student identities
//! are additionally checked against the identifier pattern; teacher and
//! admin principals carry gateway-scoped names outside that pattern.

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::http::HeaderMap;
use tutormesh_core::IdentityContext;
use tutormesh_core::PlaneError;
use tutormesh_core::Role;
use tutormesh_core::StudentId;
use tutormesh_core::core::validate::is_valid_student_identity;

// ============================================================================
// SECTION: Headers
// ============================================================================

/// Header carrying the authenticated caller identity.
pub const HEADER_USERNAME: &str = "x-consumer-username";
/// Header carrying the caller role claim.
pub const HEADER_ROLE: &str = "x-consumer-role";
/// Header carrying the optional request idempotency key.
pub const HEADER_IDEMPOTENCY_KEY: &str = "idempotency-key";

// ============================================================================
// SECTION: Extraction
// ============================================================================

/// Extracts the caller identity from gateway headers.
///
/// # Errors
///
/// Returns [`PlaneError::Authentication`] when either header is missing or
/// malformed.
pub fn identity_from_headers(headers: &HeaderMap) -> Result<IdentityContext, PlaneError> {
    let username = header_value(headers, HEADER_USERNAME)?;
    let role_raw = header_value(headers, HEADER_ROLE)?;

    let role = Role::parse(role_raw).ok_or_else(|| PlaneError::Authentication {
        reason: "unknown role claim".to_string(),
    })?;
    if role == Role::Student && !is_valid_student_identity(username) {
        return Err(PlaneError::Authentication {
            reason: "student identity does not match the required pattern".to_string(),
        });
    }
    Ok(IdentityContext::new(StudentId::new(username), role))
}

/// Reads a required header as a non-empty string.
fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, PlaneError> {
    let value = headers
        .get(name)
        .ok_or_else(|| PlaneError::Authentication {
            reason: format!("missing {name} header"),
        })?
        .to_str()
        .map_err(|_| PlaneError::Authentication {
            reason: format!("malformed {name} header"),
        })?;
    if value.is_empty() {
        return Err(PlaneError::Authentication {
            reason: format!("empty {name} header"),
        });
    }
    Ok(value)
}
