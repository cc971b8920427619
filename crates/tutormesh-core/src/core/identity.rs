// tutormesh-core/src/core/identity.rs
// ============================================================================
// Module: Tutormesh Identity Context
// Description: Request-scoped caller identity and role derived at the gateway.
// Purpose: Provide fail-closed access checks without re-verifying JWTs.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! The gateway authenticates callers and forwards the student identity and
//! role as trusted headers. This module models that request-scoped identity
//! and the access rules derived from it. The core never re-verifies JWT
//! signatures; the trust boundary is the gateway.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::StudentId;

// ============================================================================
// SECTION: Roles
// ============================================================================

/// Caller role asserted by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// A student reading and submitting their own records.
    Student,
    /// A teacher with read access across students.
    Teacher,
    /// An administrator with read and compliance access.
    Admin,
}

impl Role {
    /// Parses the gateway role header value. Unknown values fail closed.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "student" => Some(Self::Student),
            "teacher" => Some(Self::Teacher),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    /// Returns a stable label for the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Teacher => "teacher",
            Self::Admin => "admin",
        }
    }

    /// Returns the permission labels granted to the role.
    #[must_use]
    pub const fn permissions(self) -> &'static [&'static str] {
        match self {
            Self::Student => &["triage:submit", "mastery:read:self"],
            Self::Teacher => &["triage:submit", "mastery:read:self", "mastery:read:any"],
            Self::Admin => &[
                "triage:submit",
                "mastery:read:self",
                "mastery:read:any",
                "compliance:export",
                "compliance:erase",
            ],
        }
    }
}

// ============================================================================
// SECTION: Identity Context
// ============================================================================

/// Request-scoped authenticated caller identity.
///
/// # Invariants
/// - Immutable for the lifetime of a request.
/// - Constructed only from gateway-injected headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityContext {
    /// Authenticated caller identity.
    pub student_identity: StudentId,
    /// Caller role.
    pub role: Role,
}

impl IdentityContext {
    /// Creates an identity context.
    #[must_use]
    pub const fn new(student_identity: StudentId, role: Role) -> Self {
        Self {
            student_identity,
            role,
        }
    }

    /// Returns the permission labels granted to this caller.
    #[must_use]
    pub const fn permissions(&self) -> &'static [&'static str] {
        self.role.permissions()
    }

    /// Returns true when the caller may read records for `subject`.
    #[must_use]
    pub fn may_read(&self, subject: &StudentId) -> bool {
        match self.role {
            Role::Student => &self.student_identity == subject,
            Role::Teacher | Role::Admin => true,
        }
    }

    /// Returns true when the caller may submit a triage request for `subject`.
    #[must_use]
    pub fn may_act_for(&self, subject: &StudentId) -> bool {
        self.may_read(subject)
    }

    /// Returns true when the caller may export records for `subject`.
    ///
    /// Export is permitted for administrators and for the subject themself
    /// (data portability); teachers have read access but no export access.
    #[must_use]
    pub fn may_export(&self, subject: &StudentId) -> bool {
        self.role == Role::Admin || &self.student_identity == subject
    }

    /// Returns true when the caller may erase records. Erasure is
    /// administrator-only.
    #[must_use]
    pub fn may_erase(&self) -> bool {
        self.role == Role::Admin
    }
}
