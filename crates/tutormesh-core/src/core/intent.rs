// tutormesh-core/src/core/intent.rs
// ============================================================================
// Module: Tutormesh Intent Model
// Description: Intent tags, classification output, and the routing table.
// Purpose: Provide tagged intent variants with a constant intent→agent map.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Intents are a closed tagged enum: the four primary classification tags
//! plus the review fallback used when classification confidence falls below
//! the routing floor. The intent→agent table is a constant mapping; there is
//! no dynamic dispatch on intent strings.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::AgentId;

// ============================================================================
// SECTION: Intent Tags
// ============================================================================

/// Classified intent of a student query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentTag {
    /// Help with a concrete error or broken code.
    SyntaxHelp,
    /// Request for a conceptual explanation.
    ConceptExplanation,
    /// Request for practice material.
    ExerciseRequest,
    /// Question about learning progress.
    ProgressCheck,
    /// Low-confidence fallback routed to the review agent.
    Review,
}

impl IntentTag {
    /// Primary classification tags in tie-break priority order.
    pub const PRIMARY: [Self; 4] =
        [Self::SyntaxHelp, Self::ProgressCheck, Self::ExerciseRequest, Self::ConceptExplanation];

    /// Returns a stable label for the tag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SyntaxHelp => "syntax_help",
            Self::ConceptExplanation => "concept_explanation",
            Self::ExerciseRequest => "exercise_request",
            Self::ProgressCheck => "progress_check",
            Self::Review => "review",
        }
    }

    /// Returns the downstream agent bound to the tag.
    #[must_use]
    pub const fn target_agent(self) -> &'static str {
        match self {
            Self::SyntaxHelp => "debug",
            Self::ConceptExplanation => "concepts",
            Self::ExerciseRequest => "exercise",
            Self::ProgressCheck => "progress",
            Self::Review => "review",
        }
    }

    /// Returns the downstream agent as an owned identifier.
    #[must_use]
    pub fn target_agent_id(self) -> AgentId {
        AgentId::new(self.target_agent())
    }
}

// ============================================================================
// SECTION: Classification
// ============================================================================

/// Output of the intent classifier.
///
/// # Invariants
/// - `confidence` lies in `[0, 1]`.
/// - `extracted_keywords` holds at most ten deduplicated tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// Winning intent tag (the review tag marks the fallback path).
    pub intent_tag: IntentTag,
    /// Classifier confidence in `[0, 1]`.
    pub confidence: f64,
    /// Matcher patterns that fired, deduplicated and capped.
    pub extracted_keywords: Vec<String>,
    /// Version label of the classifier that produced this output.
    pub classifier_version: String,
}
