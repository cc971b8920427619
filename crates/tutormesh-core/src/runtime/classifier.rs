// tutormesh-core/src/runtime/classifier.rs
// ============================================================================
// Module: Tutormesh Intent Classifier
// Description: Deterministic rule-based classification with LLM fallback.
// Purpose: Produce an intent tag, confidence, and keywords per query.
// Dependencies: crate::core, crate::interfaces, tokio
// ============================================================================

//! ## Overview
//! The primary path is deterministic: each intent carries an ordered matcher
//! list applied to the lowercased query; matches accumulate integer scores
//! and the highest score wins, with ties broken by the fixed priority order.
//! Confidence saturates at three matches. Below the routing floor the query
//! falls back to the review path. An optional LLM classifier may be
//! consulted under configuration; its result is used only when it answers
//! within budget — on error or timeout the deterministic result stands.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use crate::core::intent::Classification;
use crate::core::intent::IntentTag;
use crate::interfaces::LlmClassifier;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Version label stamped on every classifier output.
pub const CLASSIFIER_VERSION: &str = "rules-v1";
/// Confidence below which the query routes to the review fallback.
pub const CONFIDENCE_FLOOR: f64 = 0.6;
/// Confidence assigned to the review fallback.
pub const FALLBACK_CONFIDENCE: f64 = 0.4;
/// Match count at which confidence saturates.
const SCORE_SATURATION: f64 = 3.0;
/// Maximum keywords returned per classification.
const MAX_KEYWORDS: usize = 10;
/// Maximum characters per returned keyword.
const MAX_KEYWORD_CHARS: usize = 50;

/// Matchers for syntax-help queries.
const SYNTAX_HELP_PATTERNS: &[&str] = &[
    "error",
    "typeerror",
    "syntaxerror",
    "exception",
    "traceback",
    "crash",
    "broken",
    "not working",
    "doesn't work",
    "fix",
    "debug",
    "line",
];

/// Matchers for progress-check queries.
const PROGRESS_CHECK_PATTERNS: &[&str] = &[
    "progress",
    "score",
    "mastery",
    "how am i doing",
    "how far",
    "level",
    "stats",
    "improve",
    "track",
];

/// Matchers for exercise-request queries.
const EXERCISE_REQUEST_PATTERNS: &[&str] = &[
    "practice",
    "exercise",
    "challenge",
    "quiz me",
    "problem",
    "another one",
    "give me",
    "drill",
    "try",
];

/// Matchers for concept-explanation queries.
const CONCEPT_EXPLANATION_PATTERNS: &[&str] = &[
    "what is",
    "what are",
    "explain",
    "how does",
    "how do",
    "why",
    "understand",
    "concept",
    "difference between",
    "mean",
];

/// Returns the matcher list bound to a primary intent.
const fn patterns_for(intent: IntentTag) -> &'static [&'static str] {
    match intent {
        IntentTag::SyntaxHelp => SYNTAX_HELP_PATTERNS,
        IntentTag::ProgressCheck => PROGRESS_CHECK_PATTERNS,
        IntentTag::ExerciseRequest => EXERCISE_REQUEST_PATTERNS,
        IntentTag::ConceptExplanation | IntentTag::Review => CONCEPT_EXPLANATION_PATTERNS,
    }
}

// ============================================================================
// SECTION: Classifier
// ============================================================================

/// Intent classifier with a deterministic primary path.
pub struct IntentClassifier {
    /// Optional LLM classifier consulted under configuration.
    llm: Option<Arc<dyn LlmClassifier>>,
    /// Budget for the LLM consult.
    llm_budget: Duration,
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::deterministic()
    }
}

impl IntentClassifier {
    /// Creates a classifier without an LLM consult.
    #[must_use]
    pub const fn deterministic() -> Self {
        Self {
            llm: None,
            llm_budget: Duration::ZERO,
        }
    }

    /// Creates a classifier that consults an LLM within the given budget.
    #[must_use]
    pub fn with_llm(llm: Arc<dyn LlmClassifier>, budget: Duration) -> Self {
        Self {
            llm: Some(llm),
            llm_budget: budget,
        }
    }

    /// Classifies a query, preferring the LLM result only when it answers
    /// within budget.
    pub async fn classify(&self, query: &str) -> Classification {
        let deterministic = Self::classify_rules(query);
        let Some(llm) = &self.llm else {
            return deterministic;
        };
        match tokio::time::timeout(self.llm_budget, llm.classify(query)).await {
            Ok(Ok(classification)) => sanitize(classification),
            Ok(Err(_)) | Err(_) => deterministic,
        }
    }

    /// Deterministic rule-based classification.
    #[must_use]
    pub fn classify_rules(query: &str) -> Classification {
        let lowered = query.to_lowercase();
        let mut winner = IntentTag::PRIMARY[0];
        let mut winning_score = 0_u32;
        let mut fired: Vec<String> = Vec::new();

        for intent in IntentTag::PRIMARY {
            let mut score = 0_u32;
            for pattern in patterns_for(intent) {
                if lowered.contains(pattern) {
                    score = score.saturating_add(1);
                    if !fired.iter().any(|existing| existing == pattern) {
                        fired.push((*pattern).to_string());
                    }
                }
            }
            // Strict comparison keeps the fixed priority order on ties.
            if score > winning_score {
                winner = intent;
                winning_score = score;
            }
        }

        let confidence = (f64::from(winning_score) / SCORE_SATURATION).min(1.0);
        resolve(winner, confidence, fired)
    }
}

/// Applies the confidence floor and assembles the classification output.
fn resolve(winner: IntentTag, confidence: f64, keywords: Vec<String>) -> Classification {
    if confidence < CONFIDENCE_FLOOR {
        return Classification {
            intent_tag: IntentTag::Review,
            confidence: FALLBACK_CONFIDENCE,
            extracted_keywords: cap_keywords(keywords),
            classifier_version: CLASSIFIER_VERSION.to_string(),
        };
    }
    Classification {
        intent_tag: winner,
        confidence,
        extracted_keywords: cap_keywords(keywords),
        classifier_version: CLASSIFIER_VERSION.to_string(),
    }
}

/// Caps keyword count and length.
fn cap_keywords(mut keywords: Vec<String>) -> Vec<String> {
    keywords.truncate(MAX_KEYWORDS);
    for keyword in &mut keywords {
        if keyword.chars().count() > MAX_KEYWORD_CHARS {
            *keyword = keyword.chars().take(MAX_KEYWORD_CHARS).collect();
        }
    }
    keywords
}

/// Clamps and caps an LLM-produced classification before use.
fn sanitize(mut classification: Classification) -> Classification {
    classification.confidence = classification.confidence.clamp(0.0, 1.0);
    classification.extracted_keywords = cap_keywords(classification.extracted_keywords);
    classification
}

// ============================================================================
// SECTION: Boundary Helper
// ============================================================================

/// Applies the routing floor to an externally supplied confidence. Exposed so
/// boundary behavior is testable independently of the matcher tables.
#[must_use]
pub fn apply_confidence_floor(winner: IntentTag, confidence: f64) -> Classification {
    resolve(winner, confidence, Vec::new())
}
