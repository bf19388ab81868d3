//! Grounding Engine
//!
//! Resolves user-typed entity references to values that actually exist in the
//! source database before the question reaches SQL generation. Two strategies
//! share the [`Grounder`] capability:
//!
//! - [`lexical`]: longest-match alias substitution; rewrites the question text.
//! - [`semantic`]: nearest-neighbour search over alias embeddings; leaves the
//!   question untouched and produces a context block for the prompt instead.

pub mod lexical;
pub mod semantic;

pub use lexical::{ground, LexicalGrounder};
pub use semantic::{ground_semantic, try_ground_semantic, IndexHit, SemanticGrounder, VectorIndex};

use crate::error::{Result, SptsError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How a term was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionKind {
    /// Exact alias hit in the alias mapping
    EntityResolution,
    /// Nearest-neighbour hit in the alias vector index
    SemanticSimilarity,
}

/// One resolution that was actually applied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedMapping {
    pub original: String,
    pub grounded: String,
    pub kind: ResolutionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_distance: Option<f32>,
}

impl AppliedMapping {
    pub fn entity(original: impl Into<String>, grounded: impl Into<String>) -> Self {
        Self {
            original: original.into(),
            grounded: grounded.into(),
            kind: ResolutionKind::EntityResolution,
            similarity_distance: None,
        }
    }

    pub fn semantic(original: impl Into<String>, grounded: impl Into<String>, distance: f32) -> Self {
        Self {
            original: original.into(),
            grounded: grounded.into(),
            kind: ResolutionKind::SemanticSimilarity,
            similarity_distance: Some(distance),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundingResult {
    pub grounded_text: String,
    pub applied_mappings: Vec<AppliedMapping>,
    /// Prompt context lines (semantic strategy only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,
}

impl GroundingResult {
    /// The question unchanged, with nothing applied
    pub fn passthrough(question: &str) -> Self {
        Self {
            grounded_text: question.to_string(),
            applied_mappings: Vec::new(),
            context: Vec::new(),
        }
    }

    pub fn is_grounded(&self) -> bool {
        !self.applied_mappings.is_empty()
    }

    /// Context lines joined for prompt injection, `None` when there are none
    pub fn context_block(&self) -> Option<String> {
        if self.context.is_empty() {
            None
        } else {
            Some(self.context.join("\n"))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GroundingStrategy {
    #[default]
    Lexical,
    Semantic,
}

impl FromStr for GroundingStrategy {
    type Err = SptsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "lexical" | "vlkg" => Ok(GroundingStrategy::Lexical),
            "semantic" | "vector" => Ok(GroundingStrategy::Semantic),
            other => Err(SptsError::Config(format!(
                "Unknown grounding strategy '{}' (expected 'lexical' or 'semantic')",
                other
            ))),
        }
    }
}

impl std::fmt::Display for GroundingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroundingStrategy::Lexical => write!(f, "lexical"),
            GroundingStrategy::Semantic => write!(f, "semantic"),
        }
    }
}

/// Grounding capability shared by all strategies.
///
/// `Err` means grounding information was unavailable (index down, embedding
/// failed); `Ok` with no applied mappings means nothing matched.
#[async_trait]
pub trait Grounder: Send + Sync {
    fn strategy(&self) -> GroundingStrategy;

    async fn ground(&self, question: &str) -> Result<GroundingResult>;
}
