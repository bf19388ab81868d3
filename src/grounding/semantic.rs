//! Semantic grounding: nearest-neighbour search over alias embeddings
//!
//! The question is embedded whole and compared against the alias index. Hits
//! closer than the distance threshold become prompt context lines; the question
//! text itself is never rewritten.

use crate::error::Result;
use crate::grounding::{AppliedMapping, Grounder, GroundingResult, GroundingStrategy};
use crate::mapping::SourceLocation;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// One nearest-neighbour hit from an alias index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexHit {
    pub alias: String,
    pub canonical: String,
    /// Lower is more similar
    pub distance: f32,
    pub source: SourceLocation,
}

/// Read side of an alias vector index
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// The `k` nearest aliases to `text`, closest first
    async fn query(&self, text: &str, k: usize) -> Result<Vec<IndexHit>>;
}

/// Format one context line for a hit
pub fn context_line(hit: &IndexHit) -> String {
    format!(
        "- User term similar to '{}' should map to Canonical Value: '{}'",
        hit.alias, hit.canonical
    )
}

/// Semantic grounding that reports index failures to the caller
pub async fn try_ground_semantic(
    question: &str,
    index: &dyn VectorIndex,
    k: usize,
    threshold: f32,
) -> Result<GroundingResult> {
    let mut result = GroundingResult::passthrough(question);
    if k == 0 {
        return Ok(result);
    }

    let hits = index.query(question, k).await?;
    let mut seen = HashSet::new();

    for hit in hits {
        // strict: a hit exactly at the threshold is rejected
        if hit.distance.is_nan() || hit.distance >= threshold {
            debug!(
                "Rejected '{}' -> '{}' at distance {:.4}",
                hit.alias, hit.canonical, hit.distance
            );
            continue;
        }

        let line = context_line(&hit);
        if !seen.insert(line.clone()) {
            continue;
        }
        result.context.push(line);
        result
            .applied_mappings
            .push(AppliedMapping::semantic(hit.alias, hit.canonical, hit.distance));
    }

    Ok(result)
}

/// Semantic grounding that never fails: an unavailable index yields no context
pub async fn ground_semantic(
    question: &str,
    index: &dyn VectorIndex,
    k: usize,
    threshold: f32,
) -> GroundingResult {
    match try_ground_semantic(question, index, k, threshold).await {
        Ok(result) => result,
        Err(e) => {
            warn!("Semantic grounding unavailable, continuing without context: {}", e);
            GroundingResult::passthrough(question)
        }
    }
}

/// Semantic strategy over an injected index
pub struct SemanticGrounder {
    index: Arc<dyn VectorIndex>,
    top_k: usize,
    threshold: f32,
}

impl SemanticGrounder {
    pub fn new(index: Arc<dyn VectorIndex>, top_k: usize, threshold: f32) -> Self {
        Self {
            index,
            top_k,
            threshold,
        }
    }
}

#[async_trait]
impl Grounder for SemanticGrounder {
    fn strategy(&self) -> GroundingStrategy {
        GroundingStrategy::Semantic
    }

    async fn ground(&self, question: &str) -> Result<GroundingResult> {
        try_ground_semantic(question, self.index.as_ref(), self.top_k, self.threshold).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SptsError;
    use crate::grounding::ResolutionKind;

    struct FixedIndex(Vec<IndexHit>);

    #[async_trait]
    impl VectorIndex for FixedIndex {
        async fn query(&self, _text: &str, k: usize) -> Result<Vec<IndexHit>> {
            Ok(self.0.iter().take(k).cloned().collect())
        }
    }

    struct DownIndex;

    #[async_trait]
    impl VectorIndex for DownIndex {
        async fn query(&self, _text: &str, _k: usize) -> Result<Vec<IndexHit>> {
            Err(SptsError::IndexUnavailable("connection refused".to_string()))
        }
    }

    fn hit(alias: &str, canonical: &str, distance: f32) -> IndexHit {
        IndexHit {
            alias: alias.to_string(),
            canonical: canonical.to_string(),
            distance,
            source: SourceLocation::new("schools", "County"),
        }
    }

    #[tokio::test]
    async fn test_threshold_is_strict() {
        let threshold = 1.5_f32;
        let index = FixedIndex(vec![
            hit("ny", "New York", threshold),
            hit("new york city", "New York", threshold - 1e-4),
        ]);

        let result = ground_semantic("Count schools in NY", &index, 3, threshold).await;
        assert_eq!(result.grounded_text, "Count schools in NY");
        assert_eq!(result.applied_mappings.len(), 1);
        assert_eq!(result.applied_mappings[0].original, "new york city");
        assert_eq!(result.applied_mappings[0].kind, ResolutionKind::SemanticSimilarity);
        assert_eq!(
            result.context,
            vec!["- User term similar to 'new york city' should map to Canonical Value: 'New York'"]
        );
    }

    #[tokio::test]
    async fn test_identical_lines_are_deduplicated() {
        let index = FixedIndex(vec![
            hit("sf", "San Francisco", 0.2),
            hit("sf", "San Francisco", 0.3),
            hit("frisco", "San Francisco", 0.4),
        ]);
        let result = ground_semantic("schools in sf", &index, 3, 1.5).await;
        assert_eq!(result.context.len(), 2);
        assert!(result.context[0].contains("'sf'"));
        assert!(result.context[1].contains("'frisco'"));
    }

    #[tokio::test]
    async fn test_respects_k() {
        let index = FixedIndex(vec![hit("a", "A", 0.1), hit("b", "B", 0.2)]);
        let result = ground_semantic("q", &index, 1, 1.5).await;
        assert_eq!(result.context.len(), 1);

        let result = ground_semantic("q", &index, 0, 1.5).await;
        assert!(result.context.is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_index_degrades() {
        let result = ground_semantic("Count schools in NY", &DownIndex, 3, 1.5).await;
        assert_eq!(result, GroundingResult::passthrough("Count schools in NY"));

        let err = try_ground_semantic("Count schools in NY", &DownIndex, 3, 1.5).await.unwrap_err();
        assert!(matches!(err, SptsError::IndexUnavailable(_)));

        let grounder = SemanticGrounder::new(Arc::new(DownIndex), 3, 1.5);
        assert!(Grounder::ground(&grounder, "q").await.is_err());
    }

    #[tokio::test]
    async fn test_nothing_under_threshold() {
        let index = FixedIndex(vec![hit("ny", "New York", 1.9)]);
        let result = ground_semantic("hello", &index, 3, 1.5).await;
        assert!(result.context_block().is_none());
        assert!(!result.is_grounded());
    }
}
