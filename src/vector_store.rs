//! Alias Vector Store
//!
//! In-memory vector index over alias strings. Every document points an alias
//! embedding back at its canonical value, so a nearest-neighbour hit resolves
//! straight to a database value.
//!
//! Distances are squared Euclidean (lower = closer). For unit-normalised
//! embeddings this equals `2 - 2 * cosine_similarity`.

use crate::embedding::{Embedder, Embedding};
use crate::error::{Result, SptsError};
use crate::grounding::{IndexHit, VectorIndex};
use crate::mapping::{AliasMapping, SourceLocation};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Alias document in the vector store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasDocument {
    pub id: String,
    pub alias: String,
    pub canonical: String,
    #[serde(flatten)]
    pub source: SourceLocation,
    pub embedding: Embedding,
}

/// Search result from the vector store
#[derive(Debug, Clone)]
pub struct SearchResult<'a> {
    pub document: &'a AliasDocument,
    pub distance: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AliasIndex {
    dimension: usize,
    built_at: DateTime<Utc>,
    documents: Vec<AliasDocument>,
}

impl AliasIndex {
    /// Create an empty index; `dimension` 0 adopts the first document's dimension
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            built_at: Utc::now(),
            documents: Vec::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn documents(&self) -> &[AliasDocument] {
        &self.documents
    }

    /// Add a document; documents of the wrong dimension are rejected
    pub fn add_document(&mut self, document: AliasDocument) -> bool {
        if self.dimension == 0 && self.documents.is_empty() {
            self.dimension = document.embedding.len();
        }
        if document.embedding.len() != self.dimension {
            warn!(
                "Embedding dimension {} doesn't match index dimension {}, skipping '{}'",
                document.embedding.len(),
                self.dimension,
                document.alias
            );
            return false;
        }
        self.documents.push(document);
        true
    }

    /// Embed every alias of `mapping` once and index one document per candidate.
    ///
    /// Aliases whose embedding fails are logged and left out.
    pub async fn build(mapping: &AliasMapping, embedder: &dyn Embedder) -> Self {
        let mut index = Self::new(0);
        let mut failed = 0usize;

        for entry in mapping.entries() {
            let embedding = match embedder.embed(entry.alias).await {
                Ok(embedding) => embedding,
                Err(e) => {
                    warn!("Could not embed alias '{}': {}", entry.alias, e);
                    failed += 1;
                    continue;
                }
            };

            for candidate in entry.candidates {
                index.add_document(AliasDocument {
                    id: uuid::Uuid::new_v4().to_string(),
                    alias: entry.alias.to_string(),
                    canonical: candidate.canonical.clone(),
                    source: candidate.source.clone(),
                    embedding: embedding.clone(),
                });
            }
        }

        info!(
            "Indexed {} alias documents ({} aliases failed to embed)",
            index.len(),
            failed
        );
        index
    }

    /// The `top_k` nearest documents, closest first
    pub fn search(&self, query_embedding: &[f32], top_k: usize) -> Result<Vec<SearchResult<'_>>> {
        if self.documents.is_empty() {
            return Ok(Vec::new());
        }

        if query_embedding.len() != self.dimension {
            return Err(SptsError::IndexUnavailable(format!(
                "Query embedding dimension {} doesn't match index dimension {}",
                query_embedding.len(),
                self.dimension
            )));
        }

        let mut results: Vec<SearchResult<'_>> = self
            .documents
            .iter()
            .map(|document| SearchResult {
                document,
                distance: squared_euclidean(query_embedding, &document.embedding),
            })
            .collect();

        results.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(top_k);
        Ok(results)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let encoded = serde_json::to_string(self)?;
        std::fs::write(path, encoded)?;
        info!("Saved alias index ({} documents) to {}", self.len(), path.display());
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let encoded = std::fs::read_to_string(path).map_err(|e| {
            SptsError::IndexUnavailable(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let index: AliasIndex = serde_json::from_str(&encoded).map_err(|e| {
            SptsError::IndexUnavailable(format!("Malformed index {}: {}", path.display(), e))
        })?;

        if let Some(bad) = index.documents.iter().find(|d| d.embedding.len() != index.dimension) {
            return Err(SptsError::IndexUnavailable(format!(
                "Document '{}' has dimension {}, index declares {}",
                bad.alias,
                bad.embedding.len(),
                index.dimension
            )));
        }

        info!(
            "Loaded alias index with {} documents (built {})",
            index.len(),
            index.built_at
        );
        Ok(index)
    }
}

fn squared_euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Alias index paired with the embedder that produced it
pub struct EmbeddedAliasIndex {
    index: AliasIndex,
    embedder: Arc<dyn Embedder>,
}

impl EmbeddedAliasIndex {
    pub fn new(index: AliasIndex, embedder: Arc<dyn Embedder>) -> Self {
        Self { index, embedder }
    }
}

#[async_trait]
impl VectorIndex for EmbeddedAliasIndex {
    async fn query(&self, text: &str, k: usize) -> Result<Vec<IndexHit>> {
        if self.index.is_empty() {
            return Ok(Vec::new());
        }

        let query_embedding = self
            .embedder
            .embed(text)
            .await
            .map_err(|e| SptsError::IndexUnavailable(format!("Query embedding failed: {}", e)))?;

        let hits = self
            .index
            .search(&query_embedding, k)?
            .into_iter()
            .map(|r| IndexHit {
                alias: r.document.alias.clone(),
                canonical: r.document.canonical.clone(),
                distance: r.distance,
                source: r.document.source.clone(),
            })
            .collect();
        Ok(hits)
    }
}
