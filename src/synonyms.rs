//! Synonym Graph Builder
//!
//! Builds the alias mapping from a snapshot of canonical column values. Each
//! value gets:
//! - 3-4 aliases predicted by the generation oracle, with the column name as context
//! - a deterministic initials alias for multi-word values ("Los Angeles Unified" -> "lau")
//! - an identity alias, so typing the exact value still grounds

use crate::error::{Result, SptsError};
use crate::llm::{strip_code_fences, CompletionOracle};
use crate::mapping::{AliasMapping, CanonicalMatch, SourceLocation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A value snapshotted from the source database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalValue {
    pub value: String,
    #[serde(flatten)]
    pub source: SourceLocation,
}

impl CanonicalValue {
    pub fn new(value: impl Into<String>, table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            source: SourceLocation::new(table, column),
        }
    }
}

const SYSTEM_PROMPT: &str = "You generate search aliases for database values. Return JSON only, no text.";

/// Counters from one build run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildStats {
    pub values: usize,
    pub oracle_failures: usize,
    pub aliases_inserted: usize,
}

pub struct SynonymGraphBuilder {
    oracle: Arc<dyn CompletionOracle>,
}

impl SynonymGraphBuilder {
    pub fn new(oracle: Arc<dyn CompletionOracle>) -> Self {
        Self { oracle }
    }

    /// Build a fresh mapping from `values`
    pub async fn build(&self, values: &[CanonicalValue]) -> AliasMapping {
        let mut mapping = AliasMapping::new();
        self.extend(&mut mapping, values).await;
        mapping
    }

    /// Add aliases for `values` to an existing mapping.
    ///
    /// Oracle failures only cost that value its generated aliases; the
    /// initials and identity aliases are still inserted.
    pub async fn extend(&self, mapping: &mut AliasMapping, values: &[CanonicalValue]) -> BuildStats {
        let mut stats = BuildStats::default();

        for value in values {
            stats.values += 1;
            let mut aliases = match self.generate_aliases(value).await {
                Ok(aliases) => aliases,
                Err(e) => {
                    warn!("Error generating aliases for '{}': {}", value.value, e);
                    stats.oracle_failures += 1;
                    Vec::new()
                }
            };

            if let Some(initials) = initials_alias(&value.value) {
                aliases.push(initials);
            }
            aliases.push(value.value.clone());

            debug!("'{}' <- {:?}", value.value, aliases);
            for alias in &aliases {
                let candidate = CanonicalMatch::new(value.value.clone(), value.source.clone());
                if mapping.insert(alias, candidate) {
                    stats.aliases_inserted += 1;
                }
            }
        }

        info!(
            "Synonym graph: {} values, {} aliases inserted, {} oracle failures",
            stats.values, stats.aliases_inserted, stats.oracle_failures
        );
        stats
    }

    async fn generate_aliases(&self, value: &CanonicalValue) -> Result<Vec<String>> {
        let prompt = format!(
            r#"Context: Database column '{}' in table '{}'.
Value: "{}".
Task: Generate 3-4 likely user abbreviations, acronyms, slang, or variations for this value.
Example: "Los Angeles Unified" -> ["LAUSD", "LA Unified", "L.A. Schools"]
Output ONLY a JSON object with key 'synonyms'."#,
            value.source.column, value.source.table, value.value
        );

        let response = self.oracle.complete(SYSTEM_PROMPT, &prompt).await?;
        parse_synonyms(&response)
    }
}

/// Parse the oracle's alias list.
///
/// Accepts `{"synonyms": [...]}`, a bare list, or an object whose first array
/// value holds the aliases. Non-string and blank items are dropped.
pub fn parse_synonyms(response: &str) -> Result<Vec<String>> {
    let cleaned = strip_code_fences(response);
    let parsed: serde_json::Value = serde_json::from_str(&cleaned)
        .map_err(|e| SptsError::Oracle(format!("Unparseable synonyms response: {}", e)))?;

    let list = match &parsed {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(fields) => fields
            .get("synonyms")
            .and_then(|v| v.as_array())
            .or_else(|| fields.values().find_map(|v| v.as_array()))
            .ok_or_else(|| SptsError::Oracle("No alias list in synonyms response".to_string()))?,
        _ => {
            return Err(SptsError::Oracle(
                "Synonyms response is neither a list nor an object".to_string(),
            ))
        }
    };

    Ok(list
        .iter()
        .filter_map(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

/// Lower-cased initials of the purely alphanumeric words of a multi-word value
pub fn initials_alias(value: &str) -> Option<String> {
    let words: Vec<&str> = value
        .split_whitespace()
        .filter(|w| w.chars().all(char::is_alphanumeric))
        .collect();
    if words.len() <= 1 {
        return None;
    }

    let initials: String = words
        .iter()
        .filter_map(|w| w.chars().next())
        .flat_map(char::to_lowercase)
        .collect();
    (initials.chars().count() > 1).then_some(initials)
}
