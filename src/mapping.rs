//! Alias Mapping - the Value-Level Knowledge Graph
//!
//! Maps user-facing surface forms (abbreviations, acronyms, misspellings) to the
//! exact values stored in the source database. Keys are case-folded; each key
//! owns an ordered candidate list whose first element is the default resolution.
//!
//! On disk the mapping is a JSON object:
//! `{"lausd": [{"canonical": "Los Angeles Unified", "table": "schools", "column": "District"}]}`

use crate::error::{Result, SptsError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

/// Where a canonical value lives in the source database
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub table: String,
    pub column: String,
}

impl SourceLocation {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }
}

/// One resolution candidate for an alias
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalMatch {
    pub canonical: String,
    #[serde(flatten)]
    pub source: SourceLocation,
}

impl CanonicalMatch {
    pub fn new(canonical: impl Into<String>, source: SourceLocation) -> Self {
        Self {
            canonical: canonical.into(),
            source,
        }
    }
}

/// A single alias together with its ordered candidates
#[derive(Debug, Clone, Copy)]
pub struct AliasEntry<'a> {
    pub alias: &'a str,
    pub candidates: &'a [CanonicalMatch],
}

impl<'a> AliasEntry<'a> {
    /// The default resolution (first inserted candidate)
    pub fn default_match(&self) -> Option<&'a CanonicalMatch> {
        self.candidates.first()
    }
}

/// Alias -> ordered canonical candidates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AliasMapping {
    entries: BTreeMap<String, Vec<CanonicalMatch>>,
}

/// Case-fold and trim an alias into its lookup key
pub fn normalize_alias(alias: &str) -> String {
    alias.trim().to_lowercase()
}

impl AliasMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a candidate for `alias`.
    ///
    /// Returns `false` when nothing changed: the alias is blank, or the same
    /// canonical value is already registered under this alias.
    pub fn insert(&mut self, alias: &str, candidate: CanonicalMatch) -> bool {
        let key = normalize_alias(alias);
        if key.is_empty() {
            return false;
        }

        let candidates = self.entries.entry(key).or_default();
        if candidates.iter().any(|c| c.canonical == candidate.canonical) {
            return false;
        }
        candidates.push(candidate);
        true
    }

    /// Candidates for an alias, matched case-insensitively
    pub fn get(&self, alias: &str) -> Option<&[CanonicalMatch]> {
        self.entries.get(&normalize_alias(alias)).map(|v| v.as_slice())
    }

    pub fn resolve(&self, alias: &str) -> Option<&CanonicalMatch> {
        self.get(alias).and_then(|c| c.first())
    }

    pub fn entries(&self) -> impl Iterator<Item = AliasEntry<'_>> {
        self.entries.iter().map(|(alias, candidates)| AliasEntry {
            alias: alias.as_str(),
            candidates: candidates.as_slice(),
        })
    }

    /// Number of distinct aliases
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse and validate a mapping document.
    ///
    /// The document is untrusted: it must be an object whose values are
    /// non-empty arrays of `{canonical, table, column}` string objects.
    pub fn from_json_str(content: &str) -> Result<Self> {
        let document: serde_json::Value = serde_json::from_str(content)
            .map_err(|e| SptsError::MappingLoad(format!("Invalid JSON: {}", e)))?;

        let object = document.as_object().ok_or_else(|| {
            SptsError::MappingLoad("Alias mapping must be a JSON object".to_string())
        })?;

        let mut mapping = AliasMapping::new();
        for (alias, value) in object {
            let items = value.as_array().ok_or_else(|| {
                SptsError::MappingLoad(format!("Entry '{}' is not a list", alias))
            })?;
            if items.is_empty() {
                return Err(SptsError::MappingLoad(format!(
                    "Entry '{}' has no candidates",
                    alias
                )));
            }

            for item in items {
                let candidate: CanonicalMatch = serde_json::from_value(item.clone()).map_err(|e| {
                    SptsError::MappingLoad(format!("Malformed candidate under '{}': {}", alias, e))
                })?;
                if candidate.canonical.is_empty() {
                    return Err(SptsError::MappingLoad(format!(
                        "Empty canonical value under '{}'",
                        alias
                    )));
                }
                mapping.insert(alias, candidate);
            }
        }

        Ok(mapping)
    }

    /// Load a mapping artifact from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SptsError::MappingLoad(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let mapping = Self::from_json_str(&content)?;
        info!("Loaded {} aliases from {}", mapping.len(), path.display());
        Ok(mapping)
    }

    /// Load a mapping artifact, degrading to an empty mapping on any failure
    pub fn load_or_empty(path: impl AsRef<Path>) -> Self {
        match Self::load(path.as_ref()) {
            Ok(mapping) => mapping,
            Err(e) => {
                warn!("{}; grounding will pass questions through unchanged", e);
                Self::new()
            }
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let encoded = serde_json::to_string_pretty(self)?;
        std::fs::write(path, encoded)?;
        info!("Saved {} aliases to {}", self.len(), path.display());
        Ok(())
    }
}
