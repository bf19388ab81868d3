//! Lexical grounding: longest-match alias substitution
//!
//! Aliases are tried longest first so that "lausd" wins over "la". Matches must
//! sit on word boundaries, and text already rewritten is closed to further
//! matching. A quoted literal the user typed stays closed only when it already
//! names a canonical value; a quoted alias is replaced quotes and all.

use crate::error::Result;
use crate::grounding::{AppliedMapping, Grounder, GroundingResult, GroundingStrategy};
use crate::mapping::AliasMapping;
use async_trait::async_trait;
use itertools::Itertools;
use regex::{Regex, RegexBuilder};
use std::cmp::Reverse;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, warn};

/// Ground a question against a mapping in one shot.
///
/// Compiles the mapping on every call; use [`LexicalGrounder`] when the same
/// mapping serves many questions.
pub fn ground(question: &str, mapping: &AliasMapping) -> GroundingResult {
    AliasMatcher::new(mapping).ground(question)
}

/// Piece of the question under rewrite
#[derive(Debug, Clone, PartialEq)]
enum Segment {
    /// Original text, still open to matching
    Open(String),
    /// Substituted value or quoted canonical value; never matched again
    Consumed(String),
    /// Inner text of a quoted literal that is not a canonical value
    Quoted(String),
}

struct CompiledAlias {
    alias: String,
    canonical: String,
    pattern: Regex,
}

/// Aliases of a mapping compiled and ordered for longest-first matching
pub struct AliasMatcher {
    aliases: Vec<CompiledAlias>,
    canonicals: HashSet<String>,
}

impl AliasMatcher {
    pub fn new(mapping: &AliasMapping) -> Self {
        let mut aliases: Vec<CompiledAlias> = mapping
            .entries()
            .filter_map(|entry| {
                let default = entry.default_match()?;
                let pattern = match alias_pattern(entry.alias) {
                    Ok(p) => p,
                    Err(e) => {
                        warn!("Skipping alias '{}': {}", entry.alias, e);
                        return None;
                    }
                };
                Some(CompiledAlias {
                    alias: entry.alias.to_string(),
                    canonical: default.canonical.clone(),
                    pattern,
                })
            })
            .collect();

        aliases.sort_by(|a, b| {
            (Reverse(a.alias.chars().count()), &a.alias)
                .cmp(&(Reverse(b.alias.chars().count()), &b.alias))
        });

        let canonicals = mapping
            .entries()
            .flat_map(|entry| entry.candidates.iter().map(|c| c.canonical.clone()))
            .collect();

        Self { aliases, canonicals }
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    pub fn ground(&self, question: &str) -> GroundingResult {
        let mut segments = split_quoted_literals(question, &self.canonicals);
        let mut applied = Vec::new();

        for alias in &self.aliases {
            let mut hit = false;
            let mut rewritten = Vec::with_capacity(segments.len());

            for segment in segments {
                let text = match segment {
                    Segment::Open(text) => text,
                    Segment::Quoted(inner) => {
                        let trimmed = inner.trim();
                        let spans = find_bounded(&alias.pattern, trimmed);
                        if spans.is_empty() {
                            rewritten.push(Segment::Quoted(inner));
                            continue;
                        }
                        if spans == [(0, trimmed.len())] {
                            hit = true;
                            rewritten.push(Segment::Consumed(format!("'{}'", alias.canonical)));
                            continue;
                        }
                        // alias is only part of the literal: ground it like open text
                        format!("'{}'", inner)
                    }
                    consumed => {
                        rewritten.push(consumed);
                        continue;
                    }
                };

                let spans = find_bounded(&alias.pattern, &text);
                if spans.is_empty() {
                    rewritten.push(Segment::Open(text));
                    continue;
                }

                hit = true;
                let mut last = 0;
                for (start, end) in spans {
                    if start > last {
                        rewritten.push(Segment::Open(text[last..start].to_string()));
                    }
                    rewritten.push(Segment::Consumed(format!("'{}'", alias.canonical)));
                    last = end;
                }
                if last < text.len() {
                    rewritten.push(Segment::Open(text[last..].to_string()));
                }
            }

            segments = rewritten;
            if hit {
                debug!("Grounded '{}' -> '{}'", alias.alias, alias.canonical);
                applied.push(AppliedMapping::entity(&alias.alias, &alias.canonical));
            }
        }

        let grounded_text = segments
            .into_iter()
            .map(|segment| match segment {
                Segment::Open(text) | Segment::Consumed(text) => text,
                Segment::Quoted(inner) => format!("'{}'", inner),
            })
            .collect::<String>();

        GroundingResult {
            grounded_text,
            applied_mappings: applied,
            context: Vec::new(),
        }
    }
}

/// Case-insensitive pattern for an alias; inner whitespace matches any run of whitespace
fn alias_pattern(alias: &str) -> std::result::Result<Regex, regex::Error> {
    let pattern = alias.split_whitespace().map(regex::escape).join(r"\s+");
    RegexBuilder::new(&pattern).case_insensitive(true).build()
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn boundary_before(text: &str, idx: usize) -> bool {
    text[..idx].chars().next_back().map_or(true, |c| !is_word_char(c))
}

fn boundary_after(text: &str, idx: usize) -> bool {
    text[idx..].chars().next().map_or(true, |c| !is_word_char(c))
}

/// Non-overlapping matches of `pattern` in `text` that sit on word boundaries
fn find_bounded(pattern: &Regex, text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut pos = 0;

    while pos <= text.len() {
        let Some(m) = pattern.find_at(text, pos) else {
            break;
        };
        if m.start() == m.end() {
            break;
        }
        if boundary_before(text, m.start()) && boundary_after(text, m.end()) {
            spans.push((m.start(), m.end()));
            pos = m.end();
        } else {
            // retry from the next character; a later overlapping start may still be bounded
            pos = m.start() + text[m.start()..].chars().next().map_or(1, |c| c.len_utf8());
        }
    }

    spans
}

/// Split out single-quoted literals the question already carries.
///
/// A literal opens at a `'` not preceded by a word character and closes at the
/// next `'` not followed by one, so apostrophes ("LA's", "don't") stay open text.
/// Literals naming a canonical value exactly are already grounded.
fn split_quoted_literals(text: &str, canonicals: &HashSet<String>) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut open_start = 0;
    let mut search_from = 0;

    while let Some(rel) = text[search_from..].find('\'') {
        let start = search_from + rel;
        search_from = start + 1;
        if !boundary_before(text, start) {
            continue;
        }
        if let Some(end) = closing_quote(text, start + 1) {
            if open_start < start {
                segments.push(Segment::Open(text[open_start..start].to_string()));
            }
            let inner = &text[start + 1..end];
            if canonicals.contains(inner) {
                segments.push(Segment::Consumed(text[start..=end].to_string()));
            } else {
                segments.push(Segment::Quoted(inner.to_string()));
            }
            open_start = end + 1;
            search_from = end + 1;
        }
    }

    if open_start < text.len() {
        segments.push(Segment::Open(text[open_start..].to_string()));
    }
    segments
}

fn closing_quote(text: &str, from: usize) -> Option<usize> {
    let mut pos = from;
    while let Some(rel) = text[pos..].find('\'') {
        let idx = pos + rel;
        if boundary_after(text, idx + 1) {
            return Some(idx);
        }
        pos = idx + 1;
    }
    None
}

/// Lexical strategy over a preloaded mapping
pub struct LexicalGrounder {
    matcher: AliasMatcher,
}

impl LexicalGrounder {
    pub fn new(mapping: &AliasMapping) -> Self {
        Self {
            matcher: AliasMatcher::new(mapping),
        }
    }

    /// Load the mapping artifact; a missing or malformed file yields a pass-through grounder
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        Self::new(&AliasMapping::load_or_empty(path))
    }

    pub fn ground_text(&self, question: &str) -> GroundingResult {
        self.matcher.ground(question)
    }
}

#[async_trait]
impl Grounder for LexicalGrounder {
    fn strategy(&self) -> GroundingStrategy {
        GroundingStrategy::Lexical
    }

    async fn ground(&self, question: &str) -> Result<GroundingResult> {
        Ok(self.matcher.ground(question))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{CanonicalMatch, SourceLocation};

    fn mapping(pairs: &[(&str, &str)]) -> AliasMapping {
        let mut mapping = AliasMapping::new();
        for (alias, canonical) in pairs {
            mapping.insert(
                alias,
                CanonicalMatch::new(*canonical, SourceLocation::new("schools", "District")),
            );
        }
        mapping
    }

    #[test]
    fn test_longest_match_wins() {
        let m = mapping(&[("la", "Los Angeles"), ("lausd", "Los Angeles Unified")]);
        let result = ground("Count schools in LAUSD", &m);
        assert_eq!(result.grounded_text, "Count schools in 'Los Angeles Unified'");
        assert_eq!(result.applied_mappings, vec![AppliedMapping::entity("lausd", "Los Angeles Unified")]);
    }

    #[test]
    fn test_word_boundary() {
        let m = mapping(&[("ny", "New York")]);
        let result = ground("Does anyone know", &m);
        assert_eq!(result.grounded_text, "Does anyone know");
        assert!(result.applied_mappings.is_empty());

        let result = ground("Schools in NY?", &m);
        assert_eq!(result.grounded_text, "Schools in 'New York'?");
    }

    #[test]
    fn test_shorter_alias_cannot_rematch_consumed_span() {
        let m = mapping(&[("la unified", "Los Angeles Unified"), ("la", "Los Angeles")]);
        let result = ground("Magnet schools in LA Unified vs LA", &m);
        assert_eq!(
            result.grounded_text,
            "Magnet schools in 'Los Angeles Unified' vs 'Los Angeles'"
        );
        assert_eq!(result.applied_mappings.len(), 2);
        assert_eq!(result.applied_mappings[0].original, "la unified");
        assert_eq!(result.applied_mappings[1].original, "la");
    }

    #[test]
    fn test_alias_inside_inserted_value_is_not_matched() {
        let m = mapping(&[("lausd", "Los Angeles Unified"), ("los", "Los Osos")]);
        let result = ground("lausd", &m);
        assert_eq!(result.grounded_text, "'Los Angeles Unified'");
        assert_eq!(result.applied_mappings.len(), 1);
    }

    #[test]
    fn test_multiple_occurrences_single_entry() {
        let m = mapping(&[("sf", "San Francisco")]);
        let result = ground("SF schools vs sf charters", &m);
        assert_eq!(result.grounded_text, "'San Francisco' schools vs 'San Francisco' charters");
        assert_eq!(result.applied_mappings.len(), 1);
    }

    #[test]
    fn test_whitespace_in_multiword_alias() {
        let m = mapping(&[("la unified", "Los Angeles Unified")]);
        let result = ground("schools in LA   Unified", &m);
        assert_eq!(result.grounded_text, "schools in 'Los Angeles Unified'");
    }

    #[test]
    fn test_punctuated_alias() {
        let m = mapping(&[("l.a. schools", "Los Angeles Unified")]);
        let result = ground("How many in L.A. Schools?", &m);
        assert_eq!(result.grounded_text, "How many in 'Los Angeles Unified'?");
    }

    #[test]
    fn test_apostrophes_are_not_literals() {
        let m = mapping(&[("la", "Los Angeles")]);
        let result = ground("What's LA's biggest school", &m);
        // "LA's": the quote after LA is not a word char so LA is bounded
        assert_eq!(result.grounded_text, "What's 'Los Angeles''s biggest school");
    }

    #[test]
    fn test_regrounding_is_idempotent() {
        let m = mapping(&[
            ("lausd", "Los Angeles Unified"),
            ("los angeles unified", "Los Angeles Unified"),
        ]);
        let first = ground("Count schools in LAUSD", &m);
        let second = ground(&first.grounded_text, &m);
        assert_eq!(second.grounded_text, first.grounded_text);
        assert!(second.applied_mappings.is_empty());
    }

    #[test]
    fn test_quoted_alias_is_grounded() {
        let m = mapping(&[
            ("lausd", "Los Angeles Unified"),
            ("la", "Los Angeles"),
            ("los angeles unified", "Los Angeles Unified"),
        ]);
        let result = ground("Show schools where district = 'LAUSD'", &m);
        assert_eq!(result.grounded_text, "Show schools where district = 'Los Angeles Unified'");
        assert_eq!(result.applied_mappings, vec![AppliedMapping::entity("lausd", "Los Angeles Unified")]);

        // a quoted canonical value is left alone
        let result = ground("district = 'Los Angeles Unified'", &m);
        assert_eq!(result.grounded_text, "district = 'Los Angeles Unified'");
        assert!(result.applied_mappings.is_empty());

        // same words in other case are still an alias
        let result = ground("district = 'los angeles unified'", &m);
        assert_eq!(result.grounded_text, "district = 'Los Angeles Unified'");
        assert_eq!(result.applied_mappings[0].original, "los angeles unified");
    }

    #[test]
    fn test_alias_inside_longer_literal() {
        let m = mapping(&[("la", "Los Angeles")]);
        let result = ground("named 'LA Prep' or 'Oakland'", &m);
        assert_eq!(result.grounded_text, "named ''Los Angeles' Prep' or 'Oakland'");
        assert_eq!(result.applied_mappings.len(), 1);
    }

    #[test]
    fn test_empty_mapping_passthrough() {
        let m = AliasMapping::new();
        for q in ["", "Count schools in LAUSD", "'quoted' text"] {
            let result = ground(q, &m);
            assert_eq!(result, GroundingResult::passthrough(q));
        }
    }

    #[test]
    fn test_split_quoted_literals() {
        let canonicals: HashSet<String> = ["Los Angeles".to_string()].into_iter().collect();
        let segments = split_quoted_literals("in 'Los Angeles' or 'LA' and don't", &canonicals);
        assert_eq!(
            segments,
            vec![
                Segment::Open("in ".to_string()),
                Segment::Consumed("'Los Angeles'".to_string()),
                Segment::Open(" or ".to_string()),
                Segment::Quoted("LA".to_string()),
                Segment::Open(" and don't".to_string()),
            ]
        );
        assert_eq!(
            split_quoted_literals("'unterminated", &canonicals),
            vec![Segment::Open("'unterminated".to_string())]
        );
    }

    #[tokio::test]
    async fn test_grounder_trait() {
        let grounder = LexicalGrounder::new(&mapping(&[("lausd", "Los Angeles Unified")]));
        assert_eq!(grounder.strategy(), GroundingStrategy::Lexical);
        let result = Grounder::ground(&grounder, "Count schools in LAUSD").await.unwrap();
        assert!(result.is_grounded());
    }
}
