use async_trait::async_trait;
use spts::grounding::{ground, ground_semantic, Grounder, GroundingResult, LexicalGrounder, SemanticGrounder};
use spts::llm::CompletionOracle;
use spts::mapping::{AliasMapping, CanonicalMatch, SourceLocation};
use spts::synonyms::{CanonicalValue, SynonymGraphBuilder};
use spts::vector_store::{AliasIndex, EmbeddedAliasIndex};
use spts::{Result, SptsError};
use std::collections::HashMap;
use std::sync::Arc;

fn vlkg_document() -> &'static str {
    r#"{
        "lausd": [{"canonical": "Los Angeles Unified", "table": "schools", "column": "District"}],
        "la":    [{"canonical": "Los Angeles", "table": "schools", "column": "City"}],
        "ny":    [{"canonical": "New York", "table": "schools", "column": "County"}]
    }"#
}

#[test]
fn test_end_to_end_lausd() {
    let mapping = AliasMapping::from_json_str(
        r#"{"lausd": [{"canonical": "Los Angeles Unified", "table": "schools", "column": "District"}]}"#,
    )
    .unwrap();

    let result = ground("Count schools in LAUSD", &mapping);
    assert_eq!(result.grounded_text, "Count schools in 'Los Angeles Unified'");
    assert_eq!(
        serde_json::to_value(&result.applied_mappings).unwrap(),
        serde_json::json!([{"original": "lausd", "grounded": "Los Angeles Unified", "kind": "EntityResolution"}])
    );
}

#[test]
fn test_longest_match_and_boundaries_from_artifact() {
    let mapping = AliasMapping::from_json_str(vlkg_document()).unwrap();

    let result = ground("Count schools in LAUSD", &mapping);
    assert_eq!(result.grounded_text, "Count schools in 'Los Angeles Unified'");
    assert_eq!(result.applied_mappings.len(), 1);

    let result = ground("Does anyone know", &mapping);
    assert_eq!(result, GroundingResult::passthrough("Does anyone know"));

    let again = ground("Count schools in 'Los Angeles Unified'", &mapping);
    assert!(again.applied_mappings.is_empty());
    assert_eq!(again.grounded_text, "Count schools in 'Los Angeles Unified'");
}

#[test]
fn test_malformed_artifact_degrades_to_passthrough() {
    let path = std::env::temp_dir().join(format!("vlkg-bad-{}.json", uuid::Uuid::new_v4()));
    std::fs::write(&path, r#"{"lausd": "Los Angeles Unified"}"#).unwrap();

    assert!(matches!(AliasMapping::load(&path), Err(SptsError::MappingLoad(_))));
    let grounder = LexicalGrounder::from_path(&path);
    let result = grounder.ground_text("Count schools in LAUSD");
    assert_eq!(result, GroundingResult::passthrough("Count schools in LAUSD"));
    std::fs::remove_file(&path).ok();
}

struct SynonymOracle;

#[async_trait]
impl CompletionOracle for SynonymOracle {
    async fn complete(&self, _system_prompt: &str, user_prompt: &str) -> Result<String> {
        if user_prompt.contains("\"Los Angeles Unified\"") {
            Ok(r#"{"synonyms": ["LAUSD", "LA Unified", "L.A. Schools"]}"#.to_string())
        } else {
            Err(SptsError::Oracle("rate limited".to_string()))
        }
    }
}

#[tokio::test]
async fn test_built_graph_grounds_questions() {
    let builder = SynonymGraphBuilder::new(Arc::new(SynonymOracle));
    let values = vec![
        CanonicalValue::new("Los Angeles Unified", "schools", "District"),
        CanonicalValue::new("San Francisco Unified", "schools", "District"),
    ];
    let mapping = builder.build(&values).await;

    // round-trip through the persisted artifact
    let path = std::env::temp_dir().join(format!("vlkg-{}.json", uuid::Uuid::new_v4()));
    mapping.save(&path).unwrap();
    let grounder = LexicalGrounder::from_path(&path);
    std::fs::remove_file(&path).ok();

    let result = Grounder::ground(&grounder, "Magnet schools in LA Unified and SFU").await.unwrap();
    assert_eq!(
        result.grounded_text,
        "Magnet schools in 'Los Angeles Unified' and 'San Francisco Unified'"
    );
    assert_eq!(result.applied_mappings.len(), 2);
    assert_eq!(result.applied_mappings[0].original, "la unified");
    assert_eq!(result.applied_mappings[1].original, "sfu");

    let exact = grounder.ground_text("Schools in Los Angeles Unified");
    assert_eq!(exact.grounded_text, "Schools in 'Los Angeles Unified'");
}

struct AxisEmbedder(HashMap<&'static str, Vec<f32>>);

#[async_trait]
impl spts::embedding::Embedder for AxisEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.0
            .get(text)
            .cloned()
            .ok_or_else(|| SptsError::Oracle(format!("cannot embed '{}'", text)))
    }
}

#[tokio::test]
async fn test_semantic_grounding_over_built_index() {
    let mapping = AliasMapping::from_json_str(vlkg_document()).unwrap();
    let mut vectors = HashMap::new();
    vectors.insert("lausd", vec![1.0, 0.0, 0.0]);
    vectors.insert("la", vec![0.8, 0.6, 0.0]);
    vectors.insert("ny", vec![0.0, 0.0, 1.0]);
    vectors.insert("How many LA unified schools?", vec![0.9, 0.1, 0.0]);
    let embedder = Arc::new(AxisEmbedder(vectors));

    let index = AliasIndex::build(&mapping, embedder.as_ref()).await;
    assert_eq!(index.len(), 3);
    let store = EmbeddedAliasIndex::new(index, embedder);

    let question = "How many LA unified schools?";
    let result = ground_semantic(question, &store, 3, 0.5).await;
    assert_eq!(result.grounded_text, question);
    // lausd at 0.02, la at 0.26, ny at 1.82 (over threshold)
    assert_eq!(
        result.context,
        vec![
            "- User term similar to 'lausd' should map to Canonical Value: 'Los Angeles Unified'",
            "- User term similar to 'la' should map to Canonical Value: 'Los Angeles'",
        ]
    );

    // embedding failure for the question: empty context, never an error
    let result = ground_semantic("unembeddable", &store, 3, 0.5).await;
    assert!(result.context.is_empty());

    let grounder = SemanticGrounder::new(Arc::new(store), 3, 0.5);
    assert!(Grounder::ground(&grounder, "unembeddable").await.is_err());
}

#[test]
fn test_candidates_keep_insertion_order() {
    let mut mapping = AliasMapping::new();
    mapping.insert("sd", CanonicalMatch::new("San Diego Unified", SourceLocation::new("schools", "District")));
    mapping.insert("sd", CanonicalMatch::new("San Diego", SourceLocation::new("schools", "County")));

    let result = ground("schools in SD", &mapping);
    assert_eq!(result.grounded_text, "schools in 'San Diego Unified'");
}
