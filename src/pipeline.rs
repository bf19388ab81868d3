//! Baseline vs. grounded comparison
//!
//! question -> grounding -> {baseline SQL, grounded SQL} -> {baseline rows, grounded rows}
//!
//! Both sides run sequentially. A grounder failure only means the grounded side
//! sees the question unchanged.

use crate::config::SptsConfig;
use crate::embedding::OpenAiEmbedder;
use crate::error::Result;
use crate::executor::{QueryOutcome, SqlExecutor};
use crate::grounding::{Grounder, GroundingResult, GroundingStrategy, LexicalGrounder, SemanticGrounder};
use crate::llm::LlmClient;
use crate::sql_generator::{GeneratedSql, GenerationMode, SchemaContext, SqlGenerator};
use crate::vector_store::{AliasIndex, EmbeddedAliasIndex};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub sql: GeneratedSql,
    pub result: QueryOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub question: String,
    pub strategy: GroundingStrategy,
    pub grounding: GroundingResult,
    /// Why grounding information was unavailable, if it was
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grounding_error: Option<String>,
    pub baseline: RunOutcome,
    pub grounded: RunOutcome,
}

pub struct Pipeline {
    grounder: Arc<dyn Grounder>,
    generator: SqlGenerator,
    executor: SqlExecutor,
}

impl Pipeline {
    pub fn new(grounder: Arc<dyn Grounder>, generator: SqlGenerator, executor: SqlExecutor) -> Self {
        Self {
            grounder,
            generator,
            executor,
        }
    }

    /// Wire the pipeline from configuration
    pub fn from_config(config: &SptsConfig) -> Result<Self> {
        let oracle = Arc::new(LlmClient::new(
            config.api_key.clone(),
            config.llm_model.clone(),
            config.llm_base_url.clone(),
            config.oracle_timeout,
        )?);
        let schema = if config.table == "schools" {
            SchemaContext::schools()
        } else {
            SchemaContext::new(config.table.clone(), format!("Table: {}", config.table))
        };

        Ok(Self::new(
            build_grounder(config)?,
            SqlGenerator::new(oracle, schema),
            SqlExecutor::new(config.db_path.clone()),
        ))
    }

    pub async fn ground(&self, question: &str) -> (GroundingResult, Option<String>) {
        match self.grounder.ground(question).await {
            Ok(result) => (result, None),
            Err(e) => {
                warn!("Grounding unavailable, using the question as typed: {}", e);
                (GroundingResult::passthrough(question), Some(e.to_string()))
            }
        }
    }

    pub async fn compare(&self, question: &str) -> ComparisonReport {
        info!("Question: {}", question);
        let (grounding, grounding_error) = self.ground(question).await;
        info!(
            "Grounded with {} mapping(s): {}",
            grounding.applied_mappings.len(),
            grounding.grounded_text
        );

        let baseline_sql = self
            .generator
            .generate(question, GenerationMode::Baseline, None)
            .await;
        // semantic grounding always reports its lookup, even an empty one
        let context = match self.grounder.strategy() {
            GroundingStrategy::Semantic => Some(grounding.context_block().unwrap_or_default()),
            GroundingStrategy::Lexical => None,
        };
        let grounded_sql = self
            .generator
            .generate(&grounding.grounded_text, GenerationMode::Grounded, context.as_deref())
            .await;

        let baseline_result = self.executor.execute(&baseline_sql.sql);
        let grounded_result = self.executor.execute(&grounded_sql.sql);

        ComparisonReport {
            question: question.to_string(),
            strategy: self.grounder.strategy(),
            grounding,
            grounding_error,
            baseline: RunOutcome {
                sql: baseline_sql,
                result: baseline_result,
            },
            grounded: RunOutcome {
                sql: grounded_sql,
                result: grounded_result,
            },
        }
    }
}

/// Select and load the configured grounding strategy.
///
/// Missing artifacts degrade to a grounder that finds nothing.
pub fn build_grounder(config: &SptsConfig) -> Result<Arc<dyn Grounder>> {
    match config.strategy {
        GroundingStrategy::Lexical => Ok(Arc::new(LexicalGrounder::from_path(&config.mapping_path))),
        GroundingStrategy::Semantic => {
            let embedder = Arc::new(OpenAiEmbedder::new(
                config.embedding_api_key.clone(),
                config.embedding_base_url.clone(),
                config.embedding_model.clone(),
                config.oracle_timeout,
            )?);
            let index = AliasIndex::load(&config.index_path).unwrap_or_else(|e| {
                warn!("{}; semantic grounding will return no context", e);
                AliasIndex::new(0)
            });
            Ok(Arc::new(SemanticGrounder::new(
                Arc::new(EmbeddedAliasIndex::new(index, embedder)),
                config.top_k,
                config.distance_threshold,
            )))
        }
    }
}
