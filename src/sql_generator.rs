//! SQL Generation Adapter
//!
//! Formats one single-shot request to the generation oracle and cleans up the
//! answer. Oracle failures never reach the caller: they come back as a no-op
//! statement annotated with the error so it can be displayed and executed safely.

use crate::llm::{strip_code_fences, CompletionOracle};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

const SYSTEM_PROMPT: &str = "You are a SQL expert. Output ONLY valid SQLite code. No Markdown.";

const GROUNDED_NOTE: &str =
    "NOTE: Use the exact string values from the question for WHERE clauses. Do not invent abbreviations.";

/// Schema description handed to the oracle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaContext {
    /// Table queried by the error fallback statement
    pub table: String,
    pub description: String,
}

impl SchemaContext {
    pub fn new(table: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            description: description.into(),
        }
    }

    /// The demo schema: BIRD mini-dev `schools`
    pub fn schools() -> Self {
        Self::new(
            "schools",
            "Table: schools\nColumns: School (text), District (text), County (text), City (text), Magnet (boolean)",
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GenerationMode {
    /// The raw user question
    Baseline,
    /// A grounded question; semantic grounding also passes its context
    Grounded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedSql {
    pub sql: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct SqlGenerator {
    oracle: Arc<dyn CompletionOracle>,
    schema: SchemaContext,
}

impl SqlGenerator {
    pub fn new(oracle: Arc<dyn CompletionOracle>, schema: SchemaContext) -> Self {
        Self { oracle, schema }
    }

    /// Build the user prompt for one generation call.
    ///
    /// `context` is `None` when no semantic lookup ran, and blank when one ran
    /// but found nothing.
    pub fn user_prompt(&self, question: &str, mode: GenerationMode, context: Option<&str>) -> String {
        let mut prompt = format!("Schema: {}\nQuestion: {}", self.schema.description, question);

        if mode == GenerationMode::Grounded {
            prompt.push('\n');
            prompt.push_str(GROUNDED_NOTE);
            match context.map(str::trim) {
                Some("") => {
                    prompt.push_str("\n\n(No specific semantic mappings found, use standard SQL matching)");
                }
                Some(context) => {
                    prompt.push_str("\n\nSEMANTIC PROFILER KNOWLEDGE:\n");
                    prompt.push_str(context);
                    prompt.push_str("\n\n(Use the 'Canonical Value' for WHERE clauses)");
                }
                None => {}
            }
        }

        prompt
    }

    pub async fn generate(
        &self,
        question: &str,
        mode: GenerationMode,
        context: Option<&str>,
    ) -> GeneratedSql {
        let prompt = self.user_prompt(question, mode, context);
        match self.oracle.complete(SYSTEM_PROMPT, &prompt).await {
            Ok(response) => GeneratedSql {
                sql: strip_code_fences(&response),
                error: None,
            },
            Err(e) => {
                warn!("SQL generation failed ({:?}): {}", mode, e);
                let message = e.to_string().replace('\n', " ");
                GeneratedSql {
                    sql: format!("SELECT * FROM {} WHERE 1=0; -- Error: {}", self.schema.table, message),
                    error: Some(message),
                }
            }
        }
    }
}
