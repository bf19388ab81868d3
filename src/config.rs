//! Runtime configuration from environment variables (a `.env` file is honoured by the binary)

use crate::error::{Result, SptsError};
use crate::grounding::GroundingStrategy;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SptsConfig {
    pub api_key: String,
    pub llm_base_url: String,
    pub llm_model: String,
    pub embedding_api_key: String,
    pub embedding_base_url: String,
    pub embedding_model: String,
    pub db_path: PathBuf,
    pub mapping_path: PathBuf,
    pub index_path: PathBuf,
    pub table: String,
    pub strategy: GroundingStrategy,
    pub top_k: usize,
    pub distance_threshold: f32,
    pub oracle_timeout: Duration,
}

impl Default for SptsConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            llm_base_url: "https://api.groq.com/openai/v1".to_string(),
            llm_model: "llama-3.3-70b-versatile".to_string(),
            embedding_api_key: String::new(),
            embedding_base_url: "https://api.openai.com/v1".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            db_path: PathBuf::from("data/bird_mini_dev.sqlite"),
            mapping_path: PathBuf::from("kg/vlkg.json"),
            index_path: PathBuf::from("kg/vlkg_index.json"),
            table: "schools".to_string(),
            strategy: GroundingStrategy::Lexical,
            top_k: 3,
            distance_threshold: 1.5,
            oracle_timeout: Duration::from_secs(30),
        }
    }
}

impl SptsConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or blank keys keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(key) = get("API_KEY").or_else(|| get("OPENAI_API_KEY")) {
            config.api_key = key;
        }
        config.embedding_api_key = get("EMBEDDING_API_KEY")
            .or_else(|| get("OPENAI_API_KEY"))
            .unwrap_or_else(|| config.api_key.clone());

        if let Some(v) = get("LLM_BASE_URL") {
            config.llm_base_url = v;
        }
        if let Some(v) = get("LLM_MODEL") {
            config.llm_model = v;
        }
        if let Some(v) = get("EMBEDDING_BASE_URL") {
            config.embedding_base_url = v;
        }
        if let Some(v) = get("EMBEDDING_MODEL") {
            config.embedding_model = v;
        }
        if let Some(v) = get("SPTS_DB_PATH") {
            config.db_path = PathBuf::from(v);
        }
        if let Some(v) = get("SPTS_MAPPING_PATH") {
            config.mapping_path = PathBuf::from(v);
        }
        if let Some(v) = get("SPTS_INDEX_PATH") {
            config.index_path = PathBuf::from(v);
        }
        if let Some(v) = get("SPTS_TABLE") {
            config.table = v;
        }
        if let Some(v) = get("SPTS_GROUNDING") {
            config.strategy = v.parse()?;
        }
        if let Some(v) = get("SPTS_TOP_K") {
            config.top_k = parse_value("SPTS_TOP_K", &v)?;
        }
        if let Some(v) = get("SPTS_DISTANCE_THRESHOLD") {
            config.distance_threshold = parse_value("SPTS_DISTANCE_THRESHOLD", &v)?;
        }
        if let Some(v) = get("SPTS_ORACLE_TIMEOUT_SECS") {
            config.oracle_timeout = Duration::from_secs(parse_value("SPTS_ORACLE_TIMEOUT_SECS", &v)?);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.distance_threshold.is_finite() || self.distance_threshold <= 0.0 {
            return Err(SptsError::Config(format!(
                "Distance threshold must be a positive number, got {}",
                self.distance_threshold
            )));
        }
        if self.oracle_timeout.is_zero() {
            return Err(SptsError::Config("Oracle timeout must be at least one second".to_string()));
        }
        Ok(())
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.is_empty()
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| SptsError::Config(format!("Invalid {}='{}': {}", key, value, e)))
}
