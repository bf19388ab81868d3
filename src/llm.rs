use crate::error::{Result, SptsError};
use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;

/// Text completion service (the generation oracle)
#[async_trait]
pub trait CompletionOracle: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}

/// Chat-completions client for OpenAI-compatible endpoints (OpenAI, Groq, ...)
///
/// One attempt per call, bounded by the client timeout. No retries.
#[derive(Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
}

impl LlmClient {
    pub fn new(api_key: String, model: String, base_url: String, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SptsError::Oracle(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            temperature: 0.0,
        })
    }

    async fn call_llm(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt}
            ],
            "temperature": self.temperature,
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| SptsError::Oracle(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(SptsError::Oracle(format!("LLM API error ({}): {}", status, error_text)));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SptsError::Oracle(format!("Failed to parse LLM response: {}", e)))?;

        extract_content(&response_json)
    }
}

/// Pull the first choice's message content out of a chat-completions response
fn extract_content(response_json: &serde_json::Value) -> Result<String> {
    if let Some(error) = response_json.get("error") {
        return Err(SptsError::Oracle(format!("LLM API error: {}", error)));
    }

    let choice = response_json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| SptsError::Oracle("No choices in LLM response".to_string()))?;

    match choice.get("finish_reason").and_then(|r| r.as_str()) {
        Some("length") => warn!("LLM response was truncated due to length limit"),
        Some("content_filter") => {
            return Err(SptsError::Oracle("LLM response was filtered by content policy".to_string()))
        }
        _ => {}
    }

    let content = choice["message"]["content"]
        .as_str()
        .ok_or_else(|| SptsError::Oracle("No content in LLM response".to_string()))?;

    if content.trim().is_empty() {
        return Err(SptsError::Oracle("Empty content in LLM response".to_string()));
    }

    Ok(content.to_string())
}

#[async_trait]
impl CompletionOracle for LlmClient {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.call_llm(system_prompt, user_prompt).await
    }
}

/// Strip markdown code fences an LLM wraps around its answer
pub fn strip_code_fences(response: &str) -> String {
    lazy_static::lazy_static! {
        static ref FENCE: regex::Regex = regex::Regex::new(r"```[A-Za-z]*").unwrap();
    }
    FENCE.replace_all(response, "").trim().to_string()
}
