//! Generative completion client.
//!
//! [`GenerativeClient`] is the only seam the backfill stage talks to. The
//! bundled [`OpenAiCompatClient`] speaks the OpenAI-compatible
//! `/chat/completions` protocol with a low temperature and a bounded output
//! length.

use crate::error::{Result, SdsError};
use crate::prompts::backfill::SYSTEM_PROMPT;
use futures::future::{BoxFuture, FutureExt};
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

const DEFAULT_MAX_TOKENS: u32 = 1024;
const TEMPERATURE: f64 = 0.1;

/// LLM configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
}

impl LlmConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(SdsError::Config("LLM base URL is empty".into()));
        }
        url::Url::parse(&self.base_url)
            .map_err(|e| SdsError::Config(format!("Invalid LLM base URL {}: {}", self.base_url, e)))?;
        if self.api_key.trim().is_empty() {
            return Err(SdsError::Config("LLM API key is empty".into()));
        }
        if self.model.trim().is_empty() {
            return Err(SdsError::Config("LLM model is empty".into()));
        }
        if self.max_tokens == 0 {
            return Err(SdsError::Config("LLM max_tokens must be > 0".into()));
        }
        Ok(())
    }
}

/// Text completion service.
pub trait GenerativeClient: Send + Sync {
    fn complete<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String>>;
}

/// Token usage tracking
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// OpenAI-compatible API response structures
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
}

pub struct OpenAiCompatClient {
    client: reqwest::Client,
    config: LlmConfig,
    prompt_tokens: AtomicU64,
    completion_tokens: AtomicU64,
    total_tokens: AtomicU64,
}

impl OpenAiCompatClient {
    pub fn new(config: LlmConfig, timeout: Duration) -> Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SdsError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            config,
            prompt_tokens: AtomicU64::new(0),
            completion_tokens: AtomicU64::new(0),
            total_tokens: AtomicU64::new(0),
        })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Tokens consumed so far by this client.
    pub fn usage(&self) -> TokenUsage {
        TokenUsage {
            prompt_tokens: self.prompt_tokens.load(Ordering::Relaxed),
            completion_tokens: self.completion_tokens.load(Ordering::Relaxed),
            total_tokens: self.total_tokens.load(Ordering::Relaxed),
        }
    }

    fn record_usage(&self, usage: &ApiUsage) {
        self.prompt_tokens.fetch_add(usage.prompt_tokens, Ordering::Relaxed);
        self.completion_tokens.fetch_add(usage.completion_tokens, Ordering::Relaxed);
        self.total_tokens.fetch_add(usage.total_tokens, Ordering::Relaxed);
    }

    async fn complete_impl(&self, prompt: &str) -> Result<String> {
        let request_body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": prompt}
            ],
            "temperature": TEMPERATURE,
            "max_tokens": self.config.max_tokens
        });

        let api_url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        debug!(model = %self.config.model, prompt_chars = prompt.len(), "Sending completion request");

        let response = self
            .client
            .post(&api_url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&request_body)
            .send()
            .await
            .map_err(SdsError::Network)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(SdsError::Api {
                code: status.as_u16() as i32,
                message: format!("LLM API error: {} - {}", status, error_text),
            });
        }

        let api_response: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| SdsError::Parse(format!("Failed to parse LLM response: {}", e)))?;

        if let Some(usage) = &api_response.usage {
            self.record_usage(usage);
        }

        extract_content(api_response)
    }
}

fn extract_content(response: ChatCompletionResponse) -> Result<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| SdsError::Parse("LLM response has no content".into()))
}

impl GenerativeClient for OpenAiCompatClient {
    fn complete<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String>> {
        self.complete_impl(prompt).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        let config = LlmConfig::new("https://api.example.com/v1", "sk-test", "gpt-4o-mini");
        config.validate().unwrap();
        assert_eq!(config.max_tokens, DEFAULT_MAX_TOKENS);

        let no_key = LlmConfig::new("https://api.example.com/v1", " ", "gpt-4o-mini");
        assert!(matches!(no_key.validate(), Err(SdsError::Config(_))));

        let bad_url = LlmConfig::new("not a url", "sk-test", "gpt-4o-mini");
        assert!(bad_url.validate().is_err());
    }

    #[test]
    fn test_extract_content() {
        let response: ChatCompletionResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"content":"1. Danger"}}],
                "usage":{"prompt_tokens":10,"completion_tokens":3,"total_tokens":13}}"#,
        )
        .unwrap();
        assert_eq!(extract_content(response).unwrap(), "1. Danger");

        let empty: ChatCompletionResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":null}}]}"#).unwrap();
        assert!(matches!(extract_content(empty), Err(SdsError::Parse(_))));
    }

    #[test]
    fn test_usage_accumulates() {
        let client = OpenAiCompatClient::new(
            LlmConfig::new("http://127.0.0.1:9", "sk-test", "local"),
            Duration::from_secs(1),
        )
        .unwrap();
        client.record_usage(&ApiUsage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        });
        client.record_usage(&ApiUsage {
            prompt_tokens: 1,
            completion_tokens: 1,
            total_tokens: 2,
        });
        assert_eq!(
            client.usage(),
            TokenUsage {
                prompt_tokens: 11,
                completion_tokens: 6,
                total_tokens: 17
            }
        );
        assert_eq!(client.model(), "local");
    }
}
