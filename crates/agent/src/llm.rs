use std::time::Duration;

use async_trait::async_trait;
use mailquote_core::config::{LlmConfig, LlmProvider};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_OUTPUT_TOKENS: u32 = 2048;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("llm request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
    #[error("llm transport failure: {0}")]
    Transport(String),
    #[error("llm endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("llm response could not be decoded: {0}")]
    Decode(String),
    #[error("llm client misconfigured: {0}")]
    Configuration(String),
}

impl LlmError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Transport(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Decode(_) | Self::Configuration(_) => false,
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, LlmError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 1, base_delay_ms: 500, max_delay_ms: 4_000 }
    }
}

impl RetryPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let multiplier = 1_u64 << attempt.min(16);
        Duration::from_millis(self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms))
    }
}

/// One HTTP client for the OpenAI, Anthropic and Ollama chat endpoints.
pub struct HttpLlmClient {
    http: Client,
    provider: LlmProvider,
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
    timeout_secs: u64,
    retry: RetryPolicy,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| LlmError::Configuration(error.to_string()))?;
        let base_url = config
            .base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .unwrap_or(match config.provider {
                LlmProvider::OpenAi => OPENAI_BASE_URL,
                LlmProvider::Anthropic => ANTHROPIC_BASE_URL,
                LlmProvider::Ollama => OLLAMA_BASE_URL,
            })
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            http,
            provider: config.provider,
            base_url,
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            timeout_secs: config.timeout_secs,
            retry: RetryPolicy { max_retries: config.max_retries, ..RetryPolicy::default() },
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn attempt(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        let (path, body) = request_body(self.provider, &self.model, system, prompt);
        let mut request = self.http.post(format!("{}{}", self.base_url, path)).json(&body);
        match (self.provider, self.api_key.as_ref()) {
            (LlmProvider::OpenAi, Some(key)) => {
                request = request.bearer_auth(key.expose_secret());
            }
            (LlmProvider::Anthropic, Some(key)) => {
                request = request
                    .header("x-api-key", key.expose_secret())
                    .header("anthropic-version", ANTHROPIC_VERSION);
            }
            (LlmProvider::OpenAi | LlmProvider::Anthropic, None) => {
                return Err(LlmError::Configuration("api key is not configured".to_string()));
            }
            (LlmProvider::Ollama, _) => {}
        }

        let response = request.send().await.map_err(|error| {
            if error.is_timeout() {
                LlmError::Timeout { timeout_secs: self.timeout_secs }
            } else {
                LlmError::Transport(error.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status { status: status.as_u16(), body: truncate(&body, 300) });
        }

        let payload: Value =
            response.json().await.map_err(|error| LlmError::Decode(error.to_string()))?;
        response_text(self.provider, &payload)
            .ok_or_else(|| LlmError::Decode("response carried no message text".to_string()))
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        let mut attempt = 0;
        loop {
            match self.attempt(system, prompt).await {
                Ok(text) => {
                    debug!(
                        event_name = "llm.completion.received",
                        model = %self.model,
                        attempt,
                        chars = text.len(),
                        "llm completion received"
                    );
                    return Ok(text);
                }
                Err(error) if error.is_retryable() && attempt < self.retry.max_retries => {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        event_name = "llm.completion.retry",
                        model = %self.model,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "llm call failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

/// Endpoint path and JSON body for one chat completion.
pub fn request_body(
    provider: LlmProvider,
    model: &str,
    system: &str,
    prompt: &str,
) -> (&'static str, Value) {
    match provider {
        LlmProvider::OpenAi => (
            "/chat/completions",
            json!({
                "model": model,
                "temperature": 0,
                "response_format": {"type": "json_object"},
                "messages": [
                    {"role": "system", "content": system},
                    {"role": "user", "content": prompt}
                ]
            }),
        ),
        LlmProvider::Anthropic => (
            "/v1/messages",
            json!({
                "model": model,
                "max_tokens": MAX_OUTPUT_TOKENS,
                "temperature": 0,
                "system": system,
                "messages": [{"role": "user", "content": prompt}]
            }),
        ),
        LlmProvider::Ollama => (
            "/api/chat",
            json!({
                "model": model,
                "stream": false,
                "format": "json",
                "options": {"temperature": 0},
                "messages": [
                    {"role": "system", "content": system},
                    {"role": "user", "content": prompt}
                ]
            }),
        ),
    }
}

/// Pulls the assistant text out of a provider response.
pub fn response_text(provider: LlmProvider, payload: &Value) -> Option<String> {
    let text = match provider {
        LlmProvider::OpenAi => payload.pointer("/choices/0/message/content")?.as_str()?.to_string(),
        LlmProvider::Anthropic => {
            let blocks = payload.get("content")?.as_array()?;
            blocks
                .iter()
                .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|block| block.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("")
        }
        LlmProvider::Ollama => payload.pointer("/message/content")?.as_str()?.to_string(),
    };
    (!text.trim().is_empty()).then_some(text)
}

fn truncate(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use mailquote_core::config::LlmProvider;
    use serde_json::json;

    use super::{request_body, response_text, LlmError, RetryPolicy};

    #[test]
    fn request_bodies_follow_each_provider_shape() {
        let (path, body) = request_body(LlmProvider::Anthropic, "claude", "sys", "mail");
        assert_eq!(path, "/v1/messages");
        assert_eq!(body["system"], "sys");
        assert_eq!(body["messages"][0]["content"], "mail");

        let (path, body) = request_body(LlmProvider::Ollama, "llama3.1", "sys", "mail");
        assert_eq!(path, "/api/chat");
        assert_eq!(body["stream"], false);
        assert_eq!(body["format"], "json");

        let (path, body) = request_body(LlmProvider::OpenAi, "gpt", "sys", "mail");
        assert_eq!(path, "/chat/completions");
        assert_eq!(body["messages"][0]["role"], "system");
    }

    #[test]
    fn response_text_is_extracted_per_provider() {
        let openai = json!({"choices": [{"message": {"content": "{\"a\":1}"}}]});
        assert_eq!(response_text(LlmProvider::OpenAi, &openai).as_deref(), Some("{\"a\":1}"));

        let anthropic = json!({"content": [
            {"type": "text", "text": "{\"a\":"},
            {"type": "text", "text": "1}"}
        ]});
        assert_eq!(response_text(LlmProvider::Anthropic, &anthropic).as_deref(), Some("{\"a\":1}"));

        let ollama = json!({"message": {"role": "assistant", "content": "  "}});
        assert_eq!(response_text(LlmProvider::Ollama, &ollama), None);
    }

    #[test]
    fn only_transient_failures_are_retried() {
        assert!(LlmError::Timeout { timeout_secs: 60 }.is_retryable());
        assert!(LlmError::Status { status: 503, body: String::new() }.is_retryable());
        assert!(LlmError::Status { status: 429, body: String::new() }.is_retryable());
        assert!(!LlmError::Status { status: 400, body: String::new() }.is_retryable());
        assert!(!LlmError::Decode("eof".to_string()).is_retryable());
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_millis(500));
        assert_eq!(policy.backoff(1), Duration::from_millis(1_000));
        assert_eq!(policy.backoff(10), Duration::from_millis(4_000));
    }
}
