//! Code generation capability.
//!
//! The language model is a black box behind [`CodeGenerator`]. [`LlmClient`] talks to an
//! OpenAI-compatible chat completions endpoint; [`RetryPolicy`] adds bounded exponential
//! backoff for rate limiting only.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Failures of the generation capability itself, as opposed to bad generated content.
#[derive(Error, Debug, Clone)]
pub enum GenerationError {
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("LLM API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("no content in LLM response")]
    EmptyContent,

    #[error("LLM request failed: {0}")]
    Http(String),
}

impl GenerationError {
    /// The only class worth waiting out.
    pub fn is_resource_exhausted(&self) -> bool {
        matches!(self, GenerationError::ResourceExhausted(_))
    }
}

#[async_trait]
pub trait CodeGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.0,
            timeout_secs: 120,
        }
    }
}

pub struct LlmClient {
    settings: LlmSettings,
    http: reqwest::Client,
}

impl LlmClient {
    pub fn new(settings: LlmSettings) -> Result<Self, GenerationError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| GenerationError::Http(e.to_string()))?;
        Ok(Self { settings, http })
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }
}

fn classify_status(status: reqwest::StatusCode, body: String) -> GenerationError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        GenerationError::ResourceExhausted(body)
    } else if status.is_server_error() {
        GenerationError::Unavailable(format!("{}: {}", status, body))
    } else {
        GenerationError::Api {
            status: status.as_u16(),
            message: body,
        }
    }
}

fn classify_transport(e: reqwest::Error) -> GenerationError {
    if e.is_connect() || e.is_timeout() {
        GenerationError::Unavailable(e.to_string())
    } else {
        GenerationError::Http(e.to_string())
    }
}

#[async_trait]
impl CodeGenerator for LlmClient {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let body = serde_json::json!({
            "model": self.settings.model,
            "messages": [
                {"role": "user", "content": prompt}
            ],
            "temperature": self.settings.temperature,
        });

        let response = self
            .http
            .post(format!(
                "{}/chat/completions",
                self.settings.base_url.trim_end_matches('/')
            ))
            .header("Authorization", format!("Bearer {}", self.settings.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, text));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GenerationError::Http(format!("Failed to parse LLM response: {}", e)))?;

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .filter(|c| !c.trim().is_empty())
            .ok_or(GenerationError::EmptyContent)?;

        debug!("LLM returned {} chars", content.len());
        Ok(content.to_string())
    }
}

/// Bounded exponential backoff, applied only to `ResourceExhausted`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub multiplier: Duration,
    pub min_wait: Duration,
    pub max_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            multiplier: Duration::from_secs(2),
            min_wait: Duration::from_secs(4),
            max_wait: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// A policy with no waiting, for callers that must not sleep.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            multiplier: Duration::ZERO,
            min_wait: Duration::ZERO,
            max_wait: Duration::ZERO,
        }
    }

    /// Wait after the `attempt`-th failure (1-based).
    pub fn wait_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        let wait = self.multiplier.saturating_mul(factor);
        wait.clamp(self.min_wait, self.max_wait.max(self.min_wait))
    }

    pub async fn generate_with_retry<G: CodeGenerator + ?Sized>(
        &self,
        generator: &G,
        prompt: &str,
    ) -> Result<String, GenerationError> {
        let mut attempt = 1;
        loop {
            match generator.generate(prompt).await {
                Err(e) if e.is_resource_exhausted() && attempt < self.max_attempts => {
                    let wait = self.wait_for(attempt);
                    warn!(
                        "⏳ Generation rate-limited (attempt {}/{}), retrying in {:?}",
                        attempt, self.max_attempts, wait
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_wait_schedule() {
        let policy = RetryPolicy::default();
        let waits: Vec<u64> = (1..5).map(|n| policy.wait_for(n).as_secs()).collect();
        assert_eq!(waits, vec![4, 4, 8, 16]);
        assert_eq!(policy.wait_for(10).as_secs(), 30);
    }

    #[test]
    fn test_status_classification() {
        assert!(classify_status(reqwest::StatusCode::TOO_MANY_REQUESTS, String::new())
            .is_resource_exhausted());
        assert!(matches!(
            classify_status(reqwest::StatusCode::BAD_GATEWAY, String::new()),
            GenerationError::Unavailable(_)
        ));
        assert!(matches!(
            classify_status(reqwest::StatusCode::UNAUTHORIZED, String::new()),
            GenerationError::Api { status: 401, .. }
        ));
    }

    struct Flaky {
        failures: u32,
        calls: AtomicU32,
        error: GenerationError,
    }

    #[async_trait]
    impl CodeGenerator for Flaky {
        async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(self.error.clone())
            } else {
                Ok("{}".to_string())
            }
        }
    }

    #[tokio::test]
    async fn test_retries_only_resource_exhaustion() {
        let policy = RetryPolicy::immediate(5);

        let limited = Flaky {
            failures: 2,
            calls: AtomicU32::new(0),
            error: GenerationError::ResourceExhausted("429".into()),
        };
        assert!(policy.generate_with_retry(&limited, "p").await.is_ok());
        assert_eq!(limited.calls.load(Ordering::SeqCst), 3);

        let down = Flaky {
            failures: 2,
            calls: AtomicU32::new(0),
            error: GenerationError::Unavailable("down".into()),
        };
        assert!(policy.generate_with_retry(&down, "p").await.is_err());
        assert_eq!(down.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let policy = RetryPolicy::immediate(5);
        let always = Flaky {
            failures: u32::MAX,
            calls: AtomicU32::new(0),
            error: GenerationError::ResourceExhausted("429".into()),
        };
        assert!(policy.generate_with_retry(&always, "p").await.is_err());
        assert_eq!(always.calls.load(Ordering::SeqCst), 5);
    }
}
