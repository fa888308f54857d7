//! Shared LLM client and interaction utilities
//!
//! Every classifier talks to the language model through [`CompletionClient`],
//! a plain `prompt -> text` boundary. The production implementation wraps the
//! rig OpenAI provider and applies the configured request timeout.

use std::num::NonZeroU32;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use regex::Regex;
use rig::client::CompletionClient as _;
use rig::completion::Prompt;
use rig::providers::openai;

/// Failure of a single completion call
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum LlmError {
    #[error("Completion service overloaded: {0}")]
    Overloaded(String),

    #[error("Completion request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Completion request failed: {0}")]
    Failed(String),
}

impl LlmError {
    /// Map a provider error message onto the failure taxonomy.
    ///
    /// HTTP 503/429 and "overloaded"/"rate limit" wording are treated as
    /// transient overload; anything else is a permanent failure.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        let overloaded = lower.contains("503")
            || lower.contains("429")
            || lower.contains("overloaded")
            || lower.contains("service unavailable")
            || lower.contains("rate limit");
        if overloaded {
            LlmError::Overloaded(message)
        } else {
            LlmError::Failed(message)
        }
    }

    pub fn is_overloaded(&self) -> bool {
        matches!(self, LlmError::Overloaded(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, LlmError::Timeout(_))
    }
}

/// Text completion boundary used by every classifier
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Shared LLM client wrapper
#[derive(Clone)]
pub struct LlmClient {
    client: openai::Client,
}

impl LlmClient {
    /// Create a new LLM client with the provided API key
    pub fn new(api_key: &str) -> Result<Self, LlmError> {
        let client = openai::Client::new(api_key);

        Ok(Self { client })
    }

    /// Bind the client to a model and per-request timeout
    pub fn completion(&self, model: &str, timeout: Duration) -> OpenAiCompletion {
        OpenAiCompletion {
            client: self.client.clone(),
            model: model.to_string(),
            timeout,
        }
    }
}

/// [`CompletionClient`] backed by an OpenAI chat model
#[derive(Clone)]
pub struct OpenAiCompletion {
    client: openai::Client,
    model: String,
    timeout: Duration,
}

impl OpenAiCompletion {
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompletion {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let agent = self
            .client
            .agent(&self.model)
            .temperature(0.0)
            .build();

        let start_time = std::time::Instant::now();
        let result = tokio::time::timeout(self.timeout, agent.prompt(prompt)).await;
        let elapsed = start_time.elapsed();

        match result {
            Ok(Ok(text)) => {
                tracing::debug!(
                    model = %self.model,
                    elapsed_ms = elapsed.as_millis(),
                    prompt_length = prompt.len(),
                    response_length = text.len(),
                    "OpenAI API call completed successfully"
                );
                Ok(text)
            }
            Ok(Err(e)) => {
                tracing::error!(
                    model = %self.model,
                    elapsed_ms = elapsed.as_millis(),
                    prompt_length = prompt.len(),
                    error = %e,
                    "OpenAI API call failed"
                );
                Err(LlmError::from_message(e.to_string()))
            }
            Err(_) => {
                tracing::warn!(
                    model = %self.model,
                    timeout_ms = self.timeout.as_millis(),
                    "OpenAI API call timed out"
                );
                Err(LlmError::Timeout(self.timeout))
            }
        }
    }
}

/// Request pacing owned by a single classifier
#[derive(Clone, Default)]
pub struct RateLimit {
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

impl RateLimit {
    pub fn unlimited() -> Self {
        Self { limiter: None }
    }

    /// `0` disables limiting
    pub fn per_second(requests: u32) -> Self {
        match NonZeroU32::new(requests) {
            Some(n) => Self {
                limiter: Some(Arc::new(RateLimiter::direct(Quota::per_second(n)))),
            },
            None => Self::unlimited(),
        }
    }

    pub async fn until_ready(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }
}

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^```[A-Za-z0-9_-]*\s*(.*?)\s*```$").unwrap()
});

/// Remove a surrounding markdown code fence (```json ... ```) if present
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    match CODE_FENCE.captures(trimmed).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => trimmed,
    }
}

/// Remove surrounding `"""` or ``` fences from free-text model output
pub fn strip_text_fences(text: &str) -> String {
    let mut result = text.trim();
    for fence in ["\"\"\"", "```"] {
        if let Some(rest) = result.strip_prefix(fence) {
            result = if fence == "```" { strip_language_tag(rest) } else { rest };
        }
        if let Some(rest) = result.strip_suffix(fence) {
            result = rest;
        }
        result = result.trim();
    }
    result.to_string()
}

/// Drop a fence language tag such as `markdown`, but only when it sits alone
/// on the opening line.
fn strip_language_tag(rest: &str) -> &str {
    let tag_len = rest
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(rest.len());
    let after = &rest[tag_len..];
    if tag_len > 0 && (after.starts_with('\n') || after.starts_with("\r\n")) {
        after
    } else {
        rest
    }
}
