//! Relevance gate and claim extraction
//!
//! A comment goes through two model calls: a relevance check against the
//! project's extraction topic, then (only when relevant) a rewrite into
//! first-person claims, one per line. Every failure degrades to
//! [`Extraction::NotApplicable`] so ingestion always proceeds.

use std::sync::Arc;

use crate::service::llm::{CompletionClient, LlmError, RateLimit};
use crate::service::prompts::{PromptTemplates, TemplateId};
use crate::service::retry::{RetryPolicy, retry_with_backoff};

/// Exact (trimmed) answer that marks a comment as on-topic
const RELEVANT_MARKER: &str = "RELEVANT";

/// Outcome of relevance classification and extraction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// One or more cleaned claims, in model order
    Claims(Vec<String>),
    /// No topic, off-topic, nothing extracted, or the service failed
    NotApplicable,
}

/// Two-stage relevance/extraction classifier
pub struct ExtractionClassifier {
    llm: Arc<dyn CompletionClient>,
    templates: Arc<PromptTemplates>,
    rate_limit: RateLimit,
    retry: RetryPolicy,
}

impl ExtractionClassifier {
    pub fn new(
        llm: Arc<dyn CompletionClient>,
        templates: Arc<PromptTemplates>,
        rate_limit: RateLimit,
    ) -> Self {
        Self {
            llm,
            templates,
            rate_limit,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Classify `comment` against `topic`, producing its claims
    pub async fn classify(
        &self,
        comment: &str,
        topic: Option<&str>,
        context: Option<&str>,
    ) -> Extraction {
        let Some(topic) = topic.map(str::trim).filter(|t| !t.is_empty()) else {
            tracing::debug!("No extraction topic, skipping classification");
            return Extraction::NotApplicable;
        };
        let context = context.unwrap_or_default();

        let relevance_prompt = self.templates.render(
            TemplateId::RelevanceCheck,
            &[("topic", topic), ("context", context), ("content", comment)],
        );
        let relevant = match self.call(&relevance_prompt).await {
            Ok(answer) => is_relevant(&answer),
            Err(e) => {
                tracing::warn!(error = %e, "Relevance check failed, treating comment as not applicable");
                return Extraction::NotApplicable;
            }
        };
        if !relevant {
            tracing::debug!(topic = %topic, "Comment is not relevant to topic");
            return Extraction::NotApplicable;
        }

        let extraction_prompt = self.templates.render(
            TemplateId::ContentExtraction,
            &[("topic", topic), ("context", context), ("content", comment)],
        );
        match self.call(&extraction_prompt).await {
            Ok(text) => {
                let claims = split_claims(&text);
                tracing::debug!(claim_count = claims.len(), "Extracted claims from comment");
                if claims.is_empty() {
                    Extraction::NotApplicable
                } else {
                    Extraction::Claims(claims)
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Claim extraction failed, treating comment as not applicable");
                Extraction::NotApplicable
            }
        }
    }

    async fn call(&self, prompt: &str) -> Result<String, LlmError> {
        retry_with_backoff(
            &self.retry,
            |e: &LlmError| e.is_overloaded() || e.is_timeout(),
            || async move {
                self.rate_limit.until_ready().await;
                self.llm.complete(prompt).await
            },
        )
        .await
    }
}

fn is_relevant(answer: &str) -> bool {
    answer.trim() == RELEVANT_MARKER
}

/// One claim per non-empty trimmed line
fn split_claims(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
