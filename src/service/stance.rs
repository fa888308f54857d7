//! Stance classification of extracted claims
//!
//! Each (claim, question) pair is one model call that must name exactly one
//! offered stance option with a confidence. Answers below [`MIN_CONFIDENCE`]
//! or naming an unknown option are rejected rather than guessed.

use std::sync::Arc;

use futures::future::join_all;

use crate::model::analysis::{StanceAnalysisResult, StanceResponse};
use crate::model::comment::CommentStance;
use crate::model::project::{Question, Stance};
use crate::service::llm::{CompletionClient, LlmError, RateLimit, strip_code_fence};
use crate::service::prompts::{PromptTemplates, TemplateId};
use crate::service::retry::{RetryPolicy, retry_with_backoff};

/// Acceptance threshold for a stance label
pub const MIN_CONFIDENCE: f64 = 0.8;

pub struct StanceClassifier {
    llm: Arc<dyn CompletionClient>,
    templates: Arc<PromptTemplates>,
    rate_limit: RateLimit,
    retry: RetryPolicy,
    response_schema: String,
}

impl StanceClassifier {
    pub fn new(
        llm: Arc<dyn CompletionClient>,
        templates: Arc<PromptTemplates>,
        rate_limit: RateLimit,
    ) -> Self {
        let schema = schemars::schema_for!(StanceResponse);
        let response_schema = serde_json::to_string_pretty(&schema)
            .unwrap_or_else(|_| r#"{"stance": "<stance name>", "confidence": 0.0}"#.to_string());
        Self {
            llm,
            templates,
            rate_limit,
            retry: RetryPolicy::default(),
            response_schema,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Classify one claim against one question
    pub async fn classify_stance(
        &self,
        claim: &str,
        question: &Question,
        context: Option<&str>,
    ) -> StanceAnalysisResult {
        let options = question.stance_options();
        let option_list = options
            .iter()
            .map(|s| format!("- {}", s.name))
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = self.templates.render(
            TemplateId::StanceAnalysis,
            &[
                ("question_text", question.text.as_str()),
                ("stance_options", option_list.as_str()),
                ("context", context.unwrap_or_default()),
                ("content", claim),
                ("response_schema", self.response_schema.as_str()),
            ],
        );

        let prompt = prompt.as_str();
        let response = retry_with_backoff(
            &self.retry,
            LlmError::is_overloaded,
            || async move {
                self.rate_limit.until_ready().await;
                self.llm.complete(prompt).await
            },
        )
        .await;

        match response {
            Ok(text) => interpret_response(&text, &question.id, &options),
            Err(e) => {
                tracing::warn!(
                    question_id = %question.id,
                    error = %e,
                    "Stance classification failed"
                );
                StanceAnalysisResult::failed(&question.id)
            }
        }
    }

    /// Classify `claim` against every question concurrently.
    ///
    /// A question that already has an entry in `existing` keeps it without a
    /// model call. The output holds one result per question, in question order.
    pub async fn classify_all_stances(
        &self,
        claim: &str,
        questions: &[Question],
        existing: &[CommentStance],
        context: Option<&str>,
    ) -> Vec<StanceAnalysisResult> {
        let tasks = questions.iter().map(move |question| async move {
            match existing.iter().find(|s| s.question_id == question.id) {
                Some(previous) => StanceAnalysisResult::reused(previous),
                None => self.classify_stance(claim, question, context).await,
            }
        });
        join_all(tasks).await
    }
}

/// Apply the acceptance gate to a raw model answer
fn interpret_response(text: &str, question_id: &str, options: &[Stance]) -> StanceAnalysisResult {
    let response: StanceResponse = match serde_json::from_str(strip_code_fence(text)) {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(
                question_id = %question_id,
                error = %e,
                "Unparseable stance response"
            );
            return StanceAnalysisResult::failed(question_id);
        }
    };

    let confidence = match response.confidence {
        Some(c) if c.is_finite() && (0.0..=1.0).contains(&c) && c >= MIN_CONFIDENCE => c,
        other => {
            tracing::debug!(
                question_id = %question_id,
                confidence = ?other,
                "Stance rejected: confidence below threshold or invalid"
            );
            return StanceAnalysisResult::rejected(question_id);
        }
    };

    let name = response.stance.as_deref().unwrap_or_default();
    match options.iter().find(|s| s.name == name) {
        Some(stance) => StanceAnalysisResult::accepted(question_id, &stance.id, confidence),
        None => {
            tracing::debug!(
                question_id = %question_id,
                stance = %name,
                "Stance rejected: not an offered option"
            );
            StanceAnalysisResult::rejected(question_id)
        }
    }
}
