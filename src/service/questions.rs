//! Question generation from extracted claims

use std::sync::Arc;

use crate::model::analysis::{GeneratedQuestion, GeneratedQuestions};
use crate::service::llm::{CompletionClient, LlmError, strip_code_fence};
use crate::service::prompts::{PromptTemplates, TemplateId};
use crate::service::retry::{RetryPolicy, retry_with_backoff};

pub struct QuestionGenerator {
    llm: Arc<dyn CompletionClient>,
    templates: Arc<PromptTemplates>,
    retry: RetryPolicy,
    response_schema: String,
}

impl QuestionGenerator {
    pub fn new(llm: Arc<dyn CompletionClient>, templates: Arc<PromptTemplates>) -> Self {
        let schema = schemars::schema_for!(GeneratedQuestions);
        let response_schema = serde_json::to_string_pretty(&schema)
            .unwrap_or_else(|_| r#"{"questions": [{"text": "", "stances": [{"name": ""}]}]}"#.to_string());
        Self {
            llm,
            templates,
            retry: RetryPolicy::default(),
            response_schema,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Propose questions and stance options covering `claims`.
    ///
    /// Questions with blank text are dropped, as are blank stance names.
    /// An unparseable answer is reported as [`LlmError::Failed`].
    pub async fn generate(&self, claims: &[String]) -> Result<Vec<GeneratedQuestion>, LlmError> {
        let comments = claims.join("\n");
        let prompt = self.templates.render(
            TemplateId::QuestionGeneration,
            &[
                ("comments", comments.as_str()),
                ("response_schema", self.response_schema.as_str()),
            ],
        );

        let prompt = prompt.as_str();
        let text = retry_with_backoff(&self.retry, LlmError::is_overloaded, || async move {
            self.llm.complete(prompt).await
        })
        .await?;

        let parsed: GeneratedQuestions = serde_json::from_str(strip_code_fence(&text))
            .map_err(|e| LlmError::Failed(format!("unparseable question list: {}", e)))?;

        let questions: Vec<GeneratedQuestion> = parsed
            .questions
            .into_iter()
            .filter_map(|mut q| {
                q.text = q.text.trim().to_string();
                if q.text.is_empty() {
                    return None;
                }
                q.stances.retain_mut(|s| {
                    s.name = s.name.trim().to_string();
                    !s.name.is_empty()
                });
                Some(q)
            })
            .collect();

        tracing::info!(
            claims = claims.len(),
            questions = questions.len(),
            "Generated questions"
        );
        Ok(questions)
    }
}
