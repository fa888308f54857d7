//! Test doubles shared by service-level tests

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::service::llm::{CompletionClient, LlmError};
use crate::service::prompts::{PromptTemplates, TemplateId};

type Responder = dyn Fn(&str) -> Result<String, LlmError> + Send + Sync;

/// Completion client answering from a closure and recording every prompt
pub struct ScriptedLlm {
    responder: Box<Responder>,
    latency: Duration,
    prompts: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedLlm {
    pub fn new(responder: impl Fn(&str) -> Result<String, LlmError> + Send + Sync + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            latency: Duration::ZERO,
            prompts: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Client that fails the test if it is ever called
    pub fn unreachable() -> Self {
        Self::new(|prompt| panic!("unexpected completion call: {prompt}"))
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn calls_with_prefix(&self, prefix: &str) -> usize {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.starts_with(prefix))
            .count()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionClient for ScriptedLlm {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        } else {
            tokio::task::yield_now().await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        (self.responder)(prompt)
    }
}

/// Compact templates whose first `|`-separated field names the call kind,
/// so scripted responders can route on it
pub fn routing_templates() -> PromptTemplates {
    PromptTemplates::default()
        .with_template(TemplateId::RelevanceCheck, "RELEVANCE|$topic|$content")
        .with_template(TemplateId::ContentExtraction, "EXTRACT|$topic|$content")
        .with_template(
            TemplateId::StanceAnalysis,
            "STANCE|$question_text|$content|$stance_options",
        )
        .with_template(TemplateId::StanceReport, "STANCE_REPORT|$question_text|$stance_entries")
        .with_template(
            TemplateId::ProjectReport,
            "PROJECT_REPORT|$project_name|$question_analyses",
        )
        .with_template(TemplateId::QuestionGeneration, "QUESTIONS|$comments")
}

/// Field `index` of a routed prompt
pub fn field(prompt: &str, index: usize) -> &str {
    prompt.split('|').nth(index).unwrap_or_default()
}

pub fn stance_json(name: &str, confidence: f64) -> String {
    format!(r#"{{"stance": "{name}", "confidence": {confidence}}}"#)
}
