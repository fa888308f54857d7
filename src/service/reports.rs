//! Stance and project reports with generate-once caching
//!
//! Reports are persisted by the [`Store`] under their natural key and served
//! from there until a caller forces regeneration. An optional Redis mirror
//! sits in front of the store.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use serde::{Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::db::{DbError, Store};
use crate::model::report::{QuestionDigest, tally_stances};
use crate::model::{Project, ProjectReport, Question, StanceReport};
use crate::service::cache::RedisCache;
use crate::service::cache_keys::{project_report_key, stance_report_key};
use crate::service::llm::{CompletionClient, LlmError, strip_text_fences};
use crate::service::prompts::{PromptTemplates, TemplateId};
use crate::service::retry::{RetryPolicy, retry_with_backoff};

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ReportError {
    #[error("Project not found: {0}")]
    ProjectNotFound(Uuid),

    #[error("Question not found: {0}")]
    QuestionNotFound(String),

    #[error("Report generation failed: {0}")]
    Generation(#[from] LlmError),

    #[error("Storage error: {0}")]
    Db(#[from] DbError),
}

/// A report that can be stored and looked up by key
#[async_trait]
pub trait CachedReport: Serialize + DeserializeOwned + Send + Sync + Sized {
    type Key: Send + Sync;

    const MIRROR_PREFIX: &'static str;

    fn mirror_key(key: &Self::Key) -> String;

    async fn load(store: &dyn Store, key: &Self::Key) -> Result<Option<Self>, DbError>;

    async fn save(&self, store: &dyn Store) -> Result<(), DbError>;
}

#[async_trait]
impl CachedReport for StanceReport {
    type Key = (Uuid, String);

    const MIRROR_PREFIX: &'static str = "stance_report:";

    fn mirror_key(key: &Self::Key) -> String {
        stance_report_key(key.0, &key.1)
    }

    async fn load(store: &dyn Store, key: &Self::Key) -> Result<Option<Self>, DbError> {
        store.get_stance_report(key.0, &key.1).await
    }

    async fn save(&self, store: &dyn Store) -> Result<(), DbError> {
        store.upsert_stance_report(self).await
    }
}

#[async_trait]
impl CachedReport for ProjectReport {
    type Key = Uuid;

    const MIRROR_PREFIX: &'static str = "project_report:";

    fn mirror_key(project_id: &Self::Key) -> String {
        project_report_key(*project_id)
    }

    async fn load(store: &dyn Store, project_id: &Self::Key) -> Result<Option<Self>, DbError> {
        store.get_project_report(*project_id).await
    }

    async fn save(&self, store: &dyn Store) -> Result<(), DbError> {
        store.upsert_project_report(self).await
    }
}

/// Generate-once report cache over the store and the optional Redis mirror
#[derive(Clone)]
pub struct ReportCache {
    store: Arc<dyn Store>,
    mirror: Option<RedisCache>,
}

impl ReportCache {
    pub fn new(store: Arc<dyn Store>, mirror: Option<RedisCache>) -> Self {
        Self { store, mirror }
    }

    /// Return the cached report for `key`, or run `generate` and store its
    /// result when nothing is cached or `force_regenerate` is set. A failed
    /// generation leaves the cache untouched.
    pub async fn get_or_generate<R, F, Fut>(
        &self,
        key: &R::Key,
        force_regenerate: bool,
        generate: F,
    ) -> Result<R, ReportError>
    where
        R: CachedReport,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<R, ReportError>>,
    {
        let mirror_key = R::mirror_key(key);

        if !force_regenerate {
            if let Some(ref mirror) = self.mirror
                && let Ok(report) = mirror.get_with_prefix::<R>(R::MIRROR_PREFIX, &mirror_key).await
            {
                tracing::debug!(key = %mirror_key, kind = R::MIRROR_PREFIX, "Report cache hit (redis)");
                return Ok(report);
            }

            if let Some(report) = R::load(self.store.as_ref(), key).await? {
                tracing::debug!(key = %mirror_key, kind = R::MIRROR_PREFIX, "Report cache hit");
                self.mirror_report(&mirror_key, &report).await;
                return Ok(report);
            }
        }

        tracing::info!(
            key = %mirror_key,
            kind = R::MIRROR_PREFIX,
            forced = force_regenerate,
            "Generating report"
        );
        let report = generate().await?;
        report.save(self.store.as_ref()).await?;
        self.mirror_report(&mirror_key, &report).await;
        Ok(report)
    }

    async fn mirror_report<R: CachedReport>(&self, mirror_key: &str, report: &R) {
        let Some(ref mirror) = self.mirror else {
            return;
        };
        if let Err(e) = mirror.set_with_prefix(R::MIRROR_PREFIX, mirror_key, report).await {
            tracing::warn!(key = %mirror_key, error = %e, "Failed to mirror report to redis");
            // a stale copy would shadow the fresh database row
            if let Err(e) = mirror.delete_with_prefix(R::MIRROR_PREFIX, mirror_key).await {
                tracing::warn!(key = %mirror_key, error = %e, "Failed to evict stale report from redis");
            }
        }
    }
}

/// Builds stance and project reports on top of [`ReportCache`]
pub struct ReportService {
    store: Arc<dyn Store>,
    llm: Arc<dyn CompletionClient>,
    templates: Arc<PromptTemplates>,
    cache: ReportCache,
    retry: RetryPolicy,
}

impl ReportService {
    pub fn new(
        store: Arc<dyn Store>,
        llm: Arc<dyn CompletionClient>,
        templates: Arc<PromptTemplates>,
        cache: ReportCache,
    ) -> Self {
        Self {
            store,
            llm,
            templates,
            cache,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Stance distribution and narrative for one question
    pub async fn get_stance_report(
        &self,
        project_id: Uuid,
        question_id: &str,
        force_regenerate: bool,
    ) -> Result<StanceReport, ReportError> {
        let project = self.load_project(project_id).await?;
        let question = project
            .question(question_id)
            .ok_or_else(|| ReportError::QuestionNotFound(question_id.to_string()))?;

        self.cache
            .get_or_generate(
                &(project_id, question_id.to_string()),
                force_regenerate,
                || self.generate_stance_report(&project, question),
            )
            .await
    }

    /// Synthesis across every question of the project
    pub async fn get_project_report(
        &self,
        project_id: Uuid,
        force_regenerate: bool,
    ) -> Result<ProjectReport, ReportError> {
        let project = self.load_project(project_id).await?;

        self.cache
            .get_or_generate(&project_id, force_regenerate, || {
                self.generate_project_report(&project)
            })
            .await
    }

    async fn load_project(&self, project_id: Uuid) -> Result<Project, ReportError> {
        match self.store.get_project(project_id).await {
            Ok(project) => Ok(project),
            Err(DbError::NotFound(_)) => Err(ReportError::ProjectNotFound(project_id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn generate_stance_report(
        &self,
        project: &Project,
        question: &Question,
    ) -> Result<StanceReport, ReportError> {
        let comments = self.store.list_comments(project.id).await?;
        let tallies = tally_stances(question, &comments);

        let stance_entries = tallies
            .iter()
            .filter(|t| t.count > 0)
            .map(|t| {
                format!(
                    "Stance: {}\nComments: {}\nContent:\n{}\n",
                    t.stance_name,
                    t.count,
                    t.comments.join("\n")
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = self.templates.render(
            TemplateId::StanceReport,
            &[
                ("question_text", question.text.as_str()),
                ("stance_entries", stance_entries.as_str()),
            ],
        );

        let analysis = self.complete(&prompt).await?;

        tracing::info!(
            project_id = %project.id,
            question_id = %question.id,
            counted = tallies.iter().map(|t| t.count).sum::<usize>(),
            "Generated stance report"
        );

        Ok(StanceReport {
            project_id: project.id,
            question_id: question.id.clone(),
            question: question.text.clone(),
            tallies,
            analysis: analysis.trim().to_string(),
            generated_at: Utc::now(),
        })
    }

    async fn generate_project_report(&self, project: &Project) -> Result<ProjectReport, ReportError> {
        let stance_reports: Vec<StanceReport> = join_all(
            project
                .questions
                .iter()
                .map(|q| self.get_stance_report(project.id, &q.id, false)),
        )
        .await
        .into_iter()
        .collect::<Result<_, _>>()?;

        let total_comments: usize = stance_reports
            .iter()
            .flat_map(|r| r.tallies.iter())
            .map(|t| t.count)
            .sum();

        let question_analyses = stance_reports
            .iter()
            .enumerate()
            .map(|(index, report)| {
                let counts = report
                    .tallies
                    .iter()
                    .map(|t| format!("- {}: {} comments", t.stance_name, t.count))
                    .collect::<Vec<_>>()
                    .join("\n");
                format!(
                    "[Question {}: {}](question://{})\n\nStance distribution:\n{}\n\nAnalysis:\n{}\n",
                    index + 1,
                    report.question,
                    report.question_id,
                    counts,
                    report.analysis
                )
            })
            .collect::<Vec<_>>()
            .join("\n---\n");

        let total = total_comments.to_string();
        let today = Utc::now().format("%Y-%m-%d").to_string();
        let prompt = self.templates.render(
            TemplateId::ProjectReport,
            &[
                ("project_name", project.name.as_str()),
                ("project_description", project.description.as_str()),
                ("question_analyses", question_analyses.as_str()),
                ("total_comments", total.as_str()),
                ("current_date", today.as_str()),
            ],
        );

        let overall_analysis = strip_text_fences(&self.complete(&prompt).await?);

        tracing::info!(
            project_id = %project.id,
            question_count = stance_reports.len(),
            total_comments = total_comments,
            "Generated project report"
        );

        Ok(ProjectReport {
            project_id: project.id,
            project_name: project.name.clone(),
            overall_analysis,
            questions: stance_reports.iter().map(QuestionDigest::from).collect(),
            generated_at: Utc::now(),
        })
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        retry_with_backoff(&self.retry, LlmError::is_overloaded, || async move {
            self.llm.complete(prompt).await
        })
        .await
    }
}
