//! Comment ingestion: duplicate guard, extraction and stance labelling

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use uuid::Uuid;

use crate::db::{DbError, Store};
use crate::model::config::BatchConfig;
use crate::model::{Comment, CommentInput, CommentStance, Project};
use crate::service::batch::process_in_batches;
use crate::service::extraction::{Extraction, ExtractionClassifier};
use crate::service::stance::StanceClassifier;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CommentServiceError {
    #[error("Project not found: {0}")]
    ProjectNotFound(Uuid),

    #[error("Invalid comment: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Db(#[from] DbError),
}

pub struct CommentService {
    store: Arc<dyn Store>,
    extraction: Arc<ExtractionClassifier>,
    stance: Arc<StanceClassifier>,
    batch: BatchConfig,
}

impl CommentService {
    pub fn new(
        store: Arc<dyn Store>,
        extraction: Arc<ExtractionClassifier>,
        stance: Arc<StanceClassifier>,
        batch: BatchConfig,
    ) -> Self {
        Self {
            store,
            extraction,
            stance,
            batch,
        }
    }

    /// Comments of a project, newest first
    pub async fn list_comments(&self, project_id: Uuid) -> Result<Vec<Comment>, CommentServiceError> {
        self.load_project(project_id).await?;
        Ok(self.store.list_comments(project_id).await?)
    }

    /// Spreadsheet export of a project's comments, oldest first.
    ///
    /// One row per stored record with a column per question holding the
    /// accepted stance name, empty when the question has no accepted stance.
    pub async fn export_csv(&self, project_id: Uuid) -> Result<String, CommentServiceError> {
        let project = self.load_project(project_id).await?;
        let mut comments = self.store.list_comments(project_id).await?;
        comments.reverse();

        let options: Vec<_> = project.questions.iter().map(|q| q.stance_options()).collect();

        let mut header: Vec<String> = ["CommentID", "Content", "ExtractedContent", "Source", "URL"]
            .into_iter()
            .map(str::to_string)
            .collect();
        header.extend(project.questions.iter().map(|q| format!("Q{}({})", q.id, q.text)));

        let mut lines = Vec::with_capacity(comments.len() + 1);
        lines.push(csv_row(&header));
        for comment in &comments {
            let mut row = vec![
                comment.id.to_string(),
                comment.content.clone(),
                comment.extracted_content.clone().unwrap_or_default(),
                comment.source_type.as_str().to_string(),
                comment.source_url.clone().unwrap_or_default(),
            ];
            for (question, options) in project.questions.iter().zip(&options) {
                let name = comment
                    .stance_for(&question.id)
                    .and_then(|id| options.iter().find(|s| s.id == id))
                    .map(|s| s.name.clone())
                    .unwrap_or_default();
                row.push(name);
            }
            lines.push(csv_row(&row));
        }

        tracing::debug!(project_id = %project_id, rows = comments.len(), "Exported comments");
        Ok(lines.join("\n"))
    }

    /// Whether `content` is already stored for the project (exact match)
    pub async fn is_duplicate(&self, project_id: Uuid, content: &str) -> Result<bool, CommentServiceError> {
        Ok(self.store.comment_exists(project_id, content).await?)
    }

    /// Classify and store one submission.
    ///
    /// Returns the created records: none for a skipped duplicate, one per
    /// extracted claim, or a single unlabelled record when nothing was
    /// extracted.
    pub async fn ingest_comment(
        &self,
        project_id: Uuid,
        input: CommentInput,
        skip_duplicates: bool,
    ) -> Result<Vec<Comment>, CommentServiceError> {
        let input = validate(input)?;
        let project = self.load_project(project_id).await?;
        self.process(&project, input, skip_duplicates).await
    }

    /// Classify and store many submissions through the batch orchestrator.
    ///
    /// Blank or invalid items are dropped, as are repeats within the request
    /// when `skip_duplicates` is set. A failing item is logged and skipped.
    pub async fn ingest_comments_bulk(
        &self,
        project_id: Uuid,
        items: Vec<CommentInput>,
        skip_duplicates: bool,
    ) -> Result<Vec<Comment>, CommentServiceError> {
        let project = self.load_project(project_id).await?;
        let submitted = items.len();

        let mut seen = HashSet::new();
        let mut accepted = Vec::with_capacity(items.len());
        for item in items {
            let item = match validate(item) {
                Ok(item) => item,
                Err(e) => {
                    tracing::debug!(project_id = %project_id, error = %e, "Dropping invalid bulk item");
                    continue;
                }
            };
            if skip_duplicates && !seen.insert(item.content.clone()) {
                tracing::debug!(project_id = %project_id, "Dropping repeated content within request");
                continue;
            }
            accepted.push(item);
        }

        tracing::info!(
            project_id = %project_id,
            submitted = submitted,
            accepted = accepted.len(),
            batch_size = self.batch.batch_size,
            "Starting bulk comment import"
        );

        let project = &project;
        let results = process_in_batches(accepted, self.batch.batch_size, self.batch.delay(), |item| {
            self.process(project, item, skip_duplicates)
        })
        .await;

        let mut created = Vec::new();
        let mut failed = 0usize;
        for result in results {
            match result {
                Ok(comments) => created.extend(comments),
                Err(e) => {
                    failed += 1;
                    tracing::warn!(project_id = %project_id, error = %e, "Failed to import comment");
                }
            }
        }

        tracing::info!(
            project_id = %project_id,
            created = created.len(),
            failed = failed,
            "Bulk comment import complete"
        );

        Ok(created)
    }

    async fn process(
        &self,
        project: &Project,
        input: CommentInput,
        skip_duplicates: bool,
    ) -> Result<Vec<Comment>, CommentServiceError> {
        if skip_duplicates && self.is_duplicate(project.id, &input.content).await? {
            tracing::debug!(project_id = %project.id, "Skipping duplicate comment");
            return Ok(Vec::new());
        }

        let context = project.context.as_deref();
        let extraction = self
            .extraction
            .classify(&input.content, project.topic(), context)
            .await;

        let comments = match extraction {
            Extraction::NotApplicable => vec![Comment::new(project.id, &input, None, Vec::new())],
            Extraction::Claims(claims) => {
                let labelled = join_all(claims.into_iter().map(|claim| async move {
                    let stances = self.label(&claim, project).await;
                    (claim, stances)
                }))
                .await;
                labelled
                    .into_iter()
                    .map(|(claim, stances)| Comment::new(project.id, &input, Some(claim), stances))
                    .collect()
            }
        };

        for comment in &comments {
            self.store.insert_comment(comment).await?;
        }

        tracing::debug!(
            project_id = %project.id,
            records = comments.len(),
            "Stored comment"
        );
        Ok(comments)
    }

    /// Persistable stance labels of a fresh claim
    async fn label(&self, claim: &str, project: &Project) -> Vec<CommentStance> {
        self.stance
            .classify_all_stances(claim, &project.questions, &[], project.context.as_deref())
            .await
            .into_iter()
            .filter(|r| r.is_persistable())
            .map(CommentStance::from)
            .collect()
    }

    async fn load_project(&self, project_id: Uuid) -> Result<Project, CommentServiceError> {
        match self.store.get_project(project_id).await {
            Ok(project) => Ok(project),
            Err(DbError::NotFound(_)) => Err(CommentServiceError::ProjectNotFound(project_id)),
            Err(e) => Err(e.into()),
        }
    }
}

fn csv_row(fields: &[String]) -> String {
    fields.iter().map(|f| csv_field(f)).collect::<Vec<_>>().join(",")
}

/// Quote a field containing a delimiter, quote or line break, doubling
/// embedded quotes
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Reject blank content and malformed source URLs; blank URLs become `None`
fn validate(mut input: CommentInput) -> Result<CommentInput, CommentServiceError> {
    if input.content.trim().is_empty() {
        return Err(CommentServiceError::Validation("content must not be empty".to_string()));
    }
    input.source_url = crate::model::project::non_blank(input.source_url);
    if let Some(ref url) = input.source_url {
        url::Url::parse(url)
            .map_err(|e| CommentServiceError::Validation(format!("invalid source_url: {}", e)))?;
    }
    Ok(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryStore;
    use crate::model::project::{Question, Stance};
    use crate::model::{NewProject, SourceType};
    use crate::service::llm::{LlmError, RateLimit};
    use crate::service::prompts::PromptTemplates;
    use crate::service::retry::RetryPolicy;
    use crate::testing::{ScriptedLlm, field, routing_templates, stance_json};
    use std::time::Duration;

    struct Fixture {
        store: Arc<InMemoryStore>,
        llm: Arc<ScriptedLlm>,
        service: CommentService,
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        }
    }

    fn fixture(llm: ScriptedLlm, batch_size: usize) -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let llm = Arc::new(llm);
        let templates: Arc<PromptTemplates> = Arc::new(routing_templates());
        let extraction = ExtractionClassifier::new(llm.clone(), templates.clone(), RateLimit::unlimited())
            .with_retry_policy(fast_retry());
        let stance = StanceClassifier::new(llm.clone(), templates, RateLimit::unlimited())
            .with_retry_policy(fast_retry());
        let service = CommentService::new(
            store.clone(),
            Arc::new(extraction),
            Arc::new(stance),
            BatchConfig {
                batch_size,
                delay_ms: 0,
            },
        );
        Fixture {
            store,
            llm,
            service,
        }
    }

    async fn fares_project(store: &InMemoryStore, topic: Option<&str>) -> Project {
        let mut project = Project::new(NewProject {
            name: "Transit".to_string(),
            extraction_topic: topic.map(str::to_string),
            ..Default::default()
        });
        project.questions = vec![Question {
            id: "q-fares".to_string(),
            text: "Should fares be frozen?".to_string(),
            stances: vec![Stance::new("s-freeze", "Freeze"), Stance::new("s-raise", "Raise")],
        }];
        store.insert_project(&project).await.unwrap();
        project
    }

    /// Relevant, one claim per input line, stance named in the claim
    fn transit_responder(confidence: f64) -> ScriptedLlm {
        ScriptedLlm::new(move |prompt| match field(prompt, 0) {
            "RELEVANCE" => Ok("RELEVANT".to_string()),
            "EXTRACT" => Ok(field(prompt, 2).to_string()),
            "STANCE" => {
                let claim = field(prompt, 2);
                let name = if claim.contains("raise") { "Raise" } else { "Freeze" };
                Ok(stance_json(name, confidence))
            }
            other => panic!("unexpected call {other}"),
        })
    }

    #[tokio::test]
    async fn test_export_csv_lists_stance_names_per_question() {
        let f = fixture(ScriptedLlm::unreachable(), 2);
        let project = fares_project(&f.store, None).await;

        let first = Comment::new(
            project.id,
            &CommentInput {
                content: "Freeze fares, \"now\"".to_string(),
                source_type: Some(SourceType::Form),
                source_url: Some("https://example.org/form".to_string()),
            },
            Some("Freeze fares".to_string()),
            vec![CommentStance {
                question_id: "q-fares".to_string(),
                stance_id: Some("s-freeze".to_string()),
                confidence: Some(0.9),
            }],
        );
        f.store.insert_comment(&first).await.unwrap();
        let second = Comment::new(
            project.id,
            &CommentInput::new("No view"),
            Some("No view".to_string()),
            vec![CommentStance {
                question_id: "q-fares".to_string(),
                stance_id: Some("neutral".to_string()),
                confidence: Some(0.85),
            }],
        );
        f.store.insert_comment(&second).await.unwrap();
        let unlabelled = Comment::new(project.id, &CommentInput::new("Hello"), None, Vec::new());
        f.store.insert_comment(&unlabelled).await.unwrap();

        let csv = f.service.export_csv(project.id).await.unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "CommentID,Content,ExtractedContent,Source,URL,Qq-fares(Should fares be frozen?)");
        assert_eq!(
            lines[1],
            format!("{},\"Freeze fares, \"\"now\"\"\",Freeze fares,form,https://example.org/form,Freeze", first.id)
        );
        assert_eq!(lines[2], format!("{},No view,No view,{},,No stance", second.id, second.source_type.as_str()));
        assert_eq!(lines[3], format!("{},Hello,,{},,", unlabelled.id, unlabelled.source_type.as_str()));
        assert_eq!(f.llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_export_csv_unknown_project() {
        let f = fixture(ScriptedLlm::unreachable(), 2);
        let result = f.service.export_csv(Uuid::new_v4()).await;
        assert!(matches!(result, Err(CommentServiceError::ProjectNotFound(_))));
    }

    #[tokio::test]
    async fn test_end_to_end_single_claim() {
        let f = fixture(transit_responder(0.92), 10);
        let project = fares_project(&f.store, Some("public transit fares")).await;

        let created = f
            .service
            .ingest_comment(project.id, CommentInput::new("Fares are too high and buses are late"), true)
            .await
            .unwrap();

        assert_eq!(created.len(), 1);
        let comment = &created[0];
        assert_eq!(comment.extracted_content.as_deref(), Some("Fares are too high and buses are late"));
        assert_eq!(
            comment.stances,
            vec![CommentStance {
                question_id: "q-fares".to_string(),
                stance_id: Some("s-freeze".to_string()),
                confidence: Some(0.92),
            }]
        );
        assert_eq!(comment.source_type, SourceType::Other);
        assert_eq!(f.store.list_comments(project.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_low_confidence_is_stored_unlabelled() {
        let f = fixture(transit_responder(0.55), 10);
        let project = fares_project(&f.store, Some("public transit fares")).await;

        let created = f
            .service
            .ingest_comment(project.id, CommentInput::new("Fares are too high"), true)
            .await
            .unwrap();

        let stance = &created[0].stances[0];
        assert_eq!(stance.stance_id, None);
        assert_eq!(stance.confidence, None);
        assert_eq!(created[0].stance_for("q-fares"), None);
    }

    #[tokio::test]
    async fn test_no_topic_stores_bare_comment_without_calls() {
        let f = fixture(ScriptedLlm::unreachable(), 10);
        let project = fares_project(&f.store, None).await;

        let created = f
            .service
            .ingest_comment(project.id, CommentInput::new("Fares are too high"), true)
            .await
            .unwrap();

        assert_eq!(created.len(), 1);
        assert_eq!(created[0].extracted_content, None);
        assert!(created[0].stances.is_empty());
        assert_eq!(f.llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_multiple_claims_create_one_record_each() {
        let f = fixture(transit_responder(0.9), 10);
        let project = fares_project(&f.store, Some("fares")).await;

        let created = f
            .service
            .ingest_comment(project.id, CommentInput::new("Freeze fares now\nThen raise them later"), true)
            .await
            .unwrap();

        assert_eq!(created.len(), 2);
        assert!(created.iter().all(|c| c.content == "Freeze fares now\nThen raise them later"));
        assert_eq!(created[0].stance_for("q-fares"), Some("s-freeze"));
        assert_eq!(created[1].stance_for("q-fares"), Some("s-raise"));
    }

    #[tokio::test]
    async fn test_duplicate_guard() {
        let f = fixture(transit_responder(0.9), 10);
        let project = fares_project(&f.store, Some("fares")).await;
        let text = "Fares are too high";

        f.service.ingest_comment(project.id, CommentInput::new(text), true).await.unwrap();
        let calls_after_first = f.llm.calls();
        let skipped = f.service.ingest_comment(project.id, CommentInput::new(text), true).await.unwrap();

        assert!(skipped.is_empty());
        assert_eq!(f.llm.calls(), calls_after_first);
        assert_eq!(f.store.list_comments(project.id).await.unwrap().len(), 1);

        f.service.ingest_comment(project.id, CommentInput::new(text), false).await.unwrap();
        assert_eq!(f.store.list_comments(project.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_validation() {
        let f = fixture(ScriptedLlm::unreachable(), 10);
        let project = fares_project(&f.store, Some("fares")).await;

        let blank = f.service.ingest_comment(project.id, CommentInput::new("   "), true).await;
        assert!(matches!(blank, Err(CommentServiceError::Validation(_))));

        let bad_url = CommentInput {
            content: "Fares".to_string(),
            source_type: Some(SourceType::Youtube),
            source_url: Some("not a url".to_string()),
        };
        let result = f.service.ingest_comment(project.id, bad_url, true).await;
        assert!(matches!(result, Err(CommentServiceError::Validation(_))));

        let missing = f.service.ingest_comment(Uuid::new_v4(), CommentInput::new("Fares"), true).await;
        assert!(matches!(missing, Err(CommentServiceError::ProjectNotFound(_))));
    }

    #[tokio::test]
    async fn test_bulk_import_filters_and_degrades_per_item() {
        let f = fixture(
            ScriptedLlm::new(|prompt| match field(prompt, 0) {
                "RELEVANCE" if field(prompt, 2).contains("broken") => {
                    Err(LlmError::Failed("bad request".to_string()))
                }
                "RELEVANCE" => Ok("RELEVANT".to_string()),
                "EXTRACT" => Ok(field(prompt, 2).to_string()),
                _ => Ok(stance_json("Freeze", 0.9)),
            })
            .with_latency(Duration::from_millis(2)),
            3,
        );
        let project = fares_project(&f.store, Some("fares")).await;

        let items = vec![
            CommentInput::new("one"),
            CommentInput::new(""),
            CommentInput::new("two"),
            CommentInput::new("one"),
            CommentInput::new("broken input"),
            CommentInput::new("three"),
        ];

        let created = f.service.ingest_comments_bulk(project.id, items, true).await.unwrap();

        let mut contents: Vec<&str> = created.iter().map(|c| c.content.as_str()).collect();
        contents.sort();
        assert_eq!(contents, vec!["broken input", "one", "three", "two"]);
        let broken = created.iter().find(|c| c.content == "broken input").unwrap();
        assert!(broken.extracted_content.is_none());
        assert!(f.llm.peak_in_flight() <= 3);
    }

    #[tokio::test]
    async fn test_bulk_import_keeps_repeats_when_not_skipping() {
        let f = fixture(ScriptedLlm::unreachable(), 2);
        let project = fares_project(&f.store, None).await;

        let items = vec![CommentInput::new("same"), CommentInput::new("same")];
        let created = f.service.ingest_comments_bulk(project.id, items, false).await.unwrap();

        assert_eq!(created.len(), 2);
    }
}
