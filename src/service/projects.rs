//! Project management and stance reanalysis after question changes

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

use crate::db::{DbError, Store};
use crate::model::config::BatchConfig;
use crate::model::project::{QuestionInput, non_blank, special_stances};
use crate::model::{Comment, CommentStance, NewProject, Project, ProjectSummary, ProjectUpdate, Question, Stance};
use crate::service::batch::process_in_batches;
use crate::service::questions::QuestionGenerator;
use crate::service::stance::StanceClassifier;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ProjectServiceError {
    #[error("Project not found: {0}")]
    ProjectNotFound(Uuid),

    #[error("Invalid project: {0}")]
    Validation(String),

    #[error("Question generation failed: {0}")]
    Generation(String),

    #[error("Storage error: {0}")]
    Db(#[from] DbError),
}

/// Outcome of re-running stance classification over a project's comments
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReanalysisSummary {
    /// Comments with an extracted claim that were re-examined
    pub processed: usize,
    /// Comments whose stance list changed and was written back
    pub updated: usize,
    /// Comments whose new stance list could not be stored
    pub failed: usize,
}

pub struct ProjectService {
    store: Arc<dyn Store>,
    stance: Arc<StanceClassifier>,
    generator: Arc<QuestionGenerator>,
    reanalysis: BatchConfig,
}

impl ProjectService {
    pub fn new(
        store: Arc<dyn Store>,
        stance: Arc<StanceClassifier>,
        generator: Arc<QuestionGenerator>,
        reanalysis: BatchConfig,
    ) -> Self {
        Self {
            store,
            stance,
            generator,
            reanalysis,
        }
    }

    pub async fn create_project(&self, input: NewProject) -> Result<Project, ProjectServiceError> {
        if input.name.trim().is_empty() {
            return Err(ProjectServiceError::Validation("name must not be empty".to_string()));
        }
        let project = Project::new(input);
        self.store.insert_project(&project).await?;
        tracing::info!(project_id = %project.id, name = %project.name, "Created project");
        Ok(project)
    }

    pub async fn get_project(&self, project_id: Uuid) -> Result<Project, ProjectServiceError> {
        match self.store.get_project(project_id).await {
            Ok(project) => Ok(project),
            Err(DbError::NotFound(_)) => Err(ProjectServiceError::ProjectNotFound(project_id)),
            Err(e) => Err(e.into()),
        }
    }

    /// All projects with comment counts, newest first
    pub async fn list_projects(&self) -> Result<Vec<ProjectSummary>, ProjectServiceError> {
        Ok(self.store.list_projects().await?)
    }

    /// Apply metadata changes and, when given, a new question list.
    ///
    /// Absent fields are left alone; a blank topic or context clears it.
    pub async fn update_project(
        &self,
        project_id: Uuid,
        update: ProjectUpdate,
    ) -> Result<Project, ProjectServiceError> {
        let mut project = self.get_project(project_id).await?;
        let questions = update.questions.map(build_questions).transpose()?;

        if let Some(name) = update.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(ProjectServiceError::Validation("name must not be empty".to_string()));
            }
            project.name = name.to_string();
        }
        if let Some(description) = update.description {
            project.description = description.trim().to_string();
        }
        if let Some(topic) = update.extraction_topic {
            project.extraction_topic = non_blank(Some(topic));
        }
        if let Some(context) = update.context {
            project.context = non_blank(Some(context));
        }

        match questions {
            Some(questions) if questions != project.questions => {
                let (project, _) = self.on_question_set_changed(project, questions).await?;
                Ok(project)
            }
            _ => {
                self.store.update_project(&project).await?;
                tracing::info!(project_id = %project.id, "Updated project");
                Ok(project)
            }
        }
    }

    /// Replace the question list. Stances are only recomputed when the new
    /// list differs from the stored one.
    pub async fn replace_questions(
        &self,
        project_id: Uuid,
        inputs: Vec<QuestionInput>,
    ) -> Result<Project, ProjectServiceError> {
        let project = self.get_project(project_id).await?;
        let questions = build_questions(inputs)?;

        if questions == project.questions {
            tracing::debug!(project_id = %project_id, "Question list unchanged");
            return Ok(project);
        }

        let (project, _) = self.on_question_set_changed(project, questions).await?;
        Ok(project)
    }

    /// Derive a fresh question list from the project's extracted claims
    pub async fn generate_questions(&self, project_id: Uuid) -> Result<Project, ProjectServiceError> {
        let project = self.get_project(project_id).await?;
        let claims: Vec<String> = self
            .store
            .list_comments(project_id)
            .await?
            .into_iter()
            .filter_map(|c| c.extracted_content)
            .collect();

        if claims.is_empty() {
            return Err(ProjectServiceError::Validation(
                "project has no extracted comments to generate questions from".to_string(),
            ));
        }

        let generated = self
            .generator
            .generate(&claims)
            .await
            .map_err(|e| ProjectServiceError::Generation(e.to_string()))?;

        if generated.is_empty() {
            return Err(ProjectServiceError::Generation("no questions were generated".to_string()));
        }

        let questions = generated
            .into_iter()
            .map(|q| Question {
                id: Uuid::new_v4().to_string(),
                text: q.text,
                stances: q
                    .stances
                    .into_iter()
                    .map(|s| Stance::new(Uuid::new_v4().to_string(), s.name))
                    .collect(),
            })
            .collect();

        let (project, _) = self.on_question_set_changed(project, questions).await?;
        Ok(project)
    }

    /// Store `questions` on the project, then recompute every comment's
    /// stances against them
    pub async fn on_question_set_changed(
        &self,
        mut project: Project,
        questions: Vec<Question>,
    ) -> Result<(Project, ReanalysisSummary), ProjectServiceError> {
        project.questions = questions;
        self.store.update_project(&project).await?;
        tracing::info!(
            project_id = %project.id,
            questions = project.questions.len(),
            "Stored new question list"
        );

        let summary = self.reanalyze(&project).await?;
        Ok((project, summary))
    }

    async fn reanalyze(&self, project: &Project) -> Result<ReanalysisSummary, ProjectServiceError> {
        let start = Instant::now();
        let comments: Vec<Comment> = self
            .store
            .list_comments(project.id)
            .await?
            .into_iter()
            .filter(|c| c.extracted_content.is_some())
            .collect();

        let mut summary = ReanalysisSummary {
            processed: comments.len(),
            ..Default::default()
        };

        tracing::info!(
            project_id = %project.id,
            comments = summary.processed,
            batch_size = self.reanalysis.batch_size,
            "Starting stance reanalysis"
        );

        let results = process_in_batches(
            comments,
            self.reanalysis.batch_size,
            self.reanalysis.delay(),
            |comment| self.reanalyze_comment(project, comment),
        )
        .await;

        for result in results {
            match result {
                Ok(true) => summary.updated += 1,
                Ok(false) => {}
                Err(_) => summary.failed += 1,
            }
        }

        tracing::info!(
            project_id = %project.id,
            processed = summary.processed,
            updated = summary.updated,
            failed = summary.failed,
            elapsed_ms = start.elapsed().as_millis(),
            "Stance reanalysis complete"
        );
        Ok(summary)
    }

    /// Returns whether the stored stance list changed
    async fn reanalyze_comment(&self, project: &Project, comment: Comment) -> Result<bool, DbError> {
        let Some(claim) = comment.extracted_content.as_deref() else {
            return Ok(false);
        };

        let stances: Vec<CommentStance> = self
            .stance
            .classify_all_stances(claim, &project.questions, &comment.stances, project.context.as_deref())
            .await
            .into_iter()
            .filter(|r| r.is_persistable())
            .map(CommentStance::from)
            .collect();

        if stances == comment.stances {
            return Ok(false);
        }

        if let Err(e) = self.store.update_comment_stances(comment.id, &stances).await {
            tracing::warn!(
                project_id = %project.id,
                comment_id = %comment.id,
                error = %e,
                "Failed to store reanalysed stances"
            );
            return Err(e);
        }
        Ok(true)
    }
}

/// Turn client input into questions, assigning ids where missing
fn build_questions(inputs: Vec<QuestionInput>) -> Result<Vec<Question>, ProjectServiceError> {
    let mut question_ids = HashSet::new();
    let mut questions = Vec::with_capacity(inputs.len());

    for input in inputs {
        let text = input.text.trim();
        if text.is_empty() {
            return Err(ProjectServiceError::Validation("question text must not be empty".to_string()));
        }
        let id = non_blank(input.id).unwrap_or_else(|| Uuid::new_v4().to_string());
        if !question_ids.insert(id.clone()) {
            return Err(ProjectServiceError::Validation(format!("duplicate question id: {}", id)));
        }

        let mut stance_ids = HashSet::new();
        let mut stance_names = HashSet::new();
        let mut stances = Vec::with_capacity(input.stances.len());
        for stance in input.stances {
            let name = stance.name.trim();
            if name.is_empty() {
                return Err(ProjectServiceError::Validation(format!(
                    "stance name must not be empty (question {})",
                    id
                )));
            }
            let stance_id = non_blank(stance.id).unwrap_or_else(|| Uuid::new_v4().to_string());
            // a reserved id may only be reused together with its reserved name
            if let Some(reserved) = special_stances().into_iter().find(|s| s.id == stance_id)
                && reserved.name != name
            {
                return Err(ProjectServiceError::Validation(format!(
                    "stance id {} is reserved for \"{}\" (question {})",
                    stance_id, reserved.name, id
                )));
            }
            if !stance_ids.insert(stance_id.clone()) {
                return Err(ProjectServiceError::Validation(format!(
                    "duplicate stance id {} in question {}",
                    stance_id, id
                )));
            }
            if !stance_names.insert(name.to_string()) {
                return Err(ProjectServiceError::Validation(format!(
                    "duplicate stance name \"{}\" in question {}",
                    name, id
                )));
            }
            stances.push(Stance::new(stance_id, name));
        }

        questions.push(Question {
            id,
            text: text.to_string(),
            stances,
        });
    }

    Ok(questions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryStore;
    use crate::model::project::{NEUTRAL_STANCE_ID, NEUTRAL_STANCE_NAME, OTHER_STANCE_ID, StanceInput};
    use crate::model::report::tally_stances;
    use crate::model::{CommentInput, StanceAnalysisResult};
    use crate::service::llm::{LlmError, RateLimit};
    use crate::service::prompts::PromptTemplates;
    use crate::service::retry::RetryPolicy;
    use crate::testing::{ScriptedLlm, field, routing_templates, stance_json};
    use std::time::Duration;

    struct Fixture {
        store: Arc<InMemoryStore>,
        llm: Arc<ScriptedLlm>,
        service: ProjectService,
    }

    fn fixture(llm: ScriptedLlm) -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let llm = Arc::new(llm);
        let templates: Arc<PromptTemplates> = Arc::new(routing_templates());
        let retry = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        };
        let stance = StanceClassifier::new(llm.clone(), templates.clone(), RateLimit::unlimited())
            .with_retry_policy(retry);
        let generator = QuestionGenerator::new(llm.clone(), templates).with_retry_policy(retry);
        let service = ProjectService::new(
            store.clone(),
            Arc::new(stance),
            Arc::new(generator),
            BatchConfig {
                batch_size: 2,
                delay_ms: 0,
            },
        );
        Fixture {
            store,
            llm,
            service,
        }
    }

    fn question_input(id: &str, text: &str, stances: &[(&str, &str)]) -> QuestionInput {
        QuestionInput {
            id: Some(id.to_string()),
            text: text.to_string(),
            stances: stances
                .iter()
                .map(|(id, name)| StanceInput {
                    id: Some(id.to_string()),
                    name: name.to_string(),
                })
                .collect(),
        }
    }

    fn fares_input() -> QuestionInput {
        question_input("q-fares", "Should fares be frozen?", &[("s-freeze", "Freeze"), ("s-raise", "Raise")])
    }

    fn night_bus_input() -> QuestionInput {
        question_input("q-night", "Should night buses run?", &[("s-yes", "Yes"), ("s-no", "No")])
    }

    /// Project holding the fares question and one labelled claim
    async fn seeded_project(f: &Fixture) -> (Project, Comment) {
        let mut project = Project::new(NewProject {
            name: "Transit".to_string(),
            extraction_topic: Some("public transit".to_string()),
            ..Default::default()
        });
        project.questions = build_questions(vec![fares_input()]).unwrap();
        f.store.insert_project(&project).await.unwrap();

        let comment = Comment::new(
            project.id,
            &CommentInput::new("Freeze fares and run night buses"),
            Some("Freeze fares and run night buses".to_string()),
            vec![CommentStance::from(StanceAnalysisResult::accepted("q-fares", "s-freeze", 0.9))],
        );
        f.store.insert_comment(&comment).await.unwrap();

        let bare = Comment::new(project.id, &CommentInput::new("Unrelated"), None, Vec::new());
        f.store.insert_comment(&bare).await.unwrap();

        (project, comment)
    }

    async fn stored_comment(f: &Fixture, project_id: Uuid, id: Uuid) -> Comment {
        f.store
            .list_comments(project_id)
            .await
            .unwrap()
            .into_iter()
            .find(|c| c.id == id)
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_and_list_projects() {
        let f = fixture(ScriptedLlm::unreachable());

        let blank = f
            .service
            .create_project(NewProject {
                name: "  ".to_string(),
                ..Default::default()
            })
            .await;
        assert!(matches!(blank, Err(ProjectServiceError::Validation(_))));

        let created = f
            .service
            .create_project(NewProject {
                name: " Transit ".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(created.name, "Transit");
        assert_eq!(f.service.get_project(created.id).await.unwrap(), created);

        let summaries = f.service.list_projects().await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].comment_count, 0);

        let missing = f.service.get_project(Uuid::new_v4()).await;
        assert!(matches!(missing, Err(ProjectServiceError::ProjectNotFound(_))));
    }

    #[tokio::test]
    async fn test_reanalysis_keeps_existing_stances_and_labels_new_questions() {
        let f = fixture(ScriptedLlm::new(|prompt| {
            assert_eq!(field(prompt, 0), "STANCE");
            assert_eq!(field(prompt, 1), "Should night buses run?");
            Ok(stance_json("Yes", 0.85))
        }));
        let (project, comment) = seeded_project(&f).await;

        let updated = f
            .service
            .replace_questions(project.id, vec![fares_input(), night_bus_input()])
            .await
            .unwrap();

        assert_eq!(updated.questions.len(), 2);
        assert_eq!(f.llm.calls(), 1);

        let stored = stored_comment(&f, project.id, comment.id).await;
        assert_eq!(stored.stance_for("q-fares"), Some("s-freeze"));
        assert_eq!(stored.stance_for("q-night"), Some("s-yes"));
        assert_eq!(f.store.get_project(project.id).await.unwrap().questions.len(), 2);
    }

    #[tokio::test]
    async fn test_reanalysis_runs_in_bounded_batches() {
        let f = fixture(
            ScriptedLlm::new(|_| Ok(stance_json("Yes", 0.9))).with_latency(Duration::from_millis(5)),
        );
        let (project, _) = seeded_project(&f).await;
        for claim in ["Night buses please", "More late services", "Buses after midnight", "Keep the night route"] {
            let labelled = vec![CommentStance::from(StanceAnalysisResult::accepted("q-fares", "s-raise", 0.9))];
            let comment = Comment::new(project.id, &CommentInput::new(claim), Some(claim.to_string()), labelled);
            f.store.insert_comment(&comment).await.unwrap();
        }

        f.service
            .replace_questions(project.id, vec![fares_input(), night_bus_input()])
            .await
            .unwrap();

        assert_eq!(f.llm.calls(), 5);
        assert!(f.llm.peak_in_flight() <= 2, "peak in flight was {}", f.llm.peak_in_flight());
        assert!(f.llm.peak_in_flight() >= 1);
    }

    #[tokio::test]
    async fn test_unchanged_questions_skip_reanalysis() {
        let f = fixture(ScriptedLlm::unreachable());
        let (project, _) = seeded_project(&f).await;

        let result = f.service.replace_questions(project.id, vec![fares_input()]).await.unwrap();

        assert_eq!(result.questions, project.questions);
        assert_eq!(f.llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_removed_question_drops_its_stance() {
        let f = fixture(ScriptedLlm::new(|_| Ok(stance_json("No", 0.95))));
        let (project, comment) = seeded_project(&f).await;

        let (_, summary) = f
            .service
            .on_question_set_changed(project.clone(), build_questions(vec![night_bus_input()]).unwrap())
            .await
            .unwrap();

        assert_eq!(
            summary,
            ReanalysisSummary {
                processed: 1,
                updated: 1,
                failed: 0,
            }
        );
        let stored = stored_comment(&f, project.id, comment.id).await;
        assert_eq!(stored.stance_for("q-fares"), None);
        assert_eq!(stored.stance_for("q-night"), Some("s-no"));
    }

    #[tokio::test]
    async fn test_failed_classification_is_left_for_the_next_run() {
        let f = fixture(ScriptedLlm::new(|_| Err(LlmError::Failed("bad request".to_string()))));
        let (project, comment) = seeded_project(&f).await;

        f.service
            .replace_questions(project.id, vec![fares_input(), night_bus_input()])
            .await
            .unwrap();

        let stored = stored_comment(&f, project.id, comment.id).await;
        assert_eq!(stored.stances.len(), 1);
        assert_eq!(stored.stance_for("q-fares"), Some("s-freeze"));
    }

    #[tokio::test]
    async fn test_invalid_question_list_is_rejected_before_storing() {
        let f = fixture(ScriptedLlm::unreachable());
        let (project, _) = seeded_project(&f).await;

        let blank_stance = question_input("q-x", "Anything?", &[("s1", " ")]);
        let result = f.service.replace_questions(project.id, vec![blank_stance]).await;
        assert!(matches!(result, Err(ProjectServiceError::Validation(_))));

        let result = f
            .service
            .replace_questions(project.id, vec![fares_input(), fares_input()])
            .await;
        assert!(matches!(result, Err(ProjectServiceError::Validation(_))));

        assert_eq!(f.store.get_project(project.id).await.unwrap().questions, project.questions);
    }

    #[test]
    fn test_reserved_stance_id_needs_reserved_name() {
        let hijacked = question_input("q1", "Should fares be frozen?", &[(NEUTRAL_STANCE_ID, "Support"), ("s-oppose", "Oppose")]);
        let result = build_questions(vec![hijacked]);
        assert!(matches!(result, Err(ProjectServiceError::Validation(_))));

        let shadowing = question_input("q1", "Should fares be frozen?", &[(NEUTRAL_STANCE_ID, NEUTRAL_STANCE_NAME), ("s-oppose", "Oppose")]);
        let questions = build_questions(vec![shadowing]).unwrap();
        let options = questions[0].stance_options();
        assert_eq!(options.iter().filter(|s| s.id == NEUTRAL_STANCE_ID).count(), 1);
    }

    #[test]
    fn test_no_stance_answer_is_not_counted_under_authored_stance() {
        let hijacked = question_input("q1", "Should fares be frozen?", &[(OTHER_STANCE_ID, "Support")]);
        assert!(build_questions(vec![hijacked]).is_err());

        let question = build_questions(vec![question_input("q1", "Should fares be frozen?", &[("s-support", "Support")])])
            .unwrap()
            .remove(0);
        let comment = Comment::new(
            Uuid::new_v4(),
            &CommentInput::new("No opinion"),
            Some("No opinion".to_string()),
            vec![CommentStance::from(StanceAnalysisResult::accepted("q1", NEUTRAL_STANCE_ID, 0.9))],
        );
        let tallies = tally_stances(&question, &[comment]);
        let support = tallies.iter().find(|t| t.stance_name == "Support").unwrap();
        let neutral = tallies.iter().find(|t| t.stance_name == NEUTRAL_STANCE_NAME).unwrap();
        assert_eq!(support.count, 0);
        assert_eq!(neutral.count, 1);
    }

    #[test]
    fn test_duplicate_stance_names_are_rejected() {
        let repeated = question_input("q1", "Should fares be frozen?", &[("a", "Freeze"), ("b", " Freeze ")]);
        let result = build_questions(vec![repeated]);
        assert!(matches!(result, Err(ProjectServiceError::Validation(_))));
    }

    #[tokio::test]
    async fn test_missing_ids_are_assigned() {
        let questions = build_questions(vec![QuestionInput {
            id: None,
            text: " Should fares be frozen? ".to_string(),
            stances: vec![StanceInput {
                id: Some(" ".to_string()),
                name: "Freeze".to_string(),
            }],
        }])
        .unwrap();

        assert_eq!(questions[0].text, "Should fares be frozen?");
        assert!(Uuid::parse_str(&questions[0].id).is_ok());
        assert!(Uuid::parse_str(&questions[0].stances[0].id).is_ok());
    }

    #[tokio::test]
    async fn test_metadata_update_does_not_reanalyse() {
        let f = fixture(ScriptedLlm::unreachable());
        let (project, _) = seeded_project(&f).await;

        let updated = f
            .service
            .update_project(
                project.id,
                ProjectUpdate {
                    name: Some("Transit 2026".to_string()),
                    extraction_topic: Some(" ".to_string()),
                    questions: Some(vec![fares_input()]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.name, "Transit 2026");
        assert_eq!(updated.extraction_topic, None);
        assert_eq!(f.store.get_project(project.id).await.unwrap(), updated);
    }

    #[tokio::test]
    async fn test_generate_questions_assigns_ids_and_labels_comments() {
        let f = fixture(ScriptedLlm::new(|prompt| match field(prompt, 0) {
            "QUESTIONS" => Ok(
                r#"{"questions": [{"text": "Should fares be frozen?", "stances": [{"name": "Freeze"}, {"name": "Raise"}]}]}"#
                    .to_string(),
            ),
            "STANCE" => Ok(stance_json("Freeze", 0.9)),
            other => panic!("unexpected call {other}"),
        }));
        let (project, comment) = seeded_project(&f).await;

        let updated = f.service.generate_questions(project.id).await.unwrap();

        assert_eq!(updated.questions.len(), 1);
        let question = &updated.questions[0];
        assert_ne!(question.id, "q-fares");
        assert!(Uuid::parse_str(&question.id).is_ok());
        assert_eq!(question.stances.len(), 2);

        let stored = stored_comment(&f, project.id, comment.id).await;
        assert_eq!(stored.stance_for(&question.id), Some(question.stances[0].id.as_str()));
        assert_eq!(stored.stance_for("q-fares"), None);
    }

    #[tokio::test]
    async fn test_generate_questions_errors() {
        let f = fixture(ScriptedLlm::new(|_| Ok(r#"{"questions": []}"#.to_string())));
        let empty = f
            .service
            .create_project(NewProject {
                name: "Empty".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let result = f.service.generate_questions(empty.id).await;
        assert!(matches!(result, Err(ProjectServiceError::Validation(_))));
        assert_eq!(f.llm.calls(), 0);

        let (project, _) = seeded_project(&f).await;
        let result = f.service.generate_questions(project.id).await;
        assert!(matches!(result, Err(ProjectServiceError::Generation(_))));
        assert_eq!(f.store.get_project(project.id).await.unwrap().questions, project.questions);
    }
}
