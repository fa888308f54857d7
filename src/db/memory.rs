//! In-process [`Store`] used for local runs and tests

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{DbError, Store};
use crate::model::{Comment, CommentStance, Project, ProjectReport, ProjectSummary, StanceReport};

#[derive(Default)]
struct Tables {
    projects: HashMap<Uuid, Project>,
    // insertion order
    comments: Vec<Comment>,
    stance_reports: HashMap<(Uuid, String), StanceReport>,
    project_reports: HashMap<Uuid, ProjectReport>,
}

#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert_project(&self, project: &Project) -> Result<(), DbError> {
        self.tables
            .write()
            .await
            .projects
            .insert(project.id, project.clone());
        Ok(())
    }

    async fn get_project(&self, id: Uuid) -> Result<Project, DbError> {
        self.tables
            .read()
            .await
            .projects
            .get(&id)
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("project {}", id)))
    }

    async fn list_projects(&self) -> Result<Vec<ProjectSummary>, DbError> {
        let tables = self.tables.read().await;
        let mut summaries: Vec<ProjectSummary> = tables
            .projects
            .values()
            .map(|project| ProjectSummary {
                project: project.clone(),
                comment_count: tables
                    .comments
                    .iter()
                    .filter(|c| c.project_id == project.id)
                    .count() as i64,
            })
            .collect();
        summaries.sort_by(|a, b| b.project.created_at.cmp(&a.project.created_at));
        Ok(summaries)
    }

    async fn update_project(&self, project: &Project) -> Result<(), DbError> {
        let mut tables = self.tables.write().await;
        match tables.projects.get_mut(&project.id) {
            Some(stored) => {
                *stored = project.clone();
                Ok(())
            }
            None => Err(DbError::NotFound(format!("project {}", project.id))),
        }
    }

    async fn insert_comment(&self, comment: &Comment) -> Result<(), DbError> {
        self.tables.write().await.comments.push(comment.clone());
        Ok(())
    }

    async fn list_comments(&self, project_id: Uuid) -> Result<Vec<Comment>, DbError> {
        let tables = self.tables.read().await;
        let mut comments: Vec<Comment> = tables
            .comments
            .iter()
            .rev()
            .filter(|c| c.project_id == project_id)
            .cloned()
            .collect();
        comments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(comments)
    }

    async fn comment_exists(&self, project_id: Uuid, content: &str) -> Result<bool, DbError> {
        Ok(self
            .tables
            .read()
            .await
            .comments
            .iter()
            .any(|c| c.project_id == project_id && c.content == content))
    }

    async fn update_comment_stances(
        &self,
        comment_id: Uuid,
        stances: &[CommentStance],
    ) -> Result<(), DbError> {
        let mut tables = self.tables.write().await;
        match tables.comments.iter_mut().find(|c| c.id == comment_id) {
            Some(comment) => {
                comment.stances = stances.to_vec();
                Ok(())
            }
            None => Err(DbError::NotFound(format!("comment {}", comment_id))),
        }
    }

    async fn get_stance_report(
        &self,
        project_id: Uuid,
        question_id: &str,
    ) -> Result<Option<StanceReport>, DbError> {
        Ok(self
            .tables
            .read()
            .await
            .stance_reports
            .get(&(project_id, question_id.to_string()))
            .cloned())
    }

    async fn upsert_stance_report(&self, report: &StanceReport) -> Result<(), DbError> {
        self.tables.write().await.stance_reports.insert(
            (report.project_id, report.question_id.clone()),
            report.clone(),
        );
        Ok(())
    }

    async fn get_project_report(&self, project_id: Uuid) -> Result<Option<ProjectReport>, DbError> {
        Ok(self
            .tables
            .read()
            .await
            .project_reports
            .get(&project_id)
            .cloned())
    }

    async fn upsert_project_report(&self, report: &ProjectReport) -> Result<(), DbError> {
        self.tables
            .write()
            .await
            .project_reports
            .insert(report.project_id, report.clone());
        Ok(())
    }

    async fn ping(&self) -> Result<(), DbError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CommentInput, NewProject};

    fn project() -> Project {
        Project::new(NewProject {
            name: "Transit".to_string(),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_comment_exists_is_scoped_to_project() {
        let store = InMemoryStore::new();
        let a = project();
        let b = project();
        store.insert_project(&a).await.unwrap();
        store.insert_project(&b).await.unwrap();

        let comment = Comment::new(a.id, &CommentInput::new("Fares are too high"), None, vec![]);
        store.insert_comment(&comment).await.unwrap();

        assert!(store.comment_exists(a.id, "Fares are too high").await.unwrap());
        assert!(!store.comment_exists(a.id, "fares are too high").await.unwrap());
        assert!(!store.comment_exists(b.id, "Fares are too high").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_comments_newest_first() {
        let store = InMemoryStore::new();
        let p = project();
        store.insert_project(&p).await.unwrap();
        for content in ["first", "second", "third"] {
            let comment = Comment::new(p.id, &CommentInput::new(content), None, vec![]);
            store.insert_comment(&comment).await.unwrap();
        }

        let contents: Vec<String> = store
            .list_comments(p.id)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.content)
            .collect();

        assert_eq!(contents, vec!["third", "second", "first"]);

        let summaries = store.list_projects().await.unwrap();
        assert_eq!(summaries[0].comment_count, 3);
    }

    #[tokio::test]
    async fn test_update_unknown_comment_is_not_found() {
        let store = InMemoryStore::new();
        let result = store.update_comment_stances(Uuid::new_v4(), &[]).await;
        assert!(matches!(result, Err(DbError::NotFound(_))));
    }
}
