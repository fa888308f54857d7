//! PostgreSQL implementation of [`Store`]

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::models::{
    CommentRow, ProjectReportRow, ProjectRow, ProjectSummaryRow, StanceReportRow, to_json,
};
use super::{DbError, Store};
use crate::model::{Comment, CommentStance, Project, ProjectReport, ProjectSummary, StanceReport};
use crate::service::cache_keys::content_hash;

/// Repository for projects, comments and cached reports
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_project(&self, project: &Project) -> Result<(), DbError> {
        let questions = to_json(&project.questions).map_err(DbError::Serialization)?;

        sqlx::query(
            r#"
            INSERT INTO projects (
                id, name, description, extraction_topic, context, questions, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(project.id)
        .bind(&project.name)
        .bind(&project.description)
        .bind(&project.extraction_topic)
        .bind(&project.context)
        .bind(&questions)
        .bind(project.created_at)
        .execute(&self.pool)
        .await?;

        tracing::debug!(project_id = %project.id, "Inserted project");
        Ok(())
    }

    async fn get_project(&self, id: Uuid) -> Result<Project, DbError> {
        let row: ProjectRow = sqlx::query_as(
            r#"
            SELECT id, name, description, extraction_topic, context, questions, created_at
            FROM projects WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("project {}", id)))?;

        row.into_domain().map_err(DbError::Serialization)
    }

    async fn list_projects(&self) -> Result<Vec<ProjectSummary>, DbError> {
        let rows: Vec<ProjectSummaryRow> = sqlx::query_as(
            r#"
            SELECT p.id, p.name, p.description, p.extraction_topic, p.context, p.questions,
                   p.created_at, COUNT(c.id) AS comment_count
            FROM projects p
            LEFT JOIN comments c ON c.project_id = p.id
            GROUP BY p.id
            ORDER BY p.created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| row.into_domain().map_err(DbError::Serialization))
            .collect()
    }

    async fn update_project(&self, project: &Project) -> Result<(), DbError> {
        let questions = to_json(&project.questions).map_err(DbError::Serialization)?;

        let result = sqlx::query(
            r#"
            UPDATE projects SET
                name = $2,
                description = $3,
                extraction_topic = $4,
                context = $5,
                questions = $6
            WHERE id = $1
            "#,
        )
        .bind(project.id)
        .bind(&project.name)
        .bind(&project.description)
        .bind(&project.extraction_topic)
        .bind(&project.context)
        .bind(&questions)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("project {}", project.id)));
        }

        tracing::debug!(project_id = %project.id, "Updated project");
        Ok(())
    }

    async fn insert_comment(&self, comment: &Comment) -> Result<(), DbError> {
        let stances = to_json(&comment.stances).map_err(DbError::Serialization)?;

        sqlx::query(
            r#"
            INSERT INTO comments (
                id, project_id, content, content_hash, extracted_content,
                stances, source_type, source_url, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(comment.id)
        .bind(comment.project_id)
        .bind(&comment.content)
        .bind(content_hash(&comment.content))
        .bind(&comment.extracted_content)
        .bind(&stances)
        .bind(comment.source_type.as_str())
        .bind(&comment.source_url)
        .bind(comment.created_at)
        .execute(&self.pool)
        .await?;

        tracing::debug!(comment_id = %comment.id, project_id = %comment.project_id, "Inserted comment");
        Ok(())
    }

    async fn list_comments(&self, project_id: Uuid) -> Result<Vec<Comment>, DbError> {
        let rows: Vec<CommentRow> = sqlx::query_as(
            r#"
            SELECT id, project_id, content, extracted_content, stances,
                   source_type, source_url, created_at
            FROM comments
            WHERE project_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| row.into_domain().map_err(DbError::Serialization))
            .collect()
    }

    async fn comment_exists(&self, project_id: Uuid, content: &str) -> Result<bool, DbError> {
        let result: Option<(i32,)> = sqlx::query_as(
            r#"
            SELECT 1 FROM comments
            WHERE project_id = $1 AND content_hash = $2 AND content = $3
            LIMIT 1
            "#,
        )
        .bind(project_id)
        .bind(content_hash(content))
        .bind(content)
        .fetch_optional(&self.pool)
        .await?;

        Ok(result.is_some())
    }

    async fn update_comment_stances(
        &self,
        comment_id: Uuid,
        stances: &[CommentStance],
    ) -> Result<(), DbError> {
        let stances = to_json(&stances).map_err(DbError::Serialization)?;

        let result = sqlx::query("UPDATE comments SET stances = $2 WHERE id = $1")
            .bind(comment_id)
            .bind(&stances)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("comment {}", comment_id)));
        }
        Ok(())
    }

    async fn get_stance_report(
        &self,
        project_id: Uuid,
        question_id: &str,
    ) -> Result<Option<StanceReport>, DbError> {
        let row: Option<StanceReportRow> = sqlx::query_as(
            r#"
            SELECT project_id, question_id, question, tallies, analysis, generated_at
            FROM stance_reports
            WHERE project_id = $1 AND question_id = $2
            "#,
        )
        .bind(project_id)
        .bind(question_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_domain().map_err(DbError::Serialization))
            .transpose()
    }

    async fn upsert_stance_report(&self, report: &StanceReport) -> Result<(), DbError> {
        let tallies = to_json(&report.tallies).map_err(DbError::Serialization)?;

        sqlx::query(
            r#"
            INSERT INTO stance_reports (
                project_id, question_id, question, tallies, analysis, generated_at
            ) VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (project_id, question_id) DO UPDATE SET
                question = EXCLUDED.question,
                tallies = EXCLUDED.tallies,
                analysis = EXCLUDED.analysis,
                generated_at = EXCLUDED.generated_at
            "#,
        )
        .bind(report.project_id)
        .bind(&report.question_id)
        .bind(&report.question)
        .bind(&tallies)
        .bind(&report.analysis)
        .bind(report.generated_at)
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            project_id = %report.project_id,
            question_id = %report.question_id,
            "Upserted stance report"
        );
        Ok(())
    }

    async fn get_project_report(&self, project_id: Uuid) -> Result<Option<ProjectReport>, DbError> {
        let row: Option<ProjectReportRow> = sqlx::query_as(
            r#"
            SELECT project_id, project_name, overall_analysis, questions, generated_at
            FROM project_reports
            WHERE project_id = $1
            "#,
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_domain().map_err(DbError::Serialization))
            .transpose()
    }

    async fn upsert_project_report(&self, report: &ProjectReport) -> Result<(), DbError> {
        let questions = to_json(&report.questions).map_err(DbError::Serialization)?;

        sqlx::query(
            r#"
            INSERT INTO project_reports (
                project_id, project_name, overall_analysis, questions, generated_at
            ) VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (project_id) DO UPDATE SET
                project_name = EXCLUDED.project_name,
                overall_analysis = EXCLUDED.overall_analysis,
                questions = EXCLUDED.questions,
                generated_at = EXCLUDED.generated_at
            "#,
        )
        .bind(report.project_id)
        .bind(&report.project_name)
        .bind(&report.overall_analysis)
        .bind(&questions)
        .bind(report.generated_at)
        .execute(&self.pool)
        .await?;

        tracing::debug!(project_id = %report.project_id, "Upserted project report");
        Ok(())
    }

    async fn ping(&self) -> Result<(), DbError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
