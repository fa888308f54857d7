//! Database row types and their conversion into domain models

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::model::report::{QuestionDigest, StanceTally};
use crate::model::{
    Comment, CommentStance, Project, ProjectReport, ProjectSummary, Question, SourceType,
    StanceReport,
};

/// Database representation of a project
#[derive(Debug, Clone, FromRow)]
pub struct ProjectRow {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub extraction_topic: Option<String>,
    pub context: Option<String>,
    pub questions: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl ProjectRow {
    /// Convert database row to domain model
    pub fn into_domain(self) -> Result<Project, String> {
        let questions: Vec<Question> = serde_json::from_value(self.questions)
            .map_err(|e| format!("Invalid questions for project {}: {}", self.id, e))?;

        Ok(Project {
            id: self.id,
            name: self.name,
            description: self.description,
            extraction_topic: self.extraction_topic,
            context: self.context,
            questions,
            created_at: self.created_at,
        })
    }
}

/// Project row joined with its comment count
#[derive(Debug, Clone, FromRow)]
pub struct ProjectSummaryRow {
    #[sqlx(flatten)]
    pub project: ProjectRow,
    pub comment_count: i64,
}

impl ProjectSummaryRow {
    pub fn into_domain(self) -> Result<ProjectSummary, String> {
        Ok(ProjectSummary {
            project: self.project.into_domain()?,
            comment_count: self.comment_count,
        })
    }
}

/// Database representation of a comment
#[derive(Debug, Clone, FromRow)]
pub struct CommentRow {
    pub id: Uuid,
    pub project_id: Uuid,
    pub content: String,
    pub extracted_content: Option<String>,
    pub stances: serde_json::Value,
    pub source_type: String,
    pub source_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CommentRow {
    pub fn into_domain(self) -> Result<Comment, String> {
        let stances: Vec<CommentStance> = serde_json::from_value(self.stances)
            .map_err(|e| format!("Invalid stances for comment {}: {}", self.id, e))?;

        Ok(Comment {
            id: self.id,
            project_id: self.project_id,
            content: self.content,
            extracted_content: self.extracted_content,
            stances,
            source_type: SourceType::parse(&self.source_type),
            source_url: self.source_url,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct StanceReportRow {
    pub project_id: Uuid,
    pub question_id: String,
    pub question: String,
    pub tallies: serde_json::Value,
    pub analysis: String,
    pub generated_at: DateTime<Utc>,
}

impl StanceReportRow {
    pub fn into_domain(self) -> Result<StanceReport, String> {
        let tallies: Vec<StanceTally> = serde_json::from_value(self.tallies)
            .map_err(|e| format!("Invalid tallies for question {}: {}", self.question_id, e))?;

        Ok(StanceReport {
            project_id: self.project_id,
            question_id: self.question_id,
            question: self.question,
            tallies,
            analysis: self.analysis,
            generated_at: self.generated_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ProjectReportRow {
    pub project_id: Uuid,
    pub project_name: String,
    pub overall_analysis: String,
    pub questions: serde_json::Value,
    pub generated_at: DateTime<Utc>,
}

impl ProjectReportRow {
    pub fn into_domain(self) -> Result<ProjectReport, String> {
        let questions: Vec<QuestionDigest> = serde_json::from_value(self.questions)
            .map_err(|e| format!("Invalid digests for project {}: {}", self.project_id, e))?;

        Ok(ProjectReport {
            project_id: self.project_id,
            project_name: self.project_name,
            overall_analysis: self.overall_analysis,
            questions,
            generated_at: self.generated_at,
        })
    }
}

/// Serialize a value into a JSONB column
pub fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, String> {
    serde_json::to_value(value).map_err(|e| e.to_string())
}
