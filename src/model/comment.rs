//! Comment records and their stance labels

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::model::analysis::StanceAnalysisResult;

/// Channel a comment was collected from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Youtube,
    X,
    Form,
    #[default]
    Other,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Youtube => "youtube",
            SourceType::X => "x",
            SourceType::Form => "form",
            SourceType::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "youtube" => SourceType::Youtube,
            "x" => SourceType::X,
            "form" => SourceType::Form,
            _ => SourceType::Other,
        }
    }
}

/// Stance label attached to a comment for one question.
///
/// `stance_id: None` marks a classification that was made but rejected
/// (low confidence or unknown option); it is excluded from aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CommentStance {
    pub question_id: String,
    pub stance_id: Option<String>,
    pub confidence: Option<f64>,
}

impl From<StanceAnalysisResult> for CommentStance {
    fn from(result: StanceAnalysisResult) -> Self {
        Self {
            question_id: result.question_id,
            stance_id: result.stance_id,
            confidence: result.confidence,
        }
    }
}

/// A stored comment. One raw submission may produce several records, one
/// per extracted claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Comment {
    pub id: Uuid,
    pub project_id: Uuid,
    pub content: String,
    pub extracted_content: Option<String>,
    #[serde(default)]
    pub stances: Vec<CommentStance>,
    pub source_type: SourceType,
    pub source_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn new(
        project_id: Uuid,
        input: &CommentInput,
        extracted_content: Option<String>,
        stances: Vec<CommentStance>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            content: input.content.clone(),
            extracted_content,
            stances,
            source_type: input.source_type.unwrap_or_default(),
            source_url: input.source_url.clone(),
            created_at: Utc::now(),
        }
    }

    /// Accepted stance id for a question, if any
    pub fn stance_for(&self, question_id: &str) -> Option<&str> {
        self.stances
            .iter()
            .find(|s| s.question_id == question_id)
            .and_then(|s| s.stance_id.as_deref())
    }
}

/// Raw comment submission
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct CommentInput {
    pub content: String,
    pub source_type: Option<SourceType>,
    pub source_url: Option<String>,
}

impl CommentInput {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }
}
