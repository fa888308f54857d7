//! Projects, discussion questions and stance options

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Identifier of the implicit "no stance" option
pub const NEUTRAL_STANCE_ID: &str = "neutral";
/// Display name of the implicit "no stance" option
pub const NEUTRAL_STANCE_NAME: &str = "No stance";
/// Identifier of the implicit "other" option
pub const OTHER_STANCE_ID: &str = "other";
/// Display name of the implicit "other" option
pub const OTHER_STANCE_NAME: &str = "Other";

/// A discrete position a claim can take on a question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Stance {
    pub id: String,
    pub name: String,
}

impl Stance {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// A discussion question with its authored stance options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Question {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub stances: Vec<Stance>,
}

impl Question {
    /// Authored stances followed by the implicit "no stance" and "other"
    /// options, de-duplicated by display name (first occurrence wins). An
    /// authored stance whose display name matches an implicit option
    /// shadows it.
    pub fn stance_options(&self) -> Vec<Stance> {
        let mut options: Vec<Stance> = Vec::with_capacity(self.stances.len() + 2);
        for stance in self.stances.iter().cloned().chain(special_stances()) {
            if !options.iter().any(|s| s.name == stance.name) {
                options.push(stance);
            }
        }
        options
    }
}

/// The two stance options every question implicitly offers
pub fn special_stances() -> [Stance; 2] {
    [
        Stance::new(NEUTRAL_STANCE_ID, NEUTRAL_STANCE_NAME),
        Stance::new(OTHER_STANCE_ID, OTHER_STANCE_NAME),
    ]
}

/// A consultation project owning comments and questions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Relevance gate: comments are only classified when a topic is set
    pub extraction_topic: Option<String>,
    /// Background passed into every classification prompt
    pub context: Option<String>,
    #[serde(default)]
    pub questions: Vec<Question>,
    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn new(input: NewProject) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: input.name.trim().to_string(),
            description: input.description.trim().to_string(),
            extraction_topic: non_blank(input.extraction_topic),
            context: non_blank(input.context),
            questions: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn question(&self, question_id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == question_id)
    }

    /// Extraction topic, if set and not blank
    pub fn topic(&self) -> Option<&str> {
        self.extraction_topic
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

/// Project creation input
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct NewProject {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub extraction_topic: Option<String>,
    pub context: Option<String>,
}

/// Project update input. `questions: None` leaves the question list alone.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ProjectUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub extraction_topic: Option<String>,
    pub context: Option<String>,
    pub questions: Option<Vec<QuestionInput>>,
}

/// A question as submitted by a client; ids are assigned when missing
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct QuestionInput {
    pub id: Option<String>,
    pub text: String,
    #[serde(default)]
    pub stances: Vec<StanceInput>,
}

/// A stance option as submitted by a client
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct StanceInput {
    pub id: Option<String>,
    pub name: String,
}

/// Project listing entry
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProjectSummary {
    #[serde(flatten)]
    pub project: Project,
    pub comment_count: i64,
}

pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
