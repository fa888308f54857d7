//! Classification results and the structured outputs requested from the model

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::model::comment::CommentStance;

/// How a stance result came about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StanceOutcome {
    /// The model picked a known option with sufficient confidence
    Accepted,
    /// The model answered but the answer failed the acceptance gate
    Rejected,
    /// The external call failed or its output could not be parsed
    Failed,
    /// Carried over from a previous classification
    Reused,
}

/// Result of classifying one claim against one question
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StanceAnalysisResult {
    pub question_id: String,
    pub stance_id: Option<String>,
    pub confidence: Option<f64>,
    #[serde(skip)]
    pub outcome: StanceOutcome,
}

impl StanceAnalysisResult {
    pub fn accepted(question_id: &str, stance_id: &str, confidence: f64) -> Self {
        Self {
            question_id: question_id.to_string(),
            stance_id: Some(stance_id.to_string()),
            confidence: Some(confidence),
            outcome: StanceOutcome::Accepted,
        }
    }

    pub fn rejected(question_id: &str) -> Self {
        Self {
            question_id: question_id.to_string(),
            stance_id: None,
            confidence: None,
            outcome: StanceOutcome::Rejected,
        }
    }

    pub fn failed(question_id: &str) -> Self {
        Self {
            outcome: StanceOutcome::Failed,
            ..Self::rejected(question_id)
        }
    }

    pub fn reused(stance: &CommentStance) -> Self {
        Self {
            question_id: stance.question_id.clone(),
            stance_id: stance.stance_id.clone(),
            confidence: stance.confidence,
            outcome: StanceOutcome::Reused,
        }
    }

    /// Failed calls are not stored so that a later reanalysis retries them
    pub fn is_persistable(&self) -> bool {
        self.outcome != StanceOutcome::Failed
    }
}

/// Stance classification answer expected from the model
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StanceResponse {
    /// Exact name of one offered stance option
    pub stance: Option<String>,
    /// Confidence between 0 and 1
    pub confidence: Option<f64>,
}

/// Question generation answer expected from the model
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GeneratedQuestions {
    pub questions: Vec<GeneratedQuestion>,
}

/// A generated question with its proposed stances
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GeneratedQuestion {
    pub text: String,
    pub stances: Vec<GeneratedStance>,
}

/// A generated stance option
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GeneratedStance {
    pub name: String,
}
