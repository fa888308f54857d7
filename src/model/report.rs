//! Cached aggregate reports

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::model::comment::Comment;
use crate::model::project::Question;

/// Comments grouped under one stance option
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct StanceTally {
    pub stance_id: String,
    pub stance_name: String,
    pub count: usize,
    pub comments: Vec<String>,
}

/// Per-question stance distribution with narrative analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct StanceReport {
    pub project_id: Uuid,
    pub question_id: String,
    pub question: String,
    pub tallies: Vec<StanceTally>,
    pub analysis: String,
    pub generated_at: DateTime<Utc>,
}

/// Stance counts for one question inside a project report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct QuestionDigest {
    pub question_id: String,
    pub question: String,
    pub counts: Vec<StanceCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct StanceCount {
    pub stance_name: String,
    pub count: usize,
}

/// Whole-project synthesis across all questions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProjectReport {
    pub project_id: Uuid,
    pub project_name: String,
    pub overall_analysis: String,
    pub questions: Vec<QuestionDigest>,
    pub generated_at: DateTime<Utc>,
}

/// Count the accepted stances of `question` across `comments`.
///
/// Every offered option (authored and implicit) gets a tally, in option
/// order. Comments without an extracted claim or without an accepted stance
/// for the question are not counted.
pub fn tally_stances(question: &Question, comments: &[Comment]) -> Vec<StanceTally> {
    let mut tallies: Vec<StanceTally> = question
        .stance_options()
        .into_iter()
        .map(|option| StanceTally {
            stance_id: option.id,
            stance_name: option.name,
            count: 0,
            comments: Vec::new(),
        })
        .collect();

    for comment in comments {
        let Some(claim) = comment.extracted_content.as_ref() else {
            continue;
        };
        let Some(stance_id) = comment.stance_for(&question.id) else {
            continue;
        };
        if let Some(tally) = tallies.iter_mut().find(|t| t.stance_id == stance_id) {
            tally.count += 1;
            tally.comments.push(claim.clone());
        }
    }

    tallies
}

impl From<&StanceReport> for QuestionDigest {
    fn from(report: &StanceReport) -> Self {
        Self {
            question_id: report.question_id.clone(),
            question: report.question.clone(),
            counts: report
                .tallies
                .iter()
                .map(|t| StanceCount {
                    stance_name: t.stance_name.clone(),
                    count: t.count,
                })
                .collect(),
        }
    }
}
