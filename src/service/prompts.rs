//! Prompt templates and rendering
//!
//! Templates are plain text with `$name` placeholders. Built-in defaults are
//! compiled in; a directory of `<template-id>.txt` files can replace any of
//! them at startup.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Placeholder expanded to a background block when a non-empty `context`
/// variable is supplied, and removed otherwise
pub const CONTEXT_BLOCK: &str = "$context_block";

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PromptError {
    #[error("Failed to read prompt template {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Prompt template {0} is empty")]
    Empty(String),
}

/// Identifies one prompt template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateId {
    RelevanceCheck,
    ContentExtraction,
    StanceAnalysis,
    StanceReport,
    ProjectReport,
    QuestionGeneration,
}

impl TemplateId {
    pub const ALL: [TemplateId; 6] = [
        TemplateId::RelevanceCheck,
        TemplateId::ContentExtraction,
        TemplateId::StanceAnalysis,
        TemplateId::StanceReport,
        TemplateId::ProjectReport,
        TemplateId::QuestionGeneration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateId::RelevanceCheck => "relevance-check",
            TemplateId::ContentExtraction => "content-extraction",
            TemplateId::StanceAnalysis => "stance-analysis",
            TemplateId::StanceReport => "stance-report",
            TemplateId::ProjectReport => "project-report",
            TemplateId::QuestionGeneration => "question-generation",
        }
    }

    fn default_template(&self) -> &'static str {
        match self {
            TemplateId::RelevanceCheck => RELEVANCE_CHECK_TEMPLATE,
            TemplateId::ContentExtraction => CONTENT_EXTRACTION_TEMPLATE,
            TemplateId::StanceAnalysis => STANCE_ANALYSIS_TEMPLATE,
            TemplateId::StanceReport => STANCE_REPORT_TEMPLATE,
            TemplateId::ProjectReport => PROJECT_REPORT_TEMPLATE,
            TemplateId::QuestionGeneration => QUESTION_GENERATION_TEMPLATE,
        }
    }
}

/// Template registry shared by the classifiers and report generators
#[derive(Debug, Clone)]
pub struct PromptTemplates {
    templates: HashMap<TemplateId, String>,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            templates: TemplateId::ALL
                .iter()
                .map(|id| (*id, id.default_template().to_string()))
                .collect(),
        }
    }
}

impl PromptTemplates {
    /// Built-in templates, with any `<dir>/<template-id>.txt` file taking
    /// precedence over its default
    pub fn load(dir: Option<&Path>) -> Result<Self, PromptError> {
        let mut registry = Self::default();
        let Some(dir) = dir else {
            return Ok(registry);
        };

        for id in TemplateId::ALL {
            let path = dir.join(format!("{}.txt", id.as_str()));
            if !path.exists() {
                continue;
            }
            let contents = std::fs::read_to_string(&path).map_err(|source| PromptError::Read {
                path: path.clone(),
                source,
            })?;
            if contents.trim().is_empty() {
                return Err(PromptError::Empty(id.as_str().to_string()));
            }
            tracing::info!(template = id.as_str(), path = %path.display(), "Loaded prompt template override");
            registry.templates.insert(id, contents);
        }

        Ok(registry)
    }

    /// Replace a single template
    pub fn with_template(mut self, id: TemplateId, template: impl Into<String>) -> Self {
        self.templates.insert(id, template.into());
        self
    }

    pub fn get(&self, id: TemplateId) -> &str {
        self.templates
            .get(&id)
            .map(String::as_str)
            .unwrap_or_else(|| id.default_template())
    }

    /// Render the template `id` with `variables`
    pub fn render(&self, id: TemplateId, variables: &[(&str, &str)]) -> String {
        render(self.get(id), variables)
    }
}

/// Substitute `$name` placeholders in `template` in a single pass.
///
/// A `context` variable drives [`CONTEXT_BLOCK`] instead of being substituted
/// directly. Longer names win at each position so `$topic` never clobbers
/// `$topic_hint`, and substituted values are never rescanned.
pub fn render(template: &str, variables: &[(&str, &str)]) -> String {
    let mut names: Vec<(&str, String)> = Vec::with_capacity(variables.len() + 1);
    for (key, value) in variables {
        if *key == "context" {
            let block = if value.trim().is_empty() {
                String::new()
            } else {
                format!("Background information:\n\"\"\"\n{}\n\"\"\"\n\n", value.trim())
            };
            names.push((&CONTEXT_BLOCK[1..], block));
        } else {
            names.push((*key, value.to_string()));
        }
    }
    names.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

    let mut result = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(pos) = rest.find('$') {
        result.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        match names.iter().find(|(name, _)| after.starts_with(name)) {
            Some((name, value)) => {
                result.push_str(value);
                rest = &after[name.len()..];
            }
            None => {
                result.push('$');
                rest = after;
            }
        }
    }
    result.push_str(rest);
    result
}

pub const RELEVANCE_CHECK_TEMPLATE: &str = r#"You are a research assistant helping to analyze public consultation responses.

Decide whether the following comment is relevant to the topic "$topic".

$context_blockComment to analyze:
"""
$content
"""

Answer with exactly one word: RELEVANT or NOT_RELEVANT. A comment is relevant if it expresses any opinion or argument about the topic."#;

pub const CONTENT_EXTRACTION_TEMPLATE: &str = r#"You are a research assistant cleaning up a discussion dataset.

Rewrite the comment below as first-person claims about "$topic". Remove filler, insults and repetition; keep every distinct argument. Write one claim per line and nothing else.

$context_blockExample for the topic "AI technology":
Input:
"""
AI is honestly terrifying and people need to wake up!!! It's already taking jobs from hard working folks - my friend's cousin got replaced by some "automation system".
"""
Output:
I am worried that AI is taking people's jobs, for example a friend's cousin lost their job to automation.

Comment:
"""
$content
"""

Claims:"#;

pub const STANCE_ANALYSIS_TEMPLATE: &str = r#"You are analyzing a claim taken from a public consultation.

$context_blockQuestion: $question_text

Possible stances:
$stance_options

Claim:
"""
$content
"""

Pick the single stance the claim expresses on the question. Use "No stance" when the claim does not take a position and "Other" when it takes a position not listed.

Reply with JSON only, matching this schema:
$response_schema

"stance" must be exactly one of the stance names above and "confidence" a number between 0 and 1."#;

pub const STANCE_REPORT_TEMPLATE: &str = r#"You are summarizing public opinion on one question.

Question: $question_text

Comments grouped by stance:
$stance_entries

Write a concise analysis in markdown: the main arguments behind each stance, points of agreement and disagreement, and notable minority views."#;

pub const PROJECT_REPORT_TEMPLATE: &str = r#"You are writing an overall report for the consultation "$project_name".

Project description:
$project_description

Total classified comments: $total_comments
Report date: $current_date

Per-question results:
$question_analyses

Write an executive summary in markdown that synthesizes the results across all questions, highlights the strongest trends and open tensions, and suggests next steps for the project team."#;

pub const QUESTION_GENERATION_TEMPLATE: &str = r#"You are designing discussion questions for a public consultation.

Below are claims extracted from the submitted comments, one per line:
$comments

Propose the questions that best capture where opinions diverge. For each question give two to five mutually exclusive stances.

Reply with JSON only, matching this schema:
$response_schema"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_context_block() {
        let template = "$context_blockTopic: $topic";
        assert_eq!(
            render(template, &[("context", "Fares rose in 2024"), ("topic", "fares")]),
            "Background information:\n\"\"\"\nFares rose in 2024\n\"\"\"\n\nTopic: fares"
        );
        assert_eq!(render(template, &[("context", "  "), ("topic", "fares")]), "Topic: fares");
    }

    #[test]
    fn test_render_prefers_longer_names() {
        let rendered = render("$topic / $topic_hint", &[("topic", "fares"), ("topic_hint", "bus")]);
        assert_eq!(rendered, "fares / bus");
    }

    #[test]
    fn test_substituted_values_are_not_rescanned() {
        let rendered = render("$content ($topic)", &[("content", "costs $topic"), ("topic", "fares")]);
        assert_eq!(rendered, "costs $topic (fares)");
        assert_eq!(render("$5 fare", &[("topic", "fares")]), "$5 fare");
    }

    #[test]
    fn test_defaults_cover_every_template() {
        let templates = PromptTemplates::default();
        for id in TemplateId::ALL {
            assert!(!templates.get(id).trim().is_empty(), "{}", id.as_str());
        }
        assert!(templates.get(TemplateId::StanceAnalysis).contains("$stance_options"));
    }

    #[test]
    fn test_override_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("relevance-check.txt"), "Is $content about $topic?").unwrap();

        let templates = PromptTemplates::load(Some(dir.path())).unwrap();

        assert_eq!(
            templates.render(TemplateId::RelevanceCheck, &[("content", "x"), ("topic", "y")]),
            "Is x about y?"
        );
        assert_eq!(
            templates.get(TemplateId::StanceReport),
            STANCE_REPORT_TEMPLATE
        );
    }

    #[test]
    fn test_empty_override_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("stance-report.txt"), "  \n").unwrap();
        assert!(matches!(
            PromptTemplates::load(Some(dir.path())),
            Err(PromptError::Empty(_))
        ));
    }
}
