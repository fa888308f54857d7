pub mod batch;
pub mod cache;
pub mod cache_keys;
pub mod comments;
pub mod extraction;
pub mod llm;
pub mod projects;
pub mod prompts;
pub mod questions;
pub mod reports;
pub mod retry;
pub mod stance;

pub use cache::RedisCache;
pub use comments::CommentService;
pub use extraction::ExtractionClassifier;
pub use llm::{LlmClient, RateLimit};
pub use projects::ProjectService;
pub use prompts::PromptTemplates;
pub use questions::QuestionGenerator;
pub use reports::{ReportCache, ReportService};
pub use stance::StanceClassifier;
