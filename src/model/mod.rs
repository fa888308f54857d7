pub mod analysis;
pub mod comment;
pub mod config;
pub mod project;
pub mod report;

pub use analysis::StanceAnalysisResult;
pub use comment::{Comment, CommentInput, CommentStance, SourceType};
pub use config::{Config, StorageBackend};
pub use project::{NewProject, Project, ProjectSummary, ProjectUpdate, Question, Stance};
pub use report::{ProjectReport, StanceReport};
