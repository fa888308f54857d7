//! Database module for project, comment and report persistence

pub mod memory;
pub mod models;
pub mod repository;

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::env;
use uuid::Uuid;

use crate::model::{Comment, CommentStance, Project, ProjectReport, ProjectSummary, StanceReport};

pub use memory::InMemoryStore;
pub use repository::PgStore;

// Environment variable names
const ENV_POSTGRES_HOST: &str = "STANCE_INTEL_POSTGRES_HOST";
const ENV_POSTGRES_PORT: &str = "STANCE_INTEL_POSTGRES_PORT";
const ENV_POSTGRES_USER: &str = "STANCE_INTEL_POSTGRES_USER";
const ENV_POSTGRES_PASSWORD: &str = "STANCE_INTEL_POSTGRES_PASSWORD";
const ENV_POSTGRES_DB: &str = "STANCE_INTEL_POSTGRES_DB";

// Default values
const DEFAULT_POSTGRES_HOST: &str = "127.0.0.1";
const DEFAULT_POSTGRES_PORT: &str = "5432";
const DEFAULT_POSTGRES_USER: &str = "stance_intel";
const DEFAULT_POSTGRES_PASSWORD: &str = "stance_intel";
const DEFAULT_POSTGRES_DB: &str = "stance_intel";

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Database connection error: {0}")]
    Connection(#[from] sqlx::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Persistence boundary for the classification pipeline
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_project(&self, project: &Project) -> Result<(), DbError>;

    /// Fails with [`DbError::NotFound`] for an unknown id
    async fn get_project(&self, id: Uuid) -> Result<Project, DbError>;

    /// All projects with their comment counts, newest first
    async fn list_projects(&self) -> Result<Vec<ProjectSummary>, DbError>;

    /// Replace every mutable field of an existing project
    async fn update_project(&self, project: &Project) -> Result<(), DbError>;

    async fn insert_comment(&self, comment: &Comment) -> Result<(), DbError>;

    /// Comments of a project, newest first
    async fn list_comments(&self, project_id: Uuid) -> Result<Vec<Comment>, DbError>;

    /// Whether a comment with exactly `content` is stored for the project
    async fn comment_exists(&self, project_id: Uuid, content: &str) -> Result<bool, DbError>;

    async fn update_comment_stances(
        &self,
        comment_id: Uuid,
        stances: &[CommentStance],
    ) -> Result<(), DbError>;

    async fn get_stance_report(
        &self,
        project_id: Uuid,
        question_id: &str,
    ) -> Result<Option<StanceReport>, DbError>;

    async fn upsert_stance_report(&self, report: &StanceReport) -> Result<(), DbError>;

    async fn get_project_report(&self, project_id: Uuid) -> Result<Option<ProjectReport>, DbError>;

    async fn upsert_project_report(&self, report: &ProjectReport) -> Result<(), DbError>;

    /// Cheap round trip used by the readiness probe
    async fn ping(&self) -> Result<(), DbError>;
}

/// Create a new database connection pool
pub async fn create_pool() -> Result<PgPool, DbError> {
    let host = env::var(ENV_POSTGRES_HOST).unwrap_or_else(|_| DEFAULT_POSTGRES_HOST.to_string());
    let port = env::var(ENV_POSTGRES_PORT).unwrap_or_else(|_| DEFAULT_POSTGRES_PORT.to_string());
    let user = env::var(ENV_POSTGRES_USER).unwrap_or_else(|_| DEFAULT_POSTGRES_USER.to_string());
    let password =
        env::var(ENV_POSTGRES_PASSWORD).unwrap_or_else(|_| DEFAULT_POSTGRES_PASSWORD.to_string());
    let database = env::var(ENV_POSTGRES_DB).unwrap_or_else(|_| DEFAULT_POSTGRES_DB.to_string());

    let database_url = format!(
        "postgres://{}:{}@{}:{}/{}",
        user, password, host, port, database
    );

    tracing::debug!(host = %host, port = %port, database = %database, "Connecting to PostgreSQL");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await?;

    tracing::info!(host = %host, port = %port, "PostgreSQL connection established");

    Ok(pool)
}

/// Initialize database schema
pub async fn init_schema(pool: &PgPool) -> Result<(), DbError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS projects (
            id UUID PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            extraction_topic TEXT,
            context TEXT,
            questions JSONB NOT NULL DEFAULT '[]',
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS comments (
            id UUID PRIMARY KEY,
            project_id UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            content TEXT NOT NULL,
            content_hash VARCHAR(64) NOT NULL,
            extracted_content TEXT,
            stances JSONB NOT NULL DEFAULT '[]',
            source_type VARCHAR(16) NOT NULL DEFAULT 'other',
            source_url TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS stance_reports (
            project_id UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            question_id TEXT NOT NULL,
            question TEXT NOT NULL,
            tallies JSONB NOT NULL DEFAULT '[]',
            analysis TEXT NOT NULL,
            generated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            PRIMARY KEY (project_id, question_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS project_reports (
            project_id UUID PRIMARY KEY REFERENCES projects(id) ON DELETE CASCADE,
            project_name TEXT NOT NULL,
            overall_analysis TEXT NOT NULL,
            questions JSONB NOT NULL DEFAULT '[]',
            generated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes separately
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_comments_project_content_hash ON comments(project_id, content_hash)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_comments_project_created_at ON comments(project_id, created_at DESC)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database schema initialized");

    Ok(())
}
