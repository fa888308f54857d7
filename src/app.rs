//! Application state and service initialization
//!
//! Builds the store, the optional Redis mirror, the model clients and the
//! service graph that the Actix-web handlers share.

use std::sync::Arc;

use crate::db::{InMemoryStore, PgStore, Store};
use crate::model::{Config, StorageBackend};
use crate::service::prompts::PromptError;
use crate::service::{
    CommentService, ExtractionClassifier, LlmClient, ProjectService, PromptTemplates,
    QuestionGenerator, RateLimit, RedisCache, ReportCache, ReportService, StanceClassifier,
};

// Model selection
const ENV_EXTRACTION_MODEL: &str = "EXTRACTION_MODEL";
const ENV_STANCE_MODEL: &str = "STANCE_MODEL";
const ENV_REPORT_MODEL: &str = "REPORT_MODEL";

const DEFAULT_EXTRACTION_MODEL: &str = "gpt-4o-mini";
const DEFAULT_STANCE_MODEL: &str = "gpt-4o-mini";
const DEFAULT_REPORT_MODEL: &str = "gpt-4o";

/// Application state containing all services and shared resources
pub struct AppState {
    /// Persistence backend
    pub store: Arc<dyn Store>,
    /// Redis report mirror (optional)
    pub cache: Option<RedisCache>,
    pub project_service: Arc<ProjectService>,
    pub comment_service: Arc<CommentService>,
    pub report_service: Arc<ReportService>,
}

impl AppState {
    /// Initialize all services and build application state
    ///
    /// This performs:
    /// 1. Store initialization (PostgreSQL with schema, or in-memory)
    /// 2. Redis mirror initialization (optional)
    /// 3. Prompt template loading
    /// 4. LLM client initialization (requires OPENAI_API_KEY)
    /// 5. Service dependency graph construction
    pub async fn new(config: Config) -> Result<Self, AppError> {
        let store = Self::build_store(config.storage).await?;

        // Initialize Redis cache (optional - will log warning if Redis is unavailable)
        let cache = match RedisCache::new().await {
            Ok(cache) => {
                tracing::info!("Redis report mirror enabled");
                Some(cache)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Redis unavailable, running without report mirror");
                None
            }
        };

        let templates = Arc::new(PromptTemplates::load(config.prompts.template_dir.as_deref())?);

        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| AppError::MissingConfig("OPENAI_API_KEY"))?;

        let llm_client = LlmClient::new(&api_key)
            .map_err(|_| AppError::InvalidConfig("Invalid OPENAI_API_KEY"))?;

        let pipeline = &config.pipeline;
        let timeout = pipeline.request_timeout();
        let extraction_llm = llm_client.completion(&model_from_env(ENV_EXTRACTION_MODEL, DEFAULT_EXTRACTION_MODEL), timeout);
        let stance_llm = llm_client.completion(&model_from_env(ENV_STANCE_MODEL, DEFAULT_STANCE_MODEL), timeout);
        let report_llm = Arc::new(llm_client.completion(&model_from_env(ENV_REPORT_MODEL, DEFAULT_REPORT_MODEL), timeout));

        tracing::info!(
            extraction_model = %extraction_llm.model(),
            stance_model = %stance_llm.model(),
            report_model = %report_llm.model(),
            timeout_secs = timeout.as_secs(),
            "Configured classification models"
        );

        let extraction = Arc::new(ExtractionClassifier::new(
            Arc::new(extraction_llm),
            Arc::clone(&templates),
            RateLimit::per_second(pipeline.extraction_requests_per_second),
        ));
        let stance = Arc::new(StanceClassifier::new(
            Arc::new(stance_llm),
            Arc::clone(&templates),
            RateLimit::per_second(pipeline.stance_requests_per_second),
        ));
        let generator = Arc::new(QuestionGenerator::new(report_llm.clone(), Arc::clone(&templates)));

        let project_service = Arc::new(ProjectService::new(
            Arc::clone(&store),
            Arc::clone(&stance),
            generator,
            pipeline.reanalysis,
        ));

        let comment_service = Arc::new(CommentService::new(
            Arc::clone(&store),
            extraction,
            stance,
            pipeline.ingestion,
        ));

        let report_service = Arc::new(ReportService::new(
            Arc::clone(&store),
            report_llm,
            templates,
            ReportCache::new(Arc::clone(&store), cache.clone()),
        ));

        Ok(Self {
            store,
            cache,
            project_service,
            comment_service,
            report_service,
        })
    }

    async fn build_store(backend: StorageBackend) -> Result<Arc<dyn Store>, AppError> {
        match backend {
            StorageBackend::Postgres => {
                let pool = crate::db::create_pool()
                    .await
                    .map_err(|e| AppError::DatabaseInit(e.to_string()))?;

                crate::db::init_schema(&pool)
                    .await
                    .map_err(|e| AppError::DatabaseInit(e.to_string()))?;

                Ok(Arc::new(PgStore::new(pool)))
            }
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage, data is lost on restart");
                Ok(Arc::new(InMemoryStore::new()))
            }
        }
    }
}

fn model_from_env(var: &str, default: &str) -> String {
    std::env::var(var)
        .ok()
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Application-level errors
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AppError {
    /// Database initialization failed
    #[error("Database initialization failed: {0}")]
    DatabaseInit(String),

    /// Missing required configuration
    #[error("Missing required configuration: {0}")]
    MissingConfig(&'static str),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(&'static str),

    /// Prompt template override could not be loaded
    #[error("Prompt template error: {0}")]
    Prompts(#[from] PromptError),
}
