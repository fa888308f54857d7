use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_CONFIG_PATH: &str = "STANCE_INTEL_CONFIG_PATH";
const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Where projects, comments and reports are persisted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Postgres,
    Memory,
}

/// Concurrency and pacing for one batched workload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct BatchConfig {
    pub batch_size: usize,
    /// Pause between batches in milliseconds
    #[serde(default)]
    pub delay_ms: u64,
}

impl BatchConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Classification pipeline tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Bulk comment ingestion
    pub ingestion: BatchConfig,
    /// Stance reanalysis after a question set change
    pub reanalysis: BatchConfig,
    /// Requests per second for relevance/extraction calls (0 = unlimited)
    pub extraction_requests_per_second: u32,
    /// Requests per second for stance calls (0 = unlimited)
    pub stance_requests_per_second: u32,
    /// Timeout applied to every external model call
    pub request_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ingestion: BatchConfig {
                batch_size: 50,
                delay_ms: 0,
            },
            reanalysis: BatchConfig {
                batch_size: 25,
                delay_ms: 0,
            },
            extraction_requests_per_second: 0,
            stance_requests_per_second: 0,
            request_timeout_secs: 60,
        }
    }
}

impl PipelineConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Prompt template overrides
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PromptConfig {
    /// Directory holding `<template-id>.txt` files that replace the built-in
    /// templates
    pub template_dir: Option<PathBuf>,
}

/// YAML configuration file structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub storage: StorageBackend,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub prompts: PromptConfig,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub storage: StorageBackend,
    pub pipeline: PipelineConfig,
    pub prompts: PromptConfig,
    pub port: u16,
    pub host: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageBackend::default(),
            pipeline: PipelineConfig::default(),
            prompts: PromptConfig::default(),
            port: 8080,
            host: "127.0.0.1".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment and config file
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let config_path =
            std::env::var(ENV_CONFIG_PATH).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        let file = Self::load_config_file(Path::new(&config_path)).unwrap_or_default();

        Self {
            storage: file.storage,
            pipeline: file.pipeline,
            prompts: file.prompts,
            port,
            host,
        }
    }

    /// Load configuration from YAML file
    fn load_config_file(path: &Path) -> Option<ConfigFile> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            return None;
        }

        match fs::read_to_string(path) {
            Ok(contents) => {
                let contents = contents.trim();
                if contents.is_empty() {
                    tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
                    return Some(ConfigFile::default());
                }

                match serde_yaml::from_str(contents) {
                    Ok(config) => {
                        tracing::info!(path = %path.display(), "Loaded configuration from file");
                        Some(config)
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "Failed to parse config file, using defaults");
                        None
                    }
                }
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read config file, using defaults");
                None
            }
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
