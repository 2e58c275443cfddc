use serde::Deserialize;
use std::{num::NonZeroUsize, path::PathBuf};

use crate::{
    error::{AppError, AppResult},
    models::SimilarityMethod,
};

/// Prefix for every environment variable read by [`Config::from_env`]
pub const ENV_PREFIX: &str = "MARQUEE_";

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory holding one sub-directory per model version
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: PathBuf,

    /// Model version activated on first use
    #[serde(default = "default_model_version")]
    pub model_version: String,

    /// Multiplier applied to the scaled year feature
    #[serde(default = "default_year_weight")]
    pub year_weight: f64,

    /// Maximum number of cached query results
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Method used by similarity queries that do not name one
    #[serde(default)]
    pub default_similarity_method: SimilarityMethod,

    /// Default log filter, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_artifacts_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_model_version() -> String {
    "v1.0.0".to_string()
}

fn default_year_weight() -> f64 {
    0.1
}

fn default_cache_capacity() -> usize {
    128
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            artifacts_dir: default_artifacts_dir(),
            model_version: default_model_version(),
            year_weight: default_year_weight(),
            cache_capacity: default_cache_capacity(),
            default_similarity_method: SimilarityMethod::default(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        envy::prefixed(ENV_PREFIX)
            .from_env::<Config>()
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }

    /// Validated engine settings shared by training and serving
    pub fn engine(&self) -> AppResult<EngineConfig> {
        EngineConfig::new(
            self.year_weight,
            self.cache_capacity,
            self.default_similarity_method,
            self.model_version.clone(),
            self.artifacts_dir.clone(),
        )
    }
}

/// Validated settings for the feature builder, model store and service.
///
/// Built once at startup and passed by reference.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    year_weight: f64,
    cache_capacity: NonZeroUsize,
    default_method: SimilarityMethod,
    model_version: String,
    artifacts_dir: PathBuf,
}

impl EngineConfig {
    pub fn new(
        year_weight: f64,
        cache_capacity: usize,
        default_method: SimilarityMethod,
        model_version: String,
        artifacts_dir: PathBuf,
    ) -> AppResult<Self> {
        if !year_weight.is_finite() || year_weight <= 0.0 || year_weight > 1.0 {
            return Err(AppError::InvalidInput(format!(
                "year_weight must be in (0, 1], got {}",
                year_weight
            )));
        }
        let cache_capacity = NonZeroUsize::new(cache_capacity).ok_or_else(|| {
            AppError::InvalidInput("cache_capacity must be at least 1".to_string())
        })?;
        validate_version(&model_version)?;

        Ok(Self {
            year_weight,
            cache_capacity,
            default_method,
            model_version,
            artifacts_dir,
        })
    }

    pub fn year_weight(&self) -> f64 {
        self.year_weight
    }

    pub fn cache_capacity(&self) -> NonZeroUsize {
        self.cache_capacity
    }

    pub fn default_method(&self) -> SimilarityMethod {
        self.default_method
    }

    pub fn model_version(&self) -> &str {
        &self.model_version
    }

    pub fn artifacts_dir(&self) -> &PathBuf {
        &self.artifacts_dir
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            year_weight: default_year_weight(),
            cache_capacity: NonZeroUsize::new(default_cache_capacity()).unwrap_or(NonZeroUsize::MIN),
            default_method: SimilarityMethod::default(),
            model_version: default_model_version(),
            artifacts_dir: default_artifacts_dir(),
        }
    }
}

/// Model versions name a storage directory, so they must be a single path segment
pub fn validate_version(version: &str) -> AppResult<()> {
    let trimmed = version.trim();
    if trimmed.is_empty()
        || trimmed != version
        || version.contains(['/', '\\'])
        || version == "."
        || version == ".."
    {
        return Err(AppError::InvalidInput(format!(
            "Invalid model version '{}'",
            version
        )));
    }
    Ok(())
}
