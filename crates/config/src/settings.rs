//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::ConfigError;

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    /// Development mode - relaxed validation, warnings only
    #[default]
    Development,
    /// Staging mode - stricter validation
    Staging,
    /// Production mode - all validations enforced
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Runtime environment (development, staging, production)
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Postgres configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Embedding provider configuration
    #[serde(default)]
    pub embedding: EmbeddingProviderConfig,

    /// Chat-completion provider configuration
    #[serde(default)]
    pub llm: LlmProviderConfig,

    /// Retrieval pipeline configuration
    #[serde(default)]
    pub rag: RagConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Allowed CORS origins; empty list means localhost only
    #[serde(default)]
    pub cors_origins: Vec<String>,

    #[serde(default = "default_true")]
    pub cors_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
            cors_enabled: true,
        }
    }
}

/// Postgres configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL; `DATABASE_URL` wins over file config
    #[serde(default = "default_database_url")]
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

/// Embedding provider configuration
///
/// The API key is only ever read from `EMBEDDING_API_KEY` (falling back to
/// `DOCCHAT_API_KEY`), never from config files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingProviderConfig {
    #[serde(default = "default_embedding_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(skip, default = "embedding_api_key_from_env")]
    pub api_key: Option<String>,

    /// Expected vector dimension until the provider reveals the real one
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Pause between successive batches (rate-limit headroom)
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,

    /// Pause between per-item retries after a failed batch
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Provider price per 1K tokens, for cost estimates in logs
    #[serde(default = "default_price_per_1k_tokens")]
    pub price_per_1k_tokens: f64,
}

impl Default for EmbeddingProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: default_embedding_endpoint(),
            model: default_embedding_model(),
            api_key: embedding_api_key_from_env(),
            dimension: default_embedding_dimension(),
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
            retry_delay_ms: default_retry_delay_ms(),
            price_per_1k_tokens: default_price_per_1k_tokens(),
        }
    }
}

/// Chat-completion provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmProviderConfig {
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(skip, default = "llm_api_key_from_env")]
    pub api_key: Option<String>,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            model: default_llm_model(),
            api_key: llm_api_key_from_env(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Retrieval pipeline configuration
///
/// The threshold/top-k ladder mirrors the four escalation strategies: a
/// strict pass first, then a relaxed pass, then the non-vector fallbacks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    /// Maximum chunk size in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Overlap between consecutive chunks in characters
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Similarity floor for the standard vector pass
    #[serde(default = "default_standard_min_similarity")]
    pub standard_min_similarity: f32,

    #[serde(default = "default_standard_top_k")]
    pub standard_top_k: usize,

    /// Similarity floor for the relaxed vector pass
    #[serde(default = "default_relaxed_min_similarity")]
    pub relaxed_min_similarity: f32,

    #[serde(default = "default_relaxed_top_k")]
    pub relaxed_top_k: usize,

    /// Target chunk count for uniform sampling
    #[serde(default = "default_sample_target")]
    pub sample_target: usize,

    /// Chunk count for the first-N fallback
    #[serde(default = "default_first_n")]
    pub first_n: usize,

    /// A strategy that yields at least this many chunks stops escalation
    #[serde(default = "default_min_sufficient")]
    pub min_sufficient: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            standard_min_similarity: default_standard_min_similarity(),
            standard_top_k: default_standard_top_k(),
            relaxed_min_similarity: default_relaxed_min_similarity(),
            relaxed_top_k: default_relaxed_top_k(),
            sample_target: default_sample_target(),
            first_n: default_first_n(),
            min_sufficient: default_min_sufficient(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_database_url() -> String {
    std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgres://localhost:5432/docchat".to_string())
}

fn default_max_connections() -> u32 {
    10
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_embedding_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn embedding_api_key_from_env() -> Option<String> {
    std::env::var("EMBEDDING_API_KEY")
        .or_else(|_| std::env::var("DOCCHAT_API_KEY"))
        .ok()
        .filter(|k| !k.is_empty())
}

fn default_embedding_dimension() -> usize {
    1536
}

fn default_batch_size() -> usize {
    50
}

fn default_batch_delay_ms() -> u64 {
    500
}

fn default_retry_delay_ms() -> u64 {
    300
}

fn default_price_per_1k_tokens() -> f64 {
    0.00002
}

fn default_llm_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn llm_api_key_from_env() -> Option<String> {
    std::env::var("LLM_API_KEY")
        .or_else(|_| std::env::var("DOCCHAT_API_KEY"))
        .ok()
        .filter(|k| !k.is_empty())
}

fn default_max_tokens() -> usize {
    1024
}

fn default_temperature() -> f32 {
    0.3
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

fn default_standard_min_similarity() -> f32 {
    0.6
}

fn default_standard_top_k() -> usize {
    5
}

fn default_relaxed_min_similarity() -> f32 {
    0.4
}

fn default_relaxed_top_k() -> usize {
    8
}

fn default_sample_target() -> usize {
    10
}

fn default_first_n() -> usize {
    10
}

fn default_min_sufficient() -> usize {
    3
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rag.chunk_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "rag.chunk_size".to_string(),
                message: "Chunk size must be positive".to_string(),
            });
        }

        if self.rag.chunk_overlap >= self.rag.chunk_size {
            return Err(ConfigError::InvalidValue {
                field: "rag.chunk_overlap".to_string(),
                message: format!(
                    "Overlap ({}) must be smaller than chunk size ({})",
                    self.rag.chunk_overlap, self.rag.chunk_size
                ),
            });
        }

        for (field, value) in [
            ("rag.standard_min_similarity", self.rag.standard_min_similarity),
            ("rag.relaxed_min_similarity", self.rag.relaxed_min_similarity),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: format!("Must be between 0.0 and 1.0, got {}", value),
                });
            }
        }

        if self.rag.relaxed_min_similarity > self.rag.standard_min_similarity {
            return Err(ConfigError::InvalidValue {
                field: "rag.relaxed_min_similarity".to_string(),
                message: "Relaxed threshold must not exceed the standard one".to_string(),
            });
        }

        if self.embedding.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "embedding.batch_size".to_string(),
                message: "Batch size must be positive".to_string(),
            });
        }

        // Missing credentials are fatal in strict environments; in
        // development the provider clients raise on first use instead.
        if self.environment.is_strict() {
            if self.embedding.api_key.is_none() {
                return Err(ConfigError::MissingField(
                    "EMBEDDING_API_KEY".to_string(),
                ));
            }
            if self.llm.api_key.is_none() {
                return Err(ConfigError::MissingField("LLM_API_KEY".to_string()));
            }
        }

        Ok(())
    }
}

/// Load settings from config files and environment
///
/// Priority: env vars > `config/{env}.yaml` > `config/default.yaml` > defaults.
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    let default_path = Path::new("config/default.yaml");
    if default_path.exists() {
        builder = builder.add_source(File::from(default_path));
    }

    if let Some(env_name) = env {
        let env_path_string = format!("config/{}.yaml", env_name);
        let env_path = Path::new(&env_path_string);
        if env_path.exists() {
            builder = builder.add_source(File::from(env_path));
        } else {
            tracing::warn!(path = %env_path_string, "Environment config file not found");
        }
    }

    builder = builder.add_source(
        Environment::with_prefix("DOCCHAT")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.rag.chunk_size, 1000);
        assert_eq!(settings.rag.chunk_overlap, 200);
        assert_eq!(settings.rag.standard_top_k, 5);
        assert_eq!(settings.rag.relaxed_top_k, 8);
        assert_eq!(settings.embedding.batch_size, 50);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk() {
        let mut settings = Settings::default();
        settings.rag.chunk_overlap = settings.rag.chunk_size;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_threshold_ordering() {
        let mut settings = Settings::default();
        settings.rag.relaxed_min_similarity = 0.9;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_threshold_range() {
        let mut settings = Settings::default();
        settings.rag.standard_min_similarity = 1.5;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_environment_strictness() {
        assert!(RuntimeEnvironment::Production.is_strict());
        assert!(RuntimeEnvironment::Staging.is_strict());
        assert!(!RuntimeEnvironment::Development.is_strict());
    }
}
