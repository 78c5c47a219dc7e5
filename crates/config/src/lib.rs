//! Configuration management for docchat
//!
//! Supports loading configuration from:
//! - YAML files (`config/default.yaml`, then `config/{env}.yaml`)
//! - Environment variables (`DOCCHAT_` prefix, `__` section separator)
//! - Built-in defaults for every field
//!
//! Provider credentials are only read from the environment, never from
//! checked-in files.

pub mod settings;

pub use settings::{
    load_settings, DatabaseConfig, EmbeddingProviderConfig, LlmProviderConfig,
    RagConfig, RuntimeEnvironment, ServerConfig, Settings,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Environment error: {0}")]
    Environment(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl From<ConfigError> for docchat_core::Error {
    fn from(err: ConfigError) -> Self {
        docchat_core::Error::Config(err.to_string())
    }
}
