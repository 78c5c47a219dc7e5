//! Chat-completion provider integration
//!
//! Features:
//! - `LlmBackend` trait for dependency injection and test doubles
//! - OpenAI-compatible HTTP backend (works with any `/chat/completions` API)
//! - Error taxonomy that separates auth, rate-limit and server failures so
//!   callers can surface stable, user-legible categories

pub mod backend;
pub mod prompt;

pub use backend::{
    FinishReason, GenerationResult, LlmBackend, LlmConfig, OpenAiBackend,
};
pub use prompt::{Message, Role};

use thiserror::Error;

/// LLM errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Rate limited: {0}")]
    RateLimit(String),

    #[error("Provider server error: {0}")]
    Server(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout")]
    Timeout,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<LlmError> for docchat_core::Error {
    fn from(err: LlmError) -> Self {
        docchat_core::Error::Llm(err.to_string())
    }
}
