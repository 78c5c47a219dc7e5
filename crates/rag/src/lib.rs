//! Retrieval-augmented PDF question answering
//!
//! The pipeline: uploaded PDF -> chunker -> embedder -> chunk store
//! (background ingestion), then per question: query rewriter -> smart
//! retrieval with strategy escalation -> grounded answer generation.
//!
//! Features:
//! - Overlap chunker with semantic boundary priorities (CJK aware)
//! - Batch embedding with per-item retry and zero-vector degradation
//! - Two-stage LLM query rewriting that never blocks retrieval
//! - Four-strategy retrieval escalation with a non-empty guarantee
//! - Answer generation constrained to retrieved context with citations

pub mod answer;
pub mod chunker;
pub mod embeddings;
pub mod ingest;
pub mod pipeline;
pub mod retriever;
pub mod rewriter;
pub mod tokenizer;

pub use answer::{Answer, AnswerGenerator, SourceRef};
pub use chunker::{Chunker, ChunkerConfig, PageText, TextChunk};
pub use embeddings::{EmbeddingBackend, EmbedderConfig, HttpEmbedder};
pub use ingest::IngestPipeline;
pub use pipeline::QaPipeline;
pub use retriever::{
    RetrievalConfig, RetrievalStrategy, SmartRetrieval, SmartRetriever,
};
pub use rewriter::{QueryRewriter, QueryType, RewriteResult};
pub use tokenizer::{estimate_embedding_cost, estimate_tokens};

use thiserror::Error;

use docchat_llm::LlmError;

/// Coarse provider failure categories surfaced to the calling layer
///
/// Provider-specific details never cross the orchestrator boundary; the
/// calling layer renders a stable message per category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    Auth,
    RateLimit,
    Server,
    Unknown,
}

impl ProviderErrorKind {
    pub fn user_message(&self) -> &'static str {
        match self {
            ProviderErrorKind::Auth => "The AI service rejected our credentials",
            ProviderErrorKind::RateLimit => {
                "The AI service is busy, please try again shortly"
            }
            ProviderErrorKind::Server => "The AI service is temporarily unavailable",
            ProviderErrorKind::Unknown => "The AI service returned an unexpected error",
        }
    }
}

/// RAG errors
#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Chunking failed: {0}")]
    Chunking(String),

    #[error("Text extraction failed: {0}")]
    Extraction(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Retrieval service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Query must not be empty")]
    InvalidQuery,

    #[error("Document not found")]
    DocumentNotFound,

    #[error("Document is still processing")]
    DocumentProcessing,

    #[error("Document processing failed: {0}")]
    DocumentFailed(String),

    #[error("Document has no indexed content")]
    EmptyDocument,

    #[error("Provider error ({kind:?}): {message}")]
    Provider {
        kind: ProviderErrorKind,
        message: String,
    },
}

impl RagError {
    /// Fold an LLM failure into a coarse provider category
    pub fn from_llm(err: LlmError) -> Self {
        let kind = match &err {
            LlmError::Auth(_) | LlmError::Configuration(_) => ProviderErrorKind::Auth,
            LlmError::RateLimit(_) => ProviderErrorKind::RateLimit,
            LlmError::Server(_) | LlmError::Network(_) | LlmError::Timeout => {
                ProviderErrorKind::Server
            }
            _ => ProviderErrorKind::Unknown,
        };
        RagError::Provider {
            kind,
            message: kind.user_message().to_string(),
        }
    }
}

impl From<docchat_core::Error> for RagError {
    fn from(err: docchat_core::Error) -> Self {
        RagError::Store(err.to_string())
    }
}

impl From<RagError> for docchat_core::Error {
    fn from(err: RagError) -> Self {
        docchat_core::Error::Rag(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_llm_error_classification() {
        let err = RagError::from_llm(LlmError::RateLimit("429".to_string()));
        assert!(matches!(
            err,
            RagError::Provider {
                kind: ProviderErrorKind::RateLimit,
                ..
            }
        ));

        let err = RagError::from_llm(LlmError::Auth("401".to_string()));
        assert!(matches!(
            err,
            RagError::Provider {
                kind: ProviderErrorKind::Auth,
                ..
            }
        ));

        let err = RagError::from_llm(LlmError::Timeout);
        assert!(matches!(
            err,
            RagError::Provider {
                kind: ProviderErrorKind::Server,
                ..
            }
        ));
    }

    #[test]
    fn test_provider_messages_are_generic() {
        // No provider internals may leak into user-facing text
        for kind in [
            ProviderErrorKind::Auth,
            ProviderErrorKind::RateLimit,
            ProviderErrorKind::Server,
            ProviderErrorKind::Unknown,
        ] {
            let msg = kind.user_message();
            assert!(!msg.contains("HTTP"));
            assert!(!msg.is_empty());
        }
    }
}
