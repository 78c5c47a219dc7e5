//! Core types and traits shared across the docchat workspace
//!
//! Defines the document/chunk data model, the store traits that the
//! persistence layer implements and the RAG pipeline consumes, and the
//! top-level error type that crate-local errors convert into.

pub mod document;
pub mod traits;

pub use document::{
    Chunk, Document, DocumentStatus, NewChunk, NewDocument, RetrievedChunk,
};
pub use traits::{ChunkStore, DocumentStore, SearchParams};

use thiserror::Error;

/// Top-level error for the docchat backend
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("RAG error: {0}")]
    Rag(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
