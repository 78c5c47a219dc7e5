//! Postgres persistence layer for docchat
//!
//! Provides persistent storage for:
//! - Documents (lifecycle: processing -> ready | failed)
//! - Chunks with pgvector embeddings and cosine nearest-neighbour search
//!
//! The pool is created once at process start and injected by reference into
//! every store; nothing here opens ad-hoc connections.

pub mod chunks;
pub mod client;
pub mod documents;
pub mod schema;

pub use chunks::PgChunkStore;
pub use client::{PgClient, PgConfig};
pub use documents::PgDocumentStore;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl From<PersistenceError> for docchat_core::Error {
    fn from(err: PersistenceError) -> Self {
        docchat_core::Error::Persistence(err.to_string())
    }
}
