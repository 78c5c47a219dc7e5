//! Store traits implemented by the persistence layer
//!
//! The RAG pipeline depends on these traits rather than on concrete Postgres
//! stores, so retrieval logic is testable with in-memory fakes and the
//! process-wide connection pool is injected once at startup.

use async_trait::async_trait;
use uuid::Uuid;

use crate::document::{Chunk, Document, NewChunk, NewDocument, RetrievedChunk};
use crate::Error;

/// Parameters for a similarity search over stored chunks
#[derive(Debug, Clone)]
pub struct SearchParams {
    /// Scope the search to a single document; `None` searches everything
    pub document_id: Option<Uuid>,
    /// Maximum number of results
    pub top_k: usize,
    /// Drop results whose cosine similarity falls below this bound
    pub min_similarity: f32,
}

/// Document lifecycle storage
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Register a new document in `Processing` state
    async fn create(&self, doc: NewDocument) -> Result<Document, Error>;

    async fn get(&self, id: Uuid) -> Result<Option<Document>, Error>;

    /// Mark ingestion complete with final totals
    async fn mark_ready(
        &self,
        id: Uuid,
        page_count: i32,
        chunk_count: i32,
    ) -> Result<(), Error>;

    /// Mark ingestion failed with a user-surfaceable message
    async fn mark_failed(&self, id: Uuid, error_message: &str) -> Result<(), Error>;

    /// Delete the document; chunks cascade
    async fn delete(&self, id: Uuid) -> Result<(), Error>;
}

/// Chunk storage with vector search and the non-vector fallback reads
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Insert chunks in order; returns the number stored
    async fn insert_many(&self, chunks: &[NewChunk]) -> Result<usize, Error>;

    /// All chunks of a document ordered by `chunk_index`
    async fn find_by_document(&self, document_id: Uuid) -> Result<Vec<Chunk>, Error>;

    /// Cosine nearest-neighbour search, filtered and ranked by similarity
    async fn similarity_search(
        &self,
        query: &[f32],
        params: SearchParams,
    ) -> Result<Vec<RetrievedChunk>, Error>;

    /// Roughly every `ceil(total/target)`-th chunk in index order, capped at
    /// `target`; used when vector search is starved
    async fn uniform_sample(
        &self,
        document_id: Uuid,
        target: usize,
    ) -> Result<Vec<Chunk>, Error>;

    /// The first `n` chunks in index order
    async fn first_n(&self, document_id: Uuid, n: usize) -> Result<Vec<Chunk>, Error>;

    async fn count_for_document(&self, document_id: Uuid) -> Result<u64, Error>;
}
