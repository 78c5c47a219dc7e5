//! Chunk store with pgvector similarity search
//!
//! The similarity query ranks by the pgvector cosine distance operator and
//! converts to similarity (`1 - distance`) for filtering and scoring. Rows
//! with NULL embeddings never match vector search but are still served by
//! the sampling fallbacks. All queries are parameterized; vectors travel
//! through pgvector's native sqlx binding, never string concatenation.

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use docchat_core::{
    Chunk, ChunkStore, Error as CoreError, NewChunk, RetrievedChunk, SearchParams,
};

use crate::{PgClient, PersistenceError};

/// Postgres-backed chunk store
#[derive(Clone)]
pub struct PgChunkStore {
    pool: PgPool,
}

impl PgChunkStore {
    pub fn new(client: &PgClient) -> Self {
        Self {
            pool: client.pool().clone(),
        }
    }
}

const CHUNK_COLUMNS: &str =
    "id, document_id, chunk_index, content, embedding, token_count, page_number, metadata";

fn map_chunk(row: &PgRow) -> Result<Chunk, PersistenceError> {
    let embedding: Option<Vector> = row.try_get("embedding")?;
    Ok(Chunk {
        id: row.try_get("id")?,
        document_id: row.try_get("document_id")?,
        chunk_index: row.try_get("chunk_index")?,
        content: row.try_get("content")?,
        embedding: embedding.map(|v| v.to_vec()),
        token_count: row.try_get("token_count")?,
        page_number: row.try_get("page_number")?,
        metadata: row.try_get("metadata")?,
    })
}

/// Sampling stride: roughly every `step`-th chunk hits the target count
pub(crate) fn sample_step(total: u64, target: usize) -> i32 {
    if target == 0 {
        return i32::MAX;
    }
    (total.div_ceil(target as u64)).max(1) as i32
}

#[async_trait]
impl ChunkStore for PgChunkStore {
    async fn insert_many(&self, chunks: &[NewChunk]) -> Result<usize, CoreError> {
        let mut tx = self.pool.begin().await.map_err(PersistenceError::from)?;

        for chunk in chunks {
            sqlx::query(
                "INSERT INTO document_chunks
                     (document_id, chunk_index, content, embedding, token_count, page_number, metadata)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(chunk.document_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.content)
            .bind(chunk.embedding.as_ref().map(|e| Vector::from(e.clone())))
            .bind(chunk.token_count)
            .bind(chunk.page_number)
            .bind(&chunk.metadata)
            .execute(&mut *tx)
            .await
            .map_err(PersistenceError::from)?;
        }

        tx.commit().await.map_err(PersistenceError::from)?;
        Ok(chunks.len())
    }

    async fn find_by_document(&self, document_id: Uuid) -> Result<Vec<Chunk>, CoreError> {
        let sql = format!(
            "SELECT {CHUNK_COLUMNS} FROM document_chunks
             WHERE document_id = $1 ORDER BY chunk_index"
        );
        let rows = sqlx::query(&sql)
            .bind(document_id)
            .fetch_all(&self.pool)
            .await
            .map_err(PersistenceError::from)?;

        rows.iter()
            .map(|row| map_chunk(row).map_err(CoreError::from))
            .collect()
    }

    async fn similarity_search(
        &self,
        query: &[f32],
        params: SearchParams,
    ) -> Result<Vec<RetrievedChunk>, CoreError> {
        let query_vector = Vector::from(query.to_vec());
        let sql = format!(
            "SELECT {CHUNK_COLUMNS}, 1 - (embedding <=> $1) AS similarity
             FROM document_chunks
             WHERE embedding IS NOT NULL
               AND ($2::uuid IS NULL OR document_id = $2)
               AND 1 - (embedding <=> $1) >= $3
             ORDER BY embedding <=> $1
             LIMIT $4"
        );

        let rows = sqlx::query(&sql)
            .bind(&query_vector)
            .bind(params.document_id)
            .bind(params.min_similarity as f64)
            .bind(params.top_k as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(PersistenceError::from)?;

        rows.iter()
            .map(|row| {
                let chunk = map_chunk(row)?;
                let similarity: f64 = row.try_get("similarity")?;
                Ok(RetrievedChunk {
                    chunk,
                    similarity: Some(similarity as f32),
                })
            })
            .collect::<Result<Vec<_>, PersistenceError>>()
            .map_err(CoreError::from)
    }

    async fn uniform_sample(
        &self,
        document_id: Uuid,
        target: usize,
    ) -> Result<Vec<Chunk>, CoreError> {
        let total = self.count_for_document(document_id).await?;
        if total == 0 || target == 0 {
            return Ok(Vec::new());
        }

        let step = sample_step(total, target);
        let sql = format!(
            "SELECT {CHUNK_COLUMNS} FROM document_chunks
             WHERE document_id = $1 AND chunk_index % $2 = 0
             ORDER BY chunk_index
             LIMIT $3"
        );
        let rows = sqlx::query(&sql)
            .bind(document_id)
            .bind(step)
            .bind(target as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(PersistenceError::from)?;

        rows.iter()
            .map(|row| map_chunk(row).map_err(CoreError::from))
            .collect()
    }

    async fn first_n(&self, document_id: Uuid, n: usize) -> Result<Vec<Chunk>, CoreError> {
        let sql = format!(
            "SELECT {CHUNK_COLUMNS} FROM document_chunks
             WHERE document_id = $1 ORDER BY chunk_index LIMIT $2"
        );
        let rows = sqlx::query(&sql)
            .bind(document_id)
            .bind(n as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(PersistenceError::from)?;

        rows.iter()
            .map(|row| map_chunk(row).map_err(CoreError::from))
            .collect()
    }

    async fn count_for_document(&self, document_id: Uuid) -> Result<u64, CoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM document_chunks WHERE document_id = $1")
                .bind(document_id)
                .fetch_one(&self.pool)
                .await
                .map_err(PersistenceError::from)?;

        Ok(count as u64)
    }
}
