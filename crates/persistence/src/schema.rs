//! Postgres schema creation

use sqlx::PgPool;

use crate::PersistenceError;

/// Create the extension, tables and indexes if they don't exist
///
/// The ivfflat list count is an operational tuning knob; 100 is a reasonable
/// start for collections up to the low millions of chunks.
pub async fn create_schema(pool: &PgPool, vector_dimension: usize) -> Result<(), PersistenceError> {
    sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
        .execute(pool)
        .await
        .map_err(|e| PersistenceError::Schema(format!("Failed to enable pgvector: {}", e)))?;

    let documents_table = r#"
        CREATE TABLE IF NOT EXISTS documents (
            id UUID PRIMARY KEY,
            user_id UUID NOT NULL,
            name TEXT NOT NULL,
            file_path TEXT NOT NULL,
            size_bytes BIGINT NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'processing',
            page_count INT,
            chunk_count INT,
            error_message TEXT,
            processed_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
    "#;

    sqlx::query(documents_table)
        .execute(pool)
        .await
        .map_err(|e| PersistenceError::Schema(format!("Failed to create documents table: {}", e)))?;

    let chunks_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS document_chunks (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            document_id UUID NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
            chunk_index INT NOT NULL,
            content TEXT NOT NULL,
            embedding vector({dim}),
            token_count INT NOT NULL DEFAULT 0,
            page_number INT,
            metadata JSONB NOT NULL DEFAULT '{{}}'::jsonb,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            UNIQUE (document_id, chunk_index)
        )
    "#,
        dim = vector_dimension
    );

    sqlx::query(&chunks_table)
        .execute(pool)
        .await
        .map_err(|e| {
            PersistenceError::Schema(format!("Failed to create document_chunks table: {}", e))
        })?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_document_chunks_document
         ON document_chunks (document_id, chunk_index)",
    )
    .execute(pool)
    .await
    .map_err(|e| PersistenceError::Schema(format!("Failed to create chunk index: {}", e)))?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_document_chunks_embedding
         ON document_chunks USING ivfflat (embedding vector_cosine_ops) WITH (lists = 100)",
    )
    .execute(pool)
    .await
    .map_err(|e| PersistenceError::Schema(format!("Failed to create ANN index: {}", e)))?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_user
         ON documents (user_id, created_at DESC)",
    )
    .execute(pool)
    .await
    .map_err(|e| PersistenceError::Schema(format!("Failed to create document index: {}", e)))?;

    Ok(())
}
