//! Document store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use docchat_core::{Document, DocumentStatus, DocumentStore, Error as CoreError, NewDocument};

use crate::{PgClient, PersistenceError};

/// Postgres-backed document store
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(client: &PgClient) -> Self {
        Self {
            pool: client.pool().clone(),
        }
    }
}

const DOCUMENT_COLUMNS: &str = "id, user_id, name, file_path, size_bytes, status, \
                                page_count, chunk_count, error_message, processed_at, created_at";

fn map_document(row: &PgRow) -> Result<Document, PersistenceError> {
    let status_text: String = row.try_get("status")?;
    let status = DocumentStatus::parse(&status_text).ok_or_else(|| {
        PersistenceError::Corrupt(format!("Unknown document status '{}'", status_text))
    })?;

    Ok(Document {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        name: row.try_get("name")?,
        file_path: row.try_get("file_path")?,
        size_bytes: row.try_get("size_bytes")?,
        status,
        page_count: row.try_get("page_count")?,
        chunk_count: row.try_get("chunk_count")?,
        error_message: row.try_get("error_message")?,
        processed_at: row.try_get::<Option<DateTime<Utc>>, _>("processed_at")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn create(&self, doc: NewDocument) -> Result<Document, CoreError> {
        let sql = format!(
            "INSERT INTO documents (id, user_id, name, file_path, size_bytes, status)
             VALUES ($1, $2, $3, $4, $5, 'processing')
             RETURNING {DOCUMENT_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(doc.id)
            .bind(doc.user_id)
            .bind(&doc.name)
            .bind(&doc.file_path)
            .bind(doc.size_bytes)
            .fetch_one(&self.pool)
            .await
            .map_err(PersistenceError::from)?;

        Ok(map_document(&row)?)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Document>, CoreError> {
        let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(PersistenceError::from)?;

        match row {
            Some(row) => Ok(Some(map_document(&row)?)),
            None => Ok(None),
        }
    }

    async fn mark_ready(
        &self,
        id: Uuid,
        page_count: i32,
        chunk_count: i32,
    ) -> Result<(), CoreError> {
        sqlx::query(
            "UPDATE documents
             SET status = 'ready', page_count = $2, chunk_count = $3,
                 error_message = NULL, processed_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .bind(page_count)
        .bind(chunk_count)
        .execute(&self.pool)
        .await
        .map_err(PersistenceError::from)?;

        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error_message: &str) -> Result<(), CoreError> {
        sqlx::query(
            "UPDATE documents
             SET status = 'failed', error_message = $2, processed_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .bind(error_message)
        .execute(&self.pool)
        .await
        .map_err(PersistenceError::from)?;

        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), CoreError> {
        // Chunks go with the document via ON DELETE CASCADE
        sqlx::query("DELETE FROM documents WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(PersistenceError::from)?;

        Ok(())
    }
}
