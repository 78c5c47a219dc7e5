//! Document and chunk data model
//!
//! Documents are created in `Processing` state when an upload is registered,
//! then moved to `Ready` or `Failed` exactly once by the background ingestion
//! task. Chunks are written during ingestion and immutable afterwards, so
//! readers never need to coordinate with the writer beyond the status field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Processing state of an uploaded document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    /// Ingestion in progress; questions are rejected
    Processing,
    /// Chunked, embedded and searchable
    Ready,
    /// Ingestion failed; `error_message` holds the cause
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Processing => "processing",
            DocumentStatus::Ready => "ready",
            DocumentStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "processing" => Some(DocumentStatus::Processing),
            "ready" => Some(DocumentStatus::Ready),
            "failed" => Some(DocumentStatus::Failed),
            _ => None,
        }
    }
}

/// An uploaded source document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    /// Owning user (authorization happens upstream; stored for scoping)
    pub user_id: Uuid,
    /// Display name shown in citations
    pub name: String,
    /// Path under which the storage collaborator saved the file
    pub file_path: String,
    pub size_bytes: i64,
    pub status: DocumentStatus,
    pub page_count: Option<i32>,
    pub chunk_count: Option<i32>,
    pub error_message: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Document {
    /// Whether questions may be asked against this document
    pub fn is_ready(&self) -> bool {
        self.status == DocumentStatus::Ready
    }
}

/// Fields needed to register a new document
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub file_path: String,
    pub size_bytes: i64,
}

/// A stored slice of a document's extracted text
///
/// `chunk_index` values for a document are contiguous from 0 and reflect
/// reading order. `embedding` is `None` until computed; a chunk whose
/// embedding failed permanently is stored with a zero vector so batch counts
/// stay consistent (such chunks are unreachable by similarity search but
/// still served by the sampling fallbacks).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,
    pub document_id: Uuid,
    pub chunk_index: i32,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub token_count: i32,
    pub page_number: Option<i32>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// A chunk pending insertion
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub document_id: Uuid,
    pub chunk_index: i32,
    pub content: String,
    pub embedding: Option<Vec<f32>>,
    pub token_count: i32,
    pub page_number: Option<i32>,
    pub metadata: serde_json::Value,
}

/// A chunk returned from retrieval
///
/// `similarity` is cosine similarity in [0, 1] when the chunk came from
/// vector search and `None` when it came from a sampling fallback.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub similarity: Option<f32>,
}
