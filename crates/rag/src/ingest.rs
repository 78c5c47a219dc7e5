//! Background document ingestion
//!
//! Runs as a detached task per uploaded document: extract PDF text, chunk,
//! embed, persist, then flip the document status. The status field is the
//! only coordination point with readers; the upload request returns as soon
//! as the task is spawned, because embedding a multi-page document can
//! outlive any reasonable HTTP timeout.

use std::path::Path;
use std::sync::Arc;

use uuid::Uuid;

use docchat_core::{ChunkStore, DocumentStore, NewChunk};

use crate::chunker::{Chunker, PageText};
use crate::embeddings::EmbeddingBackend;
use crate::RagError;

/// Chunk + embed + persist pipeline
pub struct IngestPipeline {
    documents: Arc<dyn DocumentStore>,
    chunks: Arc<dyn ChunkStore>,
    embedder: Arc<dyn EmbeddingBackend>,
    chunker: Chunker,
}

impl IngestPipeline {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        chunks: Arc<dyn ChunkStore>,
        embedder: Arc<dyn EmbeddingBackend>,
        chunker: Chunker,
    ) -> Self {
        Self {
            documents,
            chunks,
            embedder,
            chunker,
        }
    }

    /// Fire-and-forget entry point
    ///
    /// Completion is reported only through the document status.
    pub fn spawn(self: Arc<Self>, document_id: Uuid, file_path: String) {
        tokio::spawn(async move {
            self.run(document_id, &file_path).await;
        });
    }

    /// Run ingestion to completion, recording the outcome on the document
    pub async fn run(&self, document_id: Uuid, file_path: &str) {
        tracing::info!(document_id = %document_id, file_path, "Ingestion started");

        match self.process(document_id, file_path).await {
            Ok((page_count, chunk_count)) => {
                if let Err(e) = self
                    .documents
                    .mark_ready(document_id, page_count, chunk_count as i32)
                    .await
                {
                    tracing::error!(document_id = %document_id, error = %e, "Failed to mark document ready");
                    return;
                }
                tracing::info!(
                    document_id = %document_id,
                    pages = page_count,
                    chunks = chunk_count,
                    "Ingestion complete"
                );
            }
            Err(e) => {
                tracing::error!(document_id = %document_id, error = %e, "Ingestion failed");
                if let Err(mark_err) = self
                    .documents
                    .mark_failed(document_id, &e.to_string())
                    .await
                {
                    tracing::error!(document_id = %document_id, error = %mark_err, "Failed to mark document failed");
                }
            }
        }
    }

    async fn process(
        &self,
        document_id: Uuid,
        file_path: &str,
    ) -> Result<(i32, usize), RagError> {
        let pages = extract_pdf_pages(file_path).await?;
        let page_count = pages.len() as i32;
        self.process_pages(document_id, file_path, pages)
            .await
            .map(|chunk_count| (page_count, chunk_count))
    }

    /// Chunk, embed and persist extracted pages; returns the stored count
    ///
    /// Embedding failures degrade per item to zero vectors inside
    /// `embed_many`; such chunks are still stored and counted, just
    /// unreachable by similarity search.
    async fn process_pages(
        &self,
        document_id: Uuid,
        file_path: &str,
        pages: Vec<PageText>,
    ) -> Result<usize, RagError> {
        let file_name = Path::new(file_path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(file_path);
        let metadata = serde_json::json!({ "file_name": file_name });

        let text_chunks = self.chunker.chunk_pages(&pages, &metadata);
        if text_chunks.is_empty() {
            tracing::warn!(document_id = %document_id, "Document produced no chunks");
            return Ok(0);
        }

        let texts: Vec<String> = text_chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = self.embedder.embed_many(&texts).await?;

        let new_chunks: Vec<NewChunk> = text_chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| NewChunk {
                document_id,
                chunk_index: chunk.index as i32,
                content: chunk.content,
                embedding: Some(embedding),
                token_count: chunk.token_count as i32,
                page_number: chunk.page_number,
                metadata: chunk.metadata,
            })
            .collect();

        let stored = self.chunks.insert_many(&new_chunks).await?;
        Ok(stored)
    }
}

/// Extract per-page text from a PDF on disk
///
/// `pdf-extract` separates pages with form feeds; empty pages are dropped
/// but keep their original page numbers.
async fn extract_pdf_pages(file_path: &str) -> Result<Vec<PageText>, RagError> {
    let bytes = tokio::fs::read(file_path)
        .await
        .map_err(|e| RagError::Extraction(format!("Cannot read {}: {}", file_path, e)))?;

    // CPU-bound parsing stays off the async workers
    let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .map_err(|e| RagError::Extraction(format!("Extraction task failed: {}", e)))?
        .map_err(|e| RagError::Extraction(e.to_string()))?;

    Ok(split_pages(&text))
}

/// Split extracted text into numbered pages on form feeds
fn split_pages(text: &str) -> Vec<PageText> {
    text.split('\u{0C}')
        .enumerate()
        .map(|(i, page)| PageText {
            number: i as i32 + 1,
            text: page.to_string(),
        })
        .filter(|p| !p.text.trim().is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    use docchat_core::{
        Chunk, Document, Error as CoreError, NewDocument, RetrievedChunk, SearchParams,
    };

    use crate::chunker::ChunkerConfig;

    #[derive(Default)]
    struct RecordingDocumentStore {
        transitions: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl DocumentStore for RecordingDocumentStore {
        async fn create(&self, _: NewDocument) -> Result<Document, CoreError> {
            unimplemented!("not used in ingestion tests")
        }

        async fn get(&self, _: Uuid) -> Result<Option<Document>, CoreError> {
            Ok(None)
        }

        async fn mark_ready(
            &self,
            _: Uuid,
            page_count: i32,
            chunk_count: i32,
        ) -> Result<(), CoreError> {
            self.transitions
                .lock()
                .push(format!("ready(pages={},chunks={})", page_count, chunk_count));
            Ok(())
        }

        async fn mark_failed(&self, _: Uuid, error_message: &str) -> Result<(), CoreError> {
            self.transitions
                .lock()
                .push(format!("failed({})", error_message));
            Ok(())
        }

        async fn delete(&self, _: Uuid) -> Result<(), CoreError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct CollectingChunkStore {
        stored: Mutex<Vec<NewChunk>>,
        fail_insert: bool,
    }

    #[async_trait]
    impl ChunkStore for CollectingChunkStore {
        async fn insert_many(&self, chunks: &[NewChunk]) -> Result<usize, CoreError> {
            if self.fail_insert {
                return Err(CoreError::Persistence("insert rejected".to_string()));
            }
            self.stored.lock().extend(chunks.iter().cloned());
            Ok(chunks.len())
        }

        async fn find_by_document(&self, _: Uuid) -> Result<Vec<Chunk>, CoreError> {
            Ok(Vec::new())
        }

        async fn similarity_search(
            &self,
            _: &[f32],
            _: SearchParams,
        ) -> Result<Vec<RetrievedChunk>, CoreError> {
            Ok(Vec::new())
        }

        async fn uniform_sample(&self, _: Uuid, _: usize) -> Result<Vec<Chunk>, CoreError> {
            Ok(Vec::new())
        }

        async fn first_n(&self, _: Uuid, _: usize) -> Result<Vec<Chunk>, CoreError> {
            Ok(Vec::new())
        }

        async fn count_for_document(&self, _: Uuid) -> Result<u64, CoreError> {
            Ok(self.stored.lock().len() as u64)
        }
    }

    /// Embedder that zero-fills marked texts, mimicking per-item degradation
    struct SelectiveEmbedder;

    #[async_trait]
    impl EmbeddingBackend for SelectiveEmbedder {
        async fn embed_one(&self, _: &str) -> Result<Vec<f32>, RagError> {
            Ok(vec![1.0, 2.0])
        }

        async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
            Ok(texts
                .iter()
                .map(|t| {
                    if t.contains("poison") {
                        vec![0.0, 0.0]
                    } else {
                        vec![1.0, 2.0]
                    }
                })
                .collect())
        }

        fn dimension(&self) -> Option<usize> {
            Some(2)
        }
    }

    fn pipeline(
        documents: Arc<RecordingDocumentStore>,
        chunks: Arc<CollectingChunkStore>,
    ) -> IngestPipeline {
        IngestPipeline::new(
            documents,
            chunks,
            Arc::new(SelectiveEmbedder),
            Chunker::new(ChunkerConfig {
                max_chars: 60,
                overlap_chars: 10,
            })
            .unwrap(),
        )
    }

    fn pages(texts: &[&str]) -> Vec<PageText> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| PageText {
                number: i as i32 + 1,
                text: t.to_string(),
            })
            .collect()
    }

    #[test]
    fn test_split_pages_on_form_feed() {
        let text = "page one text\u{0C}page two text\u{0C}\n  \u{0C}page four text";
        let pages = split_pages(text);
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0].number, 1);
        assert_eq!(pages[1].number, 2);
        // Blank page 3 dropped, numbering preserved
        assert_eq!(pages[2].number, 4);
    }

    #[tokio::test]
    async fn test_chunks_stored_with_embeddings() {
        let documents = Arc::new(RecordingDocumentStore::default());
        let chunks = Arc::new(CollectingChunkStore::default());
        let pipeline = pipeline(documents.clone(), chunks.clone());
        let doc_id = Uuid::new_v4();

        let stored = pipeline
            .process_pages(
                doc_id,
                "/uploads/report.pdf",
                pages(&["Sentence one is here. Sentence two as well. More text follows."]),
            )
            .await
            .unwrap();

        assert!(stored > 0);
        let stored_chunks = chunks.stored.lock();
        assert_eq!(stored_chunks.len(), stored);
        for (i, chunk) in stored_chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i as i32);
            assert_eq!(chunk.document_id, doc_id);
            assert_eq!(chunk.embedding.as_ref().unwrap().len(), 2);
            assert_eq!(chunk.metadata["file_name"], "report.pdf");
            assert_eq!(chunk.page_number, Some(1));
        }
    }

    #[tokio::test]
    async fn test_zero_vector_chunks_still_count() {
        let documents = Arc::new(RecordingDocumentStore::default());
        let chunks = Arc::new(CollectingChunkStore::default());
        let pipeline = pipeline(documents.clone(), chunks.clone());

        let stored = pipeline
            .process_pages(
                Uuid::new_v4(),
                "/uploads/report.pdf",
                pages(&["ordinary text to keep. poison text in the middle here. trailing text."]),
            )
            .await
            .unwrap();

        // Best-effort ingestion: degraded chunks are stored, not dropped
        let stored_chunks = chunks.stored.lock();
        assert_eq!(stored_chunks.len(), stored);
        assert!(stored_chunks
            .iter()
            .any(|c| c.embedding.as_ref().unwrap() == &vec![0.0, 0.0]));
    }

    #[tokio::test]
    async fn test_empty_document_is_ready_with_zero_chunks() {
        let documents = Arc::new(RecordingDocumentStore::default());
        let chunks = Arc::new(CollectingChunkStore::default());
        let pipeline = pipeline(documents.clone(), chunks.clone());

        let stored = pipeline
            .process_pages(Uuid::new_v4(), "/uploads/blank.pdf", Vec::new())
            .await
            .unwrap();

        assert_eq!(stored, 0);
        assert!(chunks.stored.lock().is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_marks_document_failed() {
        let documents = Arc::new(RecordingDocumentStore::default());
        let chunks = Arc::new(CollectingChunkStore {
            fail_insert: true,
            ..Default::default()
        });
        let pipeline = pipeline(documents.clone(), chunks);
        let doc_id = Uuid::new_v4();

        // run() consumes the error and records the failed transition;
        // extraction is skipped by driving process_pages directly.
        let result = pipeline
            .process_pages(doc_id, "/uploads/report.pdf", pages(&["some content to chunk"]))
            .await;
        assert!(result.is_err());

        pipeline.run(doc_id, "/nonexistent/file.pdf").await;
        let transitions = documents.transitions.lock();
        assert_eq!(transitions.len(), 1);
        assert!(transitions[0].starts_with("failed("));
    }
}
