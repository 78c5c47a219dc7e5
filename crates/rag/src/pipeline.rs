//! Question-answering entry point
//!
//! Validates the request and the document's state before any provider is
//! touched, then runs smart retrieval and answer generation. Authorization
//! happens upstream; this layer only scopes documents to their owner.

use std::sync::Arc;

use uuid::Uuid;

use docchat_core::{Document, DocumentStatus, DocumentStore};

use crate::answer::{Answer, AnswerGenerator};
use crate::retriever::SmartRetriever;
use crate::RagError;

/// The full ask-a-question flow
pub struct QaPipeline {
    documents: Arc<dyn DocumentStore>,
    retriever: SmartRetriever,
    generator: AnswerGenerator,
}

impl QaPipeline {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        retriever: SmartRetriever,
        generator: AnswerGenerator,
    ) -> Self {
        Self {
            documents,
            retriever,
            generator,
        }
    }

    /// Answer `query` against one of `user_id`'s documents
    ///
    /// Rejection paths run before any embedder or LLM call.
    pub async fn ask(
        &self,
        query: &str,
        document_id: Uuid,
        user_id: Uuid,
    ) -> Result<Answer, RagError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RagError::InvalidQuery);
        }

        let document = self.load_ready_document(document_id, user_id).await?;

        let retrieval = self.retriever.retrieve(query, document.id).await?;
        tracing::info!(
            document_id = %document.id,
            strategy = retrieval.strategy.as_str(),
            chunks = retrieval.chunks.len(),
            query_type = retrieval.rewrite.query_type.as_str(),
            "Retrieval complete"
        );

        self.generator.generate(&document, &retrieval, query).await
    }

    async fn load_ready_document(
        &self,
        document_id: Uuid,
        user_id: Uuid,
    ) -> Result<Document, RagError> {
        let document = self
            .documents
            .get(document_id)
            .await?
            .ok_or(RagError::DocumentNotFound)?;

        // A foreign document is reported as missing, not as forbidden
        if document.user_id != user_id {
            return Err(RagError::DocumentNotFound);
        }

        match document.status {
            DocumentStatus::Ready => Ok(document),
            DocumentStatus::Processing => Err(RagError::DocumentProcessing),
            DocumentStatus::Failed => Err(RagError::DocumentFailed(
                document
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "unknown ingestion error".to_string()),
            )),
        }
    }
}
