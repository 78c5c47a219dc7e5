//! Smart retrieval with strategy escalation
//!
//! A single fixed similarity threshold either over-filters (nothing for
//! paraphrased questions against a narrow document) or under-filters
//! (noise). The orchestrator instead runs up to four strategies in
//! decreasing strictness and stops at the first that yields enough chunks:
//!
//! 1. standard vector search (similarity >= 0.6, top 5)
//! 2. relaxed vector search  (similarity >= 0.4, top 8)
//! 3. uniform sampling across the document (~10 chunks)
//! 4. first-N chunks (10)
//!
//! The final two strategies guarantee an answer is groundable in something
//! from the document; the system never refuses to answer due to retrieval
//! sparsity alone. The query is rewritten once and embedded once; both are
//! reused across all strategies.

use std::sync::Arc;

use uuid::Uuid;

use docchat_core::{ChunkStore, RetrievedChunk, SearchParams};

use crate::embeddings::EmbeddingBackend;
use crate::rewriter::{QueryRewriter, RewriteResult};
use crate::RagError;

/// Thresholds and sizes for the four strategies
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub standard_min_similarity: f32,
    pub standard_top_k: usize,
    pub relaxed_min_similarity: f32,
    pub relaxed_top_k: usize,
    pub sample_target: usize,
    pub first_n: usize,
    /// A strategy yielding at least this many chunks stops escalation
    pub min_sufficient: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            standard_min_similarity: 0.6,
            standard_top_k: 5,
            relaxed_min_similarity: 0.4,
            relaxed_top_k: 8,
            sample_target: 10,
            first_n: 10,
            min_sufficient: 3,
        }
    }
}

impl From<&docchat_config::RagConfig> for RetrievalConfig {
    fn from(rag: &docchat_config::RagConfig) -> Self {
        Self {
            standard_min_similarity: rag.standard_min_similarity,
            standard_top_k: rag.standard_top_k,
            relaxed_min_similarity: rag.relaxed_min_similarity,
            relaxed_top_k: rag.relaxed_top_k,
            sample_target: rag.sample_target,
            first_n: rag.first_n,
            min_sufficient: rag.min_sufficient,
        }
    }
}

/// Which strategy produced the final chunk list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalStrategy {
    StandardVector,
    RelaxedVector,
    UniformSample,
    FirstN,
}

impl RetrievalStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalStrategy::StandardVector => "standard_vector",
            RetrievalStrategy::RelaxedVector => "relaxed_vector",
            RetrievalStrategy::UniformSample => "uniform_sample",
            RetrievalStrategy::FirstN => "first_n",
        }
    }
}

/// Result of a smart retrieval run
#[derive(Debug)]
pub struct SmartRetrieval {
    pub chunks: Vec<RetrievedChunk>,
    pub strategy: RetrievalStrategy,
    pub rewrite: RewriteResult,
}

/// The retrieval orchestrator
pub struct SmartRetriever {
    rewriter: QueryRewriter,
    embedder: Arc<dyn EmbeddingBackend>,
    store: Arc<dyn ChunkStore>,
    config: RetrievalConfig,
}

impl SmartRetriever {
    pub fn new(
        rewriter: QueryRewriter,
        embedder: Arc<dyn EmbeddingBackend>,
        store: Arc<dyn ChunkStore>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            rewriter,
            embedder,
            store,
            config,
        }
    }

    /// Retrieve chunks for a query against one document
    ///
    /// Guaranteed non-empty whenever the document has at least one chunk.
    /// An embedding-service failure is the one non-degradable error here:
    /// without a query vector none of the vector strategies can run, so it
    /// surfaces as `ServiceUnavailable` instead of silently degrading.
    pub async fn retrieve(
        &self,
        query: &str,
        document_id: Uuid,
    ) -> Result<SmartRetrieval, RagError> {
        let rewrite = self.rewriter.rewrite(query).await;
        tracing::debug!(
            original = %rewrite.original,
            final_query = %rewrite.final_query,
            query_type = rewrite.query_type.as_str(),
            "Query rewritten"
        );

        let query_vector = self
            .embedder
            .embed_one(&rewrite.final_query)
            .await
            .map_err(|e| RagError::ServiceUnavailable(e.to_string()))?;

        // Strategy 1: standard vector search
        let standard = self
            .store
            .similarity_search(
                &query_vector,
                SearchParams {
                    document_id: Some(document_id),
                    top_k: self.config.standard_top_k,
                    min_similarity: self.config.standard_min_similarity,
                },
            )
            .await?;
        if standard.len() >= self.config.min_sufficient {
            tracing::debug!(chunks = standard.len(), "Standard vector search sufficient");
            return Ok(SmartRetrieval {
                chunks: standard,
                strategy: RetrievalStrategy::StandardVector,
                rewrite,
            });
        }

        // Strategy 2: relaxed threshold, wider net
        let relaxed = self
            .store
            .similarity_search(
                &query_vector,
                SearchParams {
                    document_id: Some(document_id),
                    top_k: self.config.relaxed_top_k,
                    min_similarity: self.config.relaxed_min_similarity,
                },
            )
            .await?;
        if relaxed.len() >= self.config.min_sufficient {
            tracing::debug!(chunks = relaxed.len(), "Relaxed vector search sufficient");
            return Ok(SmartRetrieval {
                chunks: relaxed,
                strategy: RetrievalStrategy::RelaxedVector,
                rewrite,
            });
        }

        // Strategy 3: vector search is starved; sample the document evenly.
        // A non-empty sample is returned even below the sufficiency bar.
        let sampled = self
            .store
            .uniform_sample(document_id, self.config.sample_target)
            .await?;
        if !sampled.is_empty() {
            tracing::info!(
                document_id = %document_id,
                chunks = sampled.len(),
                "Vector search starved, falling back to uniform sampling"
            );
            return Ok(SmartRetrieval {
                chunks: without_scores(sampled),
                strategy: RetrievalStrategy::UniformSample,
                rewrite,
            });
        }

        // Strategy 4: last resort, the document head
        let head = self.store.first_n(document_id, self.config.first_n).await?;
        if !head.is_empty() {
            tracing::info!(
                document_id = %document_id,
                chunks = head.len(),
                "Falling back to first-N chunks"
            );
            return Ok(SmartRetrieval {
                chunks: without_scores(head),
                strategy: RetrievalStrategy::FirstN,
                rewrite,
            });
        }

        // Nothing was ever ingested for this document.
        Err(RagError::EmptyDocument)
    }
}

/// Fallback chunks carry no similarity score
fn without_scores(chunks: Vec<docchat_core::Chunk>) -> Vec<RetrievedChunk> {
    chunks
        .into_iter()
        .map(|chunk| RetrievedChunk {
            chunk,
            similarity: None,
        })
        .collect()
}
