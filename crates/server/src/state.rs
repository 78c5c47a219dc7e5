//! Application state
//!
//! Shared state across all handlers. Every provider client and store is
//! constructed once at startup and injected here; handlers only clone Arcs.

use std::sync::Arc;
use std::time::Duration;

use docchat_config::Settings;
use docchat_core::{ChunkStore, DocumentStore};
use docchat_llm::{LlmConfig, OpenAiBackend};
use docchat_persistence::{PgChunkStore, PgClient, PgDocumentStore};
use docchat_rag::{
    AnswerGenerator, Chunker, ChunkerConfig, EmbedderConfig, HttpEmbedder,
    IngestPipeline, QaPipeline, QueryRewriter, RagError, RetrievalConfig,
    SmartRetriever,
};

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub db: PgClient,
    pub documents: Arc<dyn DocumentStore>,
    pub qa: Arc<QaPipeline>,
    pub ingest: Arc<IngestPipeline>,
}

impl AppState {
    /// Wire stores, provider clients and pipelines together
    pub fn new(config: Settings, db: PgClient) -> Result<Self, RagError> {
        let documents: Arc<dyn DocumentStore> = Arc::new(PgDocumentStore::new(&db));
        let chunks: Arc<dyn ChunkStore> = Arc::new(PgChunkStore::new(&db));

        let embedder = Arc::new(HttpEmbedder::new(EmbedderConfig {
            endpoint: config.embedding.endpoint.clone(),
            model: config.embedding.model.clone(),
            api_key: config.embedding.api_key.clone(),
            dimension: config.embedding.dimension,
            batch_size: config.embedding.batch_size,
            batch_delay: Duration::from_millis(config.embedding.batch_delay_ms),
            retry_delay: Duration::from_millis(config.embedding.retry_delay_ms),
            price_per_1k_tokens: config.embedding.price_per_1k_tokens,
        })?);

        let llm = Arc::new(
            OpenAiBackend::new(LlmConfig {
                model: config.llm.model.clone(),
                endpoint: config.llm.endpoint.clone(),
                api_key: config.llm.api_key.clone(),
                max_tokens: config.llm.max_tokens,
                temperature: config.llm.temperature,
                timeout: Duration::from_secs(config.llm.timeout_secs),
                ..LlmConfig::default()
            })
            .map_err(|e| RagError::Configuration(e.to_string()))?,
        );

        let chunker = Chunker::new(ChunkerConfig {
            max_chars: config.rag.chunk_size,
            overlap_chars: config.rag.chunk_overlap,
        })?;

        let ingest = Arc::new(IngestPipeline::new(
            documents.clone(),
            chunks.clone(),
            embedder.clone(),
            chunker,
        ));

        let retriever = SmartRetriever::new(
            QueryRewriter::new(llm.clone()),
            embedder,
            chunks,
            RetrievalConfig::from(&config.rag),
        );

        let qa = Arc::new(QaPipeline::new(
            documents.clone(),
            retriever,
            AnswerGenerator::new(llm),
        ));

        Ok(Self {
            config: Arc::new(config),
            db,
            documents,
            qa,
            ingest,
        })
    }
}
