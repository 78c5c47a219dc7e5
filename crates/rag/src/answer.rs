//! Grounded answer generation
//!
//! Assembles retrieved chunks into a numbered context block and asks the
//! language model for an answer constrained to that context, with source
//! citations. Provider failures are folded into coarse categories before
//! they reach the caller.

use std::sync::Arc;

use serde::Serialize;

use docchat_core::{Document, RetrievedChunk};
use docchat_llm::{LlmBackend, Message};

use crate::retriever::SmartRetrieval;
use crate::rewriter::QueryType;
use crate::RagError;

const PREVIEW_CHARS: usize = 120;

const SYSTEM_PROMPT: &str = "\
You answer questions about a document using only the numbered context \
excerpts provided. Rules:
- Answer primarily from the supplied context.
- Cite the sources you used by their number (and page when shown), e.g. [Source 2, Page 3].
- If the context does not contain enough information, say so explicitly instead of guessing.
- Never fabricate content that is absent from the context.
- Answer in the same language as the question, using the context's structure where helpful.";

/// Citation metadata for one retrieved chunk
#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    /// 1-based index matching the citation numbers in the answer
    pub index: usize,
    /// Leading excerpt of the chunk for citation display
    pub preview: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_number: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f32>,
}

/// A generated answer with citation metadata
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<SourceRef>,
    pub model: String,
    pub chunks_retrieved: usize,
    pub used_rag: bool,
    pub query_type: QueryType,
    pub strategy: String,
}

/// Context-grounded answer generator
pub struct AnswerGenerator {
    llm: Arc<dyn LlmBackend>,
}

impl AnswerGenerator {
    pub fn new(llm: Arc<dyn LlmBackend>) -> Self {
        Self { llm }
    }

    /// Generate an answer for `question` from the retrieved chunks
    pub async fn generate(
        &self,
        document: &Document,
        retrieval: &SmartRetrieval,
        question: &str,
    ) -> Result<Answer, RagError> {
        let context = build_context(&retrieval.chunks);
        let user_prompt = format!(
            "Document: {name}\n\nContext excerpts:\n{context}\nQuestion: {question}",
            name = document.name,
            context = context,
            question = question,
        );

        let messages = vec![Message::system(SYSTEM_PROMPT), Message::user(user_prompt)];

        let response = self
            .llm
            .generate(&messages)
            .await
            .map_err(RagError::from_llm)?;

        tracing::debug!(
            document_id = %document.id,
            chunks = retrieval.chunks.len(),
            strategy = retrieval.strategy.as_str(),
            tokens = response.tokens,
            "Answer generated"
        );

        Ok(Answer {
            text: response.text,
            sources: source_refs(&retrieval.chunks),
            model: self.llm.model_name().to_string(),
            chunks_retrieved: retrieval.chunks.len(),
            used_rag: true,
            query_type: retrieval.rewrite.query_type,
            strategy: retrieval.strategy.as_str().to_string(),
        })
    }
}

/// Render the numbered context block the model is grounded on
fn build_context(chunks: &[RetrievedChunk]) -> String {
    let mut out = String::new();
    for (i, retrieved) in chunks.iter().enumerate() {
        let page = match retrieved.chunk.page_number {
            Some(p) => format!("Page {}", p),
            None => "Page unknown".to_string(),
        };
        out.push_str(&format!(
            "[Source {}] ({}, Relevance {})\n{}\n\n",
            i + 1,
            page,
            format_similarity(retrieved.similarity),
            retrieved.chunk.content.trim(),
        ));
    }
    out
}

/// Similarity as a percentage, or "N/A" for fallback-sampled chunks
fn format_similarity(similarity: Option<f32>) -> String {
    match similarity {
        Some(s) => format!("{:.1}%", s * 100.0),
        None => "N/A".to_string(),
    }
}

fn source_refs(chunks: &[RetrievedChunk]) -> Vec<SourceRef> {
    chunks
        .iter()
        .enumerate()
        .map(|(i, retrieved)| SourceRef {
            index: i + 1,
            preview: preview(&retrieved.chunk.content),
            page_number: retrieved.chunk.page_number,
            similarity: retrieved.similarity,
        })
        .collect()
}

fn preview(content: &str) -> String {
    let trimmed = content.trim();
    if trimmed.chars().count() <= PREVIEW_CHARS {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", cut.trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use uuid::Uuid;

    use docchat_core::{Chunk, DocumentStatus};
    use docchat_llm::{FinishReason, GenerationResult, LlmError};

    use crate::retriever::RetrievalStrategy;
    use crate::rewriter::RewriteResult;

    struct CannedLlm {
        reply: Result<String, fn() -> LlmError>,
    }

    #[async_trait]
    impl LlmBackend for CannedLlm {
        async fn generate(&self, _: &[Message]) -> Result<GenerationResult, LlmError> {
            match &self.reply {
                Ok(text) => Ok(GenerationResult {
                    text: text.clone(),
                    tokens: 42,
                    total_time_ms: 5,
                    finish_reason: FinishReason::Stop,
                }),
                Err(make) => Err(make()),
            }
        }

        async fn is_available(&self) -> bool {
            true
        }

        fn model_name(&self) -> &str {
            "canned-model"
        }
    }

    fn document() -> Document {
        Document {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "handbook.pdf".to_string(),
            file_path: "/uploads/handbook.pdf".to_string(),
            size_bytes: 2048,
            status: DocumentStatus::Ready,
            page_count: Some(4),
            chunk_count: Some(12),
            error_message: None,
            processed_at: Some(Utc::now()),
            created_at: Utc::now(),
        }
    }

    fn retrieved(content: &str, page: Option<i32>, similarity: Option<f32>) -> RetrievedChunk {
        RetrievedChunk {
            chunk: Chunk {
                id: Uuid::new_v4(),
                document_id: Uuid::new_v4(),
                chunk_index: 0,
                content: content.to_string(),
                embedding: None,
                token_count: 8,
                page_number: page,
                metadata: serde_json::Value::Null,
            },
            similarity,
        }
    }

    fn retrieval(chunks: Vec<RetrievedChunk>) -> SmartRetrieval {
        SmartRetrieval {
            chunks,
            strategy: RetrievalStrategy::StandardVector,
            rewrite: RewriteResult {
                original: "q".to_string(),
                final_query: "q".to_string(),
                query_type: QueryType::Expansion,
                steps: vec!["normalize".to_string(), "expand".to_string()],
                sub_queries: None,
                error: None,
            },
        }
    }

    #[test]
    fn test_context_block_format() {
        let chunks = vec![
            retrieved("Refunds are issued within 5 days.", Some(2), Some(0.873)),
            retrieved("Contact support by email.", None, None),
        ];
        let context = build_context(&chunks);

        assert!(context.contains("[Source 1] (Page 2, Relevance 87.3%)"));
        assert!(context.contains("[Source 2] (Page unknown, Relevance N/A)"));
        assert!(context.contains("Refunds are issued within 5 days."));
    }

    #[test]
    fn test_preview_truncation() {
        let long = "word ".repeat(100);
        let p = preview(&long);
        assert!(p.chars().count() <= PREVIEW_CHARS + 3);
        assert!(p.ends_with("..."));

        assert_eq!(preview("short text"), "short text");
    }

    #[tokio::test]
    async fn test_generate_returns_metadata() {
        let llm = Arc::new(CannedLlm {
            reply: Ok("Refunds take 5 days [Source 1, Page 2].".to_string()),
        });
        let generator = AnswerGenerator::new(llm);
        let retrieval = retrieval(vec![
            retrieved("Refunds are issued within 5 days.", Some(2), Some(0.87)),
            retrieved("Unrelated detail.", Some(3), Some(0.65)),
        ]);

        let answer = generator
            .generate(&document(), &retrieval, "How long do refunds take?")
            .await
            .unwrap();

        assert!(answer.text.contains("[Source 1"));
        assert_eq!(answer.sources.len(), 2);
        assert_eq!(answer.sources[0].index, 1);
        assert_eq!(answer.sources[1].index, 2);
        assert_eq!(answer.sources[0].page_number, Some(2));
        assert_eq!(answer.chunks_retrieved, 2);
        assert!(answer.used_rag);
        assert_eq!(answer.model, "canned-model");
        assert_eq!(answer.strategy, "standard_vector");
    }

    #[tokio::test]
    async fn test_provider_errors_are_categorized() {
        let llm = Arc::new(CannedLlm {
            reply: Err(|| LlmError::RateLimit("429".to_string())),
        });
        let generator = AnswerGenerator::new(llm);
        let retrieval = retrieval(vec![retrieved("content", Some(1), Some(0.9))]);

        let err = generator
            .generate(&document(), &retrieval, "question")
            .await
            .unwrap_err();

        match err {
            RagError::Provider { kind, message } => {
                assert_eq!(kind, crate::ProviderErrorKind::RateLimit);
                // Raw provider detail must not leak through
                assert!(!message.contains("429"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
