//! Two-stage query rewriting
//!
//! Turns a raw user question into a retrieval-friendly query:
//!
//! 1. **Normalization** - strip filler and politeness phrasing, keep intent.
//! 2. **Branch by structure** - compound questions (detected by a bilingual
//!    marker list) are decomposed into 2-3 self-contained sub-questions and
//!    merged; simple questions are expanded with 3-5 related terms to widen
//!    lexical recall.
//!
//! Every stage degrades to its input on failure. The result always carries a
//! usable `final_query`; the rewriter must never block retrieval.

use std::sync::Arc;

use serde::Serialize;

use docchat_llm::{LlmBackend, Message};

/// Which path produced the final query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    /// No stage changed the query
    Original,
    /// Compound question split and merged
    Decomposition,
    /// Related terms appended
    Expansion,
    /// A stage failed and the previous value was kept
    Fallback,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Original => "original",
            QueryType::Decomposition => "decomposition",
            QueryType::Expansion => "expansion",
            QueryType::Fallback => "fallback",
        }
    }
}

/// Result of a rewrite, consumed immediately by the retrieval orchestrator
#[derive(Debug, Clone)]
pub struct RewriteResult {
    pub original: String,
    pub final_query: String,
    pub query_type: QueryType,
    /// Stage labels in execution order, for observability
    pub steps: Vec<String>,
    pub sub_queries: Option<Vec<String>>,
    pub error: Option<String>,
}

/// Compound-question markers, English and Chinese
///
/// A keyword heuristic: structurally compound questions without these
/// markers take the expansion path, which is acceptable by design.
const COMPOUND_MARKERS_LATIN: &[&str] = &[
    "and", "or", "versus", "vs", "compare", "comparison", "difference",
    "differences", "contrast", "between", "both",
];

const COMPOUND_MARKERS_CJK: &[&str] = &[
    "和", "与", "或者", "还是", "以及", "对比", "比较", "区别", "差别", "不同",
];

/// Two-stage LLM query rewriter
pub struct QueryRewriter {
    llm: Arc<dyn LlmBackend>,
}

impl QueryRewriter {
    pub fn new(llm: Arc<dyn LlmBackend>) -> Self {
        Self { llm }
    }

    /// Rewrite a query; never fails
    pub async fn rewrite(&self, original: &str) -> RewriteResult {
        let original = original.trim();
        let mut steps = Vec::new();
        let mut last_error = None;

        // Stage 1: normalization, pass-through on failure
        let normalized = match self.normalize(original).await {
            Ok(q) => {
                steps.push("normalize".to_string());
                q
            }
            Err(e) => {
                tracing::debug!(error = %e, "Query normalization failed, keeping original");
                steps.push("normalize_failed".to_string());
                last_error = Some(e);
                original.to_string()
            }
        };

        // Stage 2: decompose compound questions, expand simple ones
        if is_compound(&normalized) {
            match self.decompose(&normalized).await {
                Ok(sub_queries) => {
                    steps.push("decompose".to_string());
                    let final_query = sub_queries.join(" ");
                    return RewriteResult {
                        original: original.to_string(),
                        final_query,
                        query_type: QueryType::Decomposition,
                        steps,
                        sub_queries: Some(sub_queries),
                        error: None,
                    };
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Query decomposition failed, keeping normalized");
                    steps.push("decompose_failed".to_string());
                    last_error = Some(e);
                }
            }
        } else {
            match self.expand(&normalized).await {
                Ok(expanded) => {
                    steps.push("expand".to_string());
                    return RewriteResult {
                        original: original.to_string(),
                        final_query: expanded,
                        query_type: QueryType::Expansion,
                        steps,
                        sub_queries: None,
                        error: None,
                    };
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Query expansion failed, keeping normalized");
                    steps.push("expand_failed".to_string());
                    last_error = Some(e);
                }
            }
        }

        // Both halves of the branch degrade to the best value we still have.
        let query_type = if normalized == original && last_error.is_none() {
            QueryType::Original
        } else {
            QueryType::Fallback
        };

        RewriteResult {
            original: original.to_string(),
            final_query: normalized,
            query_type,
            steps,
            sub_queries: None,
            error: last_error.map(|e| e.to_string()),
        }
    }

    async fn normalize(&self, query: &str) -> Result<String, docchat_llm::LlmError> {
        let messages = vec![
            Message::system(
                "You rewrite user questions for document retrieval. Rewrite the \
                 question into a single formal, concise query: remove filler words, \
                 verbal tics and politeness phrasing, keep the intent and language \
                 unchanged. Output only the rewritten query.",
            ),
            Message::user(query.to_string()),
        ];

        let response = self.llm.generate(&messages).await?;
        validate_single_line(&response.text, query)
    }

    async fn decompose(&self, query: &str) -> Result<Vec<String>, docchat_llm::LlmError> {
        let messages = vec![
            Message::system(
                "The user question contains multiple sub-questions. Split it into \
                 2-3 independent, self-contained questions, one per line, numbered \
                 1. 2. 3. Keep the language of the original. Output only the list.",
            ),
            Message::user(query.to_string()),
        ];

        let response = self.llm.generate(&messages).await?;
        let sub_queries = parse_sub_questions(&response.text);
        if sub_queries.len() < 2 {
            return Err(docchat_llm::LlmError::InvalidResponse(format!(
                "Expected 2-3 sub-questions, got {}",
                sub_queries.len()
            )));
        }
        Ok(sub_queries)
    }

    async fn expand(&self, query: &str) -> Result<String, docchat_llm::LlmError> {
        let messages = vec![
            Message::system(
                "Expand the retrieval query by appending 3-5 synonyms or closely \
                 related terms after the original text, separated by spaces. Do not \
                 change the original wording or its language. Output only the \
                 expanded query.",
            ),
            Message::user(query.to_string()),
        ];

        let response = self.llm.generate(&messages).await?;
        validate_single_line(&response.text, query)
    }
}

/// Detect compound-question markers
pub fn is_compound(query: &str) -> bool {
    let lowered = query.to_lowercase();
    let has_latin_marker = lowered
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| COMPOUND_MARKERS_LATIN.contains(&word));
    has_latin_marker || COMPOUND_MARKERS_CJK.iter().any(|m| lowered.contains(m))
}

/// Parse a numbered/bulleted list into sub-questions, capped at 3
fn parse_sub_questions(text: &str) -> Vec<String> {
    text.lines()
        .map(strip_list_prefix)
        .filter(|line| line.chars().count() > 3)
        .map(str::to_string)
        .take(3)
        .collect()
}

/// Strip leading numbering ("1.", "2)", "3、") and bullet markers
fn strip_list_prefix(line: &str) -> &str {
    let line = line.trim();
    let without_digits = line.trim_start_matches(|c: char| c.is_ascii_digit());
    if without_digits.len() < line.len() {
        without_digits
            .trim_start_matches(['.', ')', '、', ':'])
            .trim_start()
    } else {
        line.trim_start_matches(['-', '*', '•']).trim_start()
    }
}

/// Reject empty, multi-line or runaway rewrites
fn validate_single_line(text: &str, fallback_check: &str) -> Result<String, docchat_llm::LlmError> {
    let cleaned = text.trim();
    if cleaned.is_empty() {
        return Err(docchat_llm::LlmError::InvalidResponse(
            "Empty rewrite".to_string(),
        ));
    }
    if cleaned.lines().count() > 1 {
        return Err(docchat_llm::LlmError::InvalidResponse(
            "Multi-line rewrite".to_string(),
        ));
    }
    if cleaned.chars().count() > fallback_check.chars().count().max(50) * 10 {
        return Err(docchat_llm::LlmError::InvalidResponse(
            "Rewrite too long".to_string(),
        ));
    }
    Ok(cleaned.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    use docchat_llm::{FinishReason, GenerationResult, LlmError};

    /// Backend scripted with one outcome per expected call
    struct ScriptedLlm {
        responses: Mutex<VecDeque<Result<String, ()>>>,
    }

    impl ScriptedLlm {
        fn new(responses: Vec<Result<&str, ()>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(
                    responses
                        .into_iter()
                        .map(|r| r.map(str::to_string))
                        .collect(),
                ),
            })
        }
    }

    #[async_trait]
    impl LlmBackend for ScriptedLlm {
        async fn generate(&self, _messages: &[Message]) -> Result<GenerationResult, LlmError> {
            match self.responses.lock().pop_front() {
                Some(Ok(text)) => Ok(GenerationResult {
                    text,
                    tokens: 0,
                    total_time_ms: 1,
                    finish_reason: FinishReason::Stop,
                }),
                Some(Err(())) => Err(LlmError::Server("scripted failure".to_string())),
                None => panic!("ScriptedLlm ran out of responses"),
            }
        }

        async fn is_available(&self) -> bool {
            true
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    #[test]
    fn test_compound_detection() {
        assert!(is_compound("What are the differences between plan A and plan B?"));
        assert!(is_compound("pricing versus features"));
        assert!(is_compound("套餐A和套餐B的区别是什么"));
        assert!(is_compound("对比两种方案"));
        assert!(!is_compound("What is the refund policy?"));
        // "an" and "android" must not match the "and" marker
        assert!(!is_compound("What is an android phone?"));
    }

    #[test]
    fn test_sub_question_parsing() {
        let parsed = parse_sub_questions(
            "1. What is plan A?\n2) What is plan B?\n3、How do they differ?",
        );
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0], "What is plan A?");
        assert_eq!(parsed[1], "What is plan B?");
        assert_eq!(parsed[2], "How do they differ?");

        let bulleted = parse_sub_questions("- first question here\n- second question here");
        assert_eq!(bulleted.len(), 2);
        assert_eq!(bulleted[0], "first question here");
    }

    #[tokio::test]
    async fn test_expansion_path() {
        let llm = ScriptedLlm::new(vec![
            Ok("What is the refund policy?"),
            Ok("What is the refund policy? refund return reimbursement policy terms"),
        ]);
        let rewriter = QueryRewriter::new(llm);

        let result = rewriter.rewrite("umm, what's the refund policy please?").await;

        assert_eq!(result.query_type, QueryType::Expansion);
        assert!(result.final_query.contains("reimbursement"));
        assert_eq!(result.steps, vec!["normalize", "expand"]);
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_decomposition_path() {
        let llm = ScriptedLlm::new(vec![
            Ok("What are the differences between plan A and plan B?"),
            Ok("1. What does plan A include?\n2. What does plan B include?"),
        ]);
        let rewriter = QueryRewriter::new(llm);

        let result = rewriter
            .rewrite("What are the differences between plan A and plan B?")
            .await;

        assert_eq!(result.query_type, QueryType::Decomposition);
        assert!(result.final_query.contains("plan A"));
        assert!(result.final_query.contains("plan B"));
        assert!(!result.final_query.contains("1."));
        assert_eq!(result.sub_queries.as_ref().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_normalization_failure_degrades() {
        let llm = ScriptedLlm::new(vec![
            Err(()),
            Ok("What is the warranty period? warranty guarantee coverage duration"),
        ]);
        let rewriter = QueryRewriter::new(llm);

        let result = rewriter.rewrite("What is the warranty period?").await;

        // Expansion still ran against the unmodified original
        assert_eq!(result.query_type, QueryType::Expansion);
        assert!(result.steps.contains(&"normalize_failed".to_string()));
        assert!(!result.final_query.is_empty());
    }

    #[tokio::test]
    async fn test_total_failure_falls_back_to_original() {
        let llm = ScriptedLlm::new(vec![Err(()), Err(())]);
        let rewriter = QueryRewriter::new(llm);

        let original = "What is the warranty period?";
        let result = rewriter.rewrite(original).await;

        assert_eq!(result.final_query, original);
        assert_eq!(result.query_type, QueryType::Fallback);
        assert!(result.error.is_some());
        assert_eq!(result.steps, vec!["normalize_failed", "expand_failed"]);
    }

    #[tokio::test]
    async fn test_branch_failure_keeps_normalized_query() {
        let llm = ScriptedLlm::new(vec![Ok("plan A compared with plan B"), Err(())]);
        let rewriter = QueryRewriter::new(llm);

        let result = rewriter.rewrite("how does plan A compare with plan B??").await;

        assert_eq!(result.final_query, "plan A compared with plan B");
        assert_eq!(result.query_type, QueryType::Fallback);
    }

    #[tokio::test]
    async fn test_multiline_normalization_is_rejected() {
        let llm = ScriptedLlm::new(vec![
            Ok("Here is the rewritten query:\nWhat is the refund policy?"),
            Ok("refund policy refund return terms"),
        ]);
        let rewriter = QueryRewriter::new(llm);

        let result = rewriter.rewrite("refund policy").await;

        // The invalid normalization was discarded, not used
        assert!(result.steps.contains(&"normalize_failed".to_string()));
        assert!(!result.final_query.contains('\n'));
    }

    #[tokio::test]
    async fn test_malformed_decomposition_falls_back() {
        let llm = ScriptedLlm::new(vec![
            Ok("plan A versus plan B"),
            Ok("I cannot split this question."),
        ]);
        let rewriter = QueryRewriter::new(llm);

        let result = rewriter.rewrite("plan A versus plan B").await;

        assert_eq!(result.query_type, QueryType::Fallback);
        assert_eq!(result.final_query, "plan A versus plan B");
        assert!(result.sub_queries.is_none());
    }
}
