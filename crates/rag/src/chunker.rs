//! Overlap-window text chunking
//!
//! Splits extracted document text into chunks of at most `max_chars`
//! characters with `overlap_chars` of shared context between consecutive
//! chunks. Split points prefer semantic boundaries in priority order:
//! paragraph breaks, line breaks, sentence-ending punctuation (including the
//! fullwidth CJK set), plain whitespace, then a hard cut as last resort.
//!
//! Chunks are exact character slices of the input, so concatenating them
//! while accounting for the overlap reconstructs the original text.

use serde::{Deserialize, Serialize};

use crate::tokenizer::estimate_tokens;
use crate::RagError;

/// Sentence-ending characters, Latin and fullwidth CJK
const SENTENCE_ENDERS: &[char] = &['.', '!', '?', ';', '。', '！', '？', '；', '，'];

/// Chunker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// Maximum chunk size in characters
    pub max_chars: usize,
    /// Overlap between consecutive chunks in characters
    pub overlap_chars: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chars: 1000,
            overlap_chars: 200,
        }
    }
}

/// A single chunk of text with metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextChunk {
    /// Zero-based position of this chunk in the document
    pub index: usize,
    /// Chunk text content (exact slice of the input)
    pub content: String,
    /// Start character offset in the source text
    pub start_char: usize,
    /// End character offset in the source text (exclusive)
    pub end_char: usize,
    /// Character count
    pub char_count: usize,
    /// Estimated token count
    pub token_count: usize,
    /// Originating page, when page-aware chunking was used
    pub page_number: Option<i32>,
    /// Inherited metadata merged with per-chunk fields
    pub metadata: serde_json::Value,
}

/// One page of extracted text
#[derive(Debug, Clone)]
pub struct PageText {
    /// 1-based page number
    pub number: i32,
    pub text: String,
}

/// Overlap-window chunker
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Result<Self, RagError> {
        if config.max_chars == 0 {
            return Err(RagError::Chunking("max_chars must be positive".to_string()));
        }
        if config.overlap_chars >= config.max_chars {
            return Err(RagError::Chunking(format!(
                "overlap ({}) must be smaller than max chunk size ({})",
                config.overlap_chars, config.max_chars
            )));
        }
        Ok(Self { config })
    }

    /// Chunk a single text
    ///
    /// Empty or whitespace-only input yields an empty sequence.
    pub fn chunk(&self, text: &str, metadata: &serde_json::Value) -> Vec<TextChunk> {
        self.chunk_inner(text, None, 0, metadata)
    }

    /// Chunk per-page texts, stamping page numbers and keeping chunk indices
    /// contiguous across the whole document
    pub fn chunk_pages(
        &self,
        pages: &[PageText],
        metadata: &serde_json::Value,
    ) -> Vec<TextChunk> {
        let mut chunks = Vec::new();
        for page in pages {
            let page_chunks =
                self.chunk_inner(&page.text, Some(page.number), chunks.len(), metadata);
            chunks.extend(page_chunks);
        }
        chunks
    }

    fn chunk_inner(
        &self,
        text: &str,
        page_number: Option<i32>,
        first_index: usize,
        metadata: &serde_json::Value,
    ) -> Vec<TextChunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = text.chars().collect();
        let n = chars.len();
        let max = self.config.max_chars;
        let overlap = self.config.overlap_chars;
        // A cut below this bound would stall progress or produce slivers
        let min_cut = (max / 2).max(overlap + 1);

        let mut chunks = Vec::new();
        let mut start = 0usize;

        while start < n {
            let end = if n - start <= max {
                n
            } else {
                start + find_break(&chars[start..start + max], min_cut)
            };

            let content: String = chars[start..end].iter().collect();
            let token_count = estimate_tokens(&content);
            chunks.push(TextChunk {
                index: first_index + chunks.len(),
                char_count: content.chars().count(),
                content,
                start_char: start,
                end_char: end,
                token_count,
                page_number,
                metadata: metadata.clone(),
            });

            if end >= n {
                break;
            }
            start = end - overlap;
        }

        chunks
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            config: ChunkerConfig::default(),
        }
    }
}

/// Find the best split position in a full window of characters
///
/// Returns the cut offset (number of characters kept in the current chunk).
/// Each boundary class is scanned backwards from the window end; the first
/// class with a match past `min_cut` wins. No boundary means a hard cut at
/// the window end.
fn find_break(window: &[char], min_cut: usize) -> usize {
    let len = window.len();

    // Paragraph break: cut just after "\n\n"
    for i in (min_cut.saturating_sub(1)..len.saturating_sub(1)).rev() {
        if window[i] == '\n' && window[i + 1] == '\n' {
            let cut = i + 2;
            if cut > min_cut {
                return cut;
            }
            break;
        }
    }

    // Line break
    if let Some(cut) = rscan(window, min_cut, |c| c == '\n') {
        return cut;
    }

    // Sentence-ending punctuation
    if let Some(cut) = rscan(window, min_cut, |c| SENTENCE_ENDERS.contains(&c)) {
        return cut;
    }

    // Any whitespace
    if let Some(cut) = rscan(window, min_cut, |c| c.is_whitespace()) {
        return cut;
    }

    // Hard cut
    len
}

/// Scan backwards for a character matching `pred`; cut falls after the match
fn rscan(window: &[char], min_cut: usize, pred: impl Fn(char) -> bool) -> Option<usize> {
    for i in (min_cut..window.len()).rev() {
        if pred(window[i - 1]) {
            return Some(i);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chunker(max: usize, overlap: usize) -> Chunker {
        Chunker::new(ChunkerConfig {
            max_chars: max,
            overlap_chars: overlap,
        })
        .unwrap()
    }

    /// Rebuild the original text from chunks, dropping each chunk's overlap
    fn reconstruct(chunks: &[TextChunk]) -> String {
        let mut out = String::new();
        let mut covered = 0usize;
        for chunk in chunks {
            let skip = covered - chunk.start_char;
            out.extend(chunk.content.chars().skip(skip));
            covered = chunk.end_char;
        }
        out
    }

    #[test]
    fn test_empty_input_yields_no_chunks() {
        let c = Chunker::default();
        assert!(c.chunk("", &json!({})).is_empty());
        assert!(c.chunk("  \n\t  ", &json!({})).is_empty());
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        assert!(Chunker::new(ChunkerConfig {
            max_chars: 100,
            overlap_chars: 100,
        })
        .is_err());
        assert!(Chunker::new(ChunkerConfig {
            max_chars: 0,
            overlap_chars: 0,
        })
        .is_err());
    }

    #[test]
    fn test_short_text_is_one_chunk() {
        let c = Chunker::default();
        let chunks = c.chunk("A single short paragraph.", &json!({}));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].content, "A single short paragraph.");
    }

    #[test]
    fn test_indices_are_contiguous_and_ordered() {
        let c = chunker(80, 20);
        let text = "one two three four five six seven eight nine ten. ".repeat(20);
        let chunks = c.chunk(&text, &json!({}));
        assert!(chunks.len() > 2);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
            assert!(chunk.char_count <= 80);
        }
    }

    #[test]
    fn test_rechunking_is_idempotent() {
        let c = chunker(120, 30);
        let text = "Sentence one is here. Sentence two follows.\n\nA new paragraph \
                    starts now and carries on for a while with more words. The end \
                    arrives eventually after enough text to force several chunks."
            .repeat(3);
        let first = c.chunk(&text, &json!({}));
        let second = c.chunk(&text, &json!({}));
        assert_eq!(first, second);
    }

    #[test]
    fn test_coverage_reconstructs_original() {
        let c = chunker(100, 25);
        let text = "Alpha beta gamma delta epsilon zeta eta theta. ".repeat(15);
        let chunks = c.chunk(&text, &json!({}));
        assert!(chunks.len() > 2);
        assert_eq!(reconstruct(&chunks), text);
    }

    #[test]
    fn test_overlap_between_consecutive_chunks() {
        let c = chunker(100, 25);
        let text = "word ".repeat(200);
        let chunks = c.chunk(&text, &json!({}));
        for pair in chunks.windows(2) {
            assert_eq!(pair[1].start_char, pair[0].end_char - 25);
            let tail: String = pair[0].content.chars().skip(pair[0].char_count - 25).collect();
            let head: String = pair[1].content.chars().take(25).collect();
            assert_eq!(tail, head);
        }
    }

    #[test]
    fn test_prefers_paragraph_boundary() {
        let c = chunker(100, 10);
        let first_para = format!("{}.\n\n", "x".repeat(70));
        let text = format!("{}{}", first_para, "y".repeat(200));
        let chunks = c.chunk(&text, &json!({}));
        assert!(chunks[0].content.ends_with("\n\n"));
    }

    #[test]
    fn test_prefers_sentence_boundary_over_space() {
        let c = chunker(60, 10);
        let text = "A first sentence that is fairly long ends here. more words follow \
                    after the boundary and keep going";
        let chunks = c.chunk(&text, &json!({}));
        assert!(chunks[0].content.trim_end().ends_with('.'));
    }

    #[test]
    fn test_cjk_sentence_enders() {
        let c = chunker(30, 5);
        let text = format!("{}。{}", "文".repeat(20), "档".repeat(30));
        let chunks = c.chunk(&text, &json!({}));
        assert!(chunks[0].content.ends_with('。'));
        assert_eq!(reconstruct(&chunks), text);
    }

    #[test]
    fn test_hard_cut_without_any_boundary() {
        let c = chunker(50, 10);
        let text = "x".repeat(180);
        let chunks = c.chunk(&text, &json!({}));
        assert!(chunks.len() > 1);
        assert_eq!(chunks[0].char_count, 50);
        assert_eq!(reconstruct(&chunks), text);
    }

    #[test]
    fn test_page_aware_chunking() {
        let c = chunker(60, 10);
        let pages = vec![
            PageText {
                number: 1,
                text: "Page one content. ".repeat(8),
            },
            PageText {
                number: 2,
                text: "Page two content. ".repeat(8),
            },
        ];
        let chunks = c.chunk_pages(&pages, &json!({"source": "manual.pdf"}));
        assert!(chunks.len() > 2);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
            assert_eq!(chunk.metadata["source"], "manual.pdf");
        }
        assert_eq!(chunks.first().unwrap().page_number, Some(1));
        assert_eq!(chunks.last().unwrap().page_number, Some(2));
    }

    #[test]
    fn test_token_counts_populated() {
        let c = Chunker::default();
        let chunks = c.chunk("Twelve chars of text here.", &json!({}));
        assert!(chunks[0].token_count > 0);
    }
}
