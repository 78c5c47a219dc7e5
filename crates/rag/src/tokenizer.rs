//! Token estimation and embedding cost
//!
//! Pure heuristics; no tokenizer model is loaded. Estimates feed chunk
//! metadata and the cost figures logged during ingestion.

use unicode_segmentation::UnicodeSegmentation;

/// Estimate tokens for text
///
/// Latin text averages ~4 characters per token; CJK text averages closer to
/// 1 token per 1-2 characters, so a CJK-dominant string uses a denser ratio.
pub fn estimate_tokens(text: &str) -> usize {
    if text.trim().is_empty() {
        return 0;
    }

    let grapheme_count = text.graphemes(true).count();
    let cjk_count = text.chars().filter(|c| is_cjk(*c)).count();

    if cjk_count > grapheme_count / 3 {
        grapheme_count.max(1).div_ceil(2)
    } else {
        grapheme_count.max(1).div_ceil(4)
    }
}

/// Estimate the provider cost of embedding `tokens` at `price_per_1k_tokens`
pub fn estimate_embedding_cost(tokens: usize, price_per_1k_tokens: f64) -> f64 {
    (tokens as f64 / 1000.0) * price_per_1k_tokens
}

/// CJK unified ideographs plus the common fullwidth punctuation block
fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}'
        | '\u{3400}'..='\u{4DBF}'
        | '\u{3000}'..='\u{303F}'
        | '\u{FF00}'..='\u{FFEF}'
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("   \n\t"), 0);
    }

    #[test]
    fn test_latin_ratio() {
        // 24 graphemes -> 6 tokens at the 4:1 ratio
        let text = "the quick brown fox jump";
        assert_eq!(estimate_tokens(text), 6);
    }

    #[test]
    fn test_cjk_is_denser() {
        let latin = "retrieval augmented generation pipeline";
        let cjk = "检索增强生成管道的基本原理说明文档内容测试";
        let latin_ratio = estimate_tokens(latin) as f64 / latin.chars().count() as f64;
        let cjk_ratio = estimate_tokens(cjk) as f64 / cjk.chars().count() as f64;
        assert!(cjk_ratio > latin_ratio);
    }

    #[test]
    fn test_short_text_rounds_up() {
        assert!(estimate_tokens("a") >= 1);
        assert!(estimate_tokens("好") >= 1);
    }

    #[test]
    fn test_cost_estimate() {
        let cost = estimate_embedding_cost(2000, 0.02);
        assert!((cost - 0.04).abs() < 1e-9);
        assert_eq!(estimate_embedding_cost(0, 0.02), 0.0);
    }
}
