//! Token estimation.
//!
//! The relay budgets against an approximation rather than a real tokenizer:
//! roughly one token per four characters, but never fewer tokens than
//! whitespace-separated words. Both measures only grow as text grows, so the
//! estimate is monotonic over prefixes.

/// Characters per token for the default estimator.
pub const CHARS_PER_TOKEN: usize = 4;

/// Approximates the token cost of a text blob.
#[derive(Debug, Clone, Copy)]
pub struct TokenEstimator {
    chars_per_token: usize,
}

impl TokenEstimator {
    pub fn new() -> Self {
        Self {
            chars_per_token: CHARS_PER_TOKEN,
        }
    }

    /// Create an estimator with a custom character ratio (clamped to at least 1).
    pub fn with_chars_per_token(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }

    /// Estimated token count. Empty text costs nothing.
    pub fn estimate(&self, text: &str) -> u64 {
        let chars = text.chars().count();
        if chars == 0 {
            return 0;
        }

        let by_chars = chars.div_ceil(self.chars_per_token);
        let by_words = text.split_whitespace().count();
        by_chars.max(by_words) as u64
    }

    /// Sum of estimates over several texts.
    pub fn estimate_all<'a>(&self, texts: impl IntoIterator<Item = &'a str>) -> u64 {
        texts.into_iter().map(|t| self.estimate(t)).sum()
    }
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_zero() {
        let est = TokenEstimator::new();
        assert_eq!(est.estimate(""), 0);
    }

    #[test]
    fn test_short_text_costs_at_least_one() {
        let est = TokenEstimator::new();
        assert_eq!(est.estimate("hi"), 1);
        assert_eq!(est.estimate("hello"), 2);
    }

    #[test]
    fn test_words_floor() {
        let est = TokenEstimator::new();
        // 9 chars -> 3 by chars, but 5 words
        assert_eq!(est.estimate("a b c d e"), 5);
    }

    #[test]
    fn test_monotonic_over_prefixes() {
        let est = TokenEstimator::new();
        let text = "The quick brown fox jumps over the lazy dog, twice: ünïcödé too.";
        let mut last = 0;
        for (i, _) in text.char_indices().skip(1) {
            let cost = est.estimate(&text[..i]);
            assert!(cost >= last, "estimate dropped at byte {}", i);
            last = cost;
        }
        assert!(est.estimate(text) >= last);
    }

    #[test]
    fn test_deterministic() {
        let est = TokenEstimator::new();
        let text = "same input, same cost";
        assert_eq!(est.estimate(text), est.estimate(text));
    }

    #[test]
    fn test_custom_ratio_clamped() {
        let est = TokenEstimator::with_chars_per_token(0);
        assert_eq!(est.estimate("abcd"), 4);
    }

    #[test]
    fn test_estimate_all() {
        let est = TokenEstimator::new();
        assert_eq!(est.estimate_all(["hello", "", "hi"]), 3);
    }
}
