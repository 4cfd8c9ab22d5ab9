//! Token counting capability.
//!
//! The manager never assumes a particular model vocabulary. Callers inject a
//! [`Tokenizer`]; the default estimates tokens from character counts.

/// Default characters per token (conservative estimate for English text).
/// Most tokenizers average 3-4 chars per token; we use 3.5 as a middle ground.
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 3.5;

/// Maps content to a token count.
pub trait Tokenizer: Send + Sync + std::fmt::Debug {
    /// Number of tokens `text` occupies in a prompt.
    fn count(&self, text: &str) -> usize;
}

/// Estimates tokens as `ceil(chars / chars_per_token)`.
#[derive(Debug, Clone, Copy)]
pub struct CharRatioTokenizer {
    chars_per_token: f64,
}

impl CharRatioTokenizer {
    /// Use a calibrated chars-per-token ratio. Non-positive ratios fall back
    /// to [`DEFAULT_CHARS_PER_TOKEN`].
    pub fn new(chars_per_token: f64) -> Self {
        let chars_per_token = if chars_per_token > 0.0 {
            chars_per_token
        } else {
            DEFAULT_CHARS_PER_TOKEN
        };
        Self { chars_per_token }
    }
}

impl Default for CharRatioTokenizer {
    fn default() -> Self {
        Self::new(DEFAULT_CHARS_PER_TOKEN)
    }
}

impl Tokenizer for CharRatioTokenizer {
    fn count(&self, text: &str) -> usize {
        let chars = text.chars().count();
        (chars as f64 / self.chars_per_token).ceil() as usize
    }
}

/// One token per whitespace-separated word.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceTokenizer;

impl Tokenizer for WhitespaceTokenizer {
    fn count(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn char_ratio_rounds_up() {
        let t = CharRatioTokenizer::default();
        assert_eq!(t.count(""), 0);
        assert_eq!(t.count("abc"), 1);
        assert_eq!(t.count(&"a".repeat(35)), 10);
        assert_eq!(t.count(&"a".repeat(36)), 11);
    }

    #[test]
    fn calibrated_ratio_counts_fewer_tokens() {
        let text = "a".repeat(400);
        assert!(CharRatioTokenizer::new(4.0).count(&text) < CharRatioTokenizer::default().count(&text));
        assert_eq!(CharRatioTokenizer::new(-1.0).count(&text), CharRatioTokenizer::default().count(&text));
    }

    #[test]
    fn whitespace_counts_words() {
        assert_eq!(WhitespaceTokenizer.count("one two\nthree  four"), 4);
        assert_eq!(WhitespaceTokenizer.count("   "), 0);
    }
}
