//! Token-count estimation for page records.
//!
//! The embedding stage only needs a budget hint, so the default estimator
//! uses a fixed characters-per-token ratio rather than a model vocabulary.

/// Approximate chars-per-token ratio for English prose.
const CHARS_PER_TOKEN: usize = 4;

/// Estimates how many tokens a piece of text will cost downstream.
pub trait Tokenizer: Send + Sync {
    fn estimate(&self, text: &str) -> usize;
}

/// Character-ratio estimator.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharRatioTokenizer;

impl Tokenizer for CharRatioTokenizer {
    fn estimate(&self, text: &str) -> usize {
        text.chars().count().div_ceil(CHARS_PER_TOKEN)
    }
}
