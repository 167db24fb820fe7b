//! Text → term stream.
//!
//! Real segmentation lives outside this crate; [`Tokenizer`] is the seam it
//! plugs into. [`WordTokenizer`] is the default: lowercase runs of letters
//! and digits.

use std::sync::LazyLock;

use regex::Regex;

/// Splits raw text into index terms.
pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Vec<String>;
}

/// Unicode word tokenizer with a minimum token length.
#[derive(Debug, Clone)]
pub struct WordTokenizer {
    min_len: usize,
}

impl WordTokenizer {
    pub fn new(min_len: usize) -> Self {
        Self { min_len }
    }
}

impl Default for WordTokenizer {
    fn default() -> Self {
        Self::new(2)
    }
}

impl Tokenizer for WordTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        static WORD_RE: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"[\p{L}\p{N}]+").expect("valid regex"));

        WORD_RE
            .find_iter(text)
            .map(|m| m.as_str().to_lowercase())
            .filter(|t| t.chars().count() >= self.min_len)
            .collect()
    }
}
