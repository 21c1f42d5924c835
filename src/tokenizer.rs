use std::collections::HashSet;
use std::fmt::Debug;
use unicode_segmentation::UnicodeSegmentation;

/// Longest term, in bytes, that the term dictionary can store.
pub const MAX_TERM_LENGTH: usize = 255;

pub trait Tokenizer: Send + Sync + Debug {
    /// Returns the distinct terms of `text` in order of first occurrence.
    fn tokenize(&self, text: &str) -> Vec<String>;
}

/// Splits on unicode word boundaries, lower-cases, and keeps only word
/// characters. Words that end up empty or longer than `MAX_TERM_LENGTH`
/// bytes are dropped.
#[derive(Clone, Debug, Default)]
pub struct WordTokenizer;

impl WordTokenizer {
    pub fn new() -> WordTokenizer {
        WordTokenizer {}
    }

    pub fn boxed(self) -> Box<WordTokenizer> {
        Box::new(self)
    }

    /// Normalizes a single word the way `tokenize` does. Also used to bring
    /// query terms into the indexed form.
    pub fn normalize(word: &str) -> Option<String> {
        let term: String = word.to_lowercase().chars().filter(is_word_char).collect();
        if term.is_empty() || term.len() > MAX_TERM_LENGTH {
            None
        } else {
            Some(term)
        }
    }
}

impl Tokenizer for WordTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        text.split_word_bounds()
            .filter_map(WordTokenizer::normalize)
            .filter(|term| seen.insert(term.clone()))
            .collect()
    }
}

fn is_word_char(c: &char) -> bool {
    c.is_alphanumeric() || *c == '_'
}
