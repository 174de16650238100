//! Text analysis
//!
//! Analysis is an external concern: the core only needs "an analyzer turns
//! raw text into a token sequence". [`StandardAnalyzer`] is the reference
//! implementation used by the query parser and by tests.
//!
//! Pipeline: UAX#29 word boundaries → strip possessives → remove non-alphanumeric
//!           → lowercase → filter short tokens → optional stopword removal

use unicode_segmentation::UnicodeSegmentation;

/// Standard English stopwords (Lucene's default set)
pub const ENGLISH_STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is", "it",
    "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there", "these",
    "they", "this", "to", "was", "will", "with",
];

/// A single analyzed token
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token {
    /// Normalized token text
    pub text: String,
    /// Position in the token sequence (gaps allowed after removed tokens)
    pub position: u32,
}

impl Token {
    /// Create a new token
    pub fn new(text: impl Into<String>, position: u32) -> Self {
        Token {
            text: text.into(),
            position,
        }
    }
}

/// Boxed token iterator handed through presearcher token filters
pub type TokenStream<'a> = Box<dyn Iterator<Item = Token> + Send + 'a>;

/// Turns raw field text into a token sequence
pub trait Analyzer: Send + Sync {
    /// Analyze text into ordered tokens
    fn analyze(&self, text: &str) -> Vec<Token>;

    /// Normalize a single query term the same way document text is normalized
    ///
    /// Returns `None` when the term analyzes to nothing (e.g. a stopword).
    fn normalize(&self, term: &str) -> Option<String> {
        self.analyze(term).into_iter().next().map(|t| t.text)
    }
}

/// Reference analyzer: Unicode words, lowercased
///
/// # Example
///
/// ```
/// use percolate_core::analyzer::{Analyzer, StandardAnalyzer};
///
/// let tokens = StandardAnalyzer::new().analyze("The Quick brown fox's den");
/// let texts: Vec<_> = tokens.iter().map(|t| t.text.as_str()).collect();
/// assert_eq!(texts, vec!["the", "quick", "brown", "fox", "den"]);
/// ```
#[derive(Debug, Clone)]
pub struct StandardAnalyzer {
    min_token_len: usize,
    stopwords: Vec<String>,
}

impl Default for StandardAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl StandardAnalyzer {
    /// Analyzer with no stopwords and no length filter
    pub fn new() -> Self {
        StandardAnalyzer {
            min_token_len: 1,
            stopwords: Vec::new(),
        }
    }

    /// Analyzer that drops [`ENGLISH_STOPWORDS`]
    pub fn english() -> Self {
        Self::new().with_stopwords(ENGLISH_STOPWORDS.iter().map(|s| s.to_string()).collect())
    }

    /// Builder: drop tokens shorter than `len` characters
    pub fn with_min_token_len(mut self, len: usize) -> Self {
        self.min_token_len = len.max(1);
        self
    }

    /// Builder: set the stopword list
    pub fn with_stopwords(mut self, stopwords: Vec<String>) -> Self {
        self.stopwords = stopwords;
        self
    }

    fn is_stopword(&self, token: &str) -> bool {
        self.stopwords.iter().any(|s| s == token)
    }
}

/// Strip English possessive suffix (`'s` / `\u{2019}s`).
#[inline]
fn strip_possessive(word: &str) -> &str {
    word.strip_suffix("'s")
        .or_else(|| word.strip_suffix("\u{2019}s"))
        .unwrap_or(word)
}

impl Analyzer for StandardAnalyzer {
    fn analyze(&self, text: &str) -> Vec<Token> {
        // Positions advance for removed stopwords so phrases don't match across them.
        let mut out = Vec::new();
        let mut position = 0u32;
        for word in text.unicode_words() {
            let cleaned: String = strip_possessive(word)
                .chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase();
            if cleaned.is_empty() {
                continue;
            }
            if cleaned.chars().count() >= self.min_token_len && !self.is_stopword(&cleaned) {
                out.push(Token::new(cleaned, position));
            }
            position += 1;
        }
        out
    }
}
