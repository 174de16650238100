//! Input documents and document batches
//!
//! Documents are caller-owned and read-only to the core. Each field holds an
//! analyzed token sequence; [`InputDocument::tokens`] returns a fresh
//! iterator on every call, so the sequence can be consumed more than once
//! (once by the presearcher, again by the exact matcher).

use crate::analyzer::{Analyzer, Token};
use std::collections::BTreeMap;

/// A document to be matched against the stored query corpus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDocument {
    id: String,
    fields: BTreeMap<String, Vec<Token>>,
}

impl InputDocument {
    /// Start building a document
    pub fn builder(id: impl Into<String>) -> InputDocumentBuilder {
        InputDocumentBuilder {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Document id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Field names in sorted order
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Whether the document carries `field`
    pub fn has_field(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Token sequence for a field (empty if the field is absent)
    pub fn tokens(&self, field: &str) -> impl Iterator<Item = &Token> + '_ {
        self.fields.get(field).into_iter().flat_map(|tokens| tokens.iter())
    }

    /// Token slice for a field, if present
    pub fn field_tokens(&self, field: &str) -> Option<&[Token]> {
        self.fields.get(field).map(Vec::as_slice)
    }

    /// Number of fields
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}

/// Builder for [`InputDocument`]
#[derive(Debug)]
pub struct InputDocumentBuilder {
    id: String,
    fields: BTreeMap<String, Vec<Token>>,
}

impl InputDocumentBuilder {
    /// Analyze `text` and append the tokens to `field`
    ///
    /// Adding the same field twice appends, with positions continuing after
    /// the existing tokens.
    pub fn add_field(self, field: impl Into<String>, text: &str, analyzer: &dyn Analyzer) -> Self {
        let tokens = analyzer.analyze(text);
        self.add_tokens(field, tokens)
    }

    /// Append pre-analyzed tokens to `field`
    pub fn add_tokens(mut self, field: impl Into<String>, tokens: Vec<Token>) -> Self {
        let entry = self.fields.entry(field.into()).or_default();
        let offset = entry.last().map(|t| t.position + 1).unwrap_or(0);
        entry.extend(tokens.into_iter().map(|t| Token::new(t.text, t.position + offset)));
        self
    }

    /// Finish the document
    pub fn build(self) -> InputDocument {
        InputDocument {
            id: self.id,
            fields: self.fields,
        }
    }
}

// ============================================================================
// DocumentBatch
// ============================================================================

/// An ordered batch of documents processed as one unit of work
#[derive(Debug, Clone, Default)]
pub struct DocumentBatch {
    documents: Vec<InputDocument>,
}

impl DocumentBatch {
    /// Batch from a list of documents, preserving order
    pub fn of(documents: Vec<InputDocument>) -> Self {
        DocumentBatch { documents }
    }

    /// Batch holding a single document
    pub fn single(document: InputDocument) -> Self {
        DocumentBatch {
            documents: vec![document],
        }
    }

    /// Documents in input order
    pub fn documents(&self) -> &[InputDocument] {
        &self.documents
    }

    /// Number of documents
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Whether the batch is empty
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl From<Vec<InputDocument>> for DocumentBatch {
    fn from(documents: Vec<InputDocument>) -> Self {
        DocumentBatch::of(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::StandardAnalyzer;

    #[test]
    fn test_builder_analyzes_fields() {
        let doc = InputDocument::builder("d1")
            .add_field("text", "the quick brown fox", &StandardAnalyzer::new())
            .build();
        assert_eq!(doc.id(), "d1");
        let texts: Vec<_> = doc.tokens("text").map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["the", "quick", "brown", "fox"]);
        assert!(doc.tokens("missing").next().is_none());
    }

    #[test]
    fn test_tokens_are_restartable() {
        let doc = InputDocument::builder("d1")
            .add_field("text", "a b c", &StandardAnalyzer::new())
            .build();
        assert_eq!(doc.tokens("text").count(), 3);
        assert_eq!(doc.tokens("text").count(), 3);
    }

    #[test]
    fn test_repeated_field_continues_positions() {
        let analyzer = StandardAnalyzer::new();
        let doc = InputDocument::builder("d1")
            .add_field("text", "one two", &analyzer)
            .add_field("text", "three", &analyzer)
            .build();
        let last = doc.tokens("text").last().unwrap();
        assert_eq!(last.text, "three");
        assert_eq!(last.position, 2);
    }

    #[test]
    fn test_batch_preserves_order() {
        let batch = DocumentBatch::of(vec![
            InputDocument::builder("a").build(),
            InputDocument::builder("b").build(),
        ]);
        let ids: Vec<_> = batch.documents().iter().map(|d| d.id()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(DocumentBatch::default().is_empty());
    }
}
