//! Match result model and the exact-matcher contract
//!
//! This module provides:
//! - [`QueryMatch`]: a per-query match record
//! - [`DocumentMatches`]: all records for one document
//! - [`Matches`]: batch-level results with timing and counters
//! - [`CandidateMatcher`] / [`MatcherFactory`]: the exact-matching contract
//!
//! The monitor decides *which* (query, document) pairs reach the matcher;
//! the matcher alone decides whether a pair matches.

use crate::document::InputDocument;
use crate::query::StoredQuery;
use std::time::Duration;

/// A token span that satisfied part of a query
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hit {
    /// Field the hit is in
    pub field: String,
    /// First token position (inclusive)
    pub start: u32,
    /// Last token position (inclusive)
    pub end: u32,
}

impl Hit {
    /// Create a hit
    pub fn new(field: impl Into<String>, start: u32, end: u32) -> Self {
        Hit {
            field: field.into(),
            start,
            end,
        }
    }
}

/// A per-query match record produced by an exact matcher
pub trait QueryMatch: Send {
    /// Id of the matching stored query
    fn query_id(&self) -> &str;
}

/// An exact matcher failed on one query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchError {
    /// Query the matcher failed on
    pub query_id: String,
    /// Failure description
    pub message: String,
}

// ============================================================================
// Matcher contract
// ============================================================================

/// Evaluates candidate queries against one document
///
/// Shared by reference across worker threads for the duration of a match
/// call.
pub trait CandidateMatcher<T: QueryMatch>: Send + Sync {
    /// Exact evaluation of one candidate
    ///
    /// `Ok(None)` means the candidate was a presearcher false positive.
    /// `Err` is recorded against the query and does not abort the batch.
    fn match_query(&self, query: &StoredQuery, doc: &InputDocument) -> Result<Option<T>, String>;
}

/// Builds a matcher for each match call
pub trait MatcherFactory<T: QueryMatch>: Send + Sync {
    /// Matcher type
    type Matcher: CandidateMatcher<T>;

    /// Create a matcher for one match call
    fn create(&self) -> Self::Matcher;
}

// ============================================================================
// DocumentMatches
// ============================================================================

/// Match records for a single document
#[derive(Debug, Clone)]
pub struct DocumentMatches<T> {
    doc_id: String,
    matches: Vec<T>,
    errors: Vec<MatchError>,
    candidates: usize,
}

impl<T: QueryMatch> DocumentMatches<T> {
    /// Assemble the results for one document
    pub fn new(doc_id: impl Into<String>, matches: Vec<T>, errors: Vec<MatchError>, candidates: usize) -> Self {
        DocumentMatches {
            doc_id: doc_id.into(),
            matches,
            errors,
            candidates,
        }
    }

    /// Document id
    pub fn doc_id(&self) -> &str {
        &self.doc_id
    }

    /// Match records in candidate order
    pub fn matches(&self) -> &[T] {
        &self.matches
    }

    /// Record for a query id, if it matched
    pub fn get(&self, query_id: &str) -> Option<&T> {
        self.matches.iter().find(|m| m.query_id() == query_id)
    }

    /// Matcher failures for this document
    pub fn errors(&self) -> &[MatchError] {
        &self.errors
    }

    /// Number of candidate queries the exact matcher ran
    pub fn candidates(&self) -> usize {
        self.candidates
    }

    /// Number of matching queries
    pub fn len(&self) -> usize {
        self.matches.len()
    }

    /// Whether no query matched
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

impl<'a, T> IntoIterator for &'a DocumentMatches<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.matches.iter()
    }
}

// ============================================================================
// Matches
// ============================================================================

/// Results of matching a document batch
///
/// `documents()[i]` always corresponds to input document `i`.
#[derive(Debug, Clone)]
pub struct Matches<T> {
    documents: Vec<DocumentMatches<T>>,
    queries_run: usize,
    elapsed: Duration,
}

impl<T: QueryMatch> Matches<T> {
    /// Assemble batch results
    ///
    /// `queries_run` is derived from the per-document candidate counts.
    pub fn new(documents: Vec<DocumentMatches<T>>, elapsed: Duration) -> Self {
        let queries_run = documents.iter().map(|d| d.candidates).sum();
        Matches {
            documents,
            queries_run,
            elapsed,
        }
    }

    /// Number of documents in the batch
    pub fn batch_size(&self) -> usize {
        self.documents.len()
    }

    /// Total exact-match evaluations (sum of candidate-set sizes)
    pub fn queries_run(&self) -> usize {
        self.queries_run
    }

    /// Wall time for the whole batch
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Per-document results in input order
    pub fn documents(&self) -> &[DocumentMatches<T>] {
        &self.documents
    }

    /// Results for a document id
    pub fn document(&self, doc_id: &str) -> Option<&DocumentMatches<T>> {
        self.documents.iter().find(|d| d.doc_id == doc_id)
    }

    /// Match record for a (document, query) pair
    pub fn get(&self, doc_id: &str, query_id: &str) -> Option<&T> {
        self.document(doc_id).and_then(|d| d.get(query_id))
    }

    /// Total matching (document, query) pairs
    pub fn match_count(&self) -> usize {
        self.documents.iter().map(|d| d.len()).sum()
    }

    /// All matcher errors across the batch
    pub fn errors(&self) -> impl Iterator<Item = &MatchError> {
        self.documents.iter().flat_map(|d| d.errors.iter())
    }
}

impl<'a, T> IntoIterator for &'a Matches<T> {
    type Item = &'a DocumentMatches<T>;
    type IntoIter = std::slice::Iter<'a, DocumentMatches<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.documents.iter()
    }
}
