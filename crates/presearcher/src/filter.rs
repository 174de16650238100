//! Document-side filter model
//!
//! - [`DocumentIndex`]: the (field → distinct tokens) view of one document
//!   after presearcher token filters ran
//! - [`FilterQuery`]: the disjunctive candidate query built from it
//! - [`IndexToken`]: the key query records are posted under

use percolate_core::ANY_FIELD;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A posting key: pass number, field and token bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndexToken {
    /// Extraction pass the token belongs to
    pub pass: u32,
    /// Field name
    pub field: String,
    /// Token bytes
    pub value: Vec<u8>,
}

impl IndexToken {
    /// Create a token
    pub fn new(pass: u32, field: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        IndexToken {
            pass,
            field: field.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for IndexToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}:{}", self.pass, self.field, String::from_utf8_lossy(&self.value))
    }
}

// ============================================================================
// DocumentIndex
// ============================================================================

/// Distinct filtered tokens of one document, per field
///
/// Built once per document and consulted by components when they adjust
/// the filter query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentIndex {
    doc_id: String,
    fields: BTreeMap<String, BTreeSet<Vec<u8>>>,
}

impl DocumentIndex {
    /// Empty index for a document
    pub fn new(doc_id: impl Into<String>) -> Self {
        DocumentIndex {
            doc_id: doc_id.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Record a token (fields with no tokens are still recorded as present)
    pub fn insert(&mut self, field: &str, value: impl Into<Vec<u8>>) {
        self.fields.entry(field.to_string()).or_default().insert(value.into());
    }

    /// Mark a field present without adding tokens
    pub fn touch(&mut self, field: &str) {
        self.fields.entry(field.to_string()).or_default();
    }

    /// Document id
    pub fn doc_id(&self) -> &str {
        &self.doc_id
    }

    /// Field names in sorted order
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Distinct tokens of a field
    pub fn terms(&self, field: &str) -> Option<&BTreeSet<Vec<u8>>> {
        self.fields.get(field)
    }

    /// Whether `field` contains `value`
    pub fn contains(&self, field: &str, value: &[u8]) -> bool {
        self.fields.get(field).is_some_and(|v| v.contains(value))
    }

    /// Total distinct (field, token) pairs
    pub fn token_count(&self) -> usize {
        self.fields.values().map(BTreeSet::len).sum()
    }
}

// ============================================================================
// FilterQuery
// ============================================================================

/// Record-field constraint: a record that carries `field` must carry one
/// of `values` under it
///
/// Records without the field are unrestricted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordClause {
    /// Record field
    pub field: String,
    /// Accepted values
    pub values: BTreeSet<Vec<u8>>,
}

/// Candidate query for one document
///
/// A record is a candidate when, for every pass it was indexed with, at
/// least one of its tokens for that pass is in `tokens`, and no clause in
/// `required` excludes it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterQuery {
    tokens: BTreeSet<IndexToken>,
    required: Vec<RecordClause>,
}

impl FilterQuery {
    /// Disjunctive filter from a document index
    ///
    /// For every pass: each (field, token) pair, plus the ANY sentinel for
    /// every field present, plus the field-agnostic ANY sentinel.
    pub fn from_document(doc: &DocumentIndex, passes: u32, any_token: &[u8]) -> Self {
        let mut tokens = BTreeSet::new();
        for pass in 0..passes {
            for (field, values) in &doc.fields {
                for value in values {
                    tokens.insert(IndexToken::new(pass, field.as_str(), value.clone()));
                }
                tokens.insert(IndexToken::new(pass, field.as_str(), any_token));
            }
            tokens.insert(IndexToken::new(pass, ANY_FIELD, any_token));
        }
        FilterQuery {
            tokens,
            required: Vec::new(),
        }
    }

    /// Builder: add a required record clause
    pub fn with_required(mut self, clause: RecordClause) -> Self {
        self.required.push(clause);
        self
    }

    /// Builder: add a disjunct
    pub fn with_token(mut self, token: IndexToken) -> Self {
        self.tokens.insert(token);
        self
    }

    /// Disjunctive tokens
    pub fn tokens(&self) -> &BTreeSet<IndexToken> {
        &self.tokens
    }

    /// Required record clauses
    pub fn required(&self) -> &[RecordClause] {
        &self.required
    }

    /// Whether `record_fields` passes every required clause
    pub fn accepts(&self, record_fields: &BTreeMap<String, BTreeSet<Vec<u8>>>) -> bool {
        self.required.iter().all(|clause| match record_fields.get(&clause.field) {
            Some(values) if !values.is_empty() => values.iter().any(|v| clause.values.contains(v)),
            _ => true,
        })
    }
}
