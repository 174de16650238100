//! Immutable query-index segments
//!
//! A [`Segment`] is built once from a batch of [`QueryRecord`]s and never
//! mutated. Deletions are expressed as tombstones held next to the segment
//! in the index snapshot, and segments are periodically merged into one.
//!
//! ## Layout
//!
//! ```text
//! records:  [QueryRecord; n]            local id = slot number
//! postings: IndexToken → [local id]     ascending, deduplicated
//! ```

use crate::filter::IndexToken;
use percolate_core::StoredQuery;
use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

// ============================================================================
// QueryRecord
// ============================================================================

/// The searchable record stored for one query
///
/// Holds the pass tokens produced by extraction, plus pass-agnostic record
/// fields that components may add (e.g. metadata filter values).
#[derive(Debug, Clone)]
pub struct QueryRecord {
    query: Arc<StoredQuery>,
    passes: u32,
    tokens: BTreeSet<IndexToken>,
    fields: BTreeMap<String, BTreeSet<Vec<u8>>>,
}

impl QueryRecord {
    /// Empty record for a query extracted over `passes` passes
    pub fn new(query: Arc<StoredQuery>, passes: u32) -> Self {
        QueryRecord {
            query,
            passes,
            tokens: BTreeSet::new(),
            fields: BTreeMap::new(),
        }
    }

    /// Query id
    pub fn id(&self) -> &str {
        self.query.id()
    }

    /// The compiled query
    pub fn query(&self) -> &Arc<StoredQuery> {
        &self.query
    }

    /// Number of passes the record was indexed with
    pub fn passes(&self) -> u32 {
        self.passes
    }

    /// Post the record under a pass token
    pub fn add_token(&mut self, token: IndexToken) {
        self.tokens.insert(token);
    }

    /// Add a pass-agnostic record field value
    pub fn add_field(&mut self, field: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.fields.entry(field.into()).or_default().insert(value.into());
    }

    /// Pass tokens
    pub fn tokens(&self) -> &BTreeSet<IndexToken> {
        &self.tokens
    }

    /// Record fields
    pub fn fields(&self) -> &BTreeMap<String, BTreeSet<Vec<u8>>> {
        &self.fields
    }

    /// Bitmask with one bit per pass the record needs hit
    pub(crate) fn pass_mask(&self) -> u64 {
        if self.passes >= 64 {
            u64::MAX
        } else {
            (1u64 << self.passes) - 1
        }
    }
}

// ============================================================================
// Segment
// ============================================================================

/// An immutable batch of query records with an inverted token index
#[derive(Debug)]
pub struct Segment {
    segment_id: u64,
    records: Vec<Arc<QueryRecord>>,
    postings: FxHashMap<IndexToken, Vec<u32>>,
}

impl Segment {
    /// Build a segment; local ids follow the order of `records`
    pub fn build(segment_id: u64, records: Vec<Arc<QueryRecord>>) -> Self {
        let mut postings: FxHashMap<IndexToken, Vec<u32>> = FxHashMap::default();
        for (local, record) in records.iter().enumerate() {
            for token in record.tokens() {
                // tokens are a set, so each list stays sorted and unique
                postings.entry(token.clone()).or_default().push(local as u32);
            }
        }
        Segment {
            segment_id,
            records,
            postings,
        }
    }

    /// Segment id, unique within an index
    pub fn segment_id(&self) -> u64 {
        self.segment_id
    }

    /// Local ids posted under `token`
    pub fn postings(&self, token: &IndexToken) -> &[u32] {
        self.postings.get(token).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Record by local id
    pub fn record(&self, local: u32) -> Option<&Arc<QueryRecord>> {
        self.records.get(local as usize)
    }

    /// All records, including tombstoned ones
    pub fn records(&self) -> &[Arc<QueryRecord>] {
        &self.records
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the segment holds no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of distinct posting keys
    pub fn token_count(&self) -> usize {
        self.postings.len()
    }
}
