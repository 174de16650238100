//! Term weighting
//!
//! This module provides:
//! - [`TermWeightor`]: scores a single extracted term
//! - [`WeightNorm`] policies combined multiplicatively by [`CompositeWeightor`]
//! - [`CorpusStats`]: concurrent document-frequency table for IDF weighting
//! - [`StatsSnapshot`]: the frozen view of it that weighting reads
//!
//! Higher weight means more selective. Weights only decide *which*
//! sufficient sub-clause of a conjunction gets indexed, so any formula
//! keeps extraction sound; the formula only affects how many false
//! positives reach the exact matcher.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use percolate_core::{InputDocument, QueryTerm, TermKind};
use rustc_hash::FxHashMap;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Default number of distinct (field, token) pairs [`CorpusStats`] tracks
pub const DEFAULT_STATS_CAPACITY: usize = 1_000_000;

/// Scores extracted terms by selectivity
pub trait TermWeightor: Send + Sync {
    /// Weight of one term; finite and non-negative
    fn weigh(&self, term: &QueryTerm) -> f32;
}

/// One multiplicative factor of a [`CompositeWeightor`]
pub trait WeightNorm: fmt::Debug + Send + Sync {
    /// Factor for this term
    fn norm(&self, term: &QueryTerm) -> f32;
}

// ============================================================================
// Norms
// ============================================================================

/// Weight by term kind: ANY terms are never selective
#[derive(Debug, Clone)]
pub struct TermKindNorm {
    /// Factor for ANY terms
    pub any: f32,
    /// Factor for CUSTOM terms
    pub custom: f32,
}

impl Default for TermKindNorm {
    fn default() -> Self {
        TermKindNorm { any: 0.0, custom: 1.0 }
    }
}

impl WeightNorm for TermKindNorm {
    fn norm(&self, term: &QueryTerm) -> f32 {
        match term.kind {
            TermKind::Exact => 1.0,
            TermKind::Any => self.any,
            TermKind::Custom(_) => self.custom,
        }
    }
}

/// Longer tokens are rarer: `4 - a * e^(-k * len)`
#[derive(Debug, Clone)]
pub struct TokenLengthNorm {
    /// Penalty scale for short tokens
    pub a: f32,
    /// Decay rate of the penalty with token length
    pub k: f32,
}

impl Default for TokenLengthNorm {
    fn default() -> Self {
        TokenLengthNorm { a: 3.0, k: 0.3 }
    }
}

impl WeightNorm for TokenLengthNorm {
    fn norm(&self, term: &QueryTerm) -> f32 {
        let len = String::from_utf8_lossy(&term.value).chars().count() as f32;
        4.0 - self.a * (-self.k * len).exp()
    }
}

/// Per-field multipliers, 1.0 for unlisted fields
#[derive(Debug, Clone, Default)]
pub struct FieldWeightNorm {
    weights: HashMap<String, f32>,
}

impl FieldWeightNorm {
    /// Create from a field → factor map
    pub fn new(weights: HashMap<String, f32>) -> Self {
        FieldWeightNorm { weights }
    }

    /// Builder: set one field's factor
    pub fn with_field(mut self, field: impl Into<String>, weight: f32) -> Self {
        self.weights.insert(field.into(), weight);
        self
    }
}

impl WeightNorm for FieldWeightNorm {
    fn norm(&self, term: &QueryTerm) -> f32 {
        self.weights.get(&term.field).copied().unwrap_or(1.0)
    }
}

/// Inverse corpus frequency from observed documents
///
/// Uses standard IDF formula with smoothing:
/// IDF(t) = ln((N - df + 0.5) / (df + 0.5) + 1)
///
/// Reads the last [`CorpusStats::refresh`] snapshot, so the same query
/// weighs the same between refreshes. Returns 1.0 while that snapshot is
/// empty.
#[derive(Debug, Clone)]
pub struct TermFrequencyNorm {
    stats: Arc<CorpusStats>,
}

impl TermFrequencyNorm {
    /// Create from shared stats
    pub fn new(stats: Arc<CorpusStats>) -> Self {
        TermFrequencyNorm { stats }
    }
}

impl WeightNorm for TermFrequencyNorm {
    fn norm(&self, term: &QueryTerm) -> f32 {
        if term.kind != TermKind::Exact {
            return 1.0;
        }
        let snapshot = self.stats.snapshot();
        if snapshot.total_docs() == 0 {
            return 1.0;
        }
        snapshot.idf(&term.field, &term.value)
    }
}

// ============================================================================
// CorpusStats
// ============================================================================

/// Frozen document frequencies, as of one [`CorpusStats::refresh`]
#[derive(Debug, Default)]
pub struct StatsSnapshot {
    doc_freqs: FxHashMap<(String, Vec<u8>), u64>,
    total_docs: u64,
}

impl StatsSnapshot {
    /// Documents observed before the snapshot was taken
    pub fn total_docs(&self) -> u64 {
        self.total_docs
    }

    /// Documents containing `value` in `field`
    pub fn doc_freq(&self, field: &str, value: &[u8]) -> u64 {
        self.doc_freqs
            .get(&(field.to_string(), value.to_vec()))
            .copied()
            .unwrap_or(0)
    }

    /// Smoothed inverse document frequency
    pub fn idf(&self, field: &str, value: &[u8]) -> f32 {
        let n = self.total_docs as f32;
        let df = self.doc_freq(field, value) as f32;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }
}

/// Document frequencies of (field, token) pairs seen in matched documents
///
/// Counting is live; weighting reads a [`StatsSnapshot`] that only changes
/// on [`CorpusStats::refresh`]. At most `capacity` distinct pairs are
/// tracked: once full, unseen pairs are not counted and weigh as rare.
///
/// # Thread Safety
///
/// Uses DashMap for concurrent access; match workers observe documents
/// while query updates read the snapshot.
#[derive(Debug)]
pub struct CorpusStats {
    doc_freqs: DashMap<(String, Vec<u8>), u64>,
    total_docs: AtomicU64,
    tracked: AtomicUsize,
    capacity: usize,
    snapshot: RwLock<Arc<StatsSnapshot>>,
}

impl Default for CorpusStats {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_STATS_CAPACITY)
    }
}

impl CorpusStats {
    /// Empty stats tracking up to [`DEFAULT_STATS_CAPACITY`] pairs
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty stats tracking up to `capacity` distinct pairs
    pub fn with_capacity(capacity: usize) -> Self {
        CorpusStats {
            doc_freqs: DashMap::new(),
            total_docs: AtomicU64::new(0),
            tracked: AtomicUsize::new(0),
            capacity,
            snapshot: RwLock::new(Arc::new(StatsSnapshot::default())),
        }
    }

    /// Count each distinct (field, token) of a document once
    pub fn observe(&self, doc: &InputDocument) {
        for field in doc.field_names() {
            let unique: HashSet<&str> = doc.tokens(field).map(|t| t.text.as_str()).collect();
            for token in unique {
                match self.doc_freqs.entry((field.to_string(), token.as_bytes().to_vec())) {
                    Entry::Occupied(mut e) => *e.get_mut() += 1,
                    Entry::Vacant(e) => {
                        if self.tracked.fetch_add(1, Ordering::AcqRel) < self.capacity {
                            e.insert(1);
                        } else {
                            self.tracked.fetch_sub(1, Ordering::AcqRel);
                        }
                    }
                }
            }
        }
        self.total_docs.fetch_add(1, Ordering::Release);
    }

    /// Documents observed so far
    pub fn total_docs(&self) -> u64 {
        self.total_docs.load(Ordering::Acquire)
    }

    /// Live count of documents containing `value` in `field`
    pub fn doc_freq(&self, field: &str, value: &[u8]) -> u64 {
        self.doc_freqs
            .get(&(field.to_string(), value.to_vec()))
            .map(|r| *r)
            .unwrap_or(0)
    }

    /// Distinct pairs being counted
    pub fn tracked_terms(&self) -> usize {
        self.tracked.load(Ordering::Acquire).min(self.capacity)
    }

    /// Most distinct pairs ever counted
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Snapshot weighting currently reads
    pub fn snapshot(&self) -> Arc<StatsSnapshot> {
        Arc::clone(&self.snapshot.read())
    }

    /// Freeze the live counts into a new snapshot; returns its document count
    pub fn refresh(&self) -> u64 {
        let total_docs = self.total_docs();
        let doc_freqs = self.doc_freqs.iter().map(|r| (r.key().clone(), *r.value())).collect();
        *self.snapshot.write() = Arc::new(StatsSnapshot { doc_freqs, total_docs });
        total_docs
    }
}

// ============================================================================
// CompositeWeightor
// ============================================================================

/// Product of a list of [`WeightNorm`]s
///
/// The default combines [`TermKindNorm`] and [`TokenLengthNorm`].
#[derive(Debug)]
pub struct CompositeWeightor {
    norms: Vec<Box<dyn WeightNorm>>,
}

impl Default for CompositeWeightor {
    fn default() -> Self {
        CompositeWeightor::new(vec![
            Box::new(TermKindNorm::default()),
            Box::new(TokenLengthNorm::default()),
        ])
    }
}

impl CompositeWeightor {
    /// Create from an explicit list of norms
    pub fn new(norms: Vec<Box<dyn WeightNorm>>) -> Self {
        CompositeWeightor { norms }
    }

    /// Builder: append a norm
    pub fn with_norm(mut self, norm: Box<dyn WeightNorm>) -> Self {
        self.norms.push(norm);
        self
    }
}

impl TermWeightor for CompositeWeightor {
    fn weigh(&self, term: &QueryTerm) -> f32 {
        let w = self.norms.iter().fold(1.0f32, |acc, n| acc * n.norm(term));
        if w.is_finite() {
            w.max(0.0)
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use percolate_core::StandardAnalyzer;

    #[test]
    fn test_any_weighs_zero() {
        let w = CompositeWeightor::default();
        assert_eq!(w.weigh(&QueryTerm::any("text")), 0.0);
    }

    #[test]
    fn test_longer_tokens_weigh_more() {
        let w = CompositeWeightor::default();
        let short = w.weigh(&QueryTerm::exact("text", "ox"));
        let long = w.weigh(&QueryTerm::exact("text", "hippopotamus"));
        assert!(long > short);
    }

    #[test]
    fn test_field_weight_norm() {
        let w = CompositeWeightor::default().with_norm(Box::new(FieldWeightNorm::default().with_field("title", 2.0)));
        let body = w.weigh(&QueryTerm::exact("body", "fox"));
        let title = w.weigh(&QueryTerm::exact("title", "fox"));
        assert!((title - 2.0 * body).abs() < 1e-5);
    }

    #[test]
    fn test_corpus_stats_idf() {
        let stats = Arc::new(CorpusStats::new());
        let analyzer = StandardAnalyzer::new();
        for i in 0..10 {
            let text = if i == 0 { "common unique" } else { "common" };
            stats.observe(&InputDocument::builder(format!("d{i}")).add_field("text", text, &analyzer).build());
        }
        assert_eq!(stats.total_docs(), 10);
        assert_eq!(stats.doc_freq("text", b"common"), 10);
        assert_eq!(stats.refresh(), 10);
        let snapshot = stats.snapshot();
        assert!(snapshot.idf("text", b"unique") > snapshot.idf("text", b"common"));

        let w = CompositeWeightor::default().with_norm(Box::new(TermFrequencyNorm::new(stats)));
        // same length, different frequency
        let unique = w.weigh(&QueryTerm::exact("text", "unique"));
        let common = w.weigh(&QueryTerm::exact("text", "common"));
        assert!(unique > common);
    }

    #[test]
    fn test_frequency_norm_neutral_without_stats() {
        let norm = TermFrequencyNorm::new(Arc::new(CorpusStats::new()));
        assert_eq!(norm.norm(&QueryTerm::exact("text", "x")), 1.0);
    }

    #[test]
    fn test_weights_only_change_on_refresh() {
        let stats = Arc::new(CorpusStats::new());
        let norm = TermFrequencyNorm::new(Arc::clone(&stats));
        let analyzer = StandardAnalyzer::new();
        let term = QueryTerm::exact("text", "quick");

        for i in 0..20 {
            stats.observe(&InputDocument::builder(format!("d{i}")).add_field("text", "quick", &analyzer).build());
        }
        assert_eq!(norm.norm(&term), 1.0);

        stats.refresh();
        let frozen = norm.norm(&term);
        assert!(frozen < 1.0);
        stats.observe(&InputDocument::builder("late").add_field("text", "slow", &analyzer).build());
        assert_eq!(norm.norm(&term), frozen);
    }

    #[test]
    fn test_capacity_bounds_tracked_terms() {
        let stats = CorpusStats::with_capacity(2);
        let analyzer = StandardAnalyzer::new();
        stats.observe(&InputDocument::builder("d1").add_field("text", "ant bee cat", &analyzer).build());
        assert_eq!(stats.tracked_terms(), 2);

        stats.observe(&InputDocument::builder("d2").add_field("text", "ant bee cat dog", &analyzer).build());
        assert_eq!(stats.tracked_terms(), 2);
        assert_eq!(stats.total_docs(), 2);
        // already-tracked pairs keep counting
        let counted: u64 = ["ant", "bee", "cat", "dog"]
            .iter()
            .map(|t| stats.doc_freq("text", t.as_bytes()))
            .sum();
        assert_eq!(counted, 4);
    }
}
