//! The presearcher engine
//!
//! Index time: a stored query is extracted into per-pass terms, turned into
//! posting keys and written into the [`QueryIndex`] as a [`QueryRecord`].
//!
//! Match time: a document's tokens run through every component's token
//! filter, form a [`DocumentIndex`], become a [`FilterQuery`] and are
//! executed against an [`IndexSnapshot`], yielding a [`CandidateSet`].
//!
//! Soundness: every query that truly matches a document is in that
//! document's candidate set. False positives are expected and left to the
//! exact matcher.

use crate::component::PresearcherComponent;
use crate::filter::{DocumentIndex, FilterQuery, IndexToken};
use crate::index::{IndexSnapshot, IndexUpdate, QueryIndex};
use crate::segment::QueryRecord;
use crate::termextractor::{ClauseExtractor, ExtractedTerms, QueryAnalyzer, TermWeightor};
use percolate_core::{ClauseKind, InputDocument, Result, StoredQuery, TermKind, TokenStream, ANY_TOKEN};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// Highest supported pass count
pub const MAX_PASSES: u32 = 32;

// ============================================================================
// CandidateSet
// ============================================================================

/// Queries selected for exact matching against one document, sorted by id
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    version: u64,
    records: Vec<Arc<QueryRecord>>,
}

impl CandidateSet {
    /// Index version the candidates were read from
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Number of candidates
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no query was selected
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Candidate ids
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.id())
    }

    /// Whether `id` was selected
    pub fn contains(&self, id: &str) -> bool {
        self.records.binary_search_by(|r| r.id().cmp(id)).is_ok()
    }

    /// Candidate queries
    pub fn queries(&self) -> impl Iterator<Item = &Arc<StoredQuery>> {
        self.records.iter().map(|r| r.query())
    }
}

/// Why a query was selected for a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateExplanation {
    /// Query id
    pub query_id: String,
    /// Posting keys of the query that the document's filter hit
    pub tokens: Vec<IndexToken>,
}

// ============================================================================
// Presearcher
// ============================================================================

/// Term extraction plus candidate selection
///
/// # Example
///
/// ```
/// use percolate_core::{InputDocument, MonitorQuery, QueryNode, StandardAnalyzer, StoredQuery};
/// use percolate_presearcher::{Presearcher, QueryIndex};
/// use std::sync::Arc;
///
/// let presearcher = Presearcher::new();
/// let index = QueryIndex::default();
/// let query = StoredQuery::new(MonitorQuery::new("q1", "fox"), QueryNode::term("text", "fox"));
/// presearcher.index(&index, Arc::new(query));
///
/// let doc = InputDocument::builder("d1")
///     .add_field("text", "the quick brown fox", &StandardAnalyzer::new())
///     .build();
/// let candidates = presearcher.select_candidates(&doc, &index.snapshot()).unwrap();
/// assert!(candidates.contains("q1"));
/// ```
pub struct Presearcher {
    analyzer: QueryAnalyzer,
    components: Vec<Arc<dyn PresearcherComponent>>,
    passes: u32,
    min_weight: f32,
}

impl Default for Presearcher {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Presearcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.components.iter().map(|c| c.name()).collect();
        f.debug_struct("Presearcher")
            .field("analyzer", &self.analyzer)
            .field("components", &names)
            .field("passes", &self.passes)
            .field("min_weight", &self.min_weight)
            .finish()
    }
}

impl Presearcher {
    /// Single-pass presearcher with the default extractors and weightor
    pub fn new() -> Self {
        Presearcher {
            analyzer: QueryAnalyzer::new(),
            components: Vec::new(),
            passes: 1,
            min_weight: 0.0,
        }
    }

    /// Builder: append a component and register its clause extractors
    pub fn with_component(mut self, component: Arc<dyn PresearcherComponent>) -> Self {
        for (kind, extractor) in component.clause_extractors() {
            self.analyzer.register(kind, extractor);
        }
        self.components.push(component);
        self
    }

    /// Builder: replace the term weightor
    pub fn with_weightor(mut self, weightor: Arc<dyn TermWeightor>) -> Self {
        self.analyzer = self.analyzer.with_weightor(weightor);
        self
    }

    /// Builder: register an extractor for a clause kind
    pub fn with_extractor(mut self, kind: ClauseKind, extractor: Arc<dyn ClauseExtractor>) -> Self {
        self.analyzer.register(kind, extractor);
        self
    }

    /// Builder: number of extraction passes, clamped to `1..=MAX_PASSES`
    pub fn with_passes(mut self, passes: u32) -> Self {
        self.passes = passes.clamp(1, MAX_PASSES);
        self
    }

    /// Builder: weight a conjunction child must exceed to be used in a later pass
    pub fn with_min_weight(mut self, min_weight: f32) -> Self {
        self.min_weight = min_weight;
        self
    }

    /// Components in application order
    pub fn components(&self) -> &[Arc<dyn PresearcherComponent>] {
        &self.components
    }

    /// Configured pass count
    pub fn passes(&self) -> u32 {
        self.passes
    }

    /// Configured minimum weight for later passes
    pub fn min_weight(&self) -> f32 {
        self.min_weight
    }

    /// The extractor registry
    pub fn analyzer(&self) -> &QueryAnalyzer {
        &self.analyzer
    }

    // ========================================================================
    // Index time
    // ========================================================================

    /// Per-pass terms of a query
    pub fn extract(&self, query: &StoredQuery) -> ExtractedTerms {
        self.analyzer.extract(query.node(), self.passes as usize, self.min_weight)
    }

    /// Build the searchable record for a query
    ///
    /// CUSTOM terms no component maps to a token are indexed as ANY on their
    /// field.
    pub fn index_record(&self, query: Arc<StoredQuery>) -> QueryRecord {
        let terms = self.extract(&query);
        let mut record = QueryRecord::new(Arc::clone(&query), terms.pass_count() as u32);
        for (pass, term) in terms.iter() {
            let pass = pass as u32;
            match term.kind {
                TermKind::Exact => {
                    record.add_token(IndexToken::new(pass, term.field.as_str(), term.value.clone()));
                }
                TermKind::Any => {
                    record.add_token(IndexToken::new(pass, term.field.as_str(), ANY_TOKEN));
                }
                TermKind::Custom(_) => {
                    let mut mapped = false;
                    for component in &self.components {
                        if let Some(token) = component.extra_token(term) {
                            record.add_token(IndexToken::new(pass, term.field.as_str(), token));
                            mapped = true;
                        }
                    }
                    if !mapped {
                        debug!(
                            target: "percolate::presearch",
                            query_id = query.id(),
                            term = %term,
                            "No component maps custom term, indexing as ANY"
                        );
                        record.add_token(IndexToken::new(pass, term.field.as_str(), ANY_TOKEN));
                    }
                }
            }
        }
        for component in &self.components {
            component.adjust_query_record(&mut record, query.metadata());
        }
        trace!(
            target: "percolate::presearch",
            query_id = query.id(),
            passes = record.passes(),
            tokens = record.tokens().len(),
            "Indexed query record"
        );
        record
    }

    /// Index a single query, replacing any record with the same id
    pub fn index(&self, index: &QueryIndex, query: Arc<StoredQuery>) -> u64 {
        index.apply(IndexUpdate::new().upsert(self.index_record(query)))
    }

    // ========================================================================
    // Match time
    // ========================================================================

    /// Filtered (field → tokens) view of a document
    pub fn document_index(&self, doc: &InputDocument) -> DocumentIndex {
        let mut index = DocumentIndex::new(doc.id());
        for field in doc.field_names() {
            let mut stream: TokenStream<'_> = Box::new(doc.tokens(field).cloned());
            for component in &self.components {
                stream = component.filter_document_tokens(field, stream);
            }
            index.touch(field);
            for token in stream {
                index.insert(field, token.text.into_bytes());
            }
        }
        index
    }

    /// Candidate filter for a document
    ///
    /// Fails only when a component's `adjust_filter_query` fails.
    pub fn build_candidate_filter(&self, doc: &InputDocument) -> Result<FilterQuery> {
        let index = self.document_index(doc);
        self.filter_for(&index)
    }

    fn filter_for(&self, index: &DocumentIndex) -> Result<FilterQuery> {
        let mut filter = FilterQuery::from_document(index, self.passes, ANY_TOKEN);
        for component in &self.components {
            filter = component.adjust_filter_query(index, filter)?;
        }
        Ok(filter)
    }

    /// Queries in `snapshot` that may match `doc`
    pub fn select_candidates(&self, doc: &InputDocument, snapshot: &IndexSnapshot) -> Result<CandidateSet> {
        let filter = self.build_candidate_filter(doc)?;
        let records = snapshot.search(&filter);
        trace!(
            target: "percolate::presearch",
            doc_id = doc.id(),
            filter_tokens = filter.tokens().len(),
            candidates = records.len(),
            "Selected candidates"
        );
        Ok(CandidateSet {
            version: snapshot.version(),
            records,
        })
    }

    /// Candidates together with the posting keys that selected them
    pub fn explain_candidates(
        &self,
        doc: &InputDocument,
        snapshot: &IndexSnapshot,
    ) -> Result<Vec<CandidateExplanation>> {
        let filter = self.build_candidate_filter(doc)?;
        Ok(snapshot
            .search(&filter)
            .iter()
            .map(|record| CandidateExplanation {
                query_id: record.id().to_string(),
                tokens: snapshot.matched_tokens(record, &filter),
            })
            .collect())
    }
}
