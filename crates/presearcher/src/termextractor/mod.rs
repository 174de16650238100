//! Term extraction
//!
//! Turns a parsed [`QueryNode`] into the index terms the presearcher stores
//! for it. Extraction runs in two steps:
//!
//! 1. Build a weighted [`QueryTree`] by dispatching each node's
//!    [`ClauseKind`] to a registered [`ClauseExtractor`].
//! 2. Read off one term set per pass, advancing the tree between passes.
//!
//! Soundness rule: for every document that truly matches the query, every
//! pass's term set must contain at least one term present in the document's
//! filter. Anything that cannot be narrowed becomes an ANY term, which
//! over-selects but never under-selects.

pub mod tree;
pub mod weights;

pub use tree::{Conjunction, QueryTree};
pub use weights::{
    CompositeWeightor, CorpusStats, FieldWeightNorm, StatsSnapshot, TermFrequencyNorm, TermKindNorm, TermWeightor,
    TokenLengthNorm, WeightNorm, DEFAULT_STATS_CAPACITY,
};

use percolate_core::{ClauseKind, Error, Occur, QueryNode, QueryTerm, Result, ANY_FIELD};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

// ============================================================================
// ClauseExtractor
// ============================================================================

/// Builds the tree for one clause kind
///
/// Implementations recurse into sub-clauses through [`TreeBuilder::build`]
/// and create leaves with [`TreeBuilder::term`] so weighting stays uniform.
pub trait ClauseExtractor: Send + Sync {
    /// Extract the tree for `node`
    ///
    /// An error is not fatal: the analyzer logs it and indexes the node as
    /// ANY on its field.
    fn extract(&self, node: &QueryNode, builder: &TreeBuilder<'_>) -> Result<QueryTree>;
}

/// Recursion handle passed to extractors
pub struct TreeBuilder<'a> {
    analyzer: &'a QueryAnalyzer,
}

impl TreeBuilder<'_> {
    /// Tree for a sub-clause, using the registry and the ANY fallback
    pub fn build(&self, node: &QueryNode) -> QueryTree {
        self.analyzer.build_tree(node)
    }

    /// Weighted leaf for a term
    pub fn term(&self, term: QueryTerm) -> QueryTree {
        let weight = self.analyzer.weightor.weigh(&term);
        QueryTree::term(term.with_weight(weight))
    }
}

// ============================================================================
// Built-in extractors
// ============================================================================

/// `Term` → one EXACT leaf
#[derive(Debug, Clone, Copy, Default)]
pub struct TermClauseExtractor;

impl ClauseExtractor for TermClauseExtractor {
    fn extract(&self, node: &QueryNode, builder: &TreeBuilder<'_>) -> Result<QueryTree> {
        match node {
            QueryNode::Term { field, text } => Ok(builder.term(QueryTerm::exact(field.as_str(), text.as_bytes()))),
            other => Err(unexpected("term", other)),
        }
    }
}

/// `Phrase` → conjunction of its tokens
#[derive(Debug, Clone, Copy, Default)]
pub struct PhraseClauseExtractor;

impl ClauseExtractor for PhraseClauseExtractor {
    fn extract(&self, node: &QueryNode, builder: &TreeBuilder<'_>) -> Result<QueryTree> {
        match node {
            QueryNode::Phrase { field, terms, .. } if terms.is_empty() => Ok(QueryTree::any(field.as_str())),
            QueryNode::Phrase { field, terms, .. } => Ok(QueryTree::conjunction(
                terms
                    .iter()
                    .map(|t| builder.term(QueryTerm::exact(field.as_str(), t.as_bytes())))
                    .collect(),
            )),
            other => Err(unexpected("phrase", other)),
        }
    }
}

/// `Boolean` → conjunction of required clauses, else disjunction of
/// optional clauses, else (pure negation) field-agnostic ANY
///
/// Prohibited clauses never contribute terms.
#[derive(Debug, Clone, Copy, Default)]
pub struct BooleanClauseExtractor;

impl ClauseExtractor for BooleanClauseExtractor {
    fn extract(&self, node: &QueryNode, builder: &TreeBuilder<'_>) -> Result<QueryTree> {
        let QueryNode::Boolean { clauses } = node else {
            return Err(unexpected("boolean", node));
        };

        let required: Vec<QueryTree> = clauses
            .iter()
            .filter(|c| c.occur.is_required())
            .map(|c| builder.build(&c.node))
            .collect();
        if !required.is_empty() {
            return Ok(QueryTree::conjunction(required));
        }

        let optional: Vec<QueryTree> = clauses
            .iter()
            .filter(|c| c.occur == Occur::Should)
            .map(|c| builder.build(&c.node))
            .collect();
        if !optional.is_empty() {
            return Ok(QueryTree::disjunction(optional));
        }

        Ok(QueryTree::any_field())
    }
}

/// Clauses that cannot be narrowed → ANY on the clause's field
///
/// Registered for wildcard, range and fuzzy clauses by default.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyClauseExtractor;

impl ClauseExtractor for AnyClauseExtractor {
    fn extract(&self, node: &QueryNode, _builder: &TreeBuilder<'_>) -> Result<QueryTree> {
        Ok(any_for(node))
    }
}

/// `MatchAll` → field-agnostic ANY
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchAllClauseExtractor;

impl ClauseExtractor for MatchAllClauseExtractor {
    fn extract(&self, _node: &QueryNode, _builder: &TreeBuilder<'_>) -> Result<QueryTree> {
        Ok(QueryTree::any_field())
    }
}

fn any_for(node: &QueryNode) -> QueryTree {
    QueryTree::any(node.field().unwrap_or(ANY_FIELD))
}

fn unexpected(extractor: &str, node: &QueryNode) -> Error {
    Error::Extraction(format!("{} extractor cannot handle {:?} clause", extractor, node.kind()))
}

// ============================================================================
// QueryAnalyzer
// ============================================================================

/// Term sets for each pass of one query
///
/// May hold fewer sets than the configured pass count when the query's tree
/// could not advance; a query is a candidate once every pass it *has* is hit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedTerms {
    passes: Vec<Vec<QueryTerm>>,
}

impl ExtractedTerms {
    /// Per-pass term sets, in pass order
    pub fn passes(&self) -> &[Vec<QueryTerm>] {
        &self.passes
    }

    /// Number of distinct passes extracted
    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    /// Terms of one pass
    pub fn terms(&self, pass: usize) -> &[QueryTerm] {
        self.passes.get(pass).map(Vec::as_slice).unwrap_or(&[])
    }

    /// `(pass, term)` pairs across all passes
    pub fn iter(&self) -> impl Iterator<Item = (usize, &QueryTerm)> {
        self.passes
            .iter()
            .enumerate()
            .flat_map(|(pass, terms)| terms.iter().map(move |t| (pass, t)))
    }

    /// Whether the first pass indexes an ANY term
    pub fn has_any(&self) -> bool {
        self.terms(0).iter().any(QueryTerm::is_any)
    }
}

/// Extractor registry plus weightor
///
/// # Example
///
/// ```
/// use percolate_core::QueryNode;
/// use percolate_presearcher::QueryAnalyzer;
///
/// let analyzer = QueryAnalyzer::new();
/// let node = QueryNode::all(vec![QueryNode::term("text", "fox"), QueryNode::term("text", "quick")]);
/// let terms = analyzer.extract(&node, 1, 0.0);
/// assert_eq!(terms.terms(0).len(), 1);
/// assert_eq!(terms.terms(0)[0].text(), "quick");
/// ```
pub struct QueryAnalyzer {
    extractors: HashMap<ClauseKind, Arc<dyn ClauseExtractor>>,
    weightor: Arc<dyn TermWeightor>,
}

impl Default for QueryAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for QueryAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.extractors.keys().collect();
        kinds.sort();
        f.debug_struct("QueryAnalyzer").field("extractors", &kinds).finish_non_exhaustive()
    }
}

impl QueryAnalyzer {
    /// Analyzer with the built-in extractors and the default weightor
    pub fn new() -> Self {
        let mut analyzer = QueryAnalyzer {
            extractors: HashMap::new(),
            weightor: Arc::new(CompositeWeightor::default()),
        };
        analyzer.register(ClauseKind::Term, Arc::new(TermClauseExtractor));
        analyzer.register(ClauseKind::Phrase, Arc::new(PhraseClauseExtractor));
        analyzer.register(ClauseKind::Boolean, Arc::new(BooleanClauseExtractor));
        analyzer.register(ClauseKind::Wildcard, Arc::new(AnyClauseExtractor));
        analyzer.register(ClauseKind::Range, Arc::new(AnyClauseExtractor));
        analyzer.register(ClauseKind::Fuzzy, Arc::new(AnyClauseExtractor));
        analyzer.register(ClauseKind::MatchAll, Arc::new(MatchAllClauseExtractor));
        analyzer
    }

    /// Builder: replace the weightor
    pub fn with_weightor(mut self, weightor: Arc<dyn TermWeightor>) -> Self {
        self.weightor = weightor;
        self
    }

    /// Register (or replace) the extractor for a clause kind
    pub fn register(&mut self, kind: ClauseKind, extractor: Arc<dyn ClauseExtractor>) {
        if self.extractors.insert(kind.clone(), extractor).is_some() {
            debug!(target: "percolate::extract", ?kind, "Replaced clause extractor");
        }
    }

    /// Whether a clause kind has an extractor
    pub fn is_registered(&self, kind: &ClauseKind) -> bool {
        self.extractors.contains_key(kind)
    }

    /// Weighted tree for a node
    ///
    /// Unregistered kinds and failing extractors fall back to ANY on the
    /// node's field.
    pub fn build_tree(&self, node: &QueryNode) -> QueryTree {
        let kind = node.kind();
        let Some(extractor) = self.extractors.get(&kind) else {
            debug!(target: "percolate::extract", ?kind, "No extractor registered, indexing as ANY");
            return any_for(node);
        };
        match extractor.extract(node, &TreeBuilder { analyzer: self }) {
            Ok(tree) => tree,
            Err(e) => {
                warn!(target: "percolate::extract", ?kind, error = %e, "Clause extraction failed, indexing as ANY");
                any_for(node)
            }
        }
    }

    /// Term sets for up to `passes` passes
    pub fn extract(&self, node: &QueryNode, passes: usize, min_weight: f32) -> ExtractedTerms {
        let mut tree = self.build_tree(node);
        let mut out = Vec::with_capacity(passes.max(1));
        out.push(tree.terms());
        while out.len() < passes && tree.advance_phase(min_weight) {
            out.push(tree.terms());
        }
        ExtractedTerms { passes: out }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use percolate_core::{BooleanClause, CustomClause, Hit, InputDocument, TermKind};

    fn texts(terms: &[QueryTerm]) -> Vec<String> {
        terms.iter().map(QueryTerm::text).collect()
    }

    #[test]
    fn test_and_picks_one_clause() {
        let node = QueryNode::all(vec![QueryNode::term("text", "fox"), QueryNode::term("text", "quick")]);
        let terms = QueryAnalyzer::new().extract(&node, 1, 0.0);
        assert_eq!(texts(terms.terms(0)), vec!["quick"]);
    }

    #[test]
    fn test_or_collects_every_clause() {
        let node = QueryNode::any(vec![QueryNode::term("text", "fox"), QueryNode::term("text", "quick")]);
        let terms = QueryAnalyzer::new().extract(&node, 1, 0.0);
        assert_eq!(texts(terms.terms(0)), vec!["fox", "quick"]);
    }

    #[test]
    fn test_must_not_contributes_nothing() {
        let node = QueryNode::boolean(vec![
            BooleanClause::new(Occur::Must, QueryNode::term("text", "fox")),
            BooleanClause::new(Occur::MustNot, QueryNode::term("text", "quick")),
        ]);
        let terms = QueryAnalyzer::new().extract(&node, 1, 0.0);
        assert_eq!(texts(terms.terms(0)), vec!["fox"]);
    }

    #[test]
    fn test_pure_negation_is_any_field() {
        let node = QueryNode::boolean(vec![BooleanClause::new(Occur::MustNot, QueryNode::term("text", "fox"))]);
        let terms = QueryAnalyzer::new().extract(&node, 1, 0.0);
        assert_eq!(terms.terms(0).len(), 1);
        assert!(terms.terms(0)[0].is_any());
        assert_eq!(terms.terms(0)[0].field, ANY_FIELD);
    }

    #[test]
    fn test_match_all_is_any_field() {
        let terms = QueryAnalyzer::new().extract(&QueryNode::MatchAll, 1, 0.0);
        assert!(terms.has_any());
        assert_eq!(terms.terms(0)[0].field, ANY_FIELD);
    }

    #[test]
    fn test_wildcard_defaults_to_field_any() {
        let terms = QueryAnalyzer::new().extract(&QueryNode::wildcard("title", "fo*"), 1, 0.0);
        assert_eq!(terms.terms(0)[0].field, "title");
        assert_eq!(terms.terms(0)[0].kind, TermKind::Any);
    }

    #[derive(Debug)]
    struct Geo;

    impl CustomClause for Geo {
        fn kind(&self) -> &str {
            "geo"
        }
        fn field(&self) -> Option<&str> {
            Some("location")
        }
        fn evaluate(&self, _doc: &InputDocument) -> Option<Vec<Hit>> {
            Some(vec![])
        }
    }

    #[test]
    fn test_unregistered_custom_falls_back_to_any() {
        let node = QueryNode::Custom(Arc::new(Geo));
        let terms = QueryAnalyzer::new().extract(&node, 1, 0.0);
        assert!(terms.has_any());
        assert_eq!(terms.terms(0)[0].field, "location");
    }

    struct Failing;

    impl ClauseExtractor for Failing {
        fn extract(&self, _node: &QueryNode, _builder: &TreeBuilder<'_>) -> Result<QueryTree> {
            Err(Error::Extraction("boom".into()))
        }
    }

    #[test]
    fn test_failing_extractor_falls_back_to_any() {
        let mut analyzer = QueryAnalyzer::new();
        analyzer.register(ClauseKind::Term, Arc::new(Failing));
        let terms = analyzer.extract(&QueryNode::term("text", "fox"), 1, 0.0);
        assert!(terms.has_any());
        assert_eq!(terms.terms(0)[0].field, "text");
    }

    #[test]
    fn test_multipass_walks_conjunction() {
        let node = QueryNode::all(vec![
            QueryNode::term("text", "a"),
            QueryNode::term("text", "bbbb"),
            QueryNode::term("text", "cccccccc"),
        ]);
        let terms = QueryAnalyzer::new().extract(&node, 3, 0.0);
        assert_eq!(terms.pass_count(), 3);
        assert_eq!(texts(terms.terms(0)), vec!["cccccccc"]);
        assert_eq!(texts(terms.terms(1)), vec!["bbbb"]);
        assert_eq!(texts(terms.terms(2)), vec!["a"]);
    }

    #[test]
    fn test_multipass_stops_when_tree_cannot_advance() {
        let terms = QueryAnalyzer::new().extract(&QueryNode::term("text", "fox"), 4, 0.0);
        assert_eq!(terms.pass_count(), 1);
    }

    #[test]
    fn test_phrase_selects_single_token() {
        let node = QueryNode::phrase("text", vec!["brown".into(), "fox".into()]);
        let terms = QueryAnalyzer::new().extract(&node, 1, 0.0);
        assert_eq!(texts(terms.terms(0)), vec!["brown"]);
    }
}
