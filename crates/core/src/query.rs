//! Stored queries and the parsed query tree
//!
//! This module provides:
//! - [`MonitorQuery`]: the ingestion form `(id, query text, metadata)`
//! - [`QueryNode`]: the logical tree a parser produces
//! - [`ClauseKind`]: the tag the term extractor dispatches on
//! - [`CustomClause`]: extension point for domain-specific clause types
//! - [`StoredQuery`]: a compiled, live corpus entry

use crate::analyzer::Token;
use crate::document::InputDocument;
use crate::matches::Hit;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

// ============================================================================
// MonitorQuery
// ============================================================================

/// A query as submitted to the monitor
///
/// This is also the persisted form: the query log stores `MonitorQuery`
/// values and recompiles them on reopen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorQuery {
    /// Unique id within the corpus
    pub id: String,
    /// Query text, handed to the configured parser
    pub query: String,
    /// Free-form metadata (key order irrelevant)
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl MonitorQuery {
    /// Create a query with no metadata
    pub fn new(id: impl Into<String>, query: impl Into<String>) -> Self {
        MonitorQuery {
            id: id.into(),
            query: query.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Builder: add a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

// ============================================================================
// QueryNode
// ============================================================================

/// How a boolean clause participates in its parent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Occur {
    /// Required
    Must,
    /// Optional; a boolean with no required clauses needs at least one
    Should,
    /// Prohibited
    MustNot,
    /// Required, non-scoring
    Filter,
}

impl Occur {
    /// Whether the clause is required (`Must` or `Filter`)
    pub fn is_required(self) -> bool {
        matches!(self, Occur::Must | Occur::Filter)
    }
}

/// One clause of a boolean query
#[derive(Debug, Clone, PartialEq)]
pub struct BooleanClause {
    /// Participation
    pub occur: Occur,
    /// Sub-query
    pub node: QueryNode,
}

impl BooleanClause {
    /// Create a clause
    pub fn new(occur: Occur, node: QueryNode) -> Self {
        BooleanClause { occur, node }
    }
}

/// Dispatch tag for the term extractor's registry
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ClauseKind {
    /// Single term
    Term,
    /// Ordered token sequence
    Phrase,
    /// Boolean combination
    Boolean,
    /// Glob pattern (`*`, `?`)
    Wildcard,
    /// Lexicographic range
    Range,
    /// Edit-distance term
    Fuzzy,
    /// Matches every document
    MatchAll,
    /// Domain-specific clause identified by its kind string
    Custom(String),
}

/// A domain-specific clause
///
/// Custom clauses are opaque to the core. Extraction is dispatched on
/// `ClauseKind::Custom(kind)`; when nothing is registered for the kind the
/// extractor emits an ANY term for [`CustomClause::field`].
pub trait CustomClause: fmt::Debug + Send + Sync {
    /// Kind string used for extractor dispatch
    fn kind(&self) -> &str;

    /// Field the clause reads, if it reads exactly one
    fn field(&self) -> Option<&str> {
        None
    }

    /// Exact evaluation: `None` when the document does not match, otherwise
    /// the hits that satisfied the clause (possibly empty)
    fn evaluate(&self, doc: &InputDocument) -> Option<Vec<Hit>>;
}

/// Parsed logical tree of a stored query
#[derive(Debug, Clone)]
pub enum QueryNode {
    /// `field:text`
    Term {
        /// Field
        field: String,
        /// Normalized token
        text: String,
    },
    /// `field:"a b c"`: tokens at fixed relative positions
    Phrase {
        /// Field
        field: String,
        /// Normalized tokens in order
        terms: Vec<String>,
        /// Position of each term relative to the first; gaps are left by
        /// tokens the analyzer removed
        offsets: Vec<u32>,
    },
    /// Boolean combination of clauses
    Boolean {
        /// Clauses
        clauses: Vec<BooleanClause>,
    },
    /// `field:pat*tern?`
    Wildcard {
        /// Field
        field: String,
        /// Glob pattern
        pattern: String,
    },
    /// `field:[lower TO upper]`
    Range {
        /// Field
        field: String,
        /// Lower bound (`None` = open)
        lower: Option<String>,
        /// Upper bound (`None` = open)
        upper: Option<String>,
        /// Whether the lower bound is inclusive
        include_lower: bool,
        /// Whether the upper bound is inclusive
        include_upper: bool,
    },
    /// `field:text~N`
    Fuzzy {
        /// Field
        field: String,
        /// Normalized token
        text: String,
        /// Maximum Levenshtein distance
        max_edits: u32,
    },
    /// `*:*`
    MatchAll,
    /// Domain-specific clause
    Custom(Arc<dyn CustomClause>),
}

impl QueryNode {
    /// Term node
    pub fn term(field: impl Into<String>, text: impl Into<String>) -> Self {
        QueryNode::Term {
            field: field.into(),
            text: text.into(),
        }
    }

    /// Phrase node with terms at consecutive positions
    pub fn phrase(field: impl Into<String>, terms: Vec<String>) -> Self {
        let offsets = (0..terms.len() as u32).collect();
        QueryNode::Phrase {
            field: field.into(),
            terms,
            offsets,
        }
    }

    /// Phrase node keeping the analyzer's positions, relative to the first token
    pub fn phrase_from_tokens(field: impl Into<String>, tokens: Vec<Token>) -> Self {
        let base = tokens.first().map(|t| t.position).unwrap_or(0);
        let (terms, offsets) = tokens
            .into_iter()
            .map(|t| (t.text, t.position.saturating_sub(base)))
            .unzip();
        QueryNode::Phrase {
            field: field.into(),
            terms,
            offsets,
        }
    }

    /// Boolean node
    pub fn boolean(clauses: Vec<BooleanClause>) -> Self {
        QueryNode::Boolean { clauses }
    }

    /// Conjunction of nodes
    pub fn all(nodes: Vec<QueryNode>) -> Self {
        Self::boolean(nodes.into_iter().map(|n| BooleanClause::new(Occur::Must, n)).collect())
    }

    /// Disjunction of nodes
    pub fn any(nodes: Vec<QueryNode>) -> Self {
        Self::boolean(nodes.into_iter().map(|n| BooleanClause::new(Occur::Should, n)).collect())
    }

    /// Wildcard node
    pub fn wildcard(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        QueryNode::Wildcard {
            field: field.into(),
            pattern: pattern.into(),
        }
    }

    /// Extraction dispatch tag
    pub fn kind(&self) -> ClauseKind {
        match self {
            QueryNode::Term { .. } => ClauseKind::Term,
            QueryNode::Phrase { .. } => ClauseKind::Phrase,
            QueryNode::Boolean { .. } => ClauseKind::Boolean,
            QueryNode::Wildcard { .. } => ClauseKind::Wildcard,
            QueryNode::Range { .. } => ClauseKind::Range,
            QueryNode::Fuzzy { .. } => ClauseKind::Fuzzy,
            QueryNode::MatchAll => ClauseKind::MatchAll,
            QueryNode::Custom(c) => ClauseKind::Custom(c.kind().to_string()),
        }
    }

    /// The single field this node reads, if any
    pub fn field(&self) -> Option<&str> {
        match self {
            QueryNode::Term { field, .. }
            | QueryNode::Phrase { field, .. }
            | QueryNode::Wildcard { field, .. }
            | QueryNode::Range { field, .. }
            | QueryNode::Fuzzy { field, .. } => Some(field),
            QueryNode::Boolean { .. } | QueryNode::MatchAll => None,
            QueryNode::Custom(c) => c.field(),
        }
    }
}

impl PartialEq for QueryNode {
    fn eq(&self, other: &Self) -> bool {
        use QueryNode::*;
        match (self, other) {
            (Term { field: f1, text: t1 }, Term { field: f2, text: t2 }) => f1 == f2 && t1 == t2,
            (
                Phrase { field: f1, terms: t1, offsets: o1 },
                Phrase { field: f2, terms: t2, offsets: o2 },
            ) => f1 == f2 && t1 == t2 && o1 == o2,
            (Boolean { clauses: c1 }, Boolean { clauses: c2 }) => c1 == c2,
            (Wildcard { field: f1, pattern: p1 }, Wildcard { field: f2, pattern: p2 }) => {
                f1 == f2 && p1 == p2
            }
            (
                Range { field: f1, lower: l1, upper: u1, include_lower: il1, include_upper: iu1 },
                Range { field: f2, lower: l2, upper: u2, include_lower: il2, include_upper: iu2 },
            ) => f1 == f2 && l1 == l2 && u1 == u2 && il1 == il2 && iu1 == iu2,
            (
                Fuzzy { field: f1, text: t1, max_edits: m1 },
                Fuzzy { field: f2, text: t2, max_edits: m2 },
            ) => f1 == f2 && t1 == t2 && m1 == m2,
            (MatchAll, MatchAll) => true,
            (Custom(a), Custom(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

// ============================================================================
// StoredQuery
// ============================================================================

/// A compiled corpus entry
///
/// Immutable once built. An update with the same id replaces the whole
/// entry; nothing is ever patched in place.
#[derive(Debug, Clone)]
pub struct StoredQuery {
    query: MonitorQuery,
    node: QueryNode,
}

impl StoredQuery {
    /// Pair a submitted query with its parsed tree
    pub fn new(query: MonitorQuery, node: QueryNode) -> Self {
        StoredQuery { query, node }
    }

    /// Query id
    pub fn id(&self) -> &str {
        &self.query.id
    }

    /// Original query text
    pub fn text(&self) -> &str {
        &self.query.query
    }

    /// Metadata map
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.query.metadata
    }

    /// Parsed tree
    pub fn node(&self) -> &QueryNode {
        &self.node
    }

    /// The submitted form (for persistence)
    pub fn monitor_query(&self) -> &MonitorQuery {
        &self.query
    }
}
