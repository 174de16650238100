//! Weighted query tree used for term selection
//!
//! A [`QueryTree`] mirrors the boolean structure of a stored query but only
//! keeps what the presearcher needs: which terms a matching document must
//! contain. Invariants:
//!
//! - A conjunction contributes the terms of exactly one child (its currently
//!   selected one). Any one required clause is a sufficient filter.
//! - A disjunction contributes the terms of every child.
//! - Children of a conjunction are ordered best-first by a total order
//!   (weight, then smallest term key), so selection is deterministic.

use percolate_core::QueryTerm;
use std::cmp::Ordering;

/// Node of the weighted extraction tree
#[derive(Debug, Clone)]
pub enum QueryTree {
    /// A concrete (EXACT or CUSTOM) term
    Term(QueryTerm),
    /// A clause that cannot be narrowed beyond its field
    Any(QueryTerm),
    /// All children must match; one of them is selected for indexing
    Conjunction(Conjunction),
    /// Any child may match; all of them are indexed
    Disjunction(Vec<QueryTree>),
}

/// Conjunction state: children sorted best-first plus the selected index
#[derive(Debug, Clone)]
pub struct Conjunction {
    children: Vec<QueryTree>,
    selected: usize,
}

impl Conjunction {
    /// Children, best first
    pub fn children(&self) -> &[QueryTree] {
        &self.children
    }

    /// Index of the child currently contributing terms
    pub fn selected(&self) -> usize {
        self.selected
    }
}

impl QueryTree {
    /// Leaf for a concrete term
    pub fn term(term: QueryTerm) -> Self {
        if term.is_any() {
            QueryTree::Any(term)
        } else {
            QueryTree::Term(term)
        }
    }

    /// Leaf for an unnarrowable clause on `field`
    pub fn any(field: impl Into<String>) -> Self {
        QueryTree::Any(QueryTerm::any(field))
    }

    /// Leaf that makes the query a candidate for every document
    pub fn any_field() -> Self {
        QueryTree::Any(QueryTerm::any_field())
    }

    /// Conjunction of required children
    ///
    /// An empty conjunction constrains nothing and becomes a field-agnostic
    /// ANY; a single child is returned as is.
    pub fn conjunction(mut children: Vec<QueryTree>) -> Self {
        match children.len() {
            0 => QueryTree::any_field(),
            1 => children.remove(0),
            _ => {
                children.sort_by(|a, b| compare(b, a));
                QueryTree::Conjunction(Conjunction { children, selected: 0 })
            }
        }
    }

    /// Disjunction of alternatives
    ///
    /// An empty disjunction never matches, but it is indexed as a
    /// field-agnostic ANY so extraction never drops a query.
    pub fn disjunction(mut children: Vec<QueryTree>) -> Self {
        match children.len() {
            0 => QueryTree::any_field(),
            1 => children.remove(0),
            _ => QueryTree::Disjunction(children),
        }
    }

    /// Current selectivity weight
    ///
    /// A disjunction is only as selective as its weakest branch; a
    /// conjunction is as selective as the child it currently indexes.
    pub fn weight(&self) -> f32 {
        match self {
            QueryTree::Term(t) => t.weight,
            QueryTree::Any(_) => 0.0,
            QueryTree::Conjunction(c) => c.children[c.selected].weight(),
            QueryTree::Disjunction(children) => {
                children.iter().map(QueryTree::weight).fold(f32::INFINITY, f32::min)
            }
        }
    }

    /// Whether the current selection contains an ANY term
    pub fn has_any(&self) -> bool {
        match self {
            QueryTree::Term(_) => false,
            QueryTree::Any(_) => true,
            QueryTree::Conjunction(c) => c.children[c.selected].has_any(),
            QueryTree::Disjunction(children) => children.iter().any(QueryTree::has_any),
        }
    }

    /// Append the currently selected terms to `out`
    pub fn collect_terms(&self, out: &mut Vec<QueryTerm>) {
        match self {
            QueryTree::Term(t) | QueryTree::Any(t) => out.push(t.clone()),
            QueryTree::Conjunction(c) => c.children[c.selected].collect_terms(out),
            QueryTree::Disjunction(children) => {
                for child in children {
                    child.collect_terms(out);
                }
            }
        }
    }

    /// Currently selected terms, deduplicated and sorted by key
    pub fn terms(&self) -> Vec<QueryTerm> {
        let mut out = Vec::new();
        self.collect_terms(&mut out);
        out.sort_by(|a, b| a.key_cmp(b));
        out.dedup_by(|a, b| a.key_cmp(b) == Ordering::Equal);
        out
    }

    /// Move to the next pass's selection
    ///
    /// The deepest advanceable conjunction along the selected path switches
    /// to its next-best child, provided that child's weight exceeds
    /// `min_weight`. Returns false when nothing could advance.
    pub fn advance_phase(&mut self, min_weight: f32) -> bool {
        match self {
            QueryTree::Term(_) | QueryTree::Any(_) => false,
            QueryTree::Disjunction(children) => {
                let mut advanced = false;
                for child in children.iter_mut() {
                    advanced |= child.advance_phase(min_weight);
                }
                advanced
            }
            QueryTree::Conjunction(c) => {
                if c.children[c.selected].advance_phase(min_weight) {
                    return true;
                }
                let next = c.selected + 1;
                if next < c.children.len() && c.children[next].weight() > min_weight {
                    c.selected = next;
                    return true;
                }
                false
            }
        }
    }

    /// Smallest term key reachable through the current selection
    fn min_term(&self) -> Option<&QueryTerm> {
        match self {
            QueryTree::Term(t) | QueryTree::Any(t) => Some(t),
            QueryTree::Conjunction(c) => c.children[c.selected].min_term(),
            QueryTree::Disjunction(children) => children
                .iter()
                .filter_map(QueryTree::min_term)
                .min_by(|a, b| a.key_cmp(b)),
        }
    }
}

/// Total selectivity order: `Greater` means `a` is the better filter
///
/// Ties on weight go to the tree whose smallest term key sorts first.
pub fn compare(a: &QueryTree, b: &QueryTree) -> Ordering {
    a.weight().total_cmp(&b.weight()).then_with(|| match (a.min_term(), b.min_term()) {
        (Some(x), Some(y)) => y.key_cmp(x),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    })
}
