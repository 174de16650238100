//! Term model
//!
//! A [`QueryTerm`] is the unit the presearcher indexes: a field, a byte
//! payload, a weight and a kind tag. Terms are produced only by the term
//! extractor and never mutated afterwards.

use std::cmp::Ordering;
use std::fmt;

/// Field name used for ANY terms that are not tied to a single field
///
/// Every document filter includes this field, so a query carrying a
/// field-agnostic ANY term is a candidate for every document.
pub const ANY_FIELD: &str = "__anytokenfield";

/// Sentinel token indexed for ANY terms
pub const ANY_TOKEN: &[u8] = b"__ANYTOKEN__";

/// Kind tag of an extracted term
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TermKind {
    /// A concrete token that must appear in the document field
    Exact,
    /// The clause cannot be narrowed; any document with the field is a candidate
    Any,
    /// Domain-specific marker, mapped to an index token by a presearcher component
    Custom(String),
}

impl TermKind {
    /// Short name for logging
    pub fn name(&self) -> &str {
        match self {
            TermKind::Exact => "exact",
            TermKind::Any => "any",
            TermKind::Custom(tag) => tag,
        }
    }
}

/// A single extracted index term
#[derive(Debug, Clone, PartialEq)]
pub struct QueryTerm {
    /// Field the term applies to
    pub field: String,
    /// Term payload (token bytes)
    pub value: Vec<u8>,
    /// Selectivity weight assigned by the weightor (higher = more selective)
    pub weight: f32,
    /// Kind tag
    pub kind: TermKind,
}

impl QueryTerm {
    /// Create an EXACT term with neutral weight
    pub fn exact(field: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        QueryTerm {
            field: field.into(),
            value: value.into(),
            weight: 1.0,
            kind: TermKind::Exact,
        }
    }

    /// Create an ANY term for a field
    pub fn any(field: impl Into<String>) -> Self {
        QueryTerm {
            field: field.into(),
            value: ANY_TOKEN.to_vec(),
            weight: 0.0,
            kind: TermKind::Any,
        }
    }

    /// Create an ANY term that applies to every document
    pub fn any_field() -> Self {
        Self::any(ANY_FIELD)
    }

    /// Create a CUSTOM term
    pub fn custom(field: impl Into<String>, value: impl Into<Vec<u8>>, tag: impl Into<String>) -> Self {
        QueryTerm {
            field: field.into(),
            value: value.into(),
            weight: 1.0,
            kind: TermKind::Custom(tag.into()),
        }
    }

    /// Builder: set weight
    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight;
        self
    }

    /// Whether this is an ANY term
    pub fn is_any(&self) -> bool {
        self.kind == TermKind::Any
    }

    /// Term payload as text (lossy)
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.value).into_owned()
    }

    /// Deterministic tie-break key: field name, then term bytes, then kind
    pub fn key_cmp(&self, other: &QueryTerm) -> Ordering {
        self.field
            .cmp(&other.field)
            .then_with(|| self.value.cmp(&other.value))
            .then_with(|| self.kind.cmp(&other.kind))
    }
}

impl fmt::Display for QueryTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ({}, {:.3})", self.field, self.text(), self.kind.name(), self.weight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_any_term_uses_sentinel() {
        let t = QueryTerm::any("title");
        assert!(t.is_any());
        assert_eq!(t.value, ANY_TOKEN);
        assert_eq!(t.weight, 0.0);
    }

    #[test]
    fn test_key_cmp_orders_by_field_then_bytes() {
        let a = QueryTerm::exact("body", "zebra");
        let b = QueryTerm::exact("title", "apple");
        let c = QueryTerm::exact("title", "banana");
        assert_eq!(a.key_cmp(&b), Ordering::Less);
        assert_eq!(b.key_cmp(&c), Ordering::Less);
        assert_eq!(c.key_cmp(&c.clone().with_weight(9.0)), Ordering::Equal);
    }

    #[test]
    fn test_display() {
        let t = QueryTerm::custom("text", "foo", "wildcard_ngram");
        assert_eq!(t.to_string(), "text:foo (wildcard_ngram, 1.000)");
    }
}
