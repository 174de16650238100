//! Prefix indexing for wildcard clauses
//!
//! Without this component a wildcard clause is indexed as ANY on its field,
//! making the query a candidate for every document carrying that field.
//! With it, the literal prefix of the pattern (the text before the first
//! `*` or `?`) becomes a CUSTOM term, and every document token is expanded
//! with its own prefixes. A token matching `foo*bar` starts with `foo`, so
//! the token's prefix expansion always contains the indexed key.
//!
//! Prefix keys are truncated to `max_prefix_len` characters on both sides,
//! which keeps the expansion bounded without losing soundness.

use crate::component::PresearcherComponent;
use crate::termextractor::{ClauseExtractor, QueryTree, TreeBuilder};
use percolate_core::{ClauseKind, Error, QueryNode, QueryTerm, Result, TermKind, Token, TokenStream};
use std::sync::Arc;

/// Kind tag of the CUSTOM terms this component emits
pub const WILDCARD_NGRAM_TAG: &str = "wildcard_ngram";

/// Appended to prefix keys so they never collide with real tokens
pub const PREFIX_MARKER: &str = "\u{0}wc";

/// Default longest prefix indexed, in characters
pub const DEFAULT_MAX_PREFIX_LEN: usize = 12;

/// Indexes wildcard clauses by their literal prefix
#[derive(Debug, Clone)]
pub struct WildcardNgramComponent {
    max_prefix_len: usize,
}

impl Default for WildcardNgramComponent {
    fn default() -> Self {
        Self::new()
    }
}

impl WildcardNgramComponent {
    /// Component with the default prefix bound
    pub fn new() -> Self {
        WildcardNgramComponent {
            max_prefix_len: DEFAULT_MAX_PREFIX_LEN,
        }
    }

    /// Builder: longest prefix indexed, in characters (at least 1)
    pub fn with_max_prefix_len(mut self, len: usize) -> Self {
        self.max_prefix_len = len.max(1);
        self
    }

    fn key(prefix: &str) -> Vec<u8> {
        let mut key = prefix.as_bytes().to_vec();
        key.extend_from_slice(PREFIX_MARKER.as_bytes());
        key
    }
}

/// Literal text before the first glob metacharacter, truncated to `max` chars
fn literal_prefix(pattern: &str, max: usize) -> &str {
    let end = pattern.find(|c: char| c == '*' || c == '?').unwrap_or(pattern.len());
    let prefix = &pattern[..end];
    match prefix.char_indices().nth(max) {
        Some((cut, _)) => &prefix[..cut],
        None => prefix,
    }
}

struct PrefixExtractor {
    max_prefix_len: usize,
}

impl ClauseExtractor for PrefixExtractor {
    fn extract(&self, node: &QueryNode, builder: &TreeBuilder<'_>) -> Result<QueryTree> {
        let QueryNode::Wildcard { field, pattern } = node else {
            return Err(Error::Extraction(format!("prefix extractor cannot handle {:?} clause", node.kind())));
        };
        let prefix = literal_prefix(pattern, self.max_prefix_len);
        if prefix.is_empty() {
            return Ok(QueryTree::any(field.as_str()));
        }
        Ok(builder.term(QueryTerm::custom(field.as_str(), prefix.as_bytes(), WILDCARD_NGRAM_TAG)))
    }
}

impl PresearcherComponent for WildcardNgramComponent {
    fn name(&self) -> &str {
        WILDCARD_NGRAM_TAG
    }

    fn clause_extractors(&self) -> Vec<(ClauseKind, Arc<dyn ClauseExtractor>)> {
        vec![(
            ClauseKind::Wildcard,
            Arc::new(PrefixExtractor {
                max_prefix_len: self.max_prefix_len,
            }),
        )]
    }

    fn filter_document_tokens<'a>(&self, _field: &str, tokens: TokenStream<'a>) -> TokenStream<'a> {
        let max = self.max_prefix_len;
        Box::new(tokens.flat_map(move |token| {
            let mut out = Vec::with_capacity(max + 1);
            for (i, (at, ch)) in token.text.char_indices().enumerate() {
                if i >= max {
                    break;
                }
                let prefix = &token.text[..at + ch.len_utf8()];
                out.push(Token::new(format!("{prefix}{PREFIX_MARKER}"), token.position));
            }
            out.insert(0, token);
            out
        }))
    }

    fn extra_token(&self, term: &QueryTerm) -> Option<Vec<u8>> {
        match &term.kind {
            TermKind::Custom(tag) if tag == WILDCARD_NGRAM_TAG => {
                Some(Self::key(&String::from_utf8_lossy(&term.value)))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_prefix() {
        assert_eq!(literal_prefix("foo*", 12), "foo");
        assert_eq!(literal_prefix("fo?bar*", 12), "fo");
        assert_eq!(literal_prefix("*bar", 12), "");
        assert_eq!(literal_prefix("exact", 12), "exact");
        assert_eq!(literal_prefix("internationalization*", 4), "inte");
        assert_eq!(literal_prefix("über*", 2), "üb");
    }

    #[test]
    fn test_document_tokens_expand_to_prefixes() {
        let component = WildcardNgramComponent::new().with_max_prefix_len(3);
        let tokens: TokenStream<'_> = Box::new(vec![Token::new("fox", 0), Token::new("quick", 1)].into_iter());
        let out: Vec<String> = component.filter_document_tokens("text", tokens).map(|t| t.text).collect();
        assert_eq!(
            out,
            vec![
                "fox".to_string(),
                format!("f{PREFIX_MARKER}"),
                format!("fo{PREFIX_MARKER}"),
                format!("fox{PREFIX_MARKER}"),
                "quick".to_string(),
                format!("q{PREFIX_MARKER}"),
                format!("qu{PREFIX_MARKER}"),
                format!("qui{PREFIX_MARKER}"),
            ]
        );
    }

    #[test]
    fn test_extra_token_only_for_own_tag() {
        let component = WildcardNgramComponent::new();
        let own = QueryTerm::custom("text", "qui", WILDCARD_NGRAM_TAG);
        assert_eq!(component.extra_token(&own), Some(format!("qui{PREFIX_MARKER}").into_bytes()));
        assert_eq!(component.extra_token(&QueryTerm::custom("text", "x", "geo")), None);
        assert_eq!(component.extra_token(&QueryTerm::exact("text", "x")), None);
    }
}
