//! Presearcher extension contract
//!
//! A [`PresearcherComponent`] hooks into both sides of the presearcher:
//!
//! - query side: [`clause_extractors`](PresearcherComponent::clause_extractors),
//!   [`extra_token`](PresearcherComponent::extra_token) and
//!   [`adjust_query_record`](PresearcherComponent::adjust_query_record)
//! - document side: [`filter_document_tokens`](PresearcherComponent::filter_document_tokens)
//!   and [`adjust_filter_query`](PresearcherComponent::adjust_filter_query)
//!
//! A component must keep the two sides symmetric: whatever token it makes a
//! query record depend on, it must make a truly matching document produce.
//! Otherwise the presearcher drops true matches.

use crate::filter::{DocumentIndex, FilterQuery};
use crate::segment::QueryRecord;
use crate::termextractor::ClauseExtractor;
use percolate_core::{ClauseKind, QueryTerm, Result, TokenStream};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A pluggable presearcher extension
///
/// Every hook has a pass-through default.
pub trait PresearcherComponent: Send + Sync {
    /// Name for logging
    fn name(&self) -> &str;

    /// Extractors this component contributes, registered over the defaults
    fn clause_extractors(&self) -> Vec<(ClauseKind, Arc<dyn ClauseExtractor>)> {
        Vec::new()
    }

    /// Rewrite a document field's token stream before it is indexed
    fn filter_document_tokens<'a>(&self, _field: &str, tokens: TokenStream<'a>) -> TokenStream<'a> {
        tokens
    }

    /// Index token for a CUSTOM term this component understands
    fn extra_token(&self, _term: &QueryTerm) -> Option<Vec<u8>> {
        None
    }

    /// Add constraints to the candidate query for a document
    fn adjust_filter_query(&self, _doc: &DocumentIndex, query: FilterQuery) -> Result<FilterQuery> {
        Ok(query)
    }

    /// Add record fields derived from query metadata
    fn adjust_query_record(&self, _record: &mut QueryRecord, _metadata: &BTreeMap<String, String>) {}
}
