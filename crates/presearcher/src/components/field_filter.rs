//! Metadata field filter
//!
//! Restricts candidates to queries whose metadata value for a field equals
//! one of the document's tokens in that field. Only queries that carry the
//! metadata key are restricted: a query without it stays a candidate for
//! every document, and when a document lacks the field no restriction is
//! applied at all.
//!
//! Metadata values go through the same analyzer as document text, so
//! `lang=EN` on a query meets `lang: "EN"` on a document.

use crate::component::PresearcherComponent;
use crate::filter::{DocumentIndex, FilterQuery, RecordClause};
use crate::segment::QueryRecord;
use percolate_core::{Analyzer, Result, StandardAnalyzer};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Filters candidates on a metadata field
///
/// # Example
///
/// ```
/// use percolate_presearcher::{FieldFilterComponent, Presearcher};
/// use std::sync::Arc;
///
/// let presearcher = Presearcher::new().with_component(Arc::new(FieldFilterComponent::new("lang")));
/// assert_eq!(presearcher.components().len(), 1);
/// ```
#[derive(Clone)]
pub struct FieldFilterComponent {
    field: String,
    analyzer: Arc<dyn Analyzer>,
}

impl fmt::Debug for FieldFilterComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldFilterComponent")
            .field("field", &self.field)
            .finish_non_exhaustive()
    }
}

impl FieldFilterComponent {
    /// Filter on `field`: the metadata key and the document field share the name
    ///
    /// Metadata values are normalized with [`StandardAnalyzer::new`].
    pub fn new(field: impl Into<String>) -> Self {
        FieldFilterComponent {
            field: field.into(),
            analyzer: Arc::new(StandardAnalyzer::new()),
        }
    }

    /// Builder: the analyzer documents use for this field
    pub fn with_analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.analyzer = analyzer;
        self
    }

    /// Field filtered on
    pub fn field(&self) -> &str {
        &self.field
    }
}

impl PresearcherComponent for FieldFilterComponent {
    fn name(&self) -> &str {
        "field_filter"
    }

    fn adjust_filter_query(&self, doc: &DocumentIndex, query: FilterQuery) -> Result<FilterQuery> {
        let Some(values) = doc.terms(&self.field).filter(|v| !v.is_empty()) else {
            return Ok(query);
        };
        trace!(target: "percolate::presearch", field = %self.field, values = values.len(), "Restricting candidates");
        Ok(query.with_required(RecordClause {
            field: self.field.clone(),
            values: values.clone(),
        }))
    }

    fn adjust_query_record(&self, record: &mut QueryRecord, metadata: &BTreeMap<String, String>) {
        let Some(value) = metadata.get(&self.field) else {
            return;
        };
        // a value that analyzes to nothing leaves the query unrestricted
        for token in self.analyzer.analyze(value) {
            record.add_field(self.field.as_str(), token.text.into_bytes());
        }
    }
}
