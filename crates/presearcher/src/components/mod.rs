//! Shipped presearcher components

mod field_filter;
mod wildcard_ngram;

pub use field_filter::FieldFilterComponent;
pub use wildcard_ngram::{WildcardNgramComponent, DEFAULT_MAX_PREFIX_LEN, PREFIX_MARKER, WILDCARD_NGRAM_TAG};
