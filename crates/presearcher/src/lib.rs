//! Presearcher for percolate reverse search
//!
//! This crate provides:
//! - Term extraction: [`QueryAnalyzer`], [`QueryTree`], [`ClauseExtractor`]
//! - Term weighting: [`TermWeightor`], [`CompositeWeightor`], [`CorpusStats`]
//! - The extension contract: [`PresearcherComponent`] and shipped components
//! - The query index: [`QueryIndex`], [`IndexSnapshot`], [`Segment`]
//! - Candidate selection: [`Presearcher`], [`CandidateSet`]

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod component;
pub mod components;
pub mod filter;
pub mod index;
pub mod presearcher;
pub mod segment;
pub mod termextractor;

pub use component::PresearcherComponent;
pub use components::{FieldFilterComponent, WildcardNgramComponent};
pub use filter::{DocumentIndex, FilterQuery, IndexToken, RecordClause};
pub use index::{IndexSnapshot, IndexUpdate, QueryIndex, DEFAULT_MAX_SEGMENTS};
pub use presearcher::{CandidateExplanation, CandidateSet, Presearcher, MAX_PASSES};
pub use segment::{QueryRecord, Segment};
pub use termextractor::{
    ClauseExtractor, CompositeWeightor, CorpusStats, ExtractedTerms, FieldWeightNorm, QueryAnalyzer, QueryTree,
    StatsSnapshot, TermFrequencyNorm, TermKindNorm, TermWeightor, TokenLengthNorm, TreeBuilder, WeightNorm,
    DEFAULT_STATS_CAPACITY,
};
