//! Core types for percolate reverse search
//!
//! This crate provides:
//! - Term model: [`QueryTerm`], [`TermKind`]
//! - Query model: [`MonitorQuery`], [`QueryNode`], [`StoredQuery`]
//! - Documents: [`InputDocument`], [`DocumentBatch`]
//! - Analysis and parsing collaborators: [`Analyzer`], [`QueryParser`]
//! - Match result model and matcher contract: [`Matches`], [`MatcherFactory`]
//! - Error types: [`Error`], [`Result`]

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod analyzer;
pub mod document;
pub mod error;
pub mod matches;
pub mod parser;
pub mod query;
pub mod term;

pub use analyzer::{Analyzer, StandardAnalyzer, Token, TokenStream};
pub use document::{DocumentBatch, InputDocument, InputDocumentBuilder};
pub use error::{Error, ParseError, Result};
pub use matches::{
    CandidateMatcher, DocumentMatches, Hit, MatchError, MatcherFactory, Matches, QueryMatch,
};
pub use parser::{QueryParser, StandardQueryParser};
pub use query::{BooleanClause, ClauseKind, CustomClause, MonitorQuery, Occur, QueryNode, StoredQuery};
pub use term::{QueryTerm, TermKind, ANY_FIELD, ANY_TOKEN};
