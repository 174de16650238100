//! Percolate - reverse search over large corpora of stored queries
//!
//! A conventional search engine indexes documents and runs one query against
//! them. Percolate inverts that: it indexes *queries* and runs each incoming
//! document against all of them. Running every query against every document
//! is too slow, so a presearcher first narrows the corpus to a candidate set
//! using terms extracted from each query, and only candidates are evaluated
//! by the exact matcher.
//!
//! # Quick Start
//!
//! ```
//! use percolate::{
//!     DocumentBatch, InputDocument, Monitor, MonitorQuery, Presearcher, SimpleMatcher, StandardAnalyzer,
//!     StandardQueryParser,
//! };
//! use std::sync::Arc;
//!
//! let analyzer = Arc::new(StandardAnalyzer::new());
//! let parser = Arc::new(StandardQueryParser::new("text", analyzer.clone()));
//! let monitor = Monitor::new(parser, Presearcher::new());
//!
//! monitor.update(vec![
//!     MonitorQuery::new("q1", "fox AND quick"),
//!     MonitorQuery::new("q2", "fox AND NOT quick"),
//! ])?;
//!
//! let doc = InputDocument::builder("d1")
//!     .add_field("text", "the quick brown fox", analyzer.as_ref())
//!     .build();
//! let matches = monitor.match_batch(&DocumentBatch::single(doc), &SimpleMatcher)?;
//!
//! assert!(matches.get("d1", "q1").is_some());
//! assert!(matches.get("d1", "q2").is_none());
//! assert_eq!(matches.queries_run(), 2);
//! # Ok::<(), percolate::Error>(())
//! ```
//!
//! # Architecture
//!
//! - `percolate-core`: terms, query trees, documents, analyzer, parser,
//!   match results and errors
//! - `percolate-presearcher`: term extraction and weighting, presearcher
//!   components, the segmented query index and candidate selection
//! - `percolate-monitor`: the monitor, exact matchers, configuration and
//!   the query log

pub use percolate_core::*;
pub use percolate_monitor::*;
pub use percolate_presearcher::*;
