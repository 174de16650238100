//! Query monitor for percolate reverse search
//!
//! This crate provides:
//! - [`Monitor`]: the live stored-query corpus and batch matching
//! - Exact matchers: [`SimpleMatcher`], [`HighlightingMatcher`], [`evaluate`]
//! - Configuration: [`MonitorConfig`] loaded from `percolate.toml`
//! - Persistence: [`QueryLog`], the append-only query log replayed on open

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod log;
pub mod matchers;
pub mod monitor;
pub mod update;

pub use config::{MonitorConfig, PresearcherSettings, CONFIG_FILE_NAME};
pub use log::{LogEntry, QueryLog, LOG_FILE_NAME};
pub use matchers::{evaluate, HighlightingMatcher, HighlightsMatch, SimpleMatch, SimpleMatcher, MAX_FUZZY_EDITS};
pub use monitor::Monitor;
pub use update::{MatchOptions, UpdateError, UpdateReport};
