//! Update reports and match options

use percolate_core::Error;
use std::time::{Duration, Instant};

/// One query an update could not index
#[derive(Debug)]
pub struct UpdateError {
    /// Id of the rejected query
    pub id: String,
    /// Why it was rejected (usually `Error::Parse`)
    pub error: Error,
}

/// Outcome of [`Monitor::update`](crate::Monitor::update)
///
/// Failures are per query: a query that fails to compile is reported here
/// and the rest of the batch is still committed.
#[derive(Debug, Default)]
pub struct UpdateReport {
    /// Ids now live in the corpus, in batch order (a duplicated id appears once)
    pub committed: Vec<String>,
    /// Ids that replaced an existing query
    pub replaced: usize,
    /// Rejected queries, in batch order
    pub errors: Vec<UpdateError>,
    /// Index version published by the update (0 when nothing was committed)
    pub version: u64,
}

impl UpdateReport {
    /// Committed query count
    pub fn committed_count(&self) -> usize {
        self.committed.len()
    }

    /// True if every query in the batch was committed
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Ids of the rejected queries
    pub fn failed_ids(&self) -> impl Iterator<Item = &str> {
        self.errors.iter().map(|e| e.id.as_str())
    }
}

/// Per-call options for [`Monitor::match_with_options`](crate::Monitor::match_with_options)
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchOptions {
    /// Give up once this instant has passed
    ///
    /// Checked before each document starts; a document already being
    /// matched runs to completion.
    pub deadline: Option<Instant>,
}

impl MatchOptions {
    /// No deadline
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: absolute deadline
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Builder: deadline relative to now
    ///
    /// A timeout too large to represent as an instant means no deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Instant::now().checked_add(timeout);
        self
    }

    pub(crate) fn expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}
