//! Segmented query index with snapshot reads
//!
//! This module provides:
//! - [`IndexSnapshot`]: an immutable view of the whole index
//! - [`QueryIndex`]: the single-writer index that publishes snapshots
//! - [`IndexUpdate`]: one atomic batch of upserts and deletes
//!
//! # Segmented Architecture
//!
//! - Each applied update with upserts seals one new [`Segment`]
//! - Replaced and deleted records are tombstoned in their old segment
//! - Fully tombstoned segments are dropped
//! - When the segment count exceeds `max_segments`, live records are merged
//!   into a single segment
//!
//! # Thread Safety
//!
//! Readers clone the current `Arc<IndexSnapshot>` under a short read lock
//! and then search without any lock. Writers are serialized by a mutex and
//! publish a complete new snapshot, so a reader sees either all or none of
//! an update.

use crate::filter::{FilterQuery, IndexToken};
use crate::segment::{QueryRecord, Segment};
use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use tracing::{debug, trace};

/// Default number of segments tolerated before a merge
pub const DEFAULT_MAX_SEGMENTS: usize = 8;

// ============================================================================
// IndexSnapshot
// ============================================================================

#[derive(Debug, Clone)]
struct SegmentView {
    segment: Arc<Segment>,
    tombstones: Arc<FxHashSet<u32>>,
}

impl SegmentView {
    fn live(&self) -> usize {
        self.segment.len() - self.tombstones.len()
    }
}

/// An immutable point-in-time view of the query index
#[derive(Debug, Clone, Default)]
pub struct IndexSnapshot {
    version: u64,
    segments: Vec<SegmentView>,
    locations: FxHashMap<String, (u64, u32)>,
}

impl IndexSnapshot {
    /// Monotonic version; bumped by every applied update
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Number of live records
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    /// Whether the index holds no live records
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Number of segments
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Whether a live record exists for `id`
    pub fn contains(&self, id: &str) -> bool {
        self.locations.contains_key(id)
    }

    /// Live record for `id`
    pub fn get(&self, id: &str) -> Option<&Arc<QueryRecord>> {
        let (segment_id, local) = self.locations.get(id)?;
        self.segments
            .iter()
            .find(|v| v.segment.segment_id() == *segment_id)
            .and_then(|v| v.segment.record(*local))
    }

    /// Live records in segment order
    pub fn records(&self) -> impl Iterator<Item = &Arc<QueryRecord>> {
        self.segments.iter().flat_map(|view| {
            view.segment
                .records()
                .iter()
                .enumerate()
                .filter(move |(local, _)| !view.tombstones.contains(&(*local as u32)))
                .map(|(_, record)| record)
        })
    }

    /// Live record ids, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.locations.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Records selected by a filter, sorted by id
    ///
    /// A record is selected when every one of its passes is hit by some
    /// filter token and it satisfies the filter's required clauses.
    pub fn search(&self, filter: &FilterQuery) -> Vec<Arc<QueryRecord>> {
        let mut out = Vec::new();
        for view in &self.segments {
            let mut hits: FxHashMap<u32, u64> = FxHashMap::default();
            for token in filter.tokens() {
                if token.pass >= 64 {
                    continue;
                }
                for &local in view.segment.postings(token) {
                    if view.tombstones.contains(&local) {
                        continue;
                    }
                    *hits.entry(local).or_insert(0) |= 1u64 << token.pass;
                }
            }
            for (local, mask) in hits {
                let Some(record) = view.segment.record(local) else {
                    continue;
                };
                let need = record.pass_mask();
                if mask & need == need && filter.accepts(record.fields()) {
                    out.push(Arc::clone(record));
                }
            }
        }
        out.sort_by(|a, b| a.id().cmp(b.id()));
        out
    }

    /// Posting keys a record was indexed under that the filter hit
    pub fn matched_tokens(&self, record: &QueryRecord, filter: &FilterQuery) -> Vec<IndexToken> {
        record
            .tokens()
            .iter()
            .filter(|t| filter.tokens().contains(*t))
            .cloned()
            .collect()
    }
}

// ============================================================================
// IndexUpdate
// ============================================================================

/// One atomic batch of index changes
///
/// Deletes are applied before upserts. Among upserts sharing an id, the
/// last one wins.
#[derive(Debug, Default)]
pub struct IndexUpdate {
    upserts: Vec<QueryRecord>,
    deletes: Vec<String>,
}

impl IndexUpdate {
    /// Empty update
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: insert or replace a record
    pub fn upsert(mut self, record: QueryRecord) -> Self {
        self.upserts.push(record);
        self
    }

    /// Builder: delete a record by id
    pub fn delete(mut self, id: impl Into<String>) -> Self {
        self.deletes.push(id.into());
        self
    }

    /// Whether the update changes nothing
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deletes.is_empty()
    }
}

impl FromIterator<QueryRecord> for IndexUpdate {
    fn from_iter<I: IntoIterator<Item = QueryRecord>>(iter: I) -> Self {
        IndexUpdate {
            upserts: iter.into_iter().collect(),
            deletes: Vec::new(),
        }
    }
}

// ============================================================================
// QueryIndex
// ============================================================================

/// The presearcher's index of query records
#[derive(Debug)]
pub struct QueryIndex {
    current: RwLock<Arc<IndexSnapshot>>,
    writer: Mutex<u64>,
    max_segments: usize,
}

impl Default for QueryIndex {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SEGMENTS)
    }
}

impl QueryIndex {
    /// Empty index that merges once it holds more than `max_segments`
    pub fn new(max_segments: usize) -> Self {
        QueryIndex {
            current: RwLock::new(Arc::new(IndexSnapshot::default())),
            writer: Mutex::new(0),
            max_segments: max_segments.max(1),
        }
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        Arc::clone(&self.current.read())
    }

    /// Live record count
    pub fn len(&self) -> usize {
        self.current.read().len()
    }

    /// Whether the index is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply an update atomically; returns the new version
    pub fn apply(&self, update: IndexUpdate) -> u64 {
        let mut next_segment_id = self.writer.lock();
        let base = self.snapshot();
        if update.is_empty() {
            return base.version;
        }

        let mut segments = base.segments.clone();
        let mut locations = base.locations.clone();

        let mut upserts: Vec<Arc<QueryRecord>> = Vec::with_capacity(update.upserts.len());
        let mut slot: FxHashMap<String, usize> = FxHashMap::default();
        for record in update.upserts {
            let id = record.id().to_string();
            match slot.get(&id) {
                Some(&i) => upserts[i] = Arc::new(record),
                None => {
                    slot.insert(id, upserts.len());
                    upserts.push(Arc::new(record));
                }
            }
        }

        let replaced = upserts.iter().map(|r| r.id());
        for id in update.deletes.iter().map(String::as_str).chain(replaced) {
            if let Some((segment_id, local)) = locations.remove(id) {
                if let Some(view) = segments.iter_mut().find(|v| v.segment.segment_id() == segment_id) {
                    Arc::make_mut(&mut view.tombstones).insert(local);
                }
            }
        }

        if !upserts.is_empty() {
            let segment_id = *next_segment_id;
            *next_segment_id += 1;
            for (local, record) in upserts.iter().enumerate() {
                locations.insert(record.id().to_string(), (segment_id, local as u32));
            }
            segments.push(SegmentView {
                segment: Arc::new(Segment::build(segment_id, upserts)),
                tombstones: Arc::new(FxHashSet::default()),
            });
        }

        segments.retain(|v| v.live() > 0);

        if segments.len() > self.max_segments {
            let segment_id = *next_segment_id;
            *next_segment_id += 1;
            let merged = merge(segment_id, &segments);
            debug!(
                target: "percolate::index",
                from = segments.len(),
                records = merged.len(),
                segment_id,
                "Merged segments"
            );
            locations.clear();
            for (local, record) in merged.records().iter().enumerate() {
                locations.insert(record.id().to_string(), (segment_id, local as u32));
            }
            segments = vec![SegmentView {
                segment: Arc::new(merged),
                tombstones: Arc::new(FxHashSet::default()),
            }];
        }

        let snapshot = IndexSnapshot {
            version: base.version + 1,
            segments,
            locations,
        };
        let version = snapshot.version;
        trace!(
            target: "percolate::index",
            version,
            live = snapshot.len(),
            segments = snapshot.segment_count(),
            "Published index snapshot"
        );
        *self.current.write() = Arc::new(snapshot);
        version
    }

    /// Remove every record
    pub fn clear(&self) -> u64 {
        let _writer = self.writer.lock();
        let version = self.current.read().version + 1;
        *self.current.write() = Arc::new(IndexSnapshot {
            version,
            ..IndexSnapshot::default()
        });
        version
    }
}

fn merge(segment_id: u64, segments: &[SegmentView]) -> Segment {
    let live = segments.iter().flat_map(|view| {
        view.segment
            .records()
            .iter()
            .enumerate()
            .filter(|(local, _)| !view.tombstones.contains(&(*local as u32)))
            .map(|(_, record)| Arc::clone(record))
    });
    Segment::build(segment_id, live.collect())
}
