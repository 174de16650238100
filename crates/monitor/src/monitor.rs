//! The monitor: a live corpus of stored queries matched against documents
//!
//! # Lifecycle
//!
//! A monitor starts empty (or with the corpus replayed from its query log),
//! is populated through [`Monitor::update`] and [`Monitor::delete`], and is
//! matched against with [`Monitor::match_batch`]. [`Monitor::close`] is
//! terminal: every later call returns `Error::Closed`.
//!
//! # Thread Safety
//!
//! `Monitor` is `Send + Sync` and meant to be shared behind an `Arc`.
//! Matches run concurrently with each other and with updates. A match pins
//! the index snapshot current when it starts, so an update published
//! mid-batch is never half-visible. Updates are serialized by the writer
//! lock, which also orders them in the query log.

use crate::config::MonitorConfig;
use crate::log::{LogEntry, QueryLog};
use crate::update::{MatchOptions, UpdateError, UpdateReport};
use parking_lot::Mutex;
use percolate_core::{
    CandidateMatcher, DocumentBatch, DocumentMatches, Error, InputDocument, MatchError, MatcherFactory, Matches,
    MonitorQuery, QueryMatch, QueryParser, Result, StoredQuery,
};
use percolate_presearcher::{
    CandidateExplanation, CandidateSet, CorpusStats, IndexSnapshot, IndexUpdate, Presearcher, QueryIndex, QueryRecord,
};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Presearcher-filtered reverse search over a corpus of stored queries
///
/// # Example
///
/// ```
/// use percolate_core::{DocumentBatch, InputDocument, MonitorQuery, StandardAnalyzer, StandardQueryParser};
/// use percolate_monitor::{Monitor, SimpleMatcher};
/// use percolate_presearcher::Presearcher;
/// use std::sync::Arc;
///
/// let analyzer = Arc::new(StandardAnalyzer::new());
/// let parser = Arc::new(StandardQueryParser::new("text", analyzer.clone()));
/// let monitor = Monitor::new(parser, Presearcher::new());
///
/// monitor.update(vec![MonitorQuery::new("q1", "fox AND quick")]).unwrap();
///
/// let doc = InputDocument::builder("d1")
///     .add_field("text", "the quick brown fox", analyzer.as_ref())
///     .build();
/// let matches = monitor.match_batch(&DocumentBatch::single(doc), &SimpleMatcher).unwrap();
/// assert!(matches.get("d1", "q1").is_some());
/// ```
pub struct Monitor {
    parser: Arc<dyn QueryParser>,
    presearcher: Presearcher,
    index: QueryIndex,
    /// Query log, `None` for in-memory monitors and after close
    ///
    /// The lock is held across log append and index publish, so it also
    /// serializes writers.
    writer: Mutex<Option<QueryLog>>,
    /// False once `close()` has run
    open: AtomicBool,
    stats: Option<Arc<CorpusStats>>,
    /// Dedicated match pool when `match_threads` is configured
    pool: Option<rayon::ThreadPool>,
    config: MonitorConfig,
}

impl fmt::Debug for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Monitor")
            .field("presearcher", &self.presearcher)
            .field("queries", &self.index.len())
            .field("open", &self.open.load(Ordering::Acquire))
            .field("config", &self.config)
            .finish()
    }
}

impl Monitor {
    // ========================================================================
    // Construction
    // ========================================================================

    /// In-memory monitor with default settings
    pub fn new(parser: Arc<dyn QueryParser>, presearcher: Presearcher) -> Self {
        let config = MonitorConfig::in_memory();
        Monitor {
            parser,
            presearcher,
            index: QueryIndex::new(config.max_segments),
            writer: Mutex::new(None),
            open: AtomicBool::new(true),
            stats: None,
            pool: None,
            config,
        }
    }

    /// Open a monitor from configuration
    ///
    /// The presearcher is built from `config.presearcher`. When
    /// `storage_path` is set, the query log there is replayed before this
    /// returns.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for bad settings, `IndexIo`/`Corruption` if the query
    /// log cannot be opened.
    pub fn open(parser: Arc<dyn QueryParser>, config: MonitorConfig) -> Result<Self> {
        config.validate()?;
        let stats = config
            .collect_term_stats
            .then(|| Arc::new(CorpusStats::with_capacity(config.term_stats_capacity)));
        let presearcher = config.presearcher.build(stats.clone());
        Self::build(parser, presearcher, stats, config)
    }

    /// Open a monitor with an explicitly constructed presearcher
    ///
    /// `config.presearcher` is ignored. Corpus statistics are still
    /// collected when `collect_term_stats` is set, but only a weightor the
    /// caller wired to [`Monitor::corpus_stats`] can use them.
    pub fn open_with_presearcher(
        parser: Arc<dyn QueryParser>,
        presearcher: Presearcher,
        config: MonitorConfig,
    ) -> Result<Self> {
        config.validate()?;
        let stats = config
            .collect_term_stats
            .then(|| Arc::new(CorpusStats::with_capacity(config.term_stats_capacity)));
        Self::build(parser, presearcher, stats, config)
    }

    fn build(
        parser: Arc<dyn QueryParser>,
        presearcher: Presearcher,
        stats: Option<Arc<CorpusStats>>,
        config: MonitorConfig,
    ) -> Result<Self> {
        let pool = match config.match_threads {
            Some(threads) => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|i| format!("percolate-match-{}", i))
                    .build()
                    .map_err(|e| Error::InvalidConfig(format!("failed to start match pool: {}", e)))?,
            ),
            None => None,
        };

        let monitor = Monitor {
            parser,
            presearcher,
            index: QueryIndex::new(config.max_segments),
            writer: Mutex::new(None),
            open: AtomicBool::new(true),
            stats,
            pool,
            config,
        };

        if let Some(dir) = monitor.config.storage_path.clone() {
            let (log, entries) = QueryLog::open(&dir, monitor.config.sync_writes)?;
            monitor.replay(entries);
            *monitor.writer.lock() = Some(log);
        }

        info!(
            target: "percolate::monitor",
            queries = monitor.index.len(),
            persistent = monitor.config.storage_path.is_some(),
            passes = monitor.presearcher.passes(),
            components = monitor.presearcher.components().len(),
            "Monitor opened"
        );
        Ok(monitor)
    }

    /// Rebuild the corpus from replayed log entries
    fn replay(&self, entries: Vec<LogEntry>) {
        let record_count = entries.len();
        let mut live: BTreeMap<String, MonitorQuery> = BTreeMap::new();
        for entry in entries {
            match entry {
                LogEntry::Put(queries) => {
                    for query in queries {
                        live.insert(query.id.clone(), query);
                    }
                }
                LogEntry::Delete(ids) => {
                    for id in ids {
                        live.remove(&id);
                    }
                }
                LogEntry::Clear => live.clear(),
            }
        }

        let compiled: Vec<Result<QueryRecord>> = live
            .into_values()
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|query| self.compile(query))
            .collect();

        let mut update = IndexUpdate::new();
        let mut skipped = 0usize;
        for result in compiled {
            match result {
                Ok(record) => update = update.upsert(record),
                Err(e) => {
                    skipped += 1;
                    warn!(target: "percolate::monitor", error = %e, "Skipping logged query that no longer parses");
                }
            }
        }
        let version = self.index.apply(update);
        info!(
            target: "percolate::monitor",
            records = record_count,
            queries = self.index.len(),
            skipped,
            version,
            "Replayed query log"
        );
    }

    fn compile(&self, query: MonitorQuery) -> Result<QueryRecord> {
        let node = self
            .parser
            .parse(&query.query, &query.metadata)
            .map_err(|e| Error::parse(query.id.clone(), e))?;
        Ok(self.presearcher.index_record(Arc::new(StoredQuery::new(query, node))))
    }

    fn ensure_open(&self) -> Result<()> {
        if self.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(Error::Closed)
        }
    }

    // ========================================================================
    // Corpus updates
    // ========================================================================

    /// Add or replace queries
    ///
    /// Each query is parsed and indexed independently: a query that fails
    /// to parse is reported in the returned [`UpdateReport`] and the rest of
    /// the batch is committed. When an id appears more than once, only its
    /// last occurrence is considered. All committed queries become visible
    /// to matches at once.
    ///
    /// # Errors
    ///
    /// `Closed` after close. `IndexIo`/`Serialization` if the query log
    /// write fails, in which case nothing from the batch is published.
    pub fn update(&self, queries: Vec<MonitorQuery>) -> Result<UpdateReport> {
        self.ensure_open()?;
        let submitted = queries.len();

        let mut last: HashMap<String, usize> = HashMap::with_capacity(queries.len());
        for (i, query) in queries.iter().enumerate() {
            last.insert(query.id.clone(), i);
        }
        let queries: Vec<MonitorQuery> = queries
            .into_iter()
            .enumerate()
            .filter(|(i, q)| last.get(&q.id) == Some(i))
            .map(|(_, q)| q)
            .collect();

        let compiled: Vec<(String, Result<QueryRecord>)> = queries
            .into_par_iter()
            .map(|query| (query.id.clone(), self.compile(query)))
            .collect();

        let mut report = UpdateReport::default();
        let mut records = Vec::with_capacity(compiled.len());
        for (id, result) in compiled {
            match result {
                Ok(record) => records.push(record),
                Err(error) => {
                    debug!(target: "percolate::monitor", query_id = %id, error = %error, "Rejected query");
                    report.errors.push(UpdateError { id, error });
                }
            }
        }

        let mut writer = self.writer.lock();
        self.ensure_open()?;
        if !records.is_empty() {
            if let Some(log) = writer.as_mut() {
                let entry = LogEntry::Put(records.iter().map(|r| r.query().monitor_query().clone()).collect());
                log.append(&entry)?;
            }
            let snapshot = self.index.snapshot();
            let mut update = IndexUpdate::new();
            for record in records {
                if snapshot.contains(record.id()) {
                    report.replaced += 1;
                }
                report.committed.push(record.id().to_string());
                update = update.upsert(record);
            }
            report.version = self.index.apply(update);
        }
        drop(writer);

        info!(
            target: "percolate::monitor",
            submitted,
            committed = report.committed.len(),
            replaced = report.replaced,
            failed = report.errors.len(),
            version = report.version,
            "Corpus updated"
        );
        Ok(report)
    }

    /// Remove queries by id, returning how many were present
    ///
    /// Unknown ids are ignored. Matches already running keep seeing the
    /// removed queries.
    pub fn delete<I, S>(&self, ids: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ensure_open()?;
        let mut writer = self.writer.lock();
        self.ensure_open()?;

        let snapshot = self.index.snapshot();
        let mut present: Vec<String> = ids
            .into_iter()
            .map(Into::into)
            .filter(|id| snapshot.contains(id))
            .collect();
        present.sort();
        present.dedup();
        if present.is_empty() {
            return Ok(0);
        }

        if let Some(log) = writer.as_mut() {
            log.append(&LogEntry::Delete(present.clone()))?;
        }
        let removed = present.len();
        let update = present.into_iter().fold(IndexUpdate::new(), |update, id| update.delete(id));
        let version = self.index.apply(update);
        drop(writer);

        info!(target: "percolate::monitor", removed, version, "Queries deleted");
        Ok(removed)
    }

    /// Remove every query
    pub fn clear(&self) -> Result<()> {
        self.ensure_open()?;
        let mut writer = self.writer.lock();
        self.ensure_open()?;
        if let Some(log) = writer.as_mut() {
            log.append(&LogEntry::Clear)?;
        }
        let removed = self.index.len();
        let version = self.index.clear();
        info!(target: "percolate::monitor", removed, version, "Corpus cleared");
        Ok(())
    }

    /// Freeze the statistics gathered so far and re-extract every query
    ///
    /// Between refreshes extraction is reproducible: re-adding a query
    /// indexes the same terms no matter how many documents were matched
    /// meanwhile. Returns the published index version; without term
    /// statistics nothing changes.
    pub fn refresh_weights(&self) -> Result<u64> {
        self.ensure_open()?;
        let writer = self.writer.lock();
        self.ensure_open()?;
        let snapshot = self.index.snapshot();
        let Some(stats) = &self.stats else {
            return Ok(snapshot.version());
        };
        let docs = stats.refresh();

        let queries: Vec<Arc<StoredQuery>> = snapshot.records().map(|r| Arc::clone(r.query())).collect();
        let records: Vec<QueryRecord> = queries
            .into_par_iter()
            .map(|query| self.presearcher.index_record(query))
            .collect();
        let reindexed = records.len();
        let version = self.index.apply(records.into_iter().collect());
        drop(writer);

        info!(target: "percolate::monitor", docs, reindexed, version, "Refreshed term weights");
        Ok(version)
    }

    /// Rewrite the query log to hold only the live corpus
    ///
    /// No-op for in-memory monitors.
    pub fn compact(&self) -> Result<()> {
        self.ensure_open()?;
        let mut writer = self.writer.lock();
        self.ensure_open()?;
        if let Some(log) = writer.as_mut() {
            let snapshot = self.index.snapshot();
            let mut live: Vec<MonitorQuery> = snapshot
                .records()
                .map(|r| r.query().monitor_query().clone())
                .collect();
            live.sort_by(|a, b| a.id.cmp(&b.id));
            log.compact(live)?;
        }
        Ok(())
    }

    // ========================================================================
    // Matching
    // ========================================================================

    /// Match a batch of documents
    ///
    /// Results come back in batch order, one [`DocumentMatches`] per input
    /// document. An empty batch yields an empty result.
    pub fn match_batch<T, F>(&self, batch: &DocumentBatch, factory: &F) -> Result<Matches<T>>
    where
        T: QueryMatch,
        F: MatcherFactory<T>,
    {
        self.run_match(batch.documents(), factory, &MatchOptions::default())
    }

    /// Match a single document
    pub fn match_document<T, F>(&self, doc: &InputDocument, factory: &F) -> Result<Matches<T>>
    where
        T: QueryMatch,
        F: MatcherFactory<T>,
    {
        self.run_match(std::slice::from_ref(doc), factory, &MatchOptions::default())
    }

    /// Match a batch with per-call options
    ///
    /// # Errors
    ///
    /// `DeadlineExceeded` if the deadline passes before every document has
    /// started. Partial results are discarded and the corpus is untouched.
    pub fn match_with_options<T, F>(
        &self,
        batch: &DocumentBatch,
        factory: &F,
        options: &MatchOptions,
    ) -> Result<Matches<T>>
    where
        T: QueryMatch,
        F: MatcherFactory<T>,
    {
        self.run_match(batch.documents(), factory, options)
    }

    fn run_match<T, F>(&self, docs: &[InputDocument], factory: &F, options: &MatchOptions) -> Result<Matches<T>>
    where
        T: QueryMatch,
        F: MatcherFactory<T>,
    {
        self.ensure_open()?;
        let start = Instant::now();
        let snapshot = self.index.snapshot();
        let matcher = factory.create();
        let total = docs.len();
        let completed = AtomicUsize::new(0);

        let run = || -> Result<Vec<DocumentMatches<T>>> {
            docs.par_iter()
                .map(|doc| {
                    if options.expired() {
                        return Err(Error::DeadlineExceeded {
                            completed: completed.load(Ordering::Acquire),
                            total,
                        });
                    }
                    let matches = self.match_one(doc, &snapshot, &matcher)?;
                    completed.fetch_add(1, Ordering::AcqRel);
                    Ok(matches)
                })
                .collect()
        };
        let documents = match &self.pool {
            Some(pool) => pool.install(run),
            None => run(),
        };

        let documents = match documents {
            Ok(documents) => documents,
            Err(e) => {
                warn!(target: "percolate::monitor", documents = total, error = %e, "Match failed");
                return Err(e);
            }
        };
        let matches = Matches::new(documents, start.elapsed());
        debug!(
            target: "percolate::monitor",
            documents = matches.batch_size(),
            queries_run = matches.queries_run(),
            matched = matches.match_count(),
            version = snapshot.version(),
            elapsed_us = matches.elapsed().as_micros() as u64,
            "Matched batch"
        );
        Ok(matches)
    }

    fn match_one<T, M>(&self, doc: &InputDocument, snapshot: &IndexSnapshot, matcher: &M) -> Result<DocumentMatches<T>>
    where
        T: QueryMatch,
        M: CandidateMatcher<T>,
    {
        let candidates = self.presearcher.select_candidates(doc, snapshot)?;
        let mut matches = Vec::new();
        let mut errors = Vec::new();
        for query in candidates.queries() {
            match matcher.match_query(query, doc) {
                Ok(Some(m)) => matches.push(m),
                Ok(None) => {}
                Err(message) => {
                    debug!(
                        target: "percolate::monitor",
                        doc_id = doc.id(),
                        query_id = query.id(),
                        error = %message,
                        "Matcher failed on query"
                    );
                    errors.push(MatchError {
                        query_id: query.id().to_string(),
                        message,
                    });
                }
            }
        }
        if let Some(stats) = &self.stats {
            stats.observe(doc);
        }
        Ok(DocumentMatches::new(doc.id(), matches, errors, candidates.len()))
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// Queries the presearcher selects for `doc` against the current corpus
    pub fn select_candidates(&self, doc: &InputDocument) -> Result<CandidateSet> {
        self.ensure_open()?;
        self.presearcher.select_candidates(doc, &self.index.snapshot())
    }

    /// Candidates for `doc` with the index tokens that selected each one
    pub fn explain_candidates(&self, doc: &InputDocument) -> Result<Vec<CandidateExplanation>> {
        self.ensure_open()?;
        self.presearcher.explain_candidates(doc, &self.index.snapshot())
    }

    /// Look up a live query
    pub fn get_query(&self, id: &str) -> Result<Option<Arc<StoredQuery>>> {
        self.ensure_open()?;
        Ok(self.index.snapshot().get(id).map(|r| Arc::clone(r.query())))
    }

    /// Live query count
    pub fn query_count(&self) -> Result<usize> {
        self.ensure_open()?;
        Ok(self.index.len())
    }

    /// Live query ids, sorted
    pub fn query_ids(&self) -> Result<Vec<String>> {
        self.ensure_open()?;
        Ok(self.index.snapshot().ids())
    }

    /// Version of the current index snapshot
    pub fn version(&self) -> Result<u64> {
        self.ensure_open()?;
        Ok(self.index.snapshot().version())
    }

    /// Statistics gathered from matched documents, if enabled
    pub fn corpus_stats(&self) -> Option<&Arc<CorpusStats>> {
        self.stats.as_ref()
    }

    /// The presearcher in use
    pub fn presearcher(&self) -> &Presearcher {
        &self.presearcher
    }

    /// Configuration this monitor was opened with
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// False once closed
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    /// Sync the query log and release the index
    ///
    /// Calling `close` again is a no-op. Matches already running finish on
    /// their snapshot.
    pub fn close(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        if !self.open.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        let queries = self.index.len();
        self.index.clear();
        if let Some(mut log) = writer.take() {
            log.sync()?;
        }
        info!(target: "percolate::monitor", queries, "Monitor closed");
        Ok(())
    }
}
