//! Monitor configuration via `percolate.toml`
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working in-memory monitor.

use percolate_core::{Error, Result};
use percolate_presearcher::{
    CompositeWeightor, CorpusStats, FieldFilterComponent, Presearcher, TermFrequencyNorm, WildcardNgramComponent,
    DEFAULT_MAX_SEGMENTS, DEFAULT_STATS_CAPACITY, MAX_PASSES,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Config file name looked up in a storage directory
pub const CONFIG_FILE_NAME: &str = "percolate.toml";

/// Presearcher settings, the `[presearcher]` table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PresearcherSettings {
    /// Extraction passes (1 = single pass)
    #[serde(default = "default_passes")]
    pub passes: u32,
    /// Weight a conjunction child must exceed to be used in a later pass
    #[serde(default)]
    pub min_weight: f32,
    /// Metadata fields filtered with a `FieldFilterComponent` each
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filter_fields: Vec<String>,
    /// Index wildcard clauses by literal prefix
    #[serde(default)]
    pub wildcard_prefixes: bool,
    /// Longest wildcard prefix indexed, in characters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wildcard_max_prefix_len: Option<usize>,
}

fn default_passes() -> u32 {
    1
}

impl Default for PresearcherSettings {
    fn default() -> Self {
        PresearcherSettings {
            passes: default_passes(),
            min_weight: 0.0,
            filter_fields: Vec::new(),
            wildcard_prefixes: false,
            wildcard_max_prefix_len: None,
        }
    }
}

impl PresearcherSettings {
    /// Build the configured presearcher
    ///
    /// When `stats` is given, term weights include corpus frequency.
    pub fn build(&self, stats: Option<Arc<CorpusStats>>) -> Presearcher {
        let mut presearcher = Presearcher::new()
            .with_passes(self.passes)
            .with_min_weight(self.min_weight);
        if let Some(stats) = stats {
            let weightor = CompositeWeightor::default().with_norm(Box::new(TermFrequencyNorm::new(stats)));
            presearcher = presearcher.with_weightor(Arc::new(weightor));
        }
        if self.wildcard_prefixes {
            let mut component = WildcardNgramComponent::new();
            if let Some(len) = self.wildcard_max_prefix_len {
                component = component.with_max_prefix_len(len);
            }
            presearcher = presearcher.with_component(Arc::new(component));
        }
        for field in &self.filter_fields {
            presearcher = presearcher.with_component(Arc::new(FieldFilterComponent::new(field.as_str())));
        }
        presearcher
    }
}

/// Monitor configuration loaded from `percolate.toml`.
///
/// # Example
///
/// ```toml
/// max_segments = 8
/// storage_path = "/var/lib/percolate"
///
/// [presearcher]
/// passes = 2
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonitorConfig {
    /// Worker threads for batch matching (`None` = rayon's global pool)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_threads: Option<usize>,
    /// Segments tolerated before the query index merges
    #[serde(default = "default_max_segments")]
    pub max_segments: usize,
    /// Directory for the query log (`None` = in-memory only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<PathBuf>,
    /// fsync the query log after every write
    #[serde(default = "default_sync_writes")]
    pub sync_writes: bool,
    /// Feed matched documents into corpus statistics for IDF weighting
    ///
    /// Weights only pick up new statistics on `Monitor::refresh_weights`.
    #[serde(default)]
    pub collect_term_stats: bool,
    /// Most distinct (field, token) pairs the statistics track
    #[serde(default = "default_term_stats_capacity")]
    pub term_stats_capacity: usize,
    /// Presearcher settings
    #[serde(default)]
    pub presearcher: PresearcherSettings,
}

fn default_max_segments() -> usize {
    DEFAULT_MAX_SEGMENTS
}

fn default_sync_writes() -> bool {
    true
}

fn default_term_stats_capacity() -> usize {
    DEFAULT_STATS_CAPACITY
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            match_threads: None,
            max_segments: default_max_segments(),
            storage_path: None,
            sync_writes: default_sync_writes(),
            collect_term_stats: false,
            term_stats_capacity: default_term_stats_capacity(),
            presearcher: PresearcherSettings::default(),
        }
    }
}

impl MonitorConfig {
    /// In-memory configuration with defaults
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Persistent configuration storing the query log under `path`
    pub fn persistent(path: impl Into<PathBuf>) -> Self {
        MonitorConfig {
            storage_path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Builder: presearcher settings
    pub fn with_presearcher(mut self, presearcher: PresearcherSettings) -> Self {
        self.presearcher = presearcher;
        self
    }

    /// Builder: worker threads for batch matching
    pub fn with_match_threads(mut self, threads: usize) -> Self {
        self.match_threads = Some(threads);
        self
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` naming the first bad value.
    pub fn validate(&self) -> Result<()> {
        if self.max_segments == 0 {
            return Err(Error::InvalidConfig("max_segments must be at least 1".into()));
        }
        if self.collect_term_stats && self.term_stats_capacity == 0 {
            return Err(Error::InvalidConfig("term_stats_capacity must be at least 1".into()));
        }
        if self.match_threads == Some(0) {
            return Err(Error::InvalidConfig("match_threads must be at least 1".into()));
        }
        let passes = self.presearcher.passes;
        if passes == 0 || passes > MAX_PASSES {
            return Err(Error::InvalidConfig(format!(
                "presearcher.passes must be between 1 and {}, got {}",
                MAX_PASSES, passes
            )));
        }
        if !self.presearcher.min_weight.is_finite() || self.presearcher.min_weight < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "presearcher.min_weight must be finite and non-negative, got {}",
                self.presearcher.min_weight
            )));
        }
        if self.presearcher.wildcard_max_prefix_len == Some(0) {
            return Err(Error::InvalidConfig("presearcher.wildcard_max_prefix_len must be at least 1".into()));
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Percolate monitor configuration

# Worker threads for batch matching (default: rayon's global pool)
# match_threads = 4

# Segments tolerated in the query index before they are merged
max_segments = 8

# Directory holding queries.log; omit for an in-memory monitor
# storage_path = "/var/lib/percolate"

# fsync the query log after every update (default: true)
sync_writes = true

# Use term frequencies of matched documents when weighting query terms.
# Weights are frozen until Monitor::refresh_weights is called.
collect_term_stats = false

# Most distinct (field, token) pairs counted for term statistics
term_stats_capacity = 1000000

[presearcher]
# Extraction passes; more passes admit fewer false positives
passes = 1

# Weight a conjunction clause must exceed to be used in a later pass
min_weight = 0.0

# Metadata fields that restrict candidates by document field value
# filter_fields = ["lang"]

# Index wildcard clauses by their literal prefix instead of ANY
wildcard_prefixes = false
"#
    }

    /// Read, parse and validate config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidConfig(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        Self::from_toml(&content).map_err(|e| match e {
            Error::InvalidConfig(msg) => Error::InvalidConfig(format!("{} ({})", msg, path.display())),
            other => other,
        })
    }

    /// Parse and validate config from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: MonitorConfig =
            toml::from_str(content).map_err(|e| Error::InvalidConfig(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml())?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Serialization(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
