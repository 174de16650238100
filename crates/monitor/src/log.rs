//! Append-only query log
//!
//! The monitor's query index lives in memory; the query log is what makes a
//! corpus survive a restart. Every applied update is appended as one record
//! and the log is replayed on open.
//!
//! # File Layout
//!
//! ```text
//! ┌────────────────────────────────────┐
//! │ Header: magic "PRCQ" + version u32 │
//! ├────────────────────────────────────┤
//! │ Record 1                           │
//! ├────────────────────────────────────┤
//! │ ...                                │
//! └────────────────────────────────────┘
//! ```
//!
//! # Record Layout
//!
//! ```text
//! ┌─────────────────┬──────────────────┬─────────────────────────┬──────────┐
//! │ Length (4 bytes)│ Format Ver (1)   │ Payload (MessagePack)   │ CRC32 (4)│
//! └─────────────────┴──────────────────┴─────────────────────────┴──────────┘
//! ```
//!
//! The length field covers format version, payload and CRC. The CRC covers
//! format version and payload.
//!
//! # Recovery
//!
//! A partial or checksum-failing record ends replay: the log is truncated
//! to the last valid record and a warning is logged. A bad header is an
//! error, since it means the file is not a query log at all.

use crc32fast::Hasher;
use percolate_core::{Error, MonitorQuery, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Query log file name inside the storage directory
pub const LOG_FILE_NAME: &str = "queries.log";

/// Magic bytes identifying a query log: "PRCQ"
pub const LOG_MAGIC: [u8; 4] = *b"PRCQ";

/// Current log file format version
pub const LOG_FORMAT_VERSION: u32 = 1;

/// Size of the file header in bytes
pub const LOG_HEADER_SIZE: usize = 8;

/// Current record format version
pub const RECORD_FORMAT_VERSION: u8 = 1;

/// Records larger than this are treated as corrupt length fields
const MAX_RECORD_LEN: usize = 256 * 1024 * 1024;

/// One logged corpus change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogEntry {
    /// Queries added or replaced
    Put(Vec<MonitorQuery>),
    /// Queries deleted by id
    Delete(Vec<String>),
    /// Corpus cleared
    Clear,
}

#[derive(Debug)]
enum RecordError {
    InsufficientData,
    ChecksumMismatch { expected: u32, computed: u32 },
    InvalidFormat(String),
}

fn compute_crc(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

fn encode_record(entry: &LogEntry) -> Result<Vec<u8>> {
    encode_record_limited(entry, MAX_RECORD_LEN)
}

fn encode_record_limited(entry: &LogEntry, max_len: usize) -> Result<Vec<u8>> {
    let body = rmp_serde::to_vec_named(entry).map_err(|e| Error::Serialization(e.to_string()))?;

    let mut payload = Vec::with_capacity(1 + body.len());
    payload.push(RECORD_FORMAT_VERSION);
    payload.extend_from_slice(&body);
    let crc = compute_crc(&payload);

    let total_len = payload.len() + 4;
    if total_len > max_len {
        return Err(Error::Serialization(format!(
            "log record of {} bytes exceeds the {} byte limit",
            total_len, max_len
        )));
    }
    let mut record = Vec::with_capacity(4 + total_len);
    record.extend_from_slice(&(total_len as u32).to_le_bytes());
    record.extend_from_slice(&payload);
    record.extend_from_slice(&crc.to_le_bytes());
    Ok(record)
}

/// Returns (entry, bytes_consumed)
fn decode_record(bytes: &[u8]) -> std::result::Result<(LogEntry, usize), RecordError> {
    let Some(len_bytes) = bytes.get(0..4) else {
        return Err(RecordError::InsufficientData);
    };
    let length = u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]) as usize;
    if length < 5 || length > MAX_RECORD_LEN {
        return Err(RecordError::InvalidFormat(format!("record length {}", length)));
    }
    let Some(framed) = bytes.get(4..4 + length) else {
        return Err(RecordError::InsufficientData);
    };

    let (payload, crc_bytes) = framed.split_at(length - 4);
    let stored = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
    let computed = compute_crc(payload);
    if stored != computed {
        return Err(RecordError::ChecksumMismatch {
            expected: stored,
            computed,
        });
    }

    if payload[0] != RECORD_FORMAT_VERSION {
        return Err(RecordError::InvalidFormat(format!("record version {}", payload[0])));
    }
    let entry = rmp_serde::from_slice(&payload[1..]).map_err(|e| RecordError::InvalidFormat(e.to_string()))?;
    Ok((entry, 4 + length))
}

fn header_bytes() -> [u8; LOG_HEADER_SIZE] {
    let mut bytes = [0u8; LOG_HEADER_SIZE];
    bytes[0..4].copy_from_slice(&LOG_MAGIC);
    bytes[4..8].copy_from_slice(&LOG_FORMAT_VERSION.to_le_bytes());
    bytes
}

// ============================================================================
// QueryLog
// ============================================================================

/// Handle to an open query log
#[derive(Debug)]
pub struct QueryLog {
    writer: BufWriter<File>,
    path: PathBuf,
    sync_writes: bool,
    records: u64,
    /// End of the last complete record
    offset: u64,
    poisoned: bool,
}

impl QueryLog {
    /// Open (or create) the log in `dir` and return the entries to replay
    ///
    /// # Errors
    ///
    /// `IndexIo` if the file cannot be opened, `Corruption` if its header is
    /// not a query log header.
    pub fn open(dir: &Path, sync_writes: bool) -> Result<(QueryLog, Vec<LogEntry>)> {
        fs::create_dir_all(dir)?;
        let path = dir.join(LOG_FILE_NAME);
        let mut file = OpenOptions::new().read(true).write(true).create(true).open(&path)?;

        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;

        if buffer.len() < LOG_HEADER_SIZE {
            if !buffer.is_empty() {
                warn!(target: "percolate::log", path = %path.display(), "Truncated log header, reinitializing");
            }
            file.set_len(0)?;
            file.seek(SeekFrom::Start(0))?;
            file.write_all(&header_bytes())?;
            file.sync_all()?;
            info!(target: "percolate::log", path = %path.display(), "Created query log");
            let log = QueryLog {
                writer: BufWriter::new(file),
                path,
                sync_writes,
                records: 0,
                offset: LOG_HEADER_SIZE as u64,
                poisoned: false,
            };
            return Ok((log, Vec::new()));
        }

        if buffer[0..4] != LOG_MAGIC {
            return Err(Error::Corruption(format!("{} is not a query log", path.display())));
        }
        let version = u32::from_le_bytes([buffer[4], buffer[5], buffer[6], buffer[7]]);
        if version != LOG_FORMAT_VERSION {
            return Err(Error::Corruption(format!(
                "unsupported query log version {} in {}",
                version,
                path.display()
            )));
        }

        let mut entries = Vec::new();
        let mut offset = LOG_HEADER_SIZE;
        while offset < buffer.len() {
            match decode_record(&buffer[offset..]) {
                Ok((entry, consumed)) => {
                    entries.push(entry);
                    offset += consumed;
                }
                Err(e) => {
                    warn!(
                        target: "percolate::log",
                        path = %path.display(),
                        offset,
                        dropped_bytes = buffer.len() - offset,
                        reason = ?e,
                        "Truncating corrupt query log tail"
                    );
                    file.set_len(offset as u64)?;
                    file.sync_all()?;
                    break;
                }
            }
        }
        file.seek(SeekFrom::Start(offset as u64))?;

        info!(target: "percolate::log", path = %path.display(), records = entries.len(), "Opened query log");
        let log = QueryLog {
            writer: BufWriter::new(file),
            path,
            sync_writes,
            records: entries.len() as u64,
            offset: offset as u64,
            poisoned: false,
        };
        Ok((log, entries))
    }

    /// Append one entry; synced to disk when `sync_writes` is set
    ///
    /// A failed write is rolled back to the end of the previous record, so
    /// a later append never lands behind a torn one. If the rollback fails
    /// too, the log refuses further appends.
    pub fn append(&mut self, entry: &LogEntry) -> Result<()> {
        if self.poisoned {
            return Err(Error::Corruption(format!(
                "{} is unusable after a failed write",
                self.path.display()
            )));
        }
        let record = encode_record(entry)?;
        if let Err(e) = self.write_record(&record) {
            warn!(
                target: "percolate::log",
                path = %self.path.display(),
                offset = self.offset,
                error = %e,
                "Log append failed, rolling back"
            );
            if let Err(rollback) = self.rollback() {
                self.poisoned = true;
                warn!(target: "percolate::log", error = %rollback, "Log rollback failed, refusing further appends");
            }
            return Err(e);
        }
        self.offset += record.len() as u64;
        self.records += 1;
        debug!(target: "percolate::log", bytes = record.len(), records = self.records, "Appended log record");
        Ok(())
    }

    fn write_record(&mut self, record: &[u8]) -> Result<()> {
        self.writer.write_all(record)?;
        self.writer.flush()?;
        if self.sync_writes {
            self.writer.get_ref().sync_data()?;
        }
        Ok(())
    }

    /// Drop buffered bytes and cut the file back to the last complete record
    fn rollback(&mut self) -> Result<()> {
        let mut file = self.writer.get_ref().try_clone()?;
        file.set_len(self.offset)?;
        file.seek(SeekFrom::Start(self.offset))?;
        let torn = std::mem::replace(&mut self.writer, BufWriter::new(file));
        // into_parts hands back the unwritten buffer instead of flushing it
        let (_, _discarded) = torn.into_parts();
        Ok(())
    }

    /// Rewrite the log as a single `Put` of `live`
    ///
    /// Writes a temp file next to the log and renames it into place, so a
    /// crash leaves either the old or the new log.
    pub fn compact(&mut self, live: Vec<MonitorQuery>) -> Result<()> {
        let tmp_path = self.path.with_extension("log.tmp");
        let count = live.len();
        {
            let mut tmp = BufWriter::new(File::create(&tmp_path)?);
            tmp.write_all(&header_bytes())?;
            if !live.is_empty() {
                tmp.write_all(&encode_record(&LogEntry::Put(live))?)?;
            }
            tmp.flush()?;
            tmp.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        let mut file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        let end = file.seek(SeekFrom::End(0))?;
        let before = self.records;
        self.writer = BufWriter::new(file);
        self.offset = end;
        self.poisoned = false;
        self.records = u64::from(count > 0);
        info!(
            target: "percolate::log",
            path = %self.path.display(),
            before,
            queries = count,
            "Compacted query log"
        );
        Ok(())
    }

    /// Flush buffered bytes and sync the file
    pub fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Records in the log (including replayed ones)
    pub fn record_count(&self) -> u64 {
        self.records
    }

    /// Log file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn put(ids: &[&str]) -> LogEntry {
        LogEntry::Put(ids.iter().map(|id| MonitorQuery::new(*id, "fox")).collect())
    }

    #[test]
    fn test_open_creates_header() {
        let dir = TempDir::new().unwrap();
        let (log, entries) = QueryLog::open(dir.path(), true).unwrap();
        assert!(entries.is_empty());
        assert_eq!(fs::metadata(log.path()).unwrap().len(), LOG_HEADER_SIZE as u64);
    }

    #[test]
    fn test_append_and_replay() {
        let dir = TempDir::new().unwrap();
        {
            let (mut log, _) = QueryLog::open(dir.path(), true).unwrap();
            log.append(&put(&["q1", "q2"])).unwrap();
            log.append(&LogEntry::Delete(vec!["q1".into()])).unwrap();
            log.append(&LogEntry::Clear).unwrap();
        }
        let (log, entries) = QueryLog::open(dir.path(), true).unwrap();
        assert_eq!(entries, vec![put(&["q1", "q2"]), LogEntry::Delete(vec!["q1".into()]), LogEntry::Clear]);
        assert_eq!(log.record_count(), 3);
    }

    #[test]
    fn test_torn_tail_is_truncated() {
        let dir = TempDir::new().unwrap();
        let path = {
            let (mut log, _) = QueryLog::open(dir.path(), true).unwrap();
            log.append(&put(&["q1"])).unwrap();
            log.append(&put(&["q2"])).unwrap();
            log.path().to_path_buf()
        };
        let len = fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len - 3).unwrap();
        drop(file);

        let (mut log, entries) = QueryLog::open(dir.path(), true).unwrap();
        assert_eq!(entries, vec![put(&["q1"])]);

        // appends after recovery land after the last good record
        log.append(&put(&["q3"])).unwrap();
        drop(log);
        let (_, entries) = QueryLog::open(dir.path(), true).unwrap();
        assert_eq!(entries, vec![put(&["q1"]), put(&["q3"])]);
    }

    #[test]
    fn test_checksum_mismatch_is_truncated() {
        let dir = TempDir::new().unwrap();
        let path = {
            let (mut log, _) = QueryLog::open(dir.path(), true).unwrap();
            log.append(&put(&["q1"])).unwrap();
            log.append(&put(&["q2"])).unwrap();
            log.path().to_path_buf()
        };
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 6;
        bytes[last] ^= 0xFF;
        fs::write(&path, &bytes).unwrap();

        let (_, entries) = QueryLog::open(dir.path(), true).unwrap();
        assert_eq!(entries, vec![put(&["q1"])]);
    }

    #[test]
    fn test_failed_append_is_rolled_back() {
        let dir = TempDir::new().unwrap();
        {
            let (mut log, _) = QueryLog::open(dir.path(), true).unwrap();
            log.append(&put(&["q1"])).unwrap();

            // half a record reached the file, the rest is still buffered
            let torn = encode_record(&put(&["lost"])).unwrap();
            log.writer.get_mut().write_all(&torn[..10]).unwrap();
            log.writer.write_all(&torn[10..]).unwrap();
            log.rollback().unwrap();

            log.append(&put(&["q2"])).unwrap();
        }
        let (_, entries) = QueryLog::open(dir.path(), true).unwrap();
        assert_eq!(entries, vec![put(&["q1"]), put(&["q2"])]);
    }

    #[test]
    fn test_poisoned_log_refuses_appends() {
        let dir = TempDir::new().unwrap();
        let (mut log, _) = QueryLog::open(dir.path(), true).unwrap();
        log.poisoned = true;
        assert!(matches!(log.append(&put(&["q1"])), Err(Error::Corruption(_))));
    }

    #[test]
    fn test_oversized_record_is_rejected() {
        let entry = put(&["q1", "q2"]);
        assert!(matches!(encode_record_limited(&entry, 16), Err(Error::Serialization(_))));
        assert!(encode_record_limited(&entry, MAX_RECORD_LEN).is_ok());
    }

    #[test]
    fn test_bad_magic_is_corruption() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(LOG_FILE_NAME), b"NOTALOGFILE").unwrap();
        assert!(matches!(QueryLog::open(dir.path(), true), Err(Error::Corruption(_))));
    }

    #[test]
    fn test_compact() {
        let dir = TempDir::new().unwrap();
        {
            let (mut log, _) = QueryLog::open(dir.path(), false).unwrap();
            for i in 0..10 {
                log.append(&put(&[&format!("q{i}")])).unwrap();
            }
            log.compact(vec![MonitorQuery::new("q9", "fox")]).unwrap();
            log.append(&LogEntry::Delete(vec!["q9".into()])).unwrap();
        }
        let (_, entries) = QueryLog::open(dir.path(), false).unwrap();
        assert_eq!(entries, vec![put(&["q9"]), LogEntry::Delete(vec!["q9".into()])]);
        assert!(!dir.path().join("queries.log.tmp").exists());
    }
}
