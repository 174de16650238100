//! Query Log Persistence Tests
//!
//! A persistent monitor rebuilds its corpus from `queries.log` on open.

use percolate_core::{Error, InputDocument, MonitorQuery, StandardAnalyzer, StandardQueryParser};
use percolate_monitor::{Monitor, MonitorConfig, SimpleMatcher, LOG_FILE_NAME};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn open(path: &Path) -> Monitor {
    let parser = Arc::new(StandardQueryParser::new("text", Arc::new(StandardAnalyzer::new())));
    Monitor::open(parser, MonitorConfig::persistent(path)).unwrap()
}

fn doc(text: &str) -> InputDocument {
    InputDocument::builder("d").add_field("text", text, &StandardAnalyzer::new()).build()
}

#[test]
fn test_replay_restores_corpus() {
    let temp_dir = TempDir::new().unwrap();
    {
        let monitor = open(temp_dir.path());
        monitor
            .update(vec![
                MonitorQuery::new("a", "fox"),
                MonitorQuery::new("b", "hound").with_metadata("owner", "x"),
                MonitorQuery::new("c", "cat"),
            ])
            .unwrap();
        monitor.update(vec![MonitorQuery::new("a", "zebra")]).unwrap();
        monitor.delete(["c"]).unwrap();
        monitor.close().unwrap();
    }

    let monitor = open(temp_dir.path());
    assert_eq!(monitor.query_ids().unwrap(), vec!["a".to_string(), "b".to_string()]);
    let a = monitor.get_query("a").unwrap().unwrap();
    assert_eq!(a.text(), "zebra");
    let b = monitor.get_query("b").unwrap().unwrap();
    assert_eq!(b.metadata().get("owner").map(String::as_str), Some("x"));

    let matches = monitor.match_document(&doc("a zebra"), &SimpleMatcher).unwrap();
    assert!(matches.get("d", "a").is_some());
}

#[test]
fn test_clear_is_replayed() {
    let temp_dir = TempDir::new().unwrap();
    {
        let monitor = open(temp_dir.path());
        monitor.update(vec![MonitorQuery::new("a", "fox")]).unwrap();
        monitor.clear().unwrap();
        monitor.update(vec![MonitorQuery::new("b", "cat")]).unwrap();
    }
    let monitor = open(temp_dir.path());
    assert_eq!(monitor.query_ids().unwrap(), vec!["b".to_string()]);
}

#[test]
fn test_rejected_queries_are_not_logged() {
    let temp_dir = TempDir::new().unwrap();
    {
        let monitor = open(temp_dir.path());
        let report = monitor
            .update(vec![MonitorQuery::new("ok", "fox"), MonitorQuery::new("bad", "fox AND")])
            .unwrap();
        assert_eq!(report.errors.len(), 1);
    }
    let monitor = open(temp_dir.path());
    assert_eq!(monitor.query_ids().unwrap(), vec!["ok".to_string()]);
}

#[test]
fn test_corrupt_tail_is_truncated() {
    let temp_dir = TempDir::new().unwrap();
    {
        let monitor = open(temp_dir.path());
        monitor.update(vec![MonitorQuery::new("a", "fox")]).unwrap();
        monitor.update(vec![MonitorQuery::new("b", "cat")]).unwrap();
    }

    // a torn write: length prefix promising more bytes than follow
    let log_path = temp_dir.path().join(LOG_FILE_NAME);
    let clean_len = std::fs::metadata(&log_path).unwrap().len();
    {
        let mut file = OpenOptions::new().append(true).open(&log_path).unwrap();
        file.write_all(&[200, 0, 0, 0, 1, 0xde, 0xad]).unwrap();
    }

    let monitor = open(temp_dir.path());
    assert_eq!(monitor.query_count().unwrap(), 2);
    assert_eq!(std::fs::metadata(&log_path).unwrap().len(), clean_len);

    // the log is still appendable after truncation
    monitor.update(vec![MonitorQuery::new("c", "hound")]).unwrap();
    drop(monitor);
    assert_eq!(open(temp_dir.path()).query_count().unwrap(), 3);
}

#[test]
fn test_not_a_query_log() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(temp_dir.path().join(LOG_FILE_NAME), b"definitely not a log").unwrap();
    let parser = Arc::new(StandardQueryParser::new("text", Arc::new(StandardAnalyzer::new())));
    let err = Monitor::open(parser, MonitorConfig::persistent(temp_dir.path())).unwrap_err();
    assert!(matches!(err, Error::Corruption(_)));
}

#[test]
fn test_compact_preserves_corpus() {
    let temp_dir = TempDir::new().unwrap();
    let log_path = temp_dir.path().join(LOG_FILE_NAME);
    {
        let monitor = open(temp_dir.path());
        for i in 0..20 {
            monitor.update(vec![MonitorQuery::new("q", format!("w{}", i))]).unwrap();
        }
        let before = std::fs::metadata(&log_path).unwrap().len();
        monitor.compact().unwrap();
        assert!(std::fs::metadata(&log_path).unwrap().len() < before);
        monitor.update(vec![MonitorQuery::new("r", "fox")]).unwrap();
    }
    let monitor = open(temp_dir.path());
    assert_eq!(monitor.query_ids().unwrap(), vec!["q".to_string(), "r".to_string()]);
    assert_eq!(monitor.get_query("q").unwrap().unwrap().text(), "w19");
}
