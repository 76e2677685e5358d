//! Tests for the writer thread and the producer-facing handle

use std::time::Duration;

use tempfile::tempdir;

use super::{mirror_file, FileLogger};
use crate::config::LoggerConfig;
use crate::error::LoggerError;
use crate::sink;

fn config(dir: &std::path::Path) -> LoggerConfig {
    LoggerConfig {
        base_path: dir.join("node"),
        interval: "HOUR".into(),
        build_number: 1480,
        flush_ms: 50,
        ..LoggerConfig::default()
    }
}

#[test]
fn test_mirror_file_names() {
    let base = std::path::Path::new("/var/log/node");
    assert_eq!(
        mirror_file(base, "latest"),
        std::path::PathBuf::from("/var/log/node-latest.log")
    );
    assert_eq!(
        mirror_file(base, "previous"),
        std::path::PathBuf::from("/var/log/node-previous.log")
    );
}

#[test]
fn test_invalid_interval_is_a_constructor_error() {
    let dir = tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.interval = "7".into();
    match FileLogger::new(cfg) {
        Err(LoggerError::InvalidInterval(s)) => assert_eq!(s, "7"),
        other => panic!("expected InvalidInterval, got {:?}", other.err()),
    }
}

#[test]
fn test_stream_mode_drains_on_close() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("single.log");
    let stream = sink::open_with_retry(&path, false, false);

    let logger = FileLogger::with_stream(config(dir.path()), stream).unwrap();
    logger.start();
    for i in 0..10 {
        logger.enqueue(format!("record {}\n", i));
    }
    assert!(logger.close_and_drain());
    assert_eq!(logger.list_bytes(), 0);

    let content = std::fs::read_to_string(&path).unwrap();
    for i in 0..10 {
        assert!(content.contains(&format!("record {}\n", i)));
    }
    // Submission order is preserved
    let first = content.find("record 0").unwrap();
    let last = content.find("record 9").unwrap();
    assert!(first < last);
}

#[test]
fn test_close_is_idempotent() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("single.log");
    let stream = sink::open_with_retry(&path, false, false);

    let logger = FileLogger::with_stream(config(dir.path()), stream).unwrap();
    logger.start();
    logger.close();
    logger.close();
    assert!(logger.close_and_drain());
}

#[test]
fn test_start_twice_is_noop() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("single.log");
    let stream = sink::open_with_retry(&path, false, false);

    let logger = FileLogger::with_stream(config(dir.path()), stream).unwrap();
    logger.start();
    logger.start();
    assert!(logger.close_and_drain());
}

#[test]
fn test_wait_for_switch_returns_immediately_without_request() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("single.log");
    let stream = sink::open_with_retry(&path, false, false);
    let logger = FileLogger::with_stream(config(dir.path()), stream).unwrap();

    let start = std::time::Instant::now();
    logger.wait_for_switch();
    assert!(start.elapsed() < Duration::from_secs(1));
    logger.close();
}

#[test]
fn test_host_ident_threaded_through() {
    let dir = tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.host_ident = "node7".into();
    let path = dir.path().join("single.log");
    let stream = sink::open_with_retry(&path, false, false);
    let logger = FileLogger::with_stream(cfg, stream).unwrap();
    assert_eq!(logger.host_ident(), "node7");
    logger.close();
}
