//! End-to-end tests driving the full logger: writer thread, rotation,
//! archive bookkeeping, and the shutdown handshake.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use chrono::{TimeZone, Utc};
use flate2::read::GzDecoder;
use tempfile::tempdir;

use peerlog::{Clock, FileLogger, LoggerConfig, MockClock};

const BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

fn config(base: PathBuf) -> LoggerConfig {
    LoggerConfig {
        base_path: base,
        interval: "HOUR".into(),
        build_number: 1480,
        // A small byte bound keeps the write threshold below one
        // record, so the writer drains promptly.
        max_list_bytes: 64,
        flush_ms: 50,
        ..LoggerConfig::default()
    }
}

fn noon() -> SystemTime {
    SystemTime::from(Utc.with_ymd_and_hms(2024, 3, 15, 12, 10, 0).unwrap())
}

fn gunzip(path: &Path) -> Vec<u8> {
    let compressed = std::fs::read(path).unwrap();
    let mut decoder = GzDecoder::new(&compressed[..]);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).unwrap();
    out
}

fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn test_rotation_on_boundary_crossing() {
    let dir = tempdir().unwrap();
    let base = dir.path().join("node");
    let clock = Arc::new(MockClock::with_time(noon()));
    let logger = FileLogger::with_clock(config(base), clock.clone() as Arc<dyn Clock>).unwrap();
    logger.start();

    logger.enqueue("before rotation\n");
    let old_file = dir.path().join("node-1480-2024-03-15-12.log.gz");
    wait_until(|| logger.list_bytes() == 0);

    // Cross the boundary: the writer notices within its 500 ms poll cap
    clock.advance(Duration::from_secs(3600));
    wait_until(|| logger.list_available_logs().len() == 2);

    let entries = logger.list_available_logs();
    assert_eq!(entries[0].filename, "node-1480-2024-03-15-12.log.gz");
    assert_eq!(
        entries[0].start,
        Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap()
    );
    assert_eq!(
        entries[0].end,
        Utc.with_ymd_and_hms(2024, 3, 15, 13, 0, 0).unwrap()
    );
    assert!(entries[0].size > 0);
    // The live file is listed last
    assert_eq!(entries[1].filename, "node-1480-2024-03-15-13.log.gz");

    assert!(logger.close_and_drain());

    let old_content = gunzip(&old_file);
    assert_eq!(&old_content[..3], BOM);
    assert_eq!(&old_content[3..], b"before rotation\n");

    let new_content = gunzip(&dir.path().join("node-1480-2024-03-15-13.log.gz"));
    assert_eq!(new_content, BOM);

    // Mirror files rotated alongside
    let previous = std::fs::read(dir.path().join("node-previous.log")).unwrap();
    assert_eq!(&previous[..3], BOM);
    assert_eq!(&previous[3..], b"before rotation\n");
    assert_eq!(std::fs::read(dir.path().join("node-latest.log")).unwrap(), BOM);
}

#[test]
fn test_shutdown_drains_buffer_within_deadline() {
    let dir = tempdir().unwrap();
    let base = dir.path().join("node");
    let mut cfg = config(base);
    cfg.max_list_bytes = 1 << 20;
    let logger = FileLogger::new(cfg).unwrap();
    logger.start();

    for i in 0..10 {
        logger.enqueue(format!("record {}\n", i));
    }
    assert!(logger.close_and_drain());
    assert_eq!(logger.list_bytes(), 0);

    let entries = logger.list_available_logs();
    let live = entries.last().unwrap();
    let content = gunzip(&dir.path().join(&live.filename));
    assert_eq!(&content[..3], BOM);
    let text = String::from_utf8(content[3..].to_vec()).unwrap();
    let expected: String = (0..10).map(|i| format!("record {}\n", i)).collect();
    assert_eq!(text, expected);
}

#[test]
fn test_overflow_marker_reaches_the_log() {
    let dir = tempdir().unwrap();
    let base = dir.path().join("node");
    let mut cfg = config(base);
    cfg.max_list_size = 4;
    cfg.max_list_bytes = 1 << 20;
    let logger = FileLogger::new(cfg).unwrap();

    // Saturate before the writer starts draining, so the drop is
    // deterministic: the two oldest go, a marker and the newest stay.
    for i in 0..5 {
        logger.enqueue(format!("record {}\n", i));
    }
    logger.start();
    assert!(logger.close_and_drain());

    let live = logger.list_available_logs().pop().unwrap();
    let content = gunzip(&dir.path().join(&live.filename));
    let text = String::from_utf8_lossy(&content[3..]);
    assert!(!text.contains("record 0"));
    assert!(!text.contains("record 1"));
    assert!(text.contains("record 2\n"));
    assert!(text.contains("record 3\n"));
    assert!(text.contains("GRRR: ERROR: Logging too fast, chopped 2 entries"));
    assert!(text.ends_with("record 4\n"));
}

#[test]
fn test_startup_scan_adopts_existing_archive() {
    let dir = tempdir().unwrap();
    let base = dir.path().join("node");
    std::fs::write(dir.path().join("node-1480-2024-03-15-10.log.gz"), b"x").unwrap();
    std::fs::write(dir.path().join("node-1480-2024-03-15-11.log.gz"), b"y").unwrap();
    std::fs::write(dir.path().join("node-junk"), b"z").unwrap();
    std::fs::write(dir.path().join("node-latest.log"), b"old mirror").unwrap();

    let clock = Arc::new(MockClock::with_time(noon()));
    let logger = FileLogger::with_clock(config(base), clock).unwrap();
    logger.start();
    wait_until(|| logger.list_available_logs().len() == 3);

    let entries = logger.list_available_logs();
    assert_eq!(entries[0].filename, "node-1480-2024-03-15-10.log.gz");
    assert_eq!(entries[1].filename, "node-1480-2024-03-15-11.log.gz");
    assert_eq!(entries[2].filename, "node-1480-2024-03-15-12.log.gz");
    // Junk under the prefix is gone; the stale mirror moved aside
    assert!(!dir.path().join("node-junk").exists());
    assert!(!dir.path().join("node-latest.log").exists() || {
        // the writer reopened latest for the new session
        std::fs::read(dir.path().join("node-latest.log")).unwrap() != b"old mirror"
    });
    assert_eq!(
        std::fs::read(dir.path().join("node-previous.log")).unwrap(),
        b"old mirror"
    );

    logger.delete_all_old_log_files();
    assert!(!dir.path().join("node-1480-2024-03-15-10.log.gz").exists());
    assert!(!dir.path().join("node-1480-2024-03-15-11.log.gz").exists());

    assert!(logger.close_and_drain());
}

#[test]
fn test_switch_base_filename_at_rotation() {
    let dir = tempdir().unwrap();
    let base = dir.path().join("node");
    let clock = Arc::new(MockClock::with_time(noon()));
    let logger = FileLogger::with_clock(config(base), clock).unwrap();
    logger.start();

    logger.switch_base_filename(dir.path().join("renamed"));
    // Nudge the writer out of its wait so it reaches the rotation check
    logger.enqueue("nudge\n");
    logger.wait_for_switch();

    // The switch rotates into the next window under the new base
    let new_file = dir.path().join("renamed-1480-2024-03-15-13.log.gz");
    wait_until(|| new_file.exists());
    let entries = logger.list_available_logs();
    assert_eq!(entries.last().unwrap().filename, "renamed-1480-2024-03-15-13.log.gz");

    assert!(logger.close_and_drain());
    // The pre-switch file was archived under the old base; the nudge
    // record landed either just before or just after the rotation
    let old_content = gunzip(&dir.path().join("node-1480-2024-03-15-12.log.gz"));
    assert_eq!(&old_content[..3], BOM);
    let new_content = gunzip(&new_file);
    assert_eq!(&new_content[..3], BOM);
    let combined = [&old_content[3..], &new_content[3..]].concat();
    assert_eq!(combined, b"nudge\n");
    // The mirror follows the new base
    assert!(dir.path().join("renamed-latest.log").exists());
}
