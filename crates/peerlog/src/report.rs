//! Archive report generation
//!
//! Readers of the archive metadata: a structured listing of every log
//! file on disk, and a streaming export of the files whose span contains
//! a requested instant, optionally line-filtered through a regex with
//! the output gzip-wrapped.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use regex::Regex;

use crate::archive::{ArchiveIndex, OldLogFile};

/// Keep-alive marker cadence while filtering long files
const WAIT_MARKER_INTERVAL: std::time::Duration = std::time::Duration::from_secs(5);

/// One row of the available-logs report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFileEntry {
    pub filename: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub size: u64,
}

fn entry_from(olf: &OldLogFile) -> LogFileEntry {
    LogFileEntry {
        filename: olf
            .filename
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        start: olf.start,
        end: olf.end,
        size: olf.size,
    }
}

/// List every rotated file plus the live file (last), oldest first
pub fn list_available_logs(archive: &ArchiveIndex) -> Vec<LogFileEntry> {
    let mut entries: Vec<LogFileEntry> = archive.snapshot().iter().map(entry_from).collect();
    if let Some(current) = archive.current() {
        let size = std::fs::metadata(&current.filename)
            .map(|m| m.len())
            .unwrap_or(0);
        entries.push(entry_from(&OldLogFile {
            filename: current.filename,
            start: current.start,
            end: current.end,
            size,
        }));
    }
    entries
}

/// Stream every log file whose span contains `time` to `out`.
///
/// Without a pattern the files are sent raw, each preceded by
/// `Log:`/`LENGTH:` headers after an initial `LogCount:` line. With a
/// pattern the remainder of the stream is gzip-wrapped and each matching
/// line is sent as `MATCH:<line>`, with `WAIT` keep-alives while long
/// stretches produce no match, terminated by `EndLogFiltered`.
pub fn send_log_by_contained_date(
    archive: &ArchiveIndex,
    time: DateTime<Utc>,
    out: &mut dyn Write,
    pattern: Option<&Regex>,
) -> io::Result<()> {
    let mut matching: Vec<OldLogFile> = archive
        .snapshot()
        .into_iter()
        .filter(|olf| olf.start <= time && time < olf.end)
        .collect();
    if let Some(current) = archive.current() {
        if current.start <= time && time < current.end {
            let size = std::fs::metadata(&current.filename)
                .map(|m| m.len())
                .unwrap_or(0);
            matching.push(OldLogFile {
                filename: current.filename,
                start: current.start,
                end: current.end,
                size,
            });
        }
    }
    if matching.is_empty() {
        tracing::info!(time = %time, "no log file contains the requested instant");
        return Ok(());
    }

    match pattern {
        None => {
            writeln!(out, "LogCount:{}", matching.len())?;
            for olf in &matching {
                writeln!(out, "Log:{}", entry_from(olf).filename)?;
                writeln!(out, "LENGTH: {}", olf.size)?;
                out.flush()?;
                // Send exactly the recorded size; the live file may
                // still be growing past it.
                let file = File::open(&olf.filename)?;
                io::copy(&mut file.take(olf.size), out)?;
            }
            out.flush()
        }
        Some(pattern) => {
            let mut gz = GzEncoder::new(out, Compression::default());
            let mut last_sent = std::time::Instant::now();
            for olf in &matching {
                let file = match File::open(&olf.filename) {
                    Ok(f) => f,
                    Err(e) => {
                        tracing::warn!(
                            path = %olf.filename.display(),
                            error = %e,
                            "aborting filtered export, could not open log file"
                        );
                        return abort_filtered(gz);
                    }
                };
                let reader = BufReader::new(GzDecoder::new(BufReader::new(file)));
                for line in reader.lines() {
                    let line = match line {
                        Ok(line) => line,
                        // A truncated stream ends the file like a clean EOF
                        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                        Err(e) => {
                            tracing::warn!(
                                path = %olf.filename.display(),
                                error = %e,
                                "aborting filtered export, error reading log file"
                            );
                            return abort_filtered(gz);
                        }
                    };
                    if pattern.is_match(&line) {
                        writeln!(gz, "MATCH:{}", line)?;
                        last_sent = std::time::Instant::now();
                    } else if last_sent.elapsed() > WAIT_MARKER_INTERVAL {
                        writeln!(gz, "WAIT")?;
                        gz.flush()?;
                        last_sent = std::time::Instant::now();
                    }
                }
            }
            writeln!(gz, "EndLogFiltered")?;
            gz.finish()?.flush()
        }
    }
}

/// Abort a filtered export: the error marker takes the place of the
/// `EndLogFiltered` terminator, so readers can tell the stream was cut
/// short rather than completed.
fn abort_filtered(mut gz: GzEncoder<&mut dyn Write>) -> io::Result<()> {
    writeln!(gz, "Error:IOException")?;
    gz.finish()?.flush()
}
