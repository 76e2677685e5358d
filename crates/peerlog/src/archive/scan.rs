//! Startup scan of the log directory
//!
//! Runs once before the first log file opens: reconstructs the archive
//! index from the rotated files already on disk, cleans up anything
//! unrecognized under the log prefix, resolves a name collision with the
//! file about to be opened, and trims to the quota.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::{ArchiveIndex, OldLogFile};
use crate::filename::{self, ROTATED_SUFFIX};
use crate::rotation::Interval;

/// What the scanner needs to know about the writer's startup state
pub(crate) struct ScanContext<'a> {
    pub base: &'a Path,
    pub build_number: u32,
    pub interval: Interval,
    /// The filename the writer is about to open for the current boundary
    pub current_file: &'a Path,
    /// Boundary start of the current window (for collision renames)
    pub current_start: DateTime<Utc>,
    pub latest_file: &'a Path,
    pub previous_file: &'a Path,
    pub now: DateTime<Utc>,
}

/// Inspect the log directory and rebuild the archive index.
///
/// Filesystem problems are logged and the scan proceeds; a missing or
/// unreadable directory simply yields an empty index.
pub(crate) fn scan_old_log_files(index: &ArchiveIndex, ctx: &ScanContext<'_>) {
    let dir = match ctx.base.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let prefix = ctx
        .base
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if ctx.latest_file.exists() {
        if let Err(e) = std::fs::rename(ctx.latest_file, ctx.previous_file) {
            tracing::warn!(
                from = %ctx.latest_file.display(),
                to = %ctx.previous_file.display(),
                error = %e,
                "failed to rotate latest log to previous"
            );
        }
    }

    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "could not list log directory");
            return;
        }
    };
    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().into_string().ok())
        .collect();
    names.sort();

    let latest_name = ctx.latest_file.file_name().map(|n| n.to_os_string());
    let previous_name = ctx.previous_file.file_name().map(|n| n.to_os_string());
    let with_minute = ctx.interval.has_minute_field();

    let mut last_start: Option<DateTime<Utc>> = None;
    let mut same_times: Vec<PathBuf> = Vec::new();

    for name in names {
        let lower = name.to_lowercase();
        if !lower.starts_with(&prefix) {
            tracing::debug!(name = %name, "unrelated file in log directory");
            continue;
        }
        let path = dir.join(&name);
        if latest_name.as_deref() == path.file_name() || previous_name.as_deref() == path.file_name()
        {
            continue;
        }
        if !lower.ends_with(ROTATED_SUFFIX) {
            tracing::debug!(path = %path.display(), "deleting non-rotated file under log prefix");
            delete(&path);
            continue;
        }
        let stem = &name[..name.len() - ROTATED_SUFFIX.len()];
        let Some(stem) = strip_base_prefix(stem, &prefix) else {
            tracing::debug!(path = %path.display(), "deleting unrecognized log file");
            delete(&path);
            continue;
        };
        let Some(decoded) = filename::decode(stem, with_minute) else {
            tracing::debug!(path = %path.display(), "deleting undecodable log file");
            delete(&path);
            continue;
        };

        if last_start != Some(decoded.start) {
            if let Some(group_start) = last_start {
                append_group(index, &mut same_times, group_start, decoded.start);
            }
            last_start = Some(decoded.start);
        }
        same_times.push(path);
    }
    if let Some(group_start) = last_start {
        append_group(index, &mut same_times, group_start, ctx.now);
    }

    resolve_collision(index, ctx);
    index.trim();
}

/// Strip `<prefix>-` case-insensitively; `None` marks the file as
/// unrecognized.
fn strip_base_prefix<'a>(stem: &'a str, prefix: &str) -> Option<&'a str> {
    if stem.len() <= prefix.len() + 1 {
        return None;
    }
    let (head, tail) = stem.split_at(prefix.len());
    if !head.eq_ignore_ascii_case(prefix) {
        return None;
    }
    tail.strip_prefix('-')
}

fn append_group(
    index: &ArchiveIndex,
    group: &mut Vec<PathBuf>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) {
    for path in group.drain(..) {
        let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        index.append(OldLogFile {
            filename: path,
            start,
            end,
            size,
        });
    }
}

/// If a file already exists where the current log is about to open,
/// rename it to the lowest free disambiguation digit.
fn resolve_collision(index: &ArchiveIndex, ctx: &ScanContext<'_>) {
    if !ctx.current_file.exists() {
        return;
    }
    tracing::info!(
        path = %ctx.current_file.display(),
        "log file already exists for this boundary, renaming it aside"
    );
    for digit in 1.. {
        let candidate = filename::encode(
            ctx.base,
            ctx.build_number,
            ctx.current_start,
            ctx.interval.has_minute_field(),
            Some(digit),
            true,
        );
        if candidate.exists() {
            continue;
        }
        if let Err(e) = std::fs::rename(ctx.current_file, &candidate) {
            tracing::warn!(
                from = %ctx.current_file.display(),
                to = %candidate.display(),
                error = %e,
                "failed to rename colliding log file"
            );
        } else {
            index.rename_entries(ctx.current_file, &candidate);
        }
        return;
    }
}

fn delete(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!(path = %path.display(), error = %e, "failed to delete file");
    }
}
