//! Archive of rotated log files
//!
//! Tracks every closed, rotated file on disk together with its time span
//! and size, and enforces a byte quota by deleting the oldest files.
//! The live (in-progress) file is tracked separately and never counts
//! against the quota.
//!
//! Two cooperating mutexes guard the state: `totals` (byte total +
//! quota, also serializing trim) and `files` (the file list + live-file
//! bookkeeping). Acquisition order is totals-then-files, always.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

pub(crate) mod scan;

/// One rotated log file on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OldLogFile {
    pub filename: PathBuf,
    /// Inclusive span start
    pub start: DateTime<Utc>,
    /// Exclusive span end
    pub end: DateTime<Utc>,
    pub size: u64,
}

/// The live file the writer is currently appending to
#[derive(Debug, Clone)]
pub struct CurrentLogFile {
    pub filename: PathBuf,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

struct Totals {
    total_bytes: u64,
    max_bytes: u64,
}

struct FileList {
    old: VecDeque<OldLogFile>,
    current: Option<CurrentLogFile>,
}

/// Insertion-ordered index of rotated files with a disk quota
pub struct ArchiveIndex {
    totals: Mutex<Totals>,
    files: Mutex<FileList>,
}

impl ArchiveIndex {
    pub fn new(max_bytes: u64) -> Self {
        Self {
            totals: Mutex::new(Totals {
                total_bytes: 0,
                max_bytes,
            }),
            files: Mutex::new(FileList {
                old: VecDeque::new(),
                current: None,
            }),
        }
    }

    /// Append a rotated file to the back of the index
    pub fn append(&self, olf: OldLogFile) {
        let mut totals = self.totals.lock();
        totals.total_bytes += olf.size;
        self.files.lock().old.push_back(olf);
    }

    /// Record the live file the writer is appending to
    pub fn set_current(&self, filename: PathBuf, start: DateTime<Utc>, end: DateTime<Utc>) {
        self.files.lock().current = Some(CurrentLogFile {
            filename,
            start,
            end,
        });
    }

    /// Remove the newest entry if it names `filename`. Used at startup:
    /// the scanner may have indexed the file that is about to become the
    /// live file again.
    pub fn pop_last_if_named(&self, filename: &Path) {
        let mut totals = self.totals.lock();
        let mut files = self.files.lock();
        if files.old.back().is_some_and(|olf| olf.filename == filename) {
            if let Some(olf) = files.old.pop_back() {
                totals.total_bytes -= olf.size;
            }
        }
    }

    /// Delete the oldest files until the byte total is within the quota.
    ///
    /// Serialized on the totals lock; the files lock is only held for
    /// the pop itself, never across disk I/O.
    pub fn trim(&self) {
        let mut totals = self.totals.lock();
        while totals.total_bytes > totals.max_bytes {
            let olf = self.files.lock().old.pop_front();
            let Some(olf) = olf else {
                tracing::error!(
                    total_bytes = totals.total_bytes,
                    "inconsistent archive totals: file list is empty but bytes remain accounted"
                );
                return;
            };
            if let Err(e) = std::fs::remove_file(&olf.filename) {
                tracing::warn!(
                    path = %olf.filename.display(),
                    error = %e,
                    "failed to delete rotated log file"
                );
            }
            totals.total_bytes -= olf.size;
            tracing::debug!(
                path = %olf.filename.display(),
                saved = olf.size,
                disk_usage = totals.total_bytes,
                quota = totals.max_bytes,
                "deleted old log file"
            );
        }
    }

    /// Drain the whole archive, deleting every rotated file
    pub fn delete_all(&self) {
        let mut totals = self.totals.lock();
        loop {
            let olf = self.files.lock().old.pop_front();
            let Some(olf) = olf else { return };
            if let Err(e) = std::fs::remove_file(&olf.filename) {
                tracing::warn!(
                    path = %olf.filename.display(),
                    error = %e,
                    "failed to delete rotated log file"
                );
            }
            totals.total_bytes -= olf.size;
        }
    }

    /// Copy of the rotated-file list, oldest first
    pub fn snapshot(&self) -> Vec<OldLogFile> {
        self.files.lock().old.iter().cloned().collect()
    }

    /// The live file, if the writer has opened one
    pub fn current(&self) -> Option<CurrentLogFile> {
        self.files.lock().current.clone()
    }

    /// Sum of rotated file sizes currently accounted
    pub fn total_bytes(&self) -> u64 {
        self.totals.lock().total_bytes
    }

    /// Update the quota and trim on a background thread, so callers are
    /// not blocked on disk deletions.
    pub fn set_max_bytes(self: Arc<Self>, max_bytes: u64) {
        self.totals.lock().max_bytes = max_bytes;
        let index = Arc::clone(&self);
        let spawned = std::thread::Builder::new()
            .name("shrink-logs".into())
            .spawn(move || index.trim());
        if let Err(e) = spawned {
            tracing::warn!(error = %e, "failed to spawn trim thread; trimming inline");
            self.trim();
        }
    }

    /// Replace the filename of any entry currently named `from`,
    /// preserving its span and size. Used when the startup scanner
    /// renames a colliding file out of the way.
    pub(crate) fn rename_entries(&self, from: &Path, to: &Path) {
        let mut files = self.files.lock();
        for olf in files.old.iter_mut() {
            if olf.filename == from {
                olf.filename = to.to_path_buf();
            }
        }
    }
}
