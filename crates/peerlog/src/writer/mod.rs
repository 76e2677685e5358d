//! The rotating file logger and its writer thread
//!
//! `FileLogger` is the producer-facing handle: `enqueue` never blocks
//! beyond the buffer mutex and never fails. A single dedicated writer
//! thread drains the buffer, writes to the compressed primary file (and
//! the optional uncompressed `-latest.log` mirror), rotates on GMT
//! boundary crossings, hands rotated files to the archive, and shuts
//! down by draining within the closer's deadline.
//!
//! ```text
//! [producers] --enqueue--> [BoundedLogBuffer] --drain--> [writer thread]
//!                                                          |  rotate
//!                                                          v
//!                                       [primary .log.gz] [mirror -latest.log]
//!                                                          |
//!                                                   [ArchiveIndex] --trim--> deleted
//! ```

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex};
use regex::Regex;

use crate::archive::scan::{scan_old_log_files, ScanContext};
use crate::archive::{ArchiveIndex, OldLogFile};
use crate::buffer::{BoundedLogBuffer, WaitOutcome};
use crate::clock::{Clock, SystemClock};
use crate::config::LoggerConfig;
use crate::error::LoggerError;
use crate::filename;
use crate::report::{self, LogFileEntry};
use crate::rotation::{Interval, RotationClock};
use crate::sink::{self, SinkStream};

/// How long the closer waits for the writer to drain and close
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// How long `wait_for_switch` waits for the writer to pick up a pending
/// base-path change
const SWITCH_WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// One-shot cross-thread request to rename the base path at the next
/// rotation check
struct SwitchState {
    pending: Mutex<Option<PathBuf>>,
    cond: Condvar,
}

impl SwitchState {
    fn new() -> Self {
        Self {
            pending: Mutex::new(None),
            cond: Condvar::new(),
        }
    }

    fn request(&self, base: PathBuf) {
        *self.pending.lock() = Some(base);
    }

    fn is_pending(&self) -> bool {
        self.pending.lock().is_some()
    }

    /// Read the requested base path without consuming the request; the
    /// request stays pending until `complete` so waiters observe the
    /// whole rotation.
    fn pending_base(&self) -> Option<PathBuf> {
        self.pending.lock().clone()
    }

    fn complete(&self) {
        *self.pending.lock() = None;
        self.cond.notify_all();
    }

    fn wait_done(&self, timeout: Duration) {
        let mut pending = self.pending.lock();
        let deadline = Instant::now() + timeout;
        while pending.is_some() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return;
            }
            self.cond.wait_for(&mut pending, remaining);
        }
    }
}

/// Where the writer thread sends records
enum Output {
    /// Rotating compressed files next to `base`
    Rotating { base: PathBuf },
    /// A single pre-opened sink, no rotation bookkeeping
    Stream(Box<dyn SinkStream>),
}

/// State handed to the writer thread at `start`
struct WriterSeed {
    output: Output,
    interval: Interval,
    build_number: u32,
    mirror: bool,
    overwrite: bool,
    clock: Arc<dyn Clock>,
}

/// Asynchronous rotating compressed file logger
///
/// Producers hand preformatted newline-terminated records to `enqueue`;
/// everything else happens on the writer thread. Overload is absorbed by
/// bounded loss with an operator-visible marker, never by blocking the
/// producers (see the buffer module).
pub struct FileLogger {
    buffer: Arc<BoundedLogBuffer>,
    archive: Arc<ArchiveIndex>,
    switch: Arc<SwitchState>,
    flush_ms: Arc<AtomicU64>,
    host_ident: String,
    seed: Mutex<Option<WriterSeed>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl FileLogger {
    /// Create a rotating logger. Fails only on configuration errors;
    /// all runtime I/O failures are absorbed by the writer thread.
    pub fn new(config: LoggerConfig) -> Result<Self, LoggerError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a rotating logger with an explicit time source
    pub fn with_clock(config: LoggerConfig, clock: Arc<dyn Clock>) -> Result<Self, LoggerError> {
        let output = Output::Rotating {
            base: config.base_path.clone(),
        };
        Self::build(config, output, clock)
    }

    /// Create a non-rotating logger writing to a pre-opened sink
    pub fn with_stream(
        config: LoggerConfig,
        stream: Box<dyn SinkStream>,
    ) -> Result<Self, LoggerError> {
        Self::build(config, Output::Stream(stream), Arc::new(SystemClock))
    }

    fn build(
        config: LoggerConfig,
        output: Output,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, LoggerError> {
        let interval = Interval::parse(&config.interval)?;
        Ok(Self {
            buffer: Arc::new(BoundedLogBuffer::new(
                config.max_list_size,
                config.max_list_bytes,
            )),
            archive: Arc::new(ArchiveIndex::new(config.max_old_logs_bytes)),
            switch: Arc::new(SwitchState::new()),
            flush_ms: Arc::new(AtomicU64::new(config.flush_ms)),
            host_ident: config.host_ident,
            seed: Mutex::new(Some(WriterSeed {
                output,
                interval,
                build_number: config.build_number,
                mirror: config.mirror,
                overwrite: config.overwrite,
                clock,
            })),
            handle: Mutex::new(None),
        })
    }

    /// Launch the writer thread. A second call is a no-op.
    pub fn start(&self) {
        let Some(seed) = self.seed.lock().take() else {
            tracing::warn!("log writer already started");
            return;
        };
        let writer = WriterLoop {
            buffer: Arc::clone(&self.buffer),
            archive: Arc::clone(&self.archive),
            switch: Arc::clone(&self.switch),
            flush_ms: Arc::clone(&self.flush_ms),
            interval: seed.interval,
            build_number: seed.build_number,
            mirror: seed.mirror,
            overwrite: seed.overwrite,
            clock: seed.clock,
        };
        let spawned = std::thread::Builder::new()
            .name("log-file-writer".into())
            .spawn(move || writer.run(seed.output));
        match spawned {
            Ok(handle) => *self.handle.lock() = Some(handle),
            Err(e) => tracing::error!(error = %e, "failed to spawn log writer thread"),
        }
    }

    /// Enqueue one preformatted, newline-terminated record. Never
    /// blocks beyond the buffer mutex; overload drops old records.
    pub fn enqueue(&self, record: impl Into<Bytes>) {
        self.buffer.enqueue(record);
    }

    /// Request shutdown; idempotent and non-blocking
    pub fn close(&self) {
        self.buffer.close();
    }

    /// Shutdown-hook job: request shutdown and wait up to ten seconds
    /// for the writer to drain the buffer and close the files. Returns
    /// whether the drain completed; records still buffered at the
    /// deadline are lost.
    pub fn close_and_drain(&self) -> bool {
        let drained = self.buffer.close_and_wait(SHUTDOWN_DRAIN_TIMEOUT);
        if drained {
            tracing::info!("completed writing logs to disk");
        } else {
            tracing::warn!(
                pending_bytes = self.buffer.bytes(),
                "log drain deadline expired with records still buffered"
            );
        }
        drained
    }

    /// Update the buffer byte bound
    pub fn set_max_list_bytes(&self, max_bytes: u64) {
        self.buffer.set_max_bytes(max_bytes);
    }

    /// Update the flush window: everything hits disk within this period
    /// unless the writer is saturated
    pub fn set_max_backlog_not_busy(&self, ms: u64) {
        self.flush_ms.store(ms, Ordering::Relaxed);
    }

    /// Update the archive quota; trimming runs off-thread
    pub fn set_max_old_logs_size(&self, max_bytes: u64) {
        Arc::clone(&self.archive).set_max_bytes(max_bytes);
    }

    /// Request a base-path change, applied at the next rotation check
    pub fn switch_base_filename(&self, base: impl Into<PathBuf>) {
        self.switch.request(base.into());
    }

    /// Wait (bounded) until a requested base-path change has been
    /// applied by the writer
    pub fn wait_for_switch(&self) {
        self.switch.wait_done(SWITCH_WAIT_TIMEOUT);
    }

    /// Delete every rotated file in the archive
    pub fn delete_all_old_log_files(&self) {
        self.archive.delete_all();
    }

    /// Structured listing of rotated files plus the live file
    pub fn list_available_logs(&self) -> Vec<LogFileEntry> {
        report::list_available_logs(&self.archive)
    }

    /// Stream the log files whose span contains `time` to `out`,
    /// optionally line-filtered by `pattern` (gzip-wrapped output)
    pub fn send_log_by_contained_date(
        &self,
        time: DateTime<Utc>,
        out: &mut dyn io::Write,
        pattern: Option<&Regex>,
    ) -> io::Result<()> {
        report::send_log_by_contained_date(&self.archive, time, out, pattern)
    }

    /// Currently accounted buffer bytes
    pub fn list_bytes(&self) -> u64 {
        self.buffer.bytes()
    }

    /// Host identity token for external formatters (the `u` directive)
    pub fn host_ident(&self) -> &str {
        &self.host_ident
    }
}

/// The single-consumer drain loop
struct WriterLoop {
    buffer: Arc<BoundedLogBuffer>,
    archive: Arc<ArchiveIndex>,
    switch: Arc<SwitchState>,
    flush_ms: Arc<AtomicU64>,
    interval: Interval,
    build_number: u32,
    mirror: bool,
    overwrite: bool,
    clock: Arc<dyn Clock>,
}

fn mirror_file(base: &Path, suffix: &str) -> PathBuf {
    PathBuf::from(format!("{}-{}.log", base.display(), suffix))
}

impl WriterLoop {
    fn run(self, output: Output) {
        match output {
            Output::Rotating { base } => self.run_rotating(base),
            Output::Stream(stream) => self.run_stream(stream),
        }
    }

    fn flush_delay(&self) -> Duration {
        Duration::from_millis(self.flush_ms.load(Ordering::Relaxed))
    }

    /// Non-rotating mode: drain into one pre-opened sink
    fn run_stream(self, mut primary: Box<dyn SinkStream>) {
        let mut waiting_since = None;
        loop {
            match self
                .buffer
                .await_record(&*self.clock, self.flush_delay(), &mut waiting_since)
            {
                WaitOutcome::Closed => {
                    sink::write_with_retry(&mut *primary, None);
                    sink::close(primary);
                    self.buffer.mark_closed_finished();
                    return;
                }
                WaitOutcome::TimeoutFlush => sink::write_with_retry(&mut *primary, None),
                WaitOutcome::Record(record) => {
                    sink::write_with_retry(&mut *primary, Some(&record))
                }
            }
        }
    }

    fn run_rotating(self, mut base: PathBuf) {
        let mut latest = mirror_file(&base, "latest");
        let mut previous = mirror_file(&base, "previous");
        let with_minute = self.interval.has_minute_field();

        let now = self.clock.now_utc();
        let mut clock_state = RotationClock::new(self.interval, now);
        let mut current_file = filename::encode(
            &base,
            self.build_number,
            clock_state.start(),
            with_minute,
            None,
            true,
        );

        scan_old_log_files(
            &self.archive,
            &ScanContext {
                base: &base,
                build_number: self.build_number,
                interval: self.interval,
                current_file: &current_file,
                current_start: clock_state.start(),
                latest_file: &latest,
                previous_file: &previous,
                now,
            },
        );
        // The scanner may have indexed the file we are about to resume
        self.archive.pop_last_if_named(&current_file);
        self.archive
            .set_current(current_file.clone(), clock_state.start(), clock_state.end());

        let mut primary = sink::open_with_retry(&current_file, true, self.overwrite);
        let mut mirror_sink = self
            .mirror
            .then(|| sink::open_with_retry(&latest, false, self.overwrite));
        tracing::info!(
            path = %current_file.display(),
            next_rotation = %clock_state.end(),
            "created log files"
        );

        let mut waiting_since = None;
        loop {
            let now = self.clock.now_utc();
            if clock_state.is_due(now) || self.switch.is_pending() {
                // ---- rotation ----
                let switched_to = self.switch.pending_base();
                if let Some(new_base) = &switched_to {
                    base = new_base.clone();
                }
                let old_start = clock_state.start();
                let old_end = clock_state.end();
                clock_state.advance();
                let new_file = filename::encode(
                    &base,
                    self.build_number,
                    clock_state.start(),
                    with_minute,
                    None,
                    true,
                );

                if let Err(e) = primary.flush() {
                    tracing::error!(error = %e, "flushing on rotation failed");
                }
                sink::close(primary);

                let length = std::fs::metadata(&current_file)
                    .map(|m| m.len())
                    .unwrap_or(0);
                self.archive.append(OldLogFile {
                    filename: current_file.clone(),
                    start: old_start,
                    end: old_end,
                    size: length,
                });
                self.archive
                    .set_current(new_file.clone(), clock_state.start(), clock_state.end());
                self.archive.trim();

                current_file = new_file;
                primary = sink::open_with_retry(&current_file, true, self.overwrite);

                if let Some(old_mirror) = mirror_sink.take() {
                    sink::close(old_mirror);
                    if latest.exists() {
                        if let Err(e) = std::fs::rename(&latest, &previous) {
                            tracing::warn!(
                                from = %latest.display(),
                                error = %e,
                                "failed to rotate mirror file"
                            );
                        }
                    }
                    // Covers a failed rename; usually already gone
                    let _ = std::fs::remove_file(&latest);
                    if switched_to.is_some() {
                        latest = mirror_file(&base, "latest");
                        previous = mirror_file(&base, "previous");
                    }
                    mirror_sink = Some(sink::open_with_retry(&latest, false, self.overwrite));
                }
                if switched_to.is_some() {
                    self.switch.complete();
                }
                tracing::info!(
                    path = %current_file.display(),
                    next_rotation = %clock_state.end(),
                    "rotated log file"
                );
            }

            match self
                .buffer
                .await_record(&*self.clock, self.flush_delay(), &mut waiting_since)
            {
                WaitOutcome::Closed => {
                    sink::write_with_retry(&mut *primary, None);
                    if let Some(m) = mirror_sink.as_deref_mut() {
                        sink::write_with_retry(m, None);
                    }
                    sink::close(primary);
                    if let Some(m) = mirror_sink.take() {
                        sink::close(m);
                    }
                    self.buffer.mark_closed_finished();
                    return;
                }
                WaitOutcome::TimeoutFlush => {
                    sink::write_with_retry(&mut *primary, None);
                    if let Some(m) = mirror_sink.as_deref_mut() {
                        sink::write_with_retry(m, None);
                    }
                }
                WaitOutcome::Record(record) => {
                    sink::write_with_retry(&mut *primary, Some(&record));
                    if let Some(m) = mirror_sink.as_deref_mut() {
                        sink::write_with_retry(m, Some(&record));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "writer_test.rs"]
mod writer_test;
