//! Output sinks for log files
//!
//! A sink is one open physical file, optionally gzip-wrapped. Compressed
//! sinks layer `BufWriter(512 KiB) -> gzip -> BufWriter(64 KiB)` so the
//! gzip stream sees block-sized writes and the filesystem sees large
//! writes. Every newly opened file starts with a UTF-8 byte-order mark.
//!
//! The writer thread's job is to eventually persist: open and write
//! failures are retried forever with exponential backoff (1 s doubling,
//! capped at 60 s), never propagated. A wedged disk stalls the writer
//! thread, not the producers.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use flate2::write::GzEncoder;
use flate2::Compression;

/// UTF-8 byte-order mark written as the first bytes of every file
pub const BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// Buffer in front of the filesystem
const FILE_BUFFER_SIZE: usize = 512 * 1024;

/// Buffer in front of the gzip encoder (gzip block size is 32 KiB)
const GZIP_BUFFER_SIZE: usize = 64 * 1024;

/// Initial retry sleep for failed opens and writes
const INITIAL_RETRY_SLEEP: Duration = Duration::from_secs(1);

/// Retry sleep cap; check roughly every minute
const MAX_RETRY_SLEEP: Duration = Duration::from_secs(60);

/// An open, writable log output stream backing one physical file
pub trait SinkStream: Write + Send {
    /// Flush buffered data and finalize the stream (for gzip, write the
    /// trailer). Consumes the sink.
    fn finish(self: Box<Self>) -> io::Result<()>;
}

struct PlainSink {
    inner: BufWriter<File>,
}

impl Write for PlainSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl SinkStream for PlainSink {
    fn finish(mut self: Box<Self>) -> io::Result<()> {
        self.inner.flush()
    }
}

struct GzipSink {
    inner: BufWriter<GzEncoder<BufWriter<File>>>,
}

impl Write for GzipSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl SinkStream for GzipSink {
    fn finish(self: Box<Self>) -> io::Result<()> {
        let encoder = self.inner.into_inner().map_err(|e| e.into_error())?;
        let mut file_buffer = encoder.finish()?;
        file_buffer.flush()
    }
}

fn try_open(path: &Path, compress: bool, overwrite: bool) -> io::Result<Box<dyn SinkStream>> {
    let file = File::options()
        .create(true)
        .write(true)
        .append(!overwrite)
        .truncate(overwrite)
        .open(path)?;
    let mut sink: Box<dyn SinkStream> = if compress {
        let file_buffer = BufWriter::with_capacity(FILE_BUFFER_SIZE, file);
        let encoder = GzEncoder::new(file_buffer, Compression::default());
        Box::new(GzipSink {
            inner: BufWriter::with_capacity(GZIP_BUFFER_SIZE, encoder),
        })
    } else {
        Box::new(PlainSink {
            inner: BufWriter::with_capacity(FILE_BUFFER_SIZE, file),
        })
    };
    sink.write_all(&BOM)?;
    Ok(sink)
}

/// Open a sink, retrying forever with backoff on failure
pub fn open_with_retry(path: &Path, compress: bool, overwrite: bool) -> Box<dyn SinkStream> {
    let mut sleep = INITIAL_RETRY_SLEEP;
    loop {
        match try_open(path, compress, overwrite) {
            Ok(sink) => return sink,
            Err(e) => {
                tracing::error!(
                    path = %path.display(),
                    error = %e,
                    retry_in = ?sleep,
                    "could not open log file"
                );
                std::thread::sleep(sleep);
                sleep = (sleep * 2).min(MAX_RETRY_SLEEP);
            }
        }
    }
}

/// Write `bytes` to the sink, or flush it when `bytes` is `None`,
/// retrying forever with backoff. There is no give-up: the disk being
/// temporarily full must not lose records that already reached the
/// writer.
pub fn write_with_retry(sink: &mut dyn SinkStream, bytes: Option<&[u8]>) {
    let mut sleep = INITIAL_RETRY_SLEEP;
    loop {
        let result = match bytes {
            Some(b) => sink.write_all(b),
            None => sink.flush(),
        };
        match result {
            Ok(()) => return,
            Err(e) => {
                tracing::error!(error = %e, retry_in = ?sleep, "log write failed");
                std::thread::sleep(sleep);
                sleep = (sleep * 2).min(MAX_RETRY_SLEEP);
            }
        }
    }
}

/// Flush and close a sink; errors are logged, not propagated
pub fn close(sink: Box<dyn SinkStream>) {
    if let Err(e) = sink.finish() {
        tracing::error!(error = %e, "failed to close log stream");
    }
}
