//! peerlog - rotating compressed file logger
//!
//! Absorbs bursty log traffic from a long-running peer node without
//! blocking producer threads, without losing ordering under load, and
//! without letting a stuck disk block forward progress. Producers submit
//! preformatted records; a single background writer drains a bounded
//! in-memory buffer into a compressed, rotating log file (plus an
//! optional uncompressed `-latest.log` mirror), keeps the on-disk
//! archive of rotated files within a byte quota, and shuts down by
//! draining the buffer within a deadline.
//!
//! # Architecture
//!
//! ```text
//! [producers] --enqueue--> [BoundedLogBuffer] --> [writer thread]
//!                                                   |        |
//!                                            [SinkStream] [RotationClock]
//!                                                   |        |
//!                                          <base>-<build>-Y-M-D-H.log.gz
//!                                                   |
//!                                            [ArchiveIndex] -> quota trim
//! ```
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `buffer` | Bounded multi-producer queue, drop-with-marker overload policy |
//! | `writer` | Writer thread, rotation, shutdown handshake, `FileLogger` handle |
//! | `rotation` | Interval grammar and GMT boundary alignment |
//! | `filename` | Rotated filename encoding/decoding |
//! | `archive` | Rotated-file index, disk quota, startup directory scan |
//! | `sink` | Gzip/plain file sinks with BOM prefix and retry-forever writes |
//! | `report` | Archive listing and by-date log export |
//! | `template` | Compiled line templates for external formatters |
//!
//! # Example
//!
//! ```ignore
//! use peerlog::{FileLogger, LoggerConfig};
//!
//! let logger = FileLogger::new(LoggerConfig {
//!     base_path: "/var/log/node".into(),
//!     interval: "1HOUR".into(),
//!     build_number: 1480,
//!     ..LoggerConfig::default()
//! })?;
//! logger.start();
//! logger.enqueue("formatted record\n");
//!
//! // at shutdown, from the host's shutdown hook:
//! logger.close_and_drain();
//! ```

/// Bounded multi-producer record buffer with byte accounting
pub mod buffer;

/// Time source abstraction (system clock, mock clock for tests)
pub mod clock;

/// Logger configuration
pub mod config;

/// Constructor-time error types
pub mod error;

/// Rotated log filename encoding and decoding
pub mod filename;

/// Archive of rotated files: index, quota, startup scan
pub mod archive;

/// Archive reports: listing and by-date export
pub mod report;

/// Rotation interval parsing and GMT boundary alignment
pub mod rotation;

/// File sinks: gzip layering, BOM prefix, retry-forever writes
pub mod sink;

/// Line format templates for external formatters
pub mod template;

/// The writer thread and the producer-facing `FileLogger` handle
pub mod writer;

pub use archive::{ArchiveIndex, OldLogFile};
pub use buffer::{BoundedLogBuffer, LINE_OVERHEAD};
pub use clock::{Clock, MockClock, SystemClock};
pub use config::LoggerConfig;
pub use error::LoggerError;
pub use report::LogFileEntry;
pub use rotation::{Interval, IntervalUnit, RotationClock};
pub use sink::{SinkStream, BOM};
pub use template::{Directive, Instruction, LineTemplate};
pub use writer::FileLogger;
