//! Error types for the logger

use thiserror::Error;

/// Errors surfaced to callers at construction time
///
/// Runtime I/O failures are never propagated to producers; the writer
/// thread recovers from them locally with retry and backoff.
#[derive(Debug, Error)]
pub enum LoggerError {
    /// The rotation interval string could not be parsed
    #[error("invalid rotation interval {0:?}")]
    InvalidInterval(String),

    /// I/O error while setting up the logger
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
