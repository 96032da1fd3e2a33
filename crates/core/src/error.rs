//! Typed errors for the core layer.
//!
//! Capture input failures and configuration failures are separate enums so
//! callers can match on the exact failure mode instead of string-matching a
//! generic error.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure reading or decoding a capture source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Source path does not exist.
    #[error("source not found: {0}")]
    NotFound(PathBuf),

    /// Source path exists but is not readable by this process.
    #[error("permission denied reading {0}")]
    PermissionDenied(PathBuf),

    /// Source exceeds the configured maximum size.
    #[error("source is {size} bytes, exceeding the {max} byte limit")]
    TooLarge { size: u64, max: u64 },

    /// Source bytes are not valid UTF-8 text.
    #[error("source is not valid UTF-8 text: {0}")]
    InvalidEncoding(PathBuf),

    /// Any other I/O failure.
    #[error("io error: {0}")]
    Io(#[source] io::Error),
}

impl SourceError {
    /// Classify a read failure for `path` into the matching variant.
    pub fn from_io(path: &std::path::Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io(err),
        }
    }
}

/// Invalid configuration supplied by the caller.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Watch root missing, not a directory, or not expandable.
    #[error("invalid watch root {path}: {reason}")]
    WatchRoot { path: String, reason: String },

    /// Similarity threshold outside the open interval (0, 1).
    #[error("similarity threshold {0} must be within (0, 1)")]
    Threshold(f64),

    /// Quality weights negative or not summing to 1.
    #[error("quality weights must be non-negative and sum to 1.0 (sum was {0})")]
    Weights(f64),

    /// No file extensions configured for watching.
    #[error("watched file extensions must not be empty")]
    NoExtensions,

    /// Zero debounce or poll interval.
    #[error("{0} interval must be positive")]
    ZeroInterval(&'static str),
}

/// Malformed filter query expression.
#[derive(Debug, Error)]
#[error("invalid filter expression: {0}")]
pub struct FilterError(pub String);
