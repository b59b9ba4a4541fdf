//! Error types for Purchase Anomaly.
//!
//! One unified error enum with:
//! - Stable error codes for machine parsing
//! - Category classification for error grouping
//!
//! Anomaly detection itself is never an error: the purchase check
//! returns an explicit descriptor instead. Likewise the negative-variance
//! guard in the stats engine clamps and recovers internally rather than
//! surfacing here.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for Purchase Anomaly operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Bad window size, network depth, or sigma level.
    Config,
    /// Malformed call into the directory or group registry.
    Argument,
    /// Event record decoding failures.
    Decode,
    /// Checkpoint save/load failures.
    Checkpoint,
    /// File I/O and serialization.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Argument => write!(f, "argument"),
            ErrorCategory::Decode => write!(f, "decode"),
            ErrorCategory::Checkpoint => write!(f, "checkpoint"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Unified error type for Purchase Anomaly.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    // Argument errors (20-29)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unknown group: {0}")]
    UnknownGroup(u64),

    // Decode errors (30-39)
    #[error("unknown event type: {0}")]
    UnknownEvent(String),

    #[error("malformed timestamp: {0}")]
    MalformedTimestamp(String),

    #[error("malformed amount: {0}")]
    MalformedAmount(String),

    // Checkpoint errors (40-49)
    #[error("checkpoint version {found} differs from current version {current}")]
    VersionMismatch { found: String, current: String },

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the stable error code for this error type.
    ///
    /// Codes are grouped by category:
    /// - 10-19: Configuration errors
    /// - 20-29: Argument errors
    /// - 30-39: Decode errors
    /// - 40-49: Checkpoint errors
    /// - 60-69: I/O errors
    pub fn code(&self) -> u32 {
        match self {
            Error::InvalidConfig(_) => 10,
            Error::UnsupportedOperation(_) => 11,
            Error::InvalidArgument(_) => 20,
            Error::UnknownGroup(_) => 21,
            Error::UnknownEvent(_) => 30,
            Error::MalformedTimestamp(_) => 31,
            Error::MalformedAmount(_) => 32,
            Error::VersionMismatch { .. } => 40,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidConfig(_) | Error::UnsupportedOperation(_) => ErrorCategory::Config,
            Error::InvalidArgument(_) | Error::UnknownGroup(_) => ErrorCategory::Argument,
            Error::UnknownEvent(_)
            | Error::MalformedTimestamp(_)
            | Error::MalformedAmount(_) => ErrorCategory::Decode,
            Error::VersionMismatch { .. } => ErrorCategory::Checkpoint,
            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
        }
    }

    /// Whether a per-line ingestion failure of this kind should be
    /// logged and skipped rather than aborting the run.
    ///
    /// Undecodable JSON counts as line-local here: at the ingestion
    /// boundary a `Json` error can only mean one bad input line.
    pub fn is_line_local(&self) -> bool {
        if matches!(self, Error::Json(_)) {
            return true;
        }
        matches!(
            self.category(),
            ErrorCategory::Decode | ErrorCategory::Argument
        )
    }
}
