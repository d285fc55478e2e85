//! Unified error types for tcdedup.
//!
//! Only store failures and configuration problems surface as errors. Malformed
//! records, suspicious duplicate rates and records without SimHash data are
//! handled in place, so most of the engine never returns `Err` at all.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for tcdedup operations.
#[derive(Error, Debug)]
pub enum DedupError {
    /// I/O errors from the record store.
    #[error("storage error at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// JSON or TOML parsing/serialization errors.
    #[error("serialization error: {message}")]
    Serde { message: String },

    /// Configuration loading errors.
    #[error("config error: {message}")]
    Config { message: String },

    /// A record expected in the working set could not be located.
    #[error("record not found: {record_id}")]
    RecordNotFound { record_id: String },

    /// Caller supplied input the engine cannot act on.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
}

/// A specialized Result type for tcdedup operations.
pub type Result<T> = std::result::Result<T, DedupError>;

impl DedupError {
    /// Create a storage error from an I/O error.
    pub fn storage(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    /// Create a serialization error.
    pub fn serde(message: impl Into<String>) -> Self {
        Self::Serde {
            message: message.into(),
        }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a record-not-found error.
    pub fn record_not_found(record_id: impl Into<String>) -> Self {
        Self::RecordNotFound {
            record_id: record_id.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Whether the error is local to a single record.
    ///
    /// Record-level errors are counted and skipped inside a batch; everything
    /// else aborts the operation.
    pub fn is_record_level(&self) -> bool {
        matches!(self, Self::RecordNotFound { .. } | Self::InvalidInput { .. })
    }
}

impl From<io::Error> for DedupError {
    fn from(err: io::Error) -> Self {
        Self::Storage {
            path: PathBuf::new(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for DedupError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serde {
            message: err.to_string(),
        }
    }
}

/// Trait for fail-open error handling.
///
/// Log the error and continue with a safe default instead of propagating.
pub trait FailOpen<T> {
    /// Handle an error by logging a warning and returning the provided fallback.
    fn fail_open_with(self, context: &str, fallback: T) -> T;
}

impl<T> FailOpen<T> for Result<T> {
    fn fail_open_with(self, context: &str, fallback: T) -> T {
        match self {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!("{}: {} (fail-open: using fallback)", context, err);
                fallback
            }
        }
    }
}

/// Exit codes for the tcdedup CLI.
pub mod exit_codes {
    /// The command completed.
    pub const SUCCESS: i32 = 0;

    /// The command failed.
    pub const ERROR: i32 = 1;
}
