/*!
 * Error types for the subtran engine.
 *
 * This module contains custom error types for different parts of the engine,
 * using the thiserror crate for ergonomic error definitions.
 */

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by translation backends
#[derive(Error, Debug)]
pub enum BackendError {
    /// The backend could not be reached at all (connection refused, DNS)
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// A request timed out
    #[error("Backend timeout after {0:?}")]
    Timeout(std::time::Duration),

    /// The account or key ran out of quota
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// The configured model is not installed on the server
    #[error("Model not available: {0}")]
    ModelMissing(String),

    /// Non-success status or an unparseable response body
    #[error("Protocol error ({status_code}): {message}")]
    Protocol {
        /// HTTP status code, 0 when the body itself was the problem
        status_code: u16,
        /// Error detail from the server or the parser
        message: String,
    },
}

impl BackendError {
    /// Whether a retry with backoff can reasonably succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Protocol { status_code, .. } => {
                *status_code == 429 || (500..600).contains(&(*status_code as u32))
            }
            _ => false,
        }
    }

    /// Classify an error message the way providers phrase quota failures
    pub fn looks_like_quota(message: &str) -> bool {
        let lower = message.to_lowercase();
        lower.contains("quota") || lower.contains("limit") || lower.contains("billing")
    }
}

/// Errors that can occur while parsing or emitting subtitle files
#[derive(Error, Debug)]
pub enum SubtitleError {
    /// Malformed timestamps or structure
    #[error("Parse error at line {line}: {message}")]
    ParseError {
        /// 1-based line number in the source file
        line: usize,
        /// What went wrong
        message: String,
    },

    /// The file is a format the codec does not handle (e.g. image-based .sub)
    #[error("Unsupported subtitle format: {0}")]
    FormatMismatch(String),

    /// Underlying I/O failure
    #[error("Subtitle I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the two-tier translation cache
#[derive(Error, Debug)]
pub enum CacheError {
    /// SQLite-level failure
    #[error("Cache database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Disk-level failure opening or creating the cache file
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the glossary store
#[derive(Error, Debug)]
pub enum GlossaryError {
    /// Document could not be read or deserialized
    #[error("Glossary for series {series_id} is corrupt: {message}")]
    Corrupt {
        /// Series the document belongs to
        series_id: i64,
        /// Parser or reader detail
        message: String,
    },

    /// Document could not be persisted
    #[error("Failed to save glossary to {path:?}: {source}")]
    Save {
        /// Destination path
        path: PathBuf,
        /// Underlying I/O failure
        source: std::io::Error,
    },
}

/// Main engine error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Error from a translation backend
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Error from subtitle processing
    #[error("Subtitle error: {0}")]
    Subtitle(#[from] SubtitleError),

    /// Error from the translation cache
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Error from the glossary store
    #[error("Glossary error: {0}")]
    Glossary(#[from] GlossaryError),

    /// The run was cancelled before this unit of work completed
    #[error("Operation cancelled")]
    Cancelled,

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}
