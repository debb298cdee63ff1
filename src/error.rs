//! Centralized error types for flightmail.

use std::path::PathBuf;
use thiserror::Error;

use crate::model::flight::Strategy;

/// All errors produced by the flightmail library.
#[derive(Error, Debug)]
pub enum FlightError {
    /// I/O error with the associated file path.
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The specified file does not exist.
    #[error("Mail file not found: {0}")]
    FileNotFound(PathBuf),

    /// The file does not appear to be a valid MBOX or EML file.
    #[error("File does not appear to be a mailbox or message: {0}")]
    InvalidMailbox(PathBuf),

    /// A parsing error occurred at a specific byte offset.
    #[error("Parse error at offset {offset}: {reason}")]
    ParseError { offset: u64, reason: String },

    /// A user-supplied or built-in pattern failed to compile.
    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },

    /// An extraction strategy could not read the message.
    ///
    /// Never escapes the parser: it is logged and the next strategy runs.
    #[error("{strategy} extraction failed: {reason}")]
    Strategy { strategy: Strategy, reason: String },

    /// The embedding model could not produce a vector.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// The configuration is inconsistent.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// An export operation failed.
    #[error("Export error: {0}")]
    ExportError(String),
}

/// Convenience alias for `Result<T, FlightError>`.
pub type Result<T> = std::result::Result<T, FlightError>;

impl FlightError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a `Strategy` variant.
    pub fn strategy(strategy: Strategy, reason: impl Into<String>) -> Self {
        Self::Strategy {
            strategy,
            reason: reason.into(),
        }
    }
}

/// Allow `?` on `std::io::Error` when no path context is available
/// (rare, prefer `FlightError::io`).
impl From<std::io::Error> for FlightError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}
