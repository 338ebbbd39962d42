//! Error types for gridwork

use thiserror::Error;

/// Main error type for gridwork operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Bad geometry, missing or invalid cell size, empty data, invalid operation class setup.
    #[error("Invalid input: {reason} (got {value})")]
    InvalidInput { reason: String, value: String },

    /// Unsupported data kind for a decomposition, iteration order or file format.
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// A precondition of the engine was violated; the run cannot start.
    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("Index out of bounds: ({row}, {col}) in grid of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Grid size mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch { er: usize, ec: usize, ar: usize, ac: usize },

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Failure raised inside an operation body.
    #[error("Operation error: {0}")]
    Operation(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn invalid_input(reason: impl Into<String>, value: impl std::fmt::Display) -> Self {
        Error::InvalidInput {
            reason: reason.into(),
            value: value.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Parse {
            line: e.line(),
            message: e.to_string(),
        }
    }
}

/// Result type alias for gridwork operations
pub type Result<T> = std::result::Result<T, Error>;
