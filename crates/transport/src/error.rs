//! Transport Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A transport error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Source is neither a usable URL nor a path.
    #[display("invalid source: {_0}")]
    InvalidSource(#[error(not(source))] String),
    /// Source does not exist (missing file, HTTP 404/410).
    #[display("source not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// Server answered with a non-success status.
    #[display("unexpected HTTP status {_0}")]
    Status(#[error(not(source))] u16),
    /// Request could not be sent or the client could not be built.
    #[display("HTTP request failed")]
    Http,
    /// Local I/O failure.
    #[display("I/O error")]
    Io,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http | Self::Io => true,
            Self::Status(code) => *code == 429 || *code >= 500,
            Self::InvalidSource(_) | Self::NotFound(_) => false,
        }
    }
}
