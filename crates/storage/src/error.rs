//! Storage Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Entry does not exist
    #[display("entry not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// Access denied (permissions or credentials)
    #[display("permission denied: {}", _0.display())]
    PermissionDenied(#[error(not(source))] PathBuf),
    /// Entry already exists with a kind that conflicts with the operation
    /// (writing a file over a directory, or the other way around).
    #[display("entry already exists: {}", _0.display())]
    AlreadyExists(#[error(not(source))] PathBuf),
    /// Operation expected a file but found a directory.
    #[display("not a file: {}", _0.display())]
    NotAFile(#[error(not(source))] PathBuf),
    /// Operation expected a directory but found a file.
    #[display("not a directory: {}", _0.display())]
    NotADirectory(#[error(not(source))] PathBuf),
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// Path contains invalid characters or escapes root
    #[display("invalid path: {}", _0.display())]
    InvalidPath(#[error(not(source))] PathBuf),
    /// Name is not a single, plain path segment
    #[display("invalid entry name: {_0}")]
    InvalidName(#[error(not(source))] String),
    /// Backend-specific error
    #[display("backend error: {_0}")]
    BackendError(#[error(not(source))] String),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::BackendError(_))
    }

    /// Returns `true` if the error means the entry is simply absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(ErrorKind::NotFound(PathBuf::from("a/b")).to_string(), "entry not found: a/b");
        assert_eq!(ErrorKind::InvalidName("..".to_string()).to_string(), "invalid entry name: ..");
    }

    #[test]
    fn test_retryable() {
        assert!(ErrorKind::Io(IoError::other("boom")).is_retryable());
        assert!(!ErrorKind::NotFound(PathBuf::from("x")).is_retryable());
        assert!(ErrorKind::NotFound(PathBuf::from("x")).is_not_found());
    }
}
