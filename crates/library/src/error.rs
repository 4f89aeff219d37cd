//! Library Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Submodules with richer failure modes
//! ([`install`](crate::install), [`transaction`](crate::transaction)) carry
//! their own kinds.

use derive_more::{Display, Error};

/// A library error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Template failed to compile or render.
    #[display("issue with package name generation from template")]
    Template,
    /// Template rendered to something that can't be a folder name.
    #[display("unusable package name: {_0:?}")]
    InvalidName(#[error(not(source))] String),
    /// Library, backup and staging locations overlap.
    #[display("invalid library context: {_0}")]
    InvalidContext(#[error(not(source))] String),
    /// A storage backend operation failed.
    #[display("storage operation failed")]
    Storage,
    /// Walking the library failed.
    #[display("library scan failed")]
    Scan,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage | Self::Scan)
    }
}
