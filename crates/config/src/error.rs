//! Config Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration loading.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can be wrong with a configuration. None of these are
/// worth retrying without the user changing something.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// An explicitly requested config file doesn't exist.
    #[display("config file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// Config file extension isn't `toml`, `yaml`, `yml` or `json`.
    #[display("unsupported config file format: {}", _0.display())]
    UnsupportedFormat(#[error(not(source))] PathBuf),
    /// Layers could not be merged or deserialized.
    #[display("could not load configuration")]
    Load,
    #[display("library.songs must be set")]
    MissingSongs,
    /// Directories must be absolute.
    #[display("{_0} must be an absolute path")]
    Relative(#[error(not(source))] &'static str),
    /// Two of the library, backup and staging directories contain one another.
    #[display("{_0} and {_1} must not be nested inside one another")]
    Nested(&'static str, &'static str),
    #[display("library.concurrency must be at least 1")]
    Concurrency,
    #[display("library.template is not a valid template")]
    Template,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
