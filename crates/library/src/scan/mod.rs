//! Finding out what's installed.
//!
//! A library is a tree of folders. Any folder holding a `song.ini` is a
//! package (its subfolders are part of it, not packages of their own), any
//! `.sng` file is a package, and every other folder is just grouping and
//! gets descended into. Nothing is cached: each [`scan`] walks the whole
//! tree again.

pub mod error;
mod fingerprint;
mod index;
mod ini;
mod stream;

pub use self::fingerprint::Fingerprint;
pub use self::index::{LibraryIndex, index};
pub use self::stream::scan;
use crate::models::ChartMeta;
use std::path::PathBuf;

/// File extension of single-file packages.
pub const SNG_EXTENSION: &str = "sng";

/// Progress events emitted by [`scan`].
///
/// [`Started`](Self::Started) comes first and [`Complete`](Self::Complete)
/// last, with the number of packages found. An error on the library root
/// ends the stream early, without `Complete`.
#[derive(Debug)]
pub enum ScanEvent {
    Started,
    Found(Box<InstalledChart>),
    /// Looked like a package but couldn't be read.
    Skipped(PathBuf),
    Complete(u64),
}

/// How a package is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum PackageKind {
    /// A folder with a `song.ini` and loose chart, audio and art files.
    Directory,
    /// A single `.sng` container.
    Sng,
}

/// A package found in the library.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InstalledChart {
    pub meta: ChartMeta,
    pub fingerprint: Fingerprint,
    /// Backend path of the package folder or `.sng` file.
    pub path: PathBuf,
    pub kind: PackageKind,
}
impl InstalledChart {
    pub(crate) fn new(meta: ChartMeta, path: PathBuf, kind: PackageKind) -> Self {
        Self { fingerprint: Fingerprint::new(&meta), meta, path, kind }
    }
}
