//! Storage backend trait and implementations.
//!
//! This module defines the `StorageBackend` trait, which provides a unified
//! interface over a hierarchical store of named files and directories (the
//! local filesystem, or an in-memory tree for tests).
//!

#[cfg(feature = "mock")]
mod faulty;
mod local;
#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "mock")]
pub use self::faulty::{Fault, FaultyBackend, Operation};
pub use self::local::LocalBackend;
#[cfg(feature = "mock")]
pub use self::mock::MockBackend;
use crate::error::{ErrorKind, Result};
use crate::models::{EntryInfo, EntryKind};
use async_trait::async_trait;
use futures::io::{AsyncRead, AsyncWrite};
use futures::{Stream, TryStreamExt};
use std::path::Path;
use std::pin::Pin;

pub type EntryStream<'a> = Pin<Box<dyn Stream<Item = Result<EntryInfo>> + Send + 'a>>;
pub type BoxAsyncRead = Box<dyn AsyncRead + Send + Unpin + 'static>;
pub type BoxAsyncWrite = Box<dyn AsyncWrite + Send + Unpin + 'static>;

/// Unified interface for storage backends.
///
/// All storage operations are asynchronous. Entries are either files or
/// directories; a directory holds uniquely named children. It's a glorified
/// CRUD interface with a `read_dir` bolted on.
///
/// # Path Handling
/// All paths are relative to the storage root and must be validated using
/// [`validate_path`](crate::validate_path) before use. Implementations should
/// enforce this validation. Operations that accept an `Option<&Path>` treat
/// `None` as the storage root itself.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use chartshelf_storage::{backend::StorageBackend, error::Result};
///
/// async fn chart_size(backend: &dyn StorageBackend) -> Result<u64> {
///     let path = Path::new("Artist - Song (Charter)/notes.chart");
///     if backend.exists(path).await? {
///         Ok(backend.stat(path).await?.size)
///     } else {
///         Ok(0)
///     }
/// }
/// ```
///
/// # Streaming
/// Copy a file between two backends without buffering it in memory:
///
/// ```
/// use std::path::Path;
/// use futures::io::AsyncWriteExt;
/// use chartshelf_storage::backend::StorageBackend;
/// use chartshelf_storage::error::{ErrorKind, Result};
///
/// async fn copy_across(from: &dyn StorageBackend, to: &dyn StorageBackend, path: &Path) -> Result<u64> {
///     let mut reader = from.reader(path).await?;
///     let mut writer = to.writer(path).await?;
///     let copied = futures::io::copy(&mut reader, &mut writer).await.map_err(ErrorKind::Io)?;
///     writer.close().await.map_err(ErrorKind::Io)?;
///     Ok(copied)
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the configured backend. Each backend's name is **supposed**
    /// to be unique, but it doesn't affect the functionality of this crate if
    /// they aren't (used for logging only).
    fn name(&self) -> &str;

    /// Stream the immediate children of a directory.
    ///
    /// Children are yielded in a stable order: insertion order for
    /// backends that track it, lexicographic order otherwise. Listing a
    /// directory that doesn't exist returns
    /// [`NotFound`](crate::error::ErrorKind::NotFound).
    ///
    /// # Examples
    ///
    /// ```
    /// use futures::TryStreamExt;
    /// # use chartshelf_storage::{backend::StorageBackend, error::Result};
    /// # async fn example(backend: &dyn StorageBackend) -> Result<()> {
    /// let mut children = backend.read_dir(None);
    /// while let Some(child) = children.try_next().await? {
    ///     println!("{} ({:?})", child.path.display(), child.kind);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    fn read_dir<'a>(&'a self, dir: Option<&'a Path>) -> EntryStream<'a>;

    /// Collect the immediate children of a directory into a [`Vec`].
    async fn list(&self, dir: Option<&Path>) -> Result<Vec<EntryInfo>> {
        self.read_dir(dir).try_collect().await
    }

    /// Check if an entry (file or directory) exists.
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Get entry metadata without reading contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the entry
    /// does not exist.
    async fn stat(&self, path: &Path) -> Result<EntryInfo>;

    /// Read file contents.
    ///
    /// Returns the complete file contents as a [`Vec<u8>`]. Only meant for
    /// small files (metadata); use [`reader`](Self::reader) for anything
    /// else.
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Open a file for streaming reads.
    async fn reader(&self, path: &Path) -> Result<BoxAsyncRead>;

    /// Write file contents, creating or truncating the file.
    ///
    /// # Notes
    /// - Implementations should create parent directories as needed.
    async fn write(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Create (or truncate) a file and open it for streaming writes.
    ///
    /// # Notes
    /// - Implementations should create parent directories as needed.
    /// - Callers **must** call [`close()`](futures::io::AsyncWriteExt::close)
    ///   on the writer, even when abandoning it, so buffered data is written
    ///   and errors are propagated.
    async fn writer(&self, path: &Path) -> Result<BoxAsyncWrite>;

    /// Create a directory (and any missing parents). Succeeds if the
    /// directory already exists.
    async fn create_dir(&self, path: &Path) -> Result<()>;

    /// Delete a single file.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn delete(&self, path: &Path) -> Result<()>;

    /// Recursively delete a directory and everything inside it.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the
    /// directory does not exist.
    async fn remove_dir(&self, path: &Path) -> Result<()>;

    /// Delete an entry of either kind, recursively for directories.
    async fn remove(&self, path: &Path) -> Result<()> {
        match self.stat(path).await?.kind {
            EntryKind::File => self.delete(path).await,
            EntryKind::Directory => self.remove_dir(path).await,
        }
    }
}

/// Looks up a path, mapping [`NotFound`](ErrorKind::NotFound) to `None`.
///
/// ```
/// # use std::path::Path;
/// # use chartshelf_storage::{backend::{StorageBackend, stat_opt}, error::Result};
/// # async fn example(backend: &dyn StorageBackend) -> Result<()> {
/// if let Some(info) = stat_opt(backend, Path::new("song.ini")).await? {
///     println!("{} bytes", info.size);
/// }
/// # Ok(())
/// # }
/// ```
pub async fn stat_opt(backend: &dyn StorageBackend, path: &Path) -> Result<Option<EntryInfo>> {
    match backend.stat(path).await {
        Ok(info) => Ok(Some(info)),
        Err(e) if matches!(&*e, ErrorKind::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}
