//! Local filesystem storage backend.
//!
//! This module provides a storage backend implementation for the local filesystem.
//! Entries are stored under a configured directory and accessed using standard
//! filesystem operations via `tokio::fs` for async I/O.

use crate::backend::{BoxAsyncRead, BoxAsyncWrite, EntryStream};
use crate::error::ErrorKind;
use crate::{EntryInfo, StorageBackend, error::Result, path::validate as validate_path};
use async_stream::stream;
use async_trait::async_trait;
use std::fs::{Metadata, create_dir_all as sync_create_dir};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tokio::fs;
use tokio_util::compat::{TokioAsyncReadCompatExt, TokioAsyncWriteCompatExt};

/// Local filesystem storage backend.
///
/// Stores entries in a directory on the local filesystem. All paths are
/// relative to the configured root directory.
///
/// # Examples
///
/// ```no_run
/// use chartshelf_storage::backend::LocalBackend;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = LocalBackend::new("songs", "/home/player/Clone Hero/Songs")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LocalBackend {
    name: String,
    root: PathBuf,
}
impl LocalBackend {
    /// Create a new local filesystem backend, creating the root directory if
    /// it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute or points at a file.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::NotADirectory(root));
            }
        } else {
            // Use non-async here; it'll only happen once on library initialization
            // and it's not worth the hassle of making the constructor async.
            sync_create_dir(&root).map_err(|e| Self::map_io_error(e, &root))?;
        }

        Ok(Self { name: name.into(), root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Validates the path and joins it with the root directory.
    fn absolute_path(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let validated = validate_path(path.as_ref())?;
        Ok(self.root.join(validated))
    }

    fn absolute_dir(&self, dir: Option<&Path>) -> Result<PathBuf> {
        match dir {
            Some(dir) => self.absolute_path(dir),
            None => Ok(self.root.clone()),
        }
    }

    /// Re-use same data collection from filesystem metadata for both
    /// `read_dir` and `stat`.
    fn metadata(path: &Path, metadata: &Metadata) -> Result<EntryInfo> {
        let modified = metadata.modified().map(OffsetDateTime::from).map_err(ErrorKind::Io)?;
        if metadata.is_dir() {
            return Ok(EntryInfo::directory(path, modified));
        }
        Ok(EntryInfo::file(path, metadata.len(), modified))
    }

    fn map_io_error(e: std::io::Error, path: &Path) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
            std::io::ErrorKind::AlreadyExists => ErrorKind::AlreadyExists(path.to_path_buf()),
            std::io::ErrorKind::IsADirectory => ErrorKind::NotAFile(path.to_path_buf()),
            std::io::ErrorKind::NotADirectory => ErrorKind::NotADirectory(path.to_path_buf()),
            _ => ErrorKind::Io(e),
        }
    }

    /// Reads and sorts the children of a directory. Kept out of the stream
    /// body so errors can be `?`-propagated instead of yielded one by one.
    async fn sorted_children(&self, dir: Option<&Path>) -> Result<Vec<EntryInfo>> {
        let absolute = self.absolute_dir(dir)?;
        let relative = dir.map(validate_path).transpose()?.unwrap_or_default();
        let mut entries = fs::read_dir(&absolute).await.map_err(|e| Self::map_io_error(e, &relative))?;
        let mut children = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| Self::map_io_error(e, &relative))? {
            let path = relative.join(entry.file_name());
            let metadata = entry.metadata().await.map_err(|e| Self::map_io_error(e, &path))?;
            if metadata.is_dir() || metadata.is_file() {
                children.push(Self::metadata(&path, &metadata)?);
            } else {
                // Note: silently drop what is most likely a broken symlink.
                tracing::debug!(backend = %self.name, path = %path.display(), "Skipping special file");
            }
        }
        // The filesystem has no notion of insertion order; sort so that
        // listings are at least deterministic.
        children.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(children)
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_dir<'a>(&'a self, dir: Option<&'a Path>) -> EntryStream<'a> {
        Box::pin(stream! {
            match self.sorted_children(dir).await {
                Ok(children) => for child in children {
                    yield Ok(child);
                },
                Err(e) => yield Err(e),
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::try_exists(&abs_path).await.map_err(ErrorKind::Io)?)
    }

    async fn stat(&self, path: &Path) -> Result<EntryInfo> {
        let abs_path = self.absolute_path(path)?;
        let metadata = fs::metadata(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?;
        Self::metadata(&validate_path(path)?, &metadata)
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::read(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?)
    }

    async fn reader(&self, path: &Path) -> Result<BoxAsyncRead> {
        let abs_path = self.absolute_path(path)?;
        let file = fs::File::open(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?;
        Ok(Box::new(file.compat()))
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let abs_path = self.absolute_path(path)?;
        if let Some(parent) = abs_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| Self::map_io_error(e, path))?;
        }
        Ok(fs::write(&abs_path, data).await.map_err(|e| Self::map_io_error(e, path))?)
    }

    async fn writer(&self, path: &Path) -> Result<BoxAsyncWrite> {
        let abs_path = self.absolute_path(path)?;
        if let Some(parent) = abs_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| Self::map_io_error(e, path))?;
        }
        let file = fs::File::create(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?;
        Ok(Box::new(file.compat_write()))
    }

    async fn create_dir(&self, path: &Path) -> Result<()> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::create_dir_all(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?)
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::remove_file(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?)
    }

    async fn remove_dir(&self, path: &Path) -> Result<()> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::remove_dir_all(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EntryKind;
    use futures::io::{AsyncReadExt, AsyncWriteExt};

    fn backend() -> (tempfile::TempDir, LocalBackend) {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("songs", temp_dir.path()).unwrap();
        (temp_dir, backend)
    }

    #[test]
    fn test_new_requires_absolute_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(LocalBackend::new("name", temp_dir.path()).is_ok());
        assert!(LocalBackend::new("name", "relative/path").is_err());
        assert!(LocalBackend::new("name", "./relative").is_err());
    }

    #[test]
    fn test_new_creates_missing_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("Songs");
        LocalBackend::new("name", &root).unwrap();
        assert!(root.is_dir());
    }

    #[test]
    fn test_absolute_path() {
        let (temp_dir, backend) = backend();
        let expected = temp_dir.path().join("Song/notes.chart");
        assert_eq!(backend.absolute_path(Path::new("Song/notes.chart")).unwrap(), expected);
        assert!(backend.absolute_path(Path::new("../etc/passwd")).is_err());
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let (_temp_dir, backend) = backend();
        backend.write(Path::new("song.ini"), b"[song]").await.unwrap();
        assert_eq!(backend.read(Path::new("song.ini")).await.unwrap(), b"[song]");
    }

    #[tokio::test]
    async fn test_streaming_write_and_read() {
        let (_temp_dir, backend) = backend();
        let mut writer = backend.writer(Path::new("Song/song.ogg")).await.unwrap();
        writer.write_all(b"OggS").await.unwrap();
        writer.write_all(b" more audio").await.unwrap();
        writer.close().await.unwrap();

        let mut contents = Vec::new();
        backend.reader(Path::new("Song/song.ogg")).await.unwrap().read_to_end(&mut contents).await.unwrap();
        assert_eq!(contents, b"OggS more audio");
    }

    #[tokio::test]
    async fn test_read_dir_is_sorted_and_shallow() {
        let (_temp_dir, backend) = backend();
        backend.write(Path::new("Song/song.ogg"), b"b").await.unwrap();
        backend.write(Path::new("Song/notes.chart"), b"a").await.unwrap();
        backend.write(Path::new("Song/stems/drums.ogg"), b"c").await.unwrap();
        let children = backend.list(Some(Path::new("Song"))).await.unwrap();
        let names: Vec<_> = children.iter().map(|c| c.name()).collect();
        assert_eq!(names, ["notes.chart", "song.ogg", "stems"]);
        assert_eq!(children[2].kind, EntryKind::Directory);
        assert_eq!(children[0].size, 1);
    }

    #[tokio::test]
    async fn test_read_dir_root() {
        let (_temp_dir, backend) = backend();
        backend.create_dir(Path::new("B")).await.unwrap();
        backend.create_dir(Path::new("A")).await.unwrap();
        let children = backend.list(None).await.unwrap();
        let paths: Vec<_> = children.iter().map(|c| c.path.clone()).collect();
        assert_eq!(paths, [PathBuf::from("A"), PathBuf::from("B")]);
    }

    #[tokio::test]
    async fn test_read_dir_missing() {
        let (_temp_dir, backend) = backend();
        let err = backend.list(Some(Path::new("missing"))).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_stat_kinds() {
        let (_temp_dir, backend) = backend();
        backend.write(Path::new("Song/notes.chart"), b"12345").await.unwrap();
        let file = backend.stat(Path::new("Song/notes.chart")).await.unwrap();
        assert_eq!(file.kind, EntryKind::File);
        assert_eq!(file.size, 5);
        let dir = backend.stat(Path::new("Song")).await.unwrap();
        assert_eq!(dir.kind, EntryKind::Directory);
        let err = backend.stat(Path::new("Nope")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_remove_variants() {
        let (_temp_dir, backend) = backend();
        backend.write(Path::new("Song/notes.chart"), b"data").await.unwrap();
        backend.write(Path::new("loose.sng"), b"data").await.unwrap();
        backend.remove(Path::new("loose.sng")).await.unwrap();
        backend.remove(Path::new("Song")).await.unwrap();
        assert!(!backend.exists(Path::new("Song")).await.unwrap());
        assert!(!backend.exists(Path::new("loose.sng")).await.unwrap());
        let err = backend.delete(Path::new("loose.sng")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_path_security() {
        let (_temp_dir, backend) = backend();
        assert!(backend.read(Path::new("../etc/passwd")).await.is_err());
        assert!(backend.read(Path::new("etc/../../passwd")).await.is_err());
        assert!(backend.write(Path::new("../etc/passwd"), b"data").await.is_err());
        assert!(backend.remove_dir(Path::new("../../dir")).await.is_err());
    }
}
