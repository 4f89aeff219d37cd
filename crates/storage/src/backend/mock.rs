//! In-memory storage backend for testing.

use super::{BoxAsyncRead, BoxAsyncWrite, EntryStream};
use crate::error::{ErrorKind, Result};
use crate::path::validate as validate_path;
use crate::{EntryInfo, StorageBackend};
use async_stream::stream;
use async_trait::async_trait;
use futures::io::{AsyncWrite, Cursor};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use time::OffsetDateTime;

#[derive(Debug, Clone)]
enum Contents {
    File(Vec<u8>),
    Directory,
}

#[derive(Debug, Clone)]
struct Node {
    contents: Contents,
    /// Creation sequence number; children are listed in this order.
    seq: u64,
    modified: OffsetDateTime,
}
impl Node {
    fn info(&self, path: &Path) -> EntryInfo {
        match &self.contents {
            Contents::File(data) => EntryInfo::file(path, data.len() as u64, self.modified),
            Contents::Directory => EntryInfo::directory(path, self.modified),
        }
    }
}

#[derive(Debug, Default)]
struct Tree {
    nodes: BTreeMap<PathBuf, Node>,
    next_seq: u64,
}
impl Tree {
    fn insert(&mut self, path: PathBuf, contents: Contents) {
        let seq = match self.nodes.get(&path) {
            Some(existing) => existing.seq,
            None => {
                self.next_seq += 1;
                self.next_seq
            },
        };
        let node = Node { contents, seq, modified: OffsetDateTime::now_utc() };
        self.nodes.insert(path, node);
    }

    /// Creates every missing ancestor of `path` as a directory.
    fn create_parents(&mut self, path: &Path) -> Result<()> {
        let mut ancestors: Vec<&Path> =
            path.ancestors().skip(1).filter(|ancestor| !ancestor.as_os_str().is_empty()).collect();
        ancestors.reverse();
        for ancestor in ancestors {
            match self.nodes.get(ancestor).map(|node| &node.contents) {
                Some(Contents::Directory) => {},
                Some(Contents::File(_)) => exn::bail!(ErrorKind::NotADirectory(ancestor.to_path_buf())),
                None => self.insert(ancestor.to_path_buf(), Contents::Directory),
            }
        }
        Ok(())
    }

    fn put_file(&mut self, path: PathBuf, data: Vec<u8>) -> Result<()> {
        if matches!(self.nodes.get(&path).map(|node| &node.contents), Some(Contents::Directory)) {
            exn::bail!(ErrorKind::AlreadyExists(path));
        }
        self.create_parents(&path)?;
        self.insert(path, Contents::File(data));
        Ok(())
    }
}

/// In-memory storage backend for testing.
///
/// Entries are kept in a tree behind a [`Mutex`], so all trait methods can
/// operate on `&self` without external synchronisation. Unlike the local
/// backend, directory listings come back in insertion order. Writers write
/// through: the file exists (empty) as soon as the writer is acquired and
/// grows with every write, so a test can observe a half-written file.
///
/// # Examples
///
/// ```
/// use chartshelf_storage::backend::{MockBackend, StorageBackend};
/// use std::path::Path;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MockBackend::with_files([
///     ("Artist - Song (Charter)/notes.chart", b"[Song]"),
/// ]);
/// assert!(backend.exists(Path::new("Artist - Song (Charter)")).await?);
///
/// backend.write(Path::new("Other/song.ini"), b"[song]").await?;
/// assert_eq!(backend.list(None).await?.len(), 2);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MockBackend {
    name: String,
    tree: Arc<Mutex<Tree>>,
}

impl MockBackend {
    /// Create a mock backend pre-populated with files. Parent directories
    /// are created implicitly.
    ///
    /// Panics if any path fails validation (e.g. path traversal). If test
    /// setup is wrong, then test should not pass.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>)>) -> Self {
        let mut tree = Tree::default();
        for (path, data) in files {
            let path = path.into();
            let Ok(validated) = validate_path(&path) else {
                panic!("MockBackend::with_files: invalid path {}", path.display());
            };
            if tree.put_file(validated, data.into()).is_err() {
                panic!("MockBackend::with_files: conflicting path {}", path.display());
            }
        }
        Self {
            name: "mock".to_string(),
            tree: Arc::new(Mutex::new(tree)),
        }
    }

    /// Change the name of the mock backend.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Every entry in the backend: files map to their contents, directories
    /// to `None`. Two snapshots compare equal when the trees are identical.
    pub fn snapshot(&self) -> BTreeMap<PathBuf, Option<Vec<u8>>> {
        let Ok(tree) = self.tree.lock() else {
            return BTreeMap::new();
        };
        tree.nodes
            .iter()
            .map(|(path, node)| {
                let data = match &node.contents {
                    Contents::File(data) => Some(data.clone()),
                    Contents::Directory => None,
                };
                (path.clone(), data)
            })
            .collect()
    }

    fn tree(&self) -> Result<MutexGuard<'_, Tree>> {
        self.tree.lock().map_err(|_| exn::Exn::from(ErrorKind::BackendError("mock storage poisoned".to_string())))
    }

    fn children(&self, dir: Option<&Path>) -> Result<Vec<EntryInfo>> {
        let dir = dir.map(validate_path).transpose()?.unwrap_or_default();
        let tree = self.tree()?;
        if !dir.as_os_str().is_empty() {
            match tree.nodes.get(&dir).map(|node| &node.contents) {
                Some(Contents::Directory) => {},
                Some(Contents::File(_)) => exn::bail!(ErrorKind::NotADirectory(dir)),
                None => exn::bail!(ErrorKind::NotFound(dir)),
            }
        }
        let mut children: Vec<(&PathBuf, &Node)> =
            tree.nodes.iter().filter(|(path, _)| path.parent() == Some(dir.as_path())).collect();
        children.sort_by_key(|(_, node)| node.seq);
        Ok(children.into_iter().map(|(path, node)| node.info(path)).collect())
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        let files: [(&str, &[u8]); 0] = [];
        Self::with_files(files)
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_dir<'a>(&'a self, dir: Option<&'a Path>) -> EntryStream<'a> {
        Box::pin(stream! {
            // Snapshot the children under the lock, then drop it before
            // yielding to avoid holding the lock across yield points.
            match self.children(dir) {
                Ok(children) => for child in children {
                    yield Ok(child);
                },
                Err(e) => yield Err(e),
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let path = validate_path(path)?;
        Ok(self.tree()?.nodes.contains_key(&path))
    }

    async fn stat(&self, path: &Path) -> Result<EntryInfo> {
        let path = validate_path(path)?;
        let tree = self.tree()?;
        match tree.nodes.get(&path) {
            Some(node) => Ok(node.info(&path)),
            None => exn::bail!(ErrorKind::NotFound(path)),
        }
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let path = validate_path(path)?;
        let tree = self.tree()?;
        match tree.nodes.get(&path).map(|node| &node.contents) {
            Some(Contents::File(data)) => Ok(data.clone()),
            Some(Contents::Directory) => exn::bail!(ErrorKind::NotAFile(path)),
            None => exn::bail!(ErrorKind::NotFound(path)),
        }
    }

    async fn reader(&self, path: &Path) -> Result<BoxAsyncRead> {
        let data = self.read(path).await?;
        Ok(Box::new(Cursor::new(data)))
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let path = validate_path(path)?;
        self.tree()?.put_file(path, data.to_vec())
    }

    async fn writer(&self, path: &Path) -> Result<BoxAsyncWrite> {
        let path = validate_path(path)?;
        self.tree()?.put_file(path.clone(), Vec::new())?;
        Ok(Box::new(MockWriter { tree: Arc::clone(&self.tree), path }))
    }

    async fn create_dir(&self, path: &Path) -> Result<()> {
        let path = validate_path(path)?;
        let mut tree = self.tree()?;
        match tree.nodes.get(&path).map(|node| &node.contents) {
            Some(Contents::Directory) => Ok(()),
            Some(Contents::File(_)) => exn::bail!(ErrorKind::AlreadyExists(path)),
            None => {
                tree.create_parents(&path)?;
                tree.insert(path, Contents::Directory);
                Ok(())
            },
        }
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let path = validate_path(path)?;
        let mut tree = self.tree()?;
        match tree.nodes.get(&path).map(|node| &node.contents) {
            Some(Contents::File(_)) => {
                tree.nodes.remove(&path);
                Ok(())
            },
            Some(Contents::Directory) => exn::bail!(ErrorKind::NotAFile(path)),
            None => exn::bail!(ErrorKind::NotFound(path)),
        }
    }

    async fn remove_dir(&self, path: &Path) -> Result<()> {
        let path = validate_path(path)?;
        let mut tree = self.tree()?;
        match tree.nodes.get(&path).map(|node| &node.contents) {
            Some(Contents::Directory) => {
                tree.nodes.retain(|candidate, _| !candidate.starts_with(&path));
                Ok(())
            },
            Some(Contents::File(_)) => exn::bail!(ErrorKind::NotADirectory(path)),
            None => exn::bail!(ErrorKind::NotFound(path)),
        }
    }
}

/// Streaming writer that appends straight into the shared tree.
struct MockWriter {
    tree: Arc<Mutex<Tree>>,
    path: PathBuf,
}
impl AsyncWrite for MockWriter {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let Ok(mut tree) = self.tree.lock() else {
            return Poll::Ready(Err(io::Error::other("mock storage poisoned")));
        };
        match tree.nodes.get_mut(&self.path) {
            Some(Node { contents: Contents::File(data), modified, .. }) => {
                data.extend_from_slice(buf);
                *modified = OffsetDateTime::now_utc();
                Poll::Ready(Ok(buf.len()))
            },
            // Removed (or replaced by a directory) while the writer was open.
            _ => Poll::Ready(Err(io::Error::new(io::ErrorKind::NotFound, self.path.display().to_string()))),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
