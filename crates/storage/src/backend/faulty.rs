//! Fault-injecting storage backend for testing.
//!
//! Wraps another backend and makes selected operations fail, either outright
//! or partway through a streaming read or write. Used to prove that callers
//! clean up after storage failures.

use super::{BoxAsyncRead, BoxAsyncWrite, EntryStream};
use crate::error::{ErrorKind, Result};
use crate::path::validate as validate_path;
use crate::{BackendHandle, EntryInfo, StorageBackend};
use async_trait::async_trait;
use futures::io::{AsyncRead, AsyncWrite};
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};

/// Storage operations a [`Fault`] can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Reader,
    Write,
    Writer,
    CreateDir,
    Delete,
    RemoveDir,
}

/// A single injected failure.
///
/// A fault matches calls of one [`Operation`] on any path under its prefix
/// (an empty prefix matches everything). It lets `skip` matching calls pass,
/// then fails up to `limit` of them.
///
/// ```
/// use chartshelf_storage::backend::{Fault, Operation};
///
/// // Let the first two files through, then cut the third one off after 100 bytes.
/// let fault = Fault::new(Operation::Writer, "Artist - Song (Charter)").skip(2).after_bytes(100).once();
/// ```
#[derive(Debug)]
pub struct Fault {
    operation: Operation,
    prefix: PathBuf,
    skip: usize,
    limit: Option<usize>,
    after_bytes: Option<u64>,
    seen: AtomicUsize,
}
impl Fault {
    pub fn new(operation: Operation, prefix: impl Into<PathBuf>) -> Self {
        Self {
            operation,
            prefix: prefix.into(),
            skip: 0,
            limit: None,
            after_bytes: None,
            seen: AtomicUsize::new(0),
        }
    }

    /// Let the first `calls` matching calls succeed.
    pub fn skip(mut self, calls: usize) -> Self {
        self.skip = calls;
        self
    }

    /// Fail at most `calls` times, then behave normally again.
    pub fn times(mut self, calls: usize) -> Self {
        self.limit = Some(calls);
        self
    }

    pub fn once(self) -> Self {
        self.times(1)
    }

    /// For [`Operation::Reader`] and [`Operation::Writer`]: open the stream
    /// normally, then fail once `bytes` bytes have passed through it.
    pub fn after_bytes(mut self, bytes: u64) -> Self {
        self.after_bytes = Some(bytes);
        self
    }

    /// Records a call and returns `true` if this call should fail.
    fn fires(&self, operation: Operation, path: &Path) -> bool {
        if operation != self.operation || !path.starts_with(&self.prefix) {
            return false;
        }
        let seen = self.seen.fetch_add(1, Ordering::SeqCst);
        if seen < self.skip {
            return false;
        }
        self.limit.is_none_or(|limit| seen - self.skip < limit)
    }
}

/// Storage backend decorator that injects [`Fault`]s.
///
/// Listing, `exists` and `stat` are never faulted; they always pass through
/// to the wrapped backend.
pub struct FaultyBackend {
    inner: BackendHandle,
    faults: Vec<Fault>,
}
impl FaultyBackend {
    pub fn new(inner: BackendHandle) -> Self {
        Self { inner, faults: Vec::new() }
    }

    pub fn with_fault(mut self, fault: Fault) -> Self {
        self.faults.push(fault);
        self
    }

    /// Returns the first fault that fires for this call, if any. Every
    /// matching fault records the call, even when an earlier one fires.
    fn check(&self, operation: Operation, path: &Path) -> Result<Option<&Fault>> {
        let path = validate_path(path)?;
        let mut fired = None;
        for fault in &self.faults {
            if fault.fires(operation, &path) && fired.is_none() {
                fired = Some(fault);
            }
        }
        Ok(fired)
    }

    fn injected(operation: Operation, path: &Path) -> ErrorKind {
        tracing::debug!(?operation, path = %path.display(), "Injecting storage fault");
        ErrorKind::BackendError(format!("injected {operation:?} fault: {}", path.display()))
    }

    /// Fails outright unless the fault only cuts the stream short.
    fn fail_fast(&self, operation: Operation, path: &Path) -> Result<Option<u64>> {
        match self.check(operation, path)? {
            Some(Fault { after_bytes: Some(bytes), .. }) => Ok(Some(*bytes)),
            Some(_) => exn::bail!(Self::injected(operation, path)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl StorageBackend for FaultyBackend {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn read_dir<'a>(&'a self, dir: Option<&'a Path>) -> EntryStream<'a> {
        self.inner.read_dir(dir)
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        self.inner.exists(path).await
    }

    async fn stat(&self, path: &Path) -> Result<EntryInfo> {
        self.inner.stat(path).await
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.fail_fast(Operation::Read, path)?;
        self.inner.read(path).await
    }

    async fn reader(&self, path: &Path) -> Result<BoxAsyncRead> {
        let budget = self.fail_fast(Operation::Reader, path)?;
        let reader = self.inner.reader(path).await?;
        Ok(match budget {
            Some(budget) => Box::new(CutOff { inner: reader, budget }),
            None => reader,
        })
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        self.fail_fast(Operation::Write, path)?;
        self.inner.write(path, data).await
    }

    async fn writer(&self, path: &Path) -> Result<BoxAsyncWrite> {
        let budget = self.fail_fast(Operation::Writer, path)?;
        let writer = self.inner.writer(path).await?;
        Ok(match budget {
            Some(budget) => Box::new(CutOff { inner: writer, budget }),
            None => writer,
        })
    }

    async fn create_dir(&self, path: &Path) -> Result<()> {
        self.fail_fast(Operation::CreateDir, path)?;
        self.inner.create_dir(path).await
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        self.fail_fast(Operation::Delete, path)?;
        self.inner.delete(path).await
    }

    async fn remove_dir(&self, path: &Path) -> Result<()> {
        self.fail_fast(Operation::RemoveDir, path)?;
        self.inner.remove_dir(path).await
    }
}

/// Stream wrapper that lets `budget` bytes through, then errors.
struct CutOff<S> {
    inner: S,
    budget: u64,
}
impl<S> CutOff<S> {
    /// How much of a `len`-byte buffer may pass, or the injected error.
    fn allowance(&self, len: usize) -> io::Result<usize> {
        if self.budget == 0 && len > 0 {
            return Err(io::Error::other("injected fault: stream cut off"));
        }
        Ok(len.min(usize::try_from(self.budget).unwrap_or(usize::MAX)))
    }
}
impl<S: AsyncRead + Unpin> AsyncRead for CutOff<S> {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut [u8]) -> Poll<io::Result<usize>> {
        let allowed = match self.allowance(buf.len()) {
            Ok(allowed) => allowed,
            Err(e) => return Poll::Ready(Err(e)),
        };
        let this = &mut *self;
        let poll = Pin::new(&mut this.inner).poll_read(cx, &mut buf[..allowed]);
        if let Poll::Ready(Ok(read)) = poll {
            this.budget -= read as u64;
        }
        poll
    }
}
impl<S: AsyncWrite + Unpin> AsyncWrite for CutOff<S> {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let allowed = match self.allowance(buf.len()) {
            Ok(allowed) => allowed,
            Err(e) => return Poll::Ready(Err(e)),
        };
        let this = &mut *self;
        let poll = Pin::new(&mut this.inner).poll_write(cx, &buf[..allowed]);
        if let Poll::Ready(Ok(written)) = poll {
            this.budget -= written as u64;
        }
        poll
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_close(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use futures::io::{AsyncReadExt, AsyncWriteExt};
    use std::sync::Arc;

    fn faulty(fault: Fault) -> (MockBackend, FaultyBackend) {
        let mock = MockBackend::default();
        let faulty = FaultyBackend::new(Arc::new(mock.clone())).with_fault(fault);
        (mock, faulty)
    }

    #[tokio::test]
    async fn test_fault_matches_prefix_only() {
        let (mock, backend) = faulty(Fault::new(Operation::Write, "library"));
        assert!(backend.write(Path::new("library/song.ini"), b"x").await.is_err());
        backend.write(Path::new("staging/song.ini"), b"x").await.unwrap();
        assert!(!mock.snapshot().contains_key(Path::new("library/song.ini")));
    }

    #[tokio::test]
    async fn test_skip_and_once() {
        let (_mock, backend) = faulty(Fault::new(Operation::CreateDir, "").skip(1).once());
        backend.create_dir(Path::new("a")).await.unwrap();
        assert!(backend.create_dir(Path::new("b")).await.is_err());
        backend.create_dir(Path::new("c")).await.unwrap();
    }

    #[tokio::test]
    async fn test_writer_cut_off_midway() {
        let (mock, backend) = faulty(Fault::new(Operation::Writer, "").after_bytes(4));
        let mut writer = backend.writer(Path::new("song.ogg")).await.unwrap();
        assert!(writer.write_all(b"OggS and more").await.is_err());
        writer.close().await.unwrap();
        assert_eq!(mock.read(Path::new("song.ogg")).await.unwrap(), b"OggS");
    }

    #[tokio::test]
    async fn test_reader_cut_off_midway() {
        let (mock, backend) = faulty(Fault::new(Operation::Reader, "").after_bytes(2));
        mock.write(Path::new("notes.chart"), b"[Song]").await.unwrap();
        let mut reader = backend.reader(Path::new("notes.chart")).await.unwrap();
        let mut contents = Vec::new();
        assert!(reader.read_to_end(&mut contents).await.is_err());
        assert_eq!(contents, b"[S");
    }

    #[tokio::test]
    async fn test_metadata_is_never_faulted() {
        let (mock, backend) = faulty(Fault::new(Operation::Read, ""));
        mock.write(Path::new("a"), b"1").await.unwrap();
        assert!(backend.exists(Path::new("a")).await.unwrap());
        assert_eq!(backend.stat(Path::new("a")).await.unwrap().size, 1);
        assert_eq!(backend.list(None).await.unwrap().len(), 1);
        assert!(backend.read(Path::new("a")).await.is_err());
    }
}
