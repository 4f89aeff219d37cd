//! Moving, copying and removing whole entries between [`Location`]s.
//!
//! Everything here works across backends: a move is a streamed copy into
//! the destination followed by removal of the source, never a rename. The
//! source is only removed once the whole copy succeeded. Directory copies
//! are best effort: a failed child aborts the call, but children already
//! copied stay where they are, so callers that need all-or-nothing must
//! clean up the destination themselves (the install pipeline does).

pub mod error;

use self::error::{ErrorKind, Result};
use crate::context::{DEFAULT_CONCURRENCY, Location};
use chartshelf_storage::backend::{StorageBackend, stat_opt};
use chartshelf_storage::error::{ErrorKind as StorageErrorKind, Result as StorageResult};
use chartshelf_storage::{EntryKind, validate_name};
use exn::ResultExt;
use futures::future::BoxFuture;
use futures::io::{AsyncRead, AsyncWriteExt};
use futures::{FutureExt, TryStreamExt, stream};
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Where an entry ended up.
#[derive(Debug, Clone)]
pub struct Moved {
    pub location: Location,
    pub name: String,
}
impl Moved {
    pub fn path(&self) -> PathBuf {
        self.location.path(&self.name)
    }
}

/// Moves `name` from `source` into `destination`, keeping its name.
///
/// An entry already called `name` in `destination` is removed first (last
/// writer wins, directories are replaced rather than merged).
///
/// # Errors
///
/// - [`NotFound`](ErrorKind::NotFound) if there is nothing to move.
/// - [`Overlap`](ErrorKind::Overlap) if source and destination contain one
///   another.
/// - [`Storage`](ErrorKind::Storage) if the copy failed; the source is
///   untouched, the destination may hold part of a directory.
pub async fn move_entry(source: &Location, name: &str, destination: &Location) -> Result<Moved> {
    move_entry_as(source, name, destination, name, DEFAULT_CONCURRENCY).await
}

/// [`move_entry`] under a new name, with an explicit bound on how many
/// children of a directory are copied at once.
#[instrument(level = "debug", skip(source, destination), fields(from = %source, to = %destination))]
pub async fn move_entry_as(
    source: &Location,
    name: &str,
    destination: &Location,
    new_name: &str,
    concurrency: usize,
) -> Result<Moved> {
    let moved = transfer(source, name, destination, new_name, concurrency).await?;
    if let Some(moved) = moved {
        source.storage().remove(&source.path(name)).await.or_raise(|| ErrorKind::Storage)?;
        tracing::debug!("Moved entry");
        return Ok(moved);
    }
    Ok(Moved { location: destination.clone(), name: new_name.to_string() })
}

/// Copies `name` from `source` into `destination`. Same semantics as
/// [`move_entry`], minus removing the source.
#[instrument(level = "debug", skip(source, destination), fields(from = %source, to = %destination))]
pub async fn copy_entry(source: &Location, name: &str, destination: &Location, concurrency: usize) -> Result<Moved> {
    let copied = transfer(source, name, destination, name, concurrency).await?;
    Ok(copied.unwrap_or_else(|| Moved { location: destination.clone(), name: name.to_string() }))
}

/// Recursively removes `name` from `location`. Returns `false` if it didn't
/// exist.
#[instrument(level = "debug", skip(location), fields(location = %location))]
pub async fn remove_entry(location: &Location, name: &str) -> Result<bool> {
    validate_name(name).or_raise(|| ErrorKind::InvalidName(name.to_string()))?;
    let path = location.path(name);
    match location.storage().remove(&path).await {
        Ok(()) => Ok(true),
        Err(e) if matches!(&*e, StorageErrorKind::NotFound(_)) => Ok(false),
        Err(e) => Err(e).or_raise(|| ErrorKind::Storage),
    }
}

/// Copies source to destination. `None` if they're the same entry and
/// there's nothing to do.
async fn transfer(
    source: &Location,
    name: &str,
    destination: &Location,
    new_name: &str,
    concurrency: usize,
) -> Result<Option<Moved>> {
    validate_name(name).or_raise(|| ErrorKind::InvalidName(name.to_string()))?;
    validate_name(new_name).or_raise(|| ErrorKind::InvalidName(new_name.to_string()))?;
    let (from, to) = (source.path(name), destination.path(new_name));

    let Some(info) = stat_opt(source.storage(), &from).await.or_raise(|| ErrorKind::Storage)? else {
        exn::bail!(ErrorKind::NotFound(from));
    };
    if source.same_backend(destination) {
        if from == to {
            return Ok(None);
        }
        if to.starts_with(&from) || from.starts_with(&to) {
            exn::bail!(ErrorKind::Overlap(to));
        }
    }

    if stat_opt(destination.storage(), &to).await.or_raise(|| ErrorKind::Storage)?.is_some() {
        tracing::debug!(path = %to.display(), "Replacing existing destination entry");
        destination.storage().remove(&to).await.or_raise(|| ErrorKind::Storage)?;
    }
    copy_tree(source.storage(), from, destination.storage(), to, info.kind, concurrency.max(1)).await?;
    Ok(Some(Moved { location: destination.clone(), name: new_name.to_string() }))
}

/// Boxed so it can recurse.
fn copy_tree<'a>(
    source: &'a dyn StorageBackend,
    from: PathBuf,
    destination: &'a dyn StorageBackend,
    to: PathBuf,
    kind: EntryKind,
    concurrency: usize,
) -> BoxFuture<'a, Result<()>> {
    async move {
        match kind {
            EntryKind::File => {
                let mut reader = source.reader(&from).await.or_raise(|| ErrorKind::Storage)?;
                write_from(&mut reader, destination, &to).await.or_raise(|| ErrorKind::Storage)?;
            },
            EntryKind::Directory => {
                destination.create_dir(&to).await.or_raise(|| ErrorKind::Storage)?;
                let children = source.list(Some(&from)).await.or_raise(|| ErrorKind::Storage)?;
                stream::iter(children.into_iter().map(Ok))
                    .try_for_each_concurrent(concurrency, |child| {
                        let target = to.join(child.name());
                        copy_tree(source, child.path, destination, target, child.kind, concurrency)
                    })
                    .await?;
            },
        }
        Ok(())
    }
    .boxed()
}

/// Streams `reader` into a new file at `path`.
///
/// The writer is always closed, even when copying fails. On any failure the
/// partial file is deleted before the error is returned.
pub(crate) async fn write_from<R>(reader: &mut R, backend: &dyn StorageBackend, path: &Path) -> StorageResult<u64>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut writer = backend.writer(path).await?;
    let copied = futures::io::copy(reader, &mut writer).await;
    let closed = writer.close().await;
    let failure = match (copied, closed) {
        (Ok(bytes), Ok(())) => return Ok(bytes),
        (Err(e), _) | (Ok(_), Err(e)) => e,
    };
    if let Err(cleanup) = backend.delete(path).await {
        tracing::warn!(path = %path.display(), error = %cleanup, "Could not remove partially written file");
    }
    Err(StorageErrorKind::Io(failure).into())
}
