//! Backing up an entry before it gets replaced, and putting it back.
//!
//! A backup copy only counts once it is complete: after the copy finishes a
//! `.complete-<name>` marker is written next to it, and that marker is
//! removed before the copy is taken apart again (on revert or discard).
//! [`reconcile`](crate::reconcile::reconcile) restores marked copies only,
//! so a crash at any point never restores part of a package over a whole
//! one.

use crate::context::{Context, Location};
use crate::transaction::error::{ErrorKind, Result};
use crate::transaction::{copy_entry, remove_entry};
use exn::ResultExt;
use tracing::instrument;

const COMPLETE_PREFIX: &str = ".complete-";

/// Name of the marker that vouches for the backup copy called `name`.
pub(crate) fn complete_marker(name: &str) -> String {
    format!("{COMPLETE_PREFIX}{name}")
}

/// The backup name a marker vouches for, if `entry` is a marker.
pub(crate) fn marked_name(entry: &str) -> Option<&str> {
    entry.strip_prefix(COMPLETE_PREFIX)
}

/// Copies `name` out of `parent` into the context's backup location, under
/// the same name, then removes the original. Anything already backed up
/// under that name is replaced.
///
/// The returned record must be settled with [`Backup::revert`] or
/// [`Backup::discard`].
///
/// # Errors
///
/// [`InvalidName`](ErrorKind::InvalidName) for names starting with a dot,
/// which are reserved in the backup location.
#[instrument(skip(ctx, parent), fields(parent = %parent))]
pub async fn backup(ctx: &Context, parent: &Location, name: &str) -> Result<Backup> {
    if name.starts_with('.') {
        exn::bail!(ErrorKind::InvalidName(name.to_string()));
    }
    let backups = &ctx.backups;
    let marker = complete_marker(name);
    remove_entry(backups, &marker).await?;

    let copied = match copy_entry(parent, name, backups, ctx.concurrency).await {
        Ok(copied) => copied,
        Err(e) => {
            if matches!(&*e, ErrorKind::Storage)
                && let Err(cleanup) = remove_entry(backups, name).await
            {
                tracing::warn!(error = %cleanup, "Could not remove incomplete backup");
            }
            return Err(e);
        },
    };
    if let Err(e) = backups.storage().write(&backups.path(&marker), b"").await.or_raise(|| ErrorKind::Storage) {
        if let Err(cleanup) = remove_entry(backups, name).await {
            tracing::warn!(error = %cleanup, "Could not remove unmarked backup");
        }
        return Err(e);
    }

    let record = Backup {
        original: parent.clone(),
        backup: copied.location,
        name: copied.name,
        concurrency: ctx.concurrency,
        settled: false,
    };
    if let Err(e) = remove_entry(parent, name).await {
        // The original may be half deleted; put the complete copy back.
        if let Err(revert) = record.revert().await {
            tracing::warn!(error = %revert, "Could not restore original after a failed backup");
        }
        return Err(e);
    }
    tracing::info!(backup = %record.backup, "Backed up existing entry");
    Ok(record)
}

/// Copies the marked backup `name` from `backups` over `original`, then
/// retires the marker and removes the copy.
///
/// Until the marker is gone the copy can be restored again; once it is,
/// whatever is left of the copy is just garbage.
pub(crate) async fn restore(backups: &Location, name: &str, original: &Location, concurrency: usize) -> Result<()> {
    copy_entry(backups, name, original, concurrency).await?;
    remove_entry(backups, &complete_marker(name)).await?;
    if let Err(e) = remove_entry(backups, name).await {
        tracing::warn!(error = %e, backup = %backups, name, "Could not remove restored backup copy");
    }
    Ok(())
}

/// Where an entry was, and where its backup copy is now.
///
/// Settling consumes the record, so a backup is either reverted or
/// discarded, never both. A record dropped unsettled leaves the marked copy
/// in the backup location, to be restored by
/// [`reconcile`](crate::reconcile::reconcile).
#[derive(Debug)]
#[must_use = "a backup must be reverted or discarded"]
pub struct Backup {
    original: Location,
    backup: Location,
    name: String,
    concurrency: usize,
    settled: bool,
}
impl Backup {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn original(&self) -> &Location {
        &self.original
    }

    pub fn location(&self) -> &Location {
        &self.backup
    }

    /// Puts the backup copy back where it came from, overwriting whatever
    /// is there now.
    #[instrument(skip(self), fields(name = %self.name))]
    pub async fn revert(mut self) -> Result<()> {
        // A failed revert leaves the marked copy in place for reconciliation.
        self.settled = true;
        restore(&self.backup, &self.name, &self.original, self.concurrency).await?;
        tracing::info!("Reverted backup");
        Ok(())
    }

    /// Retires the backup copy and deletes it.
    ///
    /// # Errors
    ///
    /// Only if the marker could not be removed, in which case the next
    /// reconciliation would still restore the copy. A copy left behind
    /// after that is logged and deleted by reconciliation.
    #[instrument(skip(self), fields(name = %self.name))]
    pub async fn discard(mut self) -> Result<()> {
        self.settled = true;
        remove_entry(&self.backup, &complete_marker(&self.name)).await?;
        match remove_entry(&self.backup, &self.name).await {
            Ok(true) => tracing::debug!("Discarded backup"),
            Ok(false) => tracing::warn!("Backup was already gone"),
            Err(e) => tracing::warn!(error = %e, "Could not delete retired backup; it goes on the next reconcile"),
        }
        Ok(())
    }
}
impl Drop for Backup {
    fn drop(&mut self) {
        if !self.settled {
            tracing::warn!(
                name = %self.name,
                backup = %self.backup,
                "Backup dropped without being reverted or discarded; it stays until the next reconcile"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chartshelf_storage::BackendHandle;
    use crate::reconcile::reconcile;
    use chartshelf_storage::backend::{Fault, FaultyBackend, MockBackend, Operation};
    use rstest::rstest;
    use std::path::Path;
    use std::sync::Arc;

    fn context(mock: &MockBackend) -> Context {
        let backend: BackendHandle = Arc::new(mock.clone());
        Context::new(
            Location::new(backend.clone(), "songs"),
            Location::new(backend.clone(), "backups"),
            Location::new(backend, "staging"),
        )
        .unwrap()
    }

    #[rstest]
    #[case::directory(vec![("songs/Pkg/notes.chart", b"chart".to_vec()), ("songs/Pkg/song.ogg", vec![9u8; 4096])])]
    #[case::file(vec![("songs/Pkg", b"SNGPKG".to_vec())])]
    #[tokio::test]
    async fn test_backup_then_revert_restores(#[case] files: Vec<(&'static str, Vec<u8>)>) {
        let mock = MockBackend::with_files(files);
        let before = mock.snapshot();
        let ctx = context(&mock);

        let record = backup(&ctx, &ctx.library, "Pkg").await.unwrap();
        assert!(!mock.snapshot().contains_key(Path::new("songs/Pkg")));
        assert!(mock.snapshot().contains_key(Path::new("backups/Pkg")));

        record.revert().await.unwrap();
        let after: Vec<_> = mock.snapshot().into_iter().filter(|(path, _)| path.starts_with("songs")).collect();
        let expected: Vec<_> = before.into_iter().collect();
        assert_eq!(after, expected);
        assert!(!mock.snapshot().contains_key(Path::new("backups/Pkg")));
    }

    #[tokio::test]
    async fn test_revert_overwrites_replacement() {
        let mock = MockBackend::with_files([("songs/Pkg/notes.chart", b"original".to_vec())]);
        let ctx = context(&mock);
        let record = backup(&ctx, &ctx.library, "Pkg").await.unwrap();
        ctx.library.backend.write(Path::new("songs/Pkg/partial.ogg"), b"half").await.unwrap();

        record.revert().await.unwrap();
        let snapshot = mock.snapshot();
        assert_eq!(snapshot.get(Path::new("songs/Pkg/notes.chart")), Some(&Some(b"original".to_vec())));
        assert!(!snapshot.contains_key(Path::new("songs/Pkg/partial.ogg")));
    }

    #[tokio::test]
    async fn test_backup_then_discard() {
        let mock = MockBackend::with_files([("songs/Pkg/notes.chart", b"chart".to_vec())]);
        let ctx = context(&mock);

        let record = backup(&ctx, &ctx.library, "Pkg").await.unwrap();
        record.discard().await.unwrap();
        assert!(!mock.snapshot().keys().any(|path| path.starts_with("songs/Pkg") || path.starts_with("backups/Pkg")));
    }

    #[tokio::test]
    async fn test_backup_of_missing_entry_fails() {
        let mock = MockBackend::default();
        let ctx = context(&mock);
        assert!(backup(&ctx, &ctx.library, "Nope").await.is_err());
    }

    #[tokio::test]
    async fn test_backup_is_marked_complete() {
        let mock = MockBackend::with_files([("songs/Pkg/notes.chart", b"chart".to_vec())]);
        let ctx = context(&mock);

        let record = backup(&ctx, &ctx.library, "Pkg").await.unwrap();
        assert_eq!(mock.snapshot().get(Path::new("backups/.complete-Pkg")), Some(&Some(Vec::new())));
        record.revert().await.unwrap();
        assert!(!mock.snapshot().contains_key(Path::new("backups/.complete-Pkg")));
    }

    #[tokio::test]
    async fn test_failed_backup_copy_is_unmarked() {
        let mock = MockBackend::with_files([
            ("songs/Pkg/notes.chart", b"chart".to_vec()),
            ("songs/Pkg/song.ogg", vec![1u8; 64]),
        ]);
        let faulty: BackendHandle = Arc::new(
            FaultyBackend::new(Arc::new(mock.clone())).with_fault(Fault::new(Operation::Writer, "backups/Pkg/song.ogg")),
        );
        let backend: BackendHandle = Arc::new(mock.clone());
        let ctx = Context::new(
            Location::new(backend.clone(), "songs"),
            Location::new(faulty, "backups"),
            Location::new(backend, "staging"),
        )
        .unwrap();

        assert!(backup(&ctx, &ctx.library, "Pkg").await.is_err());
        let snapshot = mock.snapshot();
        assert!(!snapshot.contains_key(Path::new("backups/.complete-Pkg")));
        assert_eq!(snapshot.get(Path::new("songs/Pkg/song.ogg")), Some(&Some(vec![1u8; 64])));
    }

    #[tokio::test]
    async fn test_discard_retires_backup_even_if_delete_fails() {
        let mock = MockBackend::with_files([("songs/Pkg/notes.chart", b"old chart".to_vec())]);
        let faulty: BackendHandle =
            Arc::new(FaultyBackend::new(Arc::new(mock.clone())).with_fault(Fault::new(Operation::RemoveDir, "backups")));
        let backend: BackendHandle = Arc::new(mock.clone());
        let ctx = Context::new(
            Location::new(backend.clone(), "songs"),
            Location::new(faulty, "backups"),
            Location::new(backend, "staging"),
        )
        .unwrap();

        let record = backup(&ctx, &ctx.library, "Pkg").await.unwrap();
        ctx.library.backend.write(Path::new("songs/Pkg/notes.chart"), b"new chart").await.unwrap();
        record.discard().await.unwrap();
        assert!(!mock.snapshot().contains_key(Path::new("backups/.complete-Pkg")));
        assert!(mock.snapshot().contains_key(Path::new("backups/Pkg")));

        // The leftover copy is never put back over the replacement.
        let reconciled = reconcile(&ctx).await.unwrap();
        assert!(reconciled.restored_backups.is_empty());
        assert_eq!(mock.snapshot().get(Path::new("songs/Pkg/notes.chart")), Some(&Some(b"new chart".to_vec())));
    }

    #[tokio::test]
    async fn test_dot_names_are_reserved() {
        let mock = MockBackend::with_files([("songs/.complete-Pkg", b"x".to_vec())]);
        let ctx = context(&mock);
        let err = backup(&ctx, &ctx.library, ".complete-Pkg").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidName(_)));
    }
}
