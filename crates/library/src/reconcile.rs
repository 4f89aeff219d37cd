//! Startup cleanup after an interrupted install.
//!
//! A crash can leave a half-decoded package in staging, or a backup that
//! was never reverted or discarded (possibly next to a half-committed
//! replacement in the library). Running [`reconcile`] before the next
//! install puts the library back into its last known good state: staging is
//! emptied, every complete backup is moved back over whatever now has its
//! name, and backup copies that were never completed (or were already
//! retired) are deleted.
//!
//! Never run this while an install is in flight; it would destroy that
//! install's staged package and undo its backup.

use crate::backup::{complete_marker, marked_name, restore};
use crate::context::Context;
use crate::error::{ErrorKind, Result};
use crate::transaction::remove_entry;
use exn::ResultExt;
use std::collections::BTreeSet;
use tracing::instrument;

/// What [`reconcile`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Reconciled {
    /// Staging entries that were deleted.
    pub discarded_staging: Vec<String>,
    /// Backups moved back into the library.
    pub restored_backups: Vec<String>,
    /// Incomplete or retired backup copies that were deleted.
    pub discarded_backups: Vec<String>,
    /// Entries that couldn't be cleaned up; retried on the next run.
    pub failed: Vec<String>,
}
impl Reconciled {
    pub fn is_clean(&self) -> bool {
        self.discarded_staging.is_empty()
            && self.restored_backups.is_empty()
            && self.discarded_backups.is_empty()
            && self.failed.is_empty()
    }
}

/// Empties the staging area and restores every complete backup into the
/// library.
///
/// Failing to clean up a single entry is logged and recorded in
/// [`Reconciled::failed`]; only failing to list a location is an error.
#[instrument(skip_all, fields(library = %ctx.library))]
pub async fn reconcile(ctx: &Context) -> Result<Reconciled> {
    let mut reconciled = Reconciled::default();

    for entry in ctx.staging.list().await.or_raise(|| ErrorKind::Storage)? {
        let name = entry.name().to_string();
        match remove_entry(&ctx.staging, &name).await {
            Ok(_) => {
                tracing::info!(staging = %name, "Discarded leftover staged package");
                reconciled.discarded_staging.push(name);
            },
            Err(e) => {
                tracing::warn!(staging = %name, error = %e, "Could not discard leftover staged package");
                reconciled.failed.push(name);
            },
        }
    }

    let entries: BTreeSet<String> = ctx
        .backups
        .list()
        .await
        .or_raise(|| ErrorKind::Storage)?
        .iter()
        .map(|entry| entry.name().to_string())
        .collect();
    for name in &entries {
        if let Some(backed_up) = marked_name(name) {
            if !entries.contains(backed_up) {
                // The copy is gone already; only the marker is left over.
                if let Err(e) = remove_entry(&ctx.backups, name).await {
                    tracing::warn!(marker = %name, error = %e, "Could not remove stray backup marker");
                    reconciled.failed.push(name.clone());
                }
            }
            continue;
        }
        if entries.contains(&complete_marker(name)) {
            match restore(&ctx.backups, name, &ctx.library, ctx.concurrency).await {
                Ok(()) => {
                    tracing::info!(package = %name, "Restored leftover backup");
                    reconciled.restored_backups.push(name.clone());
                },
                Err(e) => {
                    tracing::warn!(package = %name, error = %e, "Could not restore leftover backup");
                    reconciled.failed.push(name.clone());
                },
            }
        } else {
            match remove_entry(&ctx.backups, name).await {
                Ok(_) => {
                    tracing::info!(package = %name, "Deleted incomplete or retired backup");
                    reconciled.discarded_backups.push(name.clone());
                },
                Err(e) => {
                    tracing::warn!(package = %name, error = %e, "Could not delete incomplete or retired backup");
                    reconciled.failed.push(name.clone());
                },
            }
        }
    }

    if !reconciled.is_clean() {
        tracing::info!(
            discarded = reconciled.discarded_staging.len(),
            restored = reconciled.restored_backups.len(),
            deleted_backups = reconciled.discarded_backups.len(),
            failed = reconciled.failed.len(),
            "Reconciled library"
        );
    }
    Ok(reconciled)
}
