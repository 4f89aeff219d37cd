use super::cancellable::Cancellable;
use super::error::{ErrorKind, Result, Stage};
use super::{InstallRequest, InstallState, Installed};
use crate::backup::{Backup, backup};
use crate::context::{Context, Location};
use crate::transaction::error::ErrorKind as TransactionErrorKind;
use crate::transaction::{move_entry_as, remove_entry, write_from};
use chartshelf_container::error::ErrorKind as ContainerErrorKind;
use chartshelf_container::{Decoder, song_ini};
use chartshelf_storage::backend::stat_opt;
use chartshelf_transport::Transport;
use exn::ResultExt;
use futures::io::AsyncRead;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Fetches `source` through `transport`, then [`install`]s it.
///
/// The package name is checked before anything is fetched, so an
/// [`AlreadyInstalled`](ErrorKind::AlreadyInstalled) package costs no
/// download.
#[instrument(skip(ctx, transport, request), fields(package))]
pub async fn download(
    ctx: &Context,
    transport: &dyn Transport,
    source: &str,
    request: InstallRequest,
) -> Result<Installed> {
    let name = resolve_name(ctx, &request).await?;
    transition(InstallState::Fetching);
    let stream = tokio::select! {
        biased;
        () = request.cancel.cancelled() => {
            aborted(&ErrorKind::Cancelled);
            exn::bail!(ErrorKind::Cancelled);
        },
        fetched = transport.fetch(source) => match fetched {
            Ok(stream) => stream,
            Err(e) => {
                aborted(&ErrorKind::Transport);
                return Err(e).or_raise(|| ErrorKind::Transport);
            },
        },
    };
    run(ctx, stream, request, name).await
}

/// Decodes a container from `stream` into the staging area, then commits
/// it into the library under the name generated from the request's
/// metadata.
///
/// Replacing an existing package backs it up first; the backup is restored
/// if committing fails and discarded once the new package is in place.
///
/// # Errors
///
/// See [`ErrorKind`]. The library is never left holding part of a package.
#[instrument(skip_all, fields(package))]
pub async fn install<R>(ctx: &Context, stream: R, request: InstallRequest) -> Result<Installed>
where
    R: AsyncRead + Send + Unpin,
{
    let name = resolve_name(ctx, &request).await?;
    // The caller already holds the stream; nothing to wait for.
    transition(InstallState::Fetching);
    run(ctx, stream, request, name).await
}

/// Generates the package name and refuses to go on if it's taken and
/// replacing wasn't requested.
async fn resolve_name(ctx: &Context, request: &InstallRequest) -> Result<String> {
    let name = match ctx.naming.generate(&request.meta) {
        Ok(name) => name,
        Err(e) => {
            aborted(&ErrorKind::Naming);
            return Err(e).or_raise(|| ErrorKind::Naming);
        },
    };
    tracing::Span::current().record("package", name.as_str());
    if !request.replace
        && ctx.library.storage().exists(&ctx.library.path(&name)).await.or_raise(|| ErrorKind::Storage(Stage::Staging))?
    {
        let kind = ErrorKind::AlreadyInstalled(name);
        aborted(&kind);
        exn::bail!(kind);
    }
    Ok(name)
}

async fn run<R>(ctx: &Context, stream: R, request: InstallRequest, name: String) -> Result<Installed>
where
    R: AsyncRead + Send + Unpin,
{
    let staging_name = staging_name(&name);
    transition(InstallState::Decoding);
    let entries = match stage(ctx, stream, &request, &ctx.staging.child(&staging_name)).await {
        Ok(entries) => entries,
        Err(e) => {
            aborted(&e);
            discard_staging(ctx, &staging_name).await;
            return Err(e);
        },
    };
    transition(InstallState::Staged);

    if request.cancel.is_cancelled() {
        aborted(&ErrorKind::Cancelled);
        discard_staging(ctx, &staging_name).await;
        exn::bail!(ErrorKind::Cancelled);
    }

    transition(InstallState::Committing);
    let replaced = match commit(ctx, &request, &staging_name, &name).await {
        Ok(replaced) => replaced,
        Err(e) => {
            aborted(&e);
            discard_staging(ctx, &staging_name).await;
            return Err(e);
        },
    };
    transition(InstallState::Done);
    tracing::info!(entries = entries.len(), replaced, "Installed package");
    Ok(Installed { location: ctx.library.clone(), name, entries, replaced })
}

/// Streams every decoded entry into `staged`. Returns the entry names.
async fn stage<R>(ctx: &Context, stream: R, request: &InstallRequest, staged: &Location) -> Result<Vec<String>>
where
    R: AsyncRead + Send + Unpin,
{
    let cancel = &request.cancel;
    let reader = Box::pin(Cancellable::new(stream, cancel.clone()));
    let mut decoder = match Decoder::open(reader).await {
        Ok(decoder) => decoder,
        Err(e) => {
            let kind = decode_failure(&e, cancel);
            return Err(e).or_raise(|| kind);
        },
    };
    if ctx.song_ini {
        let ini = song_ini(decoder.metadata(), request.meta.song_ini_overrides());
        decoder = decoder.with_virtual_entry(ini);
    }
    staged.storage().create_dir(&staged.dir).await.or_raise(|| ErrorKind::Storage(Stage::Staging))?;

    let mut entries = Vec::new();
    loop {
        let mut entry = match decoder.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                let kind = decode_failure(&e, cancel);
                return Err(e).or_raise(|| kind);
            },
        };
        let name = entry.name().to_string();
        let written = write_from(&mut entry, staged.storage(), &staged.path(&name)).await;
        drop(entry);
        match written {
            Ok(bytes) => {
                tracing::debug!(entry = %name, bytes, "Staged entry");
                entries.push(name);
            },
            Err(e) => {
                let kind = match decoder.error() {
                    _ if cancel.is_cancelled() => ErrorKind::Cancelled,
                    Some(fault) => container_failure(fault),
                    None => ErrorKind::Storage(Stage::Staging),
                };
                return Err(e).or_raise(|| kind);
            },
        }
    }
    Ok(entries)
}

/// Moves the staged package into the library. Returns whether an existing
/// package was replaced.
async fn commit(ctx: &Context, request: &InstallRequest, staging_name: &str, name: &str) -> Result<bool> {
    let storage = || ErrorKind::Storage(Stage::Committing);
    let existing = stat_opt(ctx.library.storage(), &ctx.library.path(name)).await.or_raise(storage)?;
    let backup: Option<Backup> = match existing {
        Some(_) if !request.replace => exn::bail!(ErrorKind::AlreadyInstalled(name.to_string())),
        Some(_) => Some(backup(ctx, &ctx.library, name).await.or_raise(storage)?),
        None => None,
    };
    let replaced = backup.is_some();

    match move_entry_as(&ctx.staging, staging_name, &ctx.library, name, ctx.concurrency).await {
        Ok(_) => {
            // A backup that can't be retired would be restored over the new
            // package by the next reconcile, so this isn't done yet.
            if let Some(backup) = backup {
                backup.discard().await.or_raise(|| ErrorKind::Storage(Stage::Discarding))?;
            }
            Ok(replaced)
        },
        Err(e) => {
            if !matches!(&*e, TransactionErrorKind::NotFound(_) | TransactionErrorKind::Overlap(_))
                && let Err(cleanup) = remove_entry(&ctx.library, name).await
            {
                tracing::warn!(error = %cleanup, "Could not remove partially committed package");
            }
            if let Some(backup) = backup
                && let Err(revert) = backup.revert().await
            {
                tracing::warn!(error = %revert, "Could not restore the replaced package");
            }
            Err(e).or_raise(storage)
        },
    }
}

/// Cleanup failures are logged and never mask the error that caused them.
async fn discard_staging(ctx: &Context, staging_name: &str) {
    match remove_entry(&ctx.staging, staging_name).await {
        Ok(_) => tracing::debug!(staging = staging_name, "Discarded staged package"),
        Err(e) => tracing::warn!(staging = staging_name, error = %e, "Could not discard staged package"),
    }
}

/// Unique per attempt, and stable per package so leftovers are easy to
/// trace back.
fn staging_name(name: &str) -> String {
    let hash = blake3::hash(name.as_bytes()).to_hex();
    format!("{}-{}", &hash[..16], OffsetDateTime::now_utc().unix_timestamp_nanos())
}

fn decode_failure(kind: &ContainerErrorKind, cancel: &CancellationToken) -> ErrorKind {
    if cancel.is_cancelled() { ErrorKind::Cancelled } else { container_failure(kind) }
}

fn container_failure(kind: &ContainerErrorKind) -> ErrorKind {
    match kind {
        ContainerErrorKind::Manifest(_) => ErrorKind::Manifest,
        ContainerErrorKind::Framing { name, .. } => ErrorKind::Framing(name.clone()),
        ContainerErrorKind::Transport(_) => ErrorKind::Transport,
    }
}

fn transition(state: InstallState) {
    tracing::info!(%state, "Install state changed");
}

fn aborted(reason: &ErrorKind) {
    tracing::warn!(state = %InstallState::Aborted, %reason, "Install state changed");
}
