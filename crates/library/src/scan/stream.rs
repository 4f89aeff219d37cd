use super::error::{ErrorKind as ScanErrorKind, Result as ScanResult};
use super::ini::song_section;
use super::{InstalledChart, PackageKind, SNG_EXTENSION, ScanEvent};
use crate::context::Context;
use crate::error::{ErrorKind as LibraryErrorKind, Result as LibraryResult};
use crate::models::ChartMeta;
use async_stream::stream;
use chartshelf_container::{Decoder, SONG_INI};
use chartshelf_storage::backend::StorageBackend;
use chartshelf_storage::error::ErrorKind as StorageErrorKind;
use chartshelf_storage::{EntryInfo, EntryKind};
use exn::{OptionExt, ResultExt};
use futures::Stream;
use std::path::{Path, PathBuf};

/// Streams [`ScanEvent`]s for every package in the context's library.
///
/// The walk is depth-first; children are visited in the order the backend
/// lists them. A library folder that doesn't exist yet is an empty library.
pub fn scan(ctx: &Context) -> impl Stream<Item = LibraryResult<ScanEvent>> + '_ {
    stream! {
        for await event in scan_inner(ctx) {
            yield event.or_raise(|| LibraryErrorKind::Scan);
        }
    }
}

fn scan_inner(ctx: &Context) -> impl Stream<Item = ScanResult<ScanEvent>> + '_ {
    // `rustfmt` does not format macros that use braces. Wrap in parentheses!
    stream!({
        yield Ok(ScanEvent::Started);
        let backend = ctx.library.storage();
        let root = ctx.library.dir.clone();

        let mut found = 0u64;
        let mut pending = vec![root.clone()];
        while let Some(dir) = pending.pop() {
            let children = match list(backend, &dir).await {
                Ok(children) => children,
                Err(e) if dir == root && matches!(&*e, StorageErrorKind::NotFound(_)) => Vec::new(),
                Err(e) if dir == root => {
                    yield Err(e).or_raise(|| ScanErrorKind::Storage);
                    return;
                },
                Err(e) => {
                    tracing::debug!(path = %dir.display(), error = %e, "Could not list folder");
                    yield Ok(ScanEvent::Skipped(dir));
                    continue;
                },
            };

            let ini = children.iter().find(|child| child.kind == EntryKind::File && child.name().eq_ignore_ascii_case(SONG_INI));
            if dir != root && let Some(ini) = ini {
                match read_folder_package(backend, &dir, &ini.path).await {
                    Ok(chart) => {
                        found += 1;
                        yield Ok(ScanEvent::Found(Box::new(chart)));
                    },
                    Err(e) => {
                        tracing::debug!(path = %dir.display(), error = %e, "Skipping unreadable package");
                        yield Ok(ScanEvent::Skipped(dir));
                    },
                }
                continue;
            }

            let mut subdirs = Vec::new();
            for child in children {
                match child.kind {
                    EntryKind::Directory => subdirs.push(child.path),
                    EntryKind::File if is_sng(&child.path) => match read_sng_package(backend, &child.path).await {
                        Ok(chart) => {
                            found += 1;
                            yield Ok(ScanEvent::Found(Box::new(chart)));
                        },
                        Err(e) => {
                            tracing::debug!(path = %child.path.display(), error = %e, "Skipping unreadable package");
                            yield Ok(ScanEvent::Skipped(child.path));
                        },
                    },
                    EntryKind::File => {},
                }
            }
            // Reversed, so subfolders come off the stack in listing order.
            pending.extend(subdirs.into_iter().rev());
        }

        tracing::debug!(found, "Library scan complete");
        yield Ok(ScanEvent::Complete(found));
    })
}

async fn list(backend: &dyn StorageBackend, dir: &Path) -> chartshelf_storage::error::Result<Vec<EntryInfo>> {
    let dir = (!dir.as_os_str().is_empty()).then_some(dir);
    backend.list(dir).await
}

fn is_sng(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case(SNG_EXTENSION))
}

async fn read_folder_package(backend: &dyn StorageBackend, dir: &Path, ini: &Path) -> ScanResult<InstalledChart> {
    let bytes = backend.read(ini).await.or_raise(|| ScanErrorKind::Storage)?;
    let text = String::from_utf8_lossy(&bytes);
    let meta = ChartMeta::from_pairs(song_section(&text)).ok_or_raise(|| ScanErrorKind::Metadata(ini.to_path_buf()))?;
    Ok(InstalledChart::new(meta, dir.to_path_buf(), PackageKind::Directory))
}

/// Only the container header is read.
async fn read_sng_package(backend: &dyn StorageBackend, path: &Path) -> ScanResult<InstalledChart> {
    let reader = backend.reader(path).await.or_raise(|| ScanErrorKind::Storage)?;
    let decoder = Decoder::open(reader).await.or_raise(|| ScanErrorKind::Container(path.to_path_buf()))?;
    let pairs = decoder.metadata().iter().map(|(key, value)| (key.as_str(), value.as_str()));
    let meta = ChartMeta::from_pairs(pairs).ok_or_raise(|| ScanErrorKind::Metadata(PathBuf::from(path)))?;
    Ok(InstalledChart::new(meta, path.to_path_buf(), PackageKind::Sng))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Location;
    use chartshelf_container::encode::ContainerBuilder;
    use chartshelf_storage::BackendHandle;
    use chartshelf_storage::backend::MockBackend;
    use futures::TryStreamExt;
    use std::sync::Arc;

    fn context(mock: MockBackend) -> Context {
        let backend: BackendHandle = Arc::new(mock);
        Context::new(
            Location::new(backend.clone(), "songs"),
            Location::new(backend.clone(), "backups"),
            Location::new(backend, "staging"),
        )
        .unwrap()
    }

    fn sng(artist: &str, name: &str) -> Vec<u8> {
        ContainerBuilder::new().metadata("artist", artist).metadata("name", name).entry("notes.chart", b"x".to_vec()).build()
    }

    async fn events(ctx: &Context) -> Vec<ScanEvent> {
        scan(ctx).try_collect().await.unwrap()
    }

    #[tokio::test]
    async fn test_finds_folders_and_sng_files() {
        let ctx = context(MockBackend::with_files([
            ("songs/Band - Song (Me)/song.ini", b"[song]\nname = Song\nartist = Band\ncharter = Me\n".to_vec()),
            ("songs/Band - Song (Me)/notes.chart", b"chart".to_vec()),
            ("songs/Band - Song (Me)/extras/song.ini", b"[song]\nname = Nested\n".to_vec()),
            ("songs/Setlist/Other - Tune.sng", sng("Other", "Tune")),
            ("songs/Setlist/Deeper/SONG.INI", b"[Song]\nName = Deep\n".to_vec()),
            ("songs/readme.txt", b"hi".to_vec()),
        ]));

        let events = events(&ctx).await;
        assert!(matches!(events.first(), Some(ScanEvent::Started)));
        assert!(matches!(events.last(), Some(ScanEvent::Complete(3))));
        let found: Vec<_> = events
            .iter()
            .filter_map(|event| match event {
                ScanEvent::Found(chart) => Some((chart.meta.name.as_str(), chart.kind, chart.path.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(found, vec![
            ("Song", PackageKind::Directory, PathBuf::from("songs/Band - Song (Me)")),
            ("Tune", PackageKind::Sng, PathBuf::from("songs/Setlist/Other - Tune.sng")),
            ("Deep", PackageKind::Directory, PathBuf::from("songs/Setlist/Deeper")),
        ]);
    }

    #[tokio::test]
    async fn test_unreadable_packages_are_skipped() {
        let ctx = context(MockBackend::with_files([
            ("songs/Broken/song.ini", b"[song]\nartist = No Name\n".to_vec()),
            ("songs/garbage.sng", b"not a container".to_vec()),
            ("songs/Fine/song.ini", b"[song]\nname = Fine\n".to_vec()),
        ]));

        let events = events(&ctx).await;
        let skipped: Vec<_> = events
            .iter()
            .filter_map(|event| match event {
                ScanEvent::Skipped(path) => Some(path.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(skipped, vec![PathBuf::from("songs/garbage.sng"), PathBuf::from("songs/Broken")]);
        assert!(matches!(events.last(), Some(ScanEvent::Complete(1))));
    }

    #[tokio::test]
    async fn test_missing_library_is_empty() {
        let ctx = context(MockBackend::default());
        let events = events(&ctx).await;
        assert!(matches!(events.as_slice(), [ScanEvent::Started, ScanEvent::Complete(0)]));
    }

    #[tokio::test]
    async fn test_library_root_is_never_a_package() {
        let ctx = context(MockBackend::with_files([
            ("songs/song.ini", b"[song]\nname = Root\n".to_vec()),
            ("songs/Pkg/song.ini", b"[song]\nname = Pkg\n".to_vec()),
        ]));
        assert!(matches!(events(&ctx).await.last(), Some(ScanEvent::Complete(1))));
    }
}
