use crate::error::{ErrorKind, Result};
use crate::naming::{DEFAULT_TEMPLATE, NameGenerator};
use chartshelf_storage::backend::StorageBackend;
use chartshelf_storage::error::{ErrorKind as StorageErrorKind, Result as StorageResult};
use chartshelf_storage::{BackendHandle, EntryInfo};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Children processed at once during recursive directory moves.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// A directory on a storage backend. An empty `dir` is the backend root.
#[derive(Clone)]
pub struct Location {
    pub backend: BackendHandle,
    pub dir: PathBuf,
}
impl Location {
    pub fn new(backend: BackendHandle, dir: impl Into<PathBuf>) -> Self {
        Self { backend, dir: dir.into() }
    }

    pub fn root(backend: BackendHandle) -> Self {
        Self::new(backend, PathBuf::new())
    }

    /// Backend path of the entry called `name` in this location.
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// The directory `name` inside this location, as a location of its own.
    pub fn child(&self, name: &str) -> Self {
        Self::new(Arc::clone(&self.backend), self.path(name))
    }

    pub(crate) fn dir(&self) -> Option<&Path> {
        (!self.dir.as_os_str().is_empty()).then_some(self.dir.as_path())
    }

    pub(crate) fn storage(&self) -> &dyn StorageBackend {
        &*self.backend
    }

    /// Immediate children. A location whose directory doesn't exist yet is
    /// simply empty.
    pub async fn list(&self) -> StorageResult<Vec<EntryInfo>> {
        match self.backend.list(self.dir()).await {
            Ok(children) => Ok(children),
            Err(e) if matches!(&*e, StorageErrorKind::NotFound(_)) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// `true` if both locations live on the same backend instance.
    pub(crate) fn same_backend(&self, other: &Location) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.backend), Arc::as_ptr(&other.backend))
    }

    /// `true` if one location contains the other (or they're the same).
    fn overlaps(&self, other: &Location) -> bool {
        self.same_backend(other) && (self.dir.starts_with(&other.dir) || other.dir.starts_with(&self.dir))
    }
}
impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Location").field("backend", &self.backend.name()).field("dir", &self.dir).finish()
    }
}
impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:/{}", self.backend.name(), self.dir.display())
    }
}

/// Everything library operations need, threaded explicitly into every call.
///
/// The three locations must not nest: staging and backup directories inside
/// the library would show up as packages, and a library inside staging
/// would be wiped by [`reconcile`](crate::reconcile::reconcile).
#[derive(Clone, Debug)]
pub struct Context {
    pub library: Location,
    pub backups: Location,
    pub staging: Location,
    pub naming: Arc<NameGenerator>,
    /// Upper bound on concurrent child transfers in a directory move.
    pub concurrency: usize,
    /// Synthesize a `song.ini` from container metadata on install.
    pub song_ini: bool,
}
impl Context {
    /// # Errors
    ///
    /// [`InvalidContext`](ErrorKind::InvalidContext) if any two locations
    /// share a backend and one contains the other.
    pub fn new(library: Location, backups: Location, staging: Location) -> Result<Self> {
        let pairs = [("library", &library, "backups", &backups), ("library", &library, "staging", &staging), (
            "backups", &backups, "staging", &staging,
        )];
        for (a_name, a, b_name, b) in pairs {
            if a.overlaps(b) {
                exn::bail!(ErrorKind::InvalidContext(format!("{a_name} ({a}) and {b_name} ({b}) overlap")));
            }
        }
        Ok(Self {
            library,
            backups,
            staging,
            naming: Arc::new(DEFAULT_TEMPLATE.parse()?),
            concurrency: DEFAULT_CONCURRENCY,
            song_ini: true,
        })
    }

    pub fn with_naming(mut self, naming: NameGenerator) -> Self {
        self.naming = Arc::new(naming);
        self
    }

    /// Zero is treated as one.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_song_ini(mut self, song_ini: bool) -> Self {
        self.song_ini = song_ini;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chartshelf_storage::backend::MockBackend;
    use rstest::rstest;

    #[rstest]
    #[case("songs", "backups", "staging", true)]
    #[case("data/songs", "data/backups", "data/staging", true)]
    #[case("", "backups", "staging", false)]
    #[case("songs", "songs/backups", "staging", false)]
    #[case("songs/staging", "backups", "songs", false)]
    #[case("songs", "backups", "backups", false)]
    fn test_context_rejects_nesting(
        #[case] library: &str,
        #[case] backups: &str,
        #[case] staging: &str,
        #[case] valid: bool,
    ) {
        let backend: BackendHandle = Arc::new(MockBackend::default());
        let context = Context::new(
            Location::new(backend.clone(), library),
            Location::new(backend.clone(), backups),
            Location::new(backend, staging),
        );
        assert_eq!(context.is_ok(), valid);
    }

    #[test]
    fn test_separate_backends_never_overlap() {
        let songs: BackendHandle = Arc::new(MockBackend::default());
        let data: BackendHandle = Arc::new(MockBackend::default());
        let context =
            Context::new(Location::root(songs), Location::new(data.clone(), "backups"), Location::new(data, "staging"));
        assert!(context.is_ok());
    }

    #[test]
    fn test_concurrency_floor() {
        let backend: BackendHandle = Arc::new(MockBackend::default());
        let context = Context::new(
            Location::new(backend.clone(), "a"),
            Location::new(backend.clone(), "b"),
            Location::new(backend, "c"),
        )
        .unwrap()
        .with_concurrency(0);
        assert_eq!(context.concurrency, 1);
    }

    #[tokio::test]
    async fn test_missing_location_lists_empty() {
        let location = Location::new(Arc::new(MockBackend::default()), "nowhere");
        assert!(location.list().await.unwrap().is_empty());
        assert_eq!(location.path("Song"), Path::new("nowhere/Song"));
        assert_eq!(Location::root(location.backend.clone()).path("Song"), Path::new("Song"));
    }
}
