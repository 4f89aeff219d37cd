//! Layered configuration for chartshelf.
//!
//! Values are merged with [`figment`], later layers overriding earlier ones:
//!
//! 1. Built-in defaults ([`Config::default`]); backup and staging
//!    directories live in the platform data directory.
//! 2. A config file, `toml`, `yaml` or `json` by extension. Either given
//!    explicitly or `config.toml` in the platform config directory, if it
//!    exists.
//! 3. Environment variables prefixed `CHARTSHELF_`, with nested keys split on
//!    `__` (`CHARTSHELF_LIBRARY__SONGS=/games/songs`).
//!
//! ```toml
//! [library]
//! songs = "/home/me/Clone Hero/songs"
//! template = "{{ artist }} - {{ name }}"
//! concurrency = 4
//!
//! [log]
//! level = "debug"
//! ```

pub mod error;

use crate::error::{ErrorKind, Result};
use chartshelf_library::{DEFAULT_CONCURRENCY, DEFAULT_TEMPLATE, NameGenerator};
use chartshelf_transport::USER_AGENT;
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix of environment variable overrides.
pub const ENV_PREFIX: &str = "CHARTSHELF_";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "chartshelf")
}

/// `config.toml` in the platform config directory.
pub fn default_config_file() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub library: LibraryConfig,
    pub transport: TransportConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// The game's songs folder. No default: it has to be configured.
    pub songs: Option<PathBuf>,
    pub backups: PathBuf,
    pub staging: PathBuf,
    /// Package folder naming template.
    pub template: String,
    pub concurrency: usize,
    /// Synthesize a `song.ini` from package metadata on install.
    pub song_ini: bool,
}
impl Default for LibraryConfig {
    fn default() -> Self {
        // Without a home directory these stay empty, which validation
        // rejects until they're configured.
        let data = project_dirs().map(|dirs| dirs.data_dir().to_path_buf()).unwrap_or_default();
        Self {
            songs: None,
            backups: data.join("backups"),
            staging: data.join("staging"),
            template: DEFAULT_TEMPLATE.to_string(),
            concurrency: DEFAULT_CONCURRENCY,
            song_ini: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub user_agent: String,
    /// Connect timeout for HTTP sources, in seconds.
    pub timeout_secs: u64,
}
impl Default for TransportConfig {
    fn default() -> Self {
        Self { user_agent: USER_AGENT.to_string(), timeout_secs: 30 }
    }
}
impl TransportConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// A `tracing` filter directive, used when `RUST_LOG` isn't set.
    pub level: String,
}
impl Default for LogConfig {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}

impl Config {
    /// All layers, unextracted. `file` replaces the default config file
    /// location.
    ///
    /// # Errors
    ///
    /// [`NotFound`](ErrorKind::NotFound) if `file` is given but missing,
    /// [`UnsupportedFormat`](ErrorKind::UnsupportedFormat) for an unknown
    /// extension.
    pub fn figment(file: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        let file = match file {
            Some(file) if !file.is_file() => exn::bail!(ErrorKind::NotFound(file.to_path_buf())),
            Some(file) => Some(file.to_path_buf()),
            None => default_config_file().filter(|file| file.is_file()),
        };
        if let Some(file) = file {
            tracing::debug!(path = %file.display(), "Reading config file");
            figment = match file.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase).as_deref() {
                Some("toml") => figment.merge(Toml::file(&file)),
                Some("yaml" | "yml") => figment.merge(Yaml::file(&file)),
                Some("json") => figment.merge(Json::file(&file)),
                _ => exn::bail!(ErrorKind::UnsupportedFormat(file)),
            };
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Loads and validates the configuration.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let config: Config = Self::figment(file)?.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks everything [`load`](Self::load) can't express through types.
    pub fn validate(&self) -> Result<()> {
        let library = &self.library;
        let songs = library.songs.as_deref().filter(|songs| !songs.as_os_str().is_empty());
        let Some(songs) = songs else {
            exn::bail!(ErrorKind::MissingSongs);
        };
        let dirs = [
            ("library.songs", songs),
            ("library.backups", library.backups.as_path()),
            ("library.staging", library.staging.as_path()),
        ];
        for (key, dir) in dirs {
            if !dir.is_absolute() {
                exn::bail!(ErrorKind::Relative(key));
            }
        }
        for (i, &(a_key, a)) in dirs.iter().enumerate() {
            for &(b_key, b) in &dirs[i + 1..] {
                if a.starts_with(b) || b.starts_with(a) {
                    exn::bail!(ErrorKind::Nested(a_key, b_key));
                }
            }
        }
        if library.concurrency == 0 {
            exn::bail!(ErrorKind::Concurrency);
        }
        library.template.parse::<NameGenerator>().or_raise(|| ErrorKind::Template)?;
        Ok(())
    }
}
