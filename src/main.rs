//! chartshelf: install, replace and scan rhythm-game chart packages.

use chartshelf_config::Config;
use chartshelf_library::install::{InstallRequest, download};
use chartshelf_library::reconcile::reconcile;
use chartshelf_library::scan::{ScanEvent, index, scan};
use chartshelf_library::{ChartMeta, Context, Location, NameGenerator};
use chartshelf_storage::BackendHandle;
use chartshelf_storage::backend::LocalBackend;
use chartshelf_transport::{AnyTransport, HttpTransport};
use clap::{Parser, Subcommand};
use futures::TryStreamExt;
use miette::{IntoDiagnostic, Report, miette};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "chartshelf", version, about)]
struct Cli {
    /// Config file (toml, yaml or json). Defaults to `config.toml` in the
    /// platform config directory.
    #[arg(long, global = true, env = "CHARTSHELF_CONFIG")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Download a chart package and install it into the songs folder.
    Install {
        /// URL or local path of an `.sng` package (optionally compressed).
        source: String,
        #[arg(long)]
        artist: String,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        charter: String,
        /// Replace an installed package with the same name.
        #[arg(long)]
        replace: bool,
    },
    /// List installed charts.
    Scan {
        /// Print the full library index as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Clean up after an interrupted install.
    Reconcile,
}

/// Renders an error tree as a diagnostic: the top-level kind as the
/// message, the full tree (with locations) as help.
fn report<E>(err: exn::Exn<E>) -> Report
where
    E: std::error::Error + Send + Sync + 'static,
{
    miette!(help = format!("{err:?}"), "{}", *err)
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn local(name: &str, root: &Path) -> miette::Result<BackendHandle> {
    Ok(Arc::new(LocalBackend::new(name, root).map_err(report)?))
}

fn context(config: &Config) -> miette::Result<Context> {
    let library = &config.library;
    let songs = library.songs.as_deref().ok_or_else(|| miette!("library.songs must be set"))?;
    let naming: NameGenerator = library.template.parse().map_err(report)?;
    let ctx = Context::new(
        Location::root(local("songs", songs)?),
        Location::root(local("backups", &library.backups)?),
        Location::root(local("staging", &library.staging)?),
    )
    .map_err(report)?;
    Ok(ctx.with_naming(naming).with_concurrency(library.concurrency).with_song_ini(library.song_ini))
}

/// Ctrl-C cancels `token` instead of killing the process, so an install
/// can clean up after itself.
fn cancel_on_interrupt(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            token.cancel();
        }
    });
}

async fn run(cli: Cli) -> miette::Result<()> {
    let config = Config::load(cli.config.as_deref()).map_err(report)?;
    init_logging(&config.log.level);
    let ctx = context(&config)?;

    match cli.command {
        Command::Install { source, artist, title, charter, replace } => {
            let reconciled = reconcile(&ctx).await.map_err(report)?;
            if !reconciled.failed.is_empty() {
                tracing::warn!(failed = ?reconciled.failed, "Some leftovers of earlier installs could not be cleaned up");
            }
            let http = HttpTransport::new(&config.transport.user_agent, config.transport.timeout()).map_err(report)?;
            let transport = AnyTransport::new(http);
            let cancel = CancellationToken::new();
            cancel_on_interrupt(cancel.clone());

            let request = InstallRequest::new(ChartMeta::new(artist, title, charter))
                .replace(replace)
                .with_cancellation(cancel);
            let installed = download(&ctx, &transport, &source, request).await.map_err(report)?;
            let path = config.library.songs.as_deref().map(|songs| songs.join(&installed.name));
            println!("{}", path.unwrap_or_else(|| installed.path()).display());
        },
        Command::Scan { json: true } => {
            let index = index(&ctx).await.map_err(report)?;
            println!("{}", serde_json::to_string_pretty(&index).into_diagnostic()?);
        },
        Command::Scan { json: false } => {
            let mut events = std::pin::pin!(scan(&ctx));
            while let Some(event) = events.try_next().await.map_err(report)? {
                match event {
                    ScanEvent::Found(chart) => {
                        let meta = &chart.meta;
                        println!("{} - {} ({})\t{}", meta.artist, meta.name, meta.charter, chart.path.display());
                    },
                    ScanEvent::Skipped(path) => eprintln!("skipped unreadable package {}", path.display()),
                    ScanEvent::Complete(found) => eprintln!("{found} charts installed"),
                    ScanEvent::Started => {},
                }
            }
        },
        Command::Reconcile => {
            let reconciled = reconcile(&ctx).await.map_err(report)?;
            println!(
                "discarded {} staged, restored {} backups, {} failed",
                reconciled.discarded_staging.len(),
                reconciled.restored_backups.len(),
                reconciled.failed.len()
            );
        },
    }
    Ok(())
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    run(Cli::parse()).await
}
