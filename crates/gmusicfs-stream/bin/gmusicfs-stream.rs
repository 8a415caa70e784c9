//! gmusicfs-stream binary entry point.
//!
//! A thin wrapper around the gmusicfs-stream library that:
//! 1. Parses command-line arguments
//! 2. Initializes logging
//! 3. Streams a track from explicit URLs, or checks the credential store
//!
//! For library usage, see the gmusicfs-stream crate documentation.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use gmusicfs_stream::{
    AlbumRef, CatalogClient, Credentials, HttpFetcher, OpenTarget, Session, StreamConfig,
    StreamFiles, TrackRef,
};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use url::Url;

#[derive(Debug, Parser)]
#[command(name = "gmusicfs-stream", version, about = "Stream music-library files from the command line")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Read a track through the streaming file handles and save it
    Fetch(FetchArgs),
    /// Load and validate the credential store
    CheckCredentials {
        /// Credential file, defaults to ~/.gmusicfs
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

#[derive(Debug, Args)]
struct FetchArgs {
    /// Stream URL, or several segment URLs carrying range parameters
    #[arg(required = true)]
    urls: Vec<Url>,

    /// Output file, stdout when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Bytes requested per read call
    #[arg(long, default_value_t = 128 * 1024)]
    read_size: usize,

    /// Read the URL as cover art (no tag trailer)
    #[arg(long)]
    cover: bool,

    #[arg(long, default_value = "")]
    title: String,

    #[arg(long, default_value = "")]
    artist: String,

    #[arg(long, default_value = "")]
    album: String,
}

/// Catalog that answers every lookup with the URLs given on the command line
struct FixedCatalog {
    urls: Vec<Url>,
}

impl CatalogClient for FixedCatalog {
    fn stream_urls(&self, _track: &TrackRef) -> gmusicfs_stream::Result<Vec<Url>> {
        Ok(self.urls.clone())
    }

    fn cover_url(&self, _album: &AlbumRef) -> gmusicfs_stream::Result<Option<Url>> {
        Ok(self.urls.first().cloned())
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Fetch(args) => fetch(args),
        Command::CheckCredentials { path } => check_credentials(path),
    }
}

fn fetch(args: FetchArgs) -> Result<()> {
    let config = StreamConfig::from_env()?;
    let fetcher = Arc::new(HttpFetcher::new(&config)?);

    let target = if args.cover {
        OpenTarget::Cover(AlbumRef::new("cli"))
    } else {
        OpenTarget::Track(TrackRef {
            title: args.title,
            artist: args.artist,
            album: args.album,
            ..TrackRef::new("cli")
        })
    };
    let files = StreamFiles::new(FixedCatalog { urls: args.urls }, fetcher, config);

    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    let fh = files.open(&target)?;
    let mut offset = 0u64;
    let result = loop {
        match files.read(fh, offset, args.read_size) {
            Ok(data) if data.is_empty() => break Ok(()),
            Ok(data) => {
                if let Err(e) = out.write_all(&data) {
                    break Err(anyhow::Error::from(e).context("writing output"));
                }
                offset += data.len() as u64;
            }
            Err(e) => break Err(e.into()),
        }
    };
    files.release(fh);
    result?;
    out.flush()?;

    tracing::info!(bytes = offset, "fetch complete");
    Ok(())
}

fn check_credentials(path: Option<PathBuf>) -> Result<()> {
    let path = match path {
        Some(path) => path,
        None => Credentials::default_path().context("HOME is not set")?,
    };
    let session = Session::from_file(&path)
        .with_context(|| format!("credential store {}", path.display()))?;
    tracing::info!(
        username = session.username(),
        device_id = session.device_id(),
        "credentials OK"
    );
    Ok(())
}
