//! larder - Data files and stores for a long-running bot host
//!
//! This binary wires the library crates together:
//! - Configuration loading
//! - Periodic resource refresh (`serve`, `fetch`)
//! - Flat record files (`records`)
//! - Per-channel SQLite stores (`stores`)

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use larder_config::{Settings, load_config};
use larder_refresh::{
    DEFAULT_FETCH_TIMEOUT, PeriodicResourceRefresher, RefresherOptions, ResourceRegistry,
    UrlFetcher,
};
use larder_store::{
    Access, KeyedHandleCache, OwnerToken, RecordCodec, RecordStore, SqliteFactory, Store,
    StoreResult,
};
use larder_util::{ChannelKey, RecordId, default_config_path, format_datetime_full};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// larder - Keeps bot data files fresh and channel stores open
#[derive(Parser, Debug)]
#[command(name = "larder")]
#[command(about = "Keeps bot data files fresh and channel stores open", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/larder/config.toml)
    #[arg(short, long, env = "LARDER_CONFIG", default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Data directory override (or set LARDER_DATA_DIR env var)
    #[arg(short, long, env = "LARDER_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Keep every configured resource fresh until interrupted
    Serve {
        /// How often to check resources for staleness, in seconds
        #[arg(long, default_value_t = 60)]
        tick_seconds: u64,
    },

    /// Refresh resources once and wait for the downloads
    Fetch {
        /// Resource names (default: all configured resources)
        names: Vec<String>,
    },

    /// Print the records of a record file
    Records {
        /// Record file, relative to the data directory unless absolute
        file: PathBuf,

        /// Only show this channel
        #[arg(long)]
        channel: Option<String>,
    },

    /// Read or write a per-channel store
    Stores {
        /// Database name, e.g. "Seen"
        name: String,

        /// Channel whose database to open
        channel: String,

        /// Key to read, or to write when a value is given
        key: Option<String>,

        /// Value to store under the key
        value: Option<String>,
    },
}

/// Keeps record fields as they are on disk
struct RawCodec;

impl RecordCodec for RawCodec {
    type Value = Vec<String>;

    fn deserialize(&self, _: &ChannelKey, _: &RecordId, fields: &[String]) -> StoreResult<Vec<String>> {
        Ok(fields.to_vec())
    }

    fn serialize(&self, value: &Vec<String>) -> StoreResult<Vec<String>> {
        Ok(value.clone())
    }
}

fn load_settings(args: &Args) -> Result<Settings> {
    let mut settings = if args.config.exists() {
        load_config(&args.config)
            .with_context(|| format!("Failed to load config from {:?}", args.config))?
    } else {
        warn!(config_path = %args.config.display(), "Config file not found, using defaults");
        Settings::default()
    };

    if let Some(data_dir) = &args.data_dir {
        settings.service.data_dir = data_dir.clone();
    }

    info!(
        config_path = %args.config.display(),
        data_dir = %settings.service.data_dir.display(),
        resource_count = settings.resources.len(),
        "Configuration loaded"
    );

    Ok(settings)
}

fn build_refresher(settings: &Settings) -> Result<PeriodicResourceRefresher> {
    let registry = ResourceRegistry::from_specs(&settings.resources)?;
    let fetcher = Arc::new(UrlFetcher::new(DEFAULT_FETCH_TIMEOUT)?);

    let refresher = PeriodicResourceRefresher::new(
        RefresherOptions::from(&settings.service),
        registry,
        fetcher,
        Handle::current(),
    )
    .context("Failed to start resource refresher")?;

    Ok(refresher)
}

async fn serve(settings: &Settings, tick: Duration) -> Result<()> {
    let refresher = build_refresher(settings)?;

    let mut sigterm = signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
    let mut sighup = signal(SignalKind::hangup()).context("Failed to create SIGHUP handler")?;

    let mut tick_timer = tokio::time::interval(tick);
    info!(tick_seconds = tick.as_secs(), "Service running");

    loop {
        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down gracefully");
                break;
            }
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down gracefully");
                break;
            }
            _ = sighup.recv() => {
                info!("Received SIGHUP, shutting down gracefully");
                break;
            }
            _ = tick_timer.tick() => {
                for name in settings.resources.iter().map(|r| r.name.as_str()) {
                    match refresher.ensure_fresh(name) {
                        Ok(outcome) => debug!(name, ?outcome, "Checked resource"),
                        Err(e) => warn!(name, error = %e, "Could not check resource"),
                    }
                }
            }
        }
    }

    refresher.shutdown().await;
    info!("Service stopped");
    Ok(())
}

async fn fetch(settings: &Settings, names: &[String]) -> Result<()> {
    let refresher = build_refresher(settings)?;

    let names: Vec<String> = if names.is_empty() {
        refresher.registry().names().map(String::from).collect()
    } else {
        names.to_vec()
    };

    for name in &names {
        let outcome = refresher
            .ensure_fresh(name)
            .with_context(|| format!("Cannot refresh {:?}", name))?;
        debug!(name = %name, ?outcome, "Requested refresh");
    }
    refresher.wait_idle().await;

    for name in &names {
        if let Some(status) = refresher.status(name) {
            let path = refresher.local_path(name).unwrap_or_default();
            println!(
                "{}\t{}\trefreshed {} time(s), last {}",
                name,
                path.display(),
                status.refresh_count,
                format_datetime_full(&status.last_refresh)
            );
        }
    }

    Ok(())
}

fn records(settings: &Settings, file: &Path, channel: Option<&str>) -> Result<()> {
    let path = if file.is_absolute() {
        file.to_path_buf()
    } else {
        settings.service.data_dir.join(file)
    };
    if !path.exists() {
        bail!("Record file not found: {}", path.display());
    }

    let store = RecordStore::open(&path, RawCodec);
    let wanted = channel.map(ChannelKey::new);

    for (key, id, fields) in store.iter() {
        if wanted.as_ref().is_some_and(|w| w != key) {
            continue;
        }
        println!("{}\t{}\t{}", key, id, fields.join("\t"));
    }

    Ok(())
}

fn stores(
    settings: &Settings,
    name: &str,
    channel: &str,
    key: Option<&str>,
    value: Option<&str>,
) -> Result<()> {
    let channel = ChannelKey::new(channel);
    if !channel.is_channel() {
        bail!("Not a channel: {}", channel);
    }

    let owner = OwnerToken::new();
    let placement = settings.clone();
    let factory = SqliteFactory::new(&settings.service.data_dir, name)
        .with_placement(move |c| placement.channel_specific(c));
    let cache = KeyedHandleCache::new(factory, &owner);

    let store = cache.get(&channel, Access::Owner(&owner))?;
    match (key, value) {
        (Some(key), Some(value)) => {
            store.put(key, value.as_bytes())?;
            info!(channel = %channel, key, "Stored value");
        }
        (Some(key), None) => match store.get(key)? {
            Some(bytes) => println!("{}", String::from_utf8_lossy(&bytes)),
            None => bail!("No value for {:?} in {}", key, channel),
        },
        (None, _) => {
            for key in store.keys()? {
                println!("{}", key);
            }
        }
    }

    cache.close_all(&owner).context("Failed to close stores")?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "larder starting");

    let settings = load_settings(&args)?;

    match &args.command {
        Cmd::Serve { tick_seconds } => {
            serve(&settings, Duration::from_secs((*tick_seconds).max(1))).await
        }
        Cmd::Fetch { names } => fetch(&settings, names).await,
        Cmd::Records { file, channel } => records(&settings, file, channel.as_deref()),
        Cmd::Stores {
            name,
            channel,
            key,
            value,
        } => stores(
            &settings,
            name,
            channel,
            key.as_deref(),
            value.as_deref(),
        ),
    }
}
