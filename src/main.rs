//! Disk LRU - maintenance tool for a journaled disk cache
//!
//! Opens a cache directory and runs one operation against it.

use std::io::Read;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use disk_lru::{Config, DiskLruCache};

/// Inspect and modify a disk LRU cache directory.
#[derive(Parser, Debug)]
#[command(name = "disk_lru", version, about)]
struct Cli {
    /// Cache directory
    #[arg(long, env = "CACHE_DIR")]
    dir: Option<PathBuf>,

    /// Application version recorded in the journal header
    #[arg(long, env = "CACHE_APP_VERSION")]
    app_version: Option<u32>,

    /// Number of values per entry
    #[arg(long, env = "CACHE_VALUE_COUNT")]
    value_count: Option<usize>,

    /// Maximum cache size in bytes
    #[arg(long, env = "CACHE_MAX_SIZE")]
    max_size: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print cache statistics as JSON
    Stats,
    /// List published keys, least recently used first
    Keys,
    /// Print one value of an entry
    Get {
        key: String,
        #[arg(long, default_value_t = 0)]
        slot: usize,
    },
    /// Store an entry; pass one value per slot
    Put { key: String, values: Vec<String> },
    /// Remove an entry
    Remove { key: String },
    /// Trim to size and flush the journal
    Flush,
    /// Delete the cache directory
    Delete,
}

fn main() -> Result<()> {
    // Logs go to stderr so command output stays clean
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "disk_lru=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let defaults = Config::from_env();
    let config = Config {
        cache_dir: cli.dir.unwrap_or(defaults.cache_dir),
        app_version: cli.app_version.unwrap_or(defaults.app_version),
        value_count: cli.value_count.unwrap_or(defaults.value_count),
        max_size: cli.max_size.unwrap_or(defaults.max_size),
        ..defaults
    };
    info!(
        "Configuration loaded: dir={:?}, app_version={}, value_count={}, max_size={}",
        config.cache_dir, config.app_version, config.value_count, config.max_size
    );

    let cache = DiskLruCache::open(
        &config.cache_dir,
        config.app_version,
        config.value_count,
        config.max_size,
    )
    .with_context(|| format!("Failed to open cache at {:?}", config.cache_dir))?;

    run(&cache, cli.command)?;

    if !cache.is_closed() {
        cache.close().context("Failed to close cache")?;
    }
    Ok(())
}

fn run(cache: &DiskLruCache, command: Command) -> Result<()> {
    match command {
        Command::Stats => {
            println!("{}", serde_json::to_string_pretty(&cache.stats())?);
        }
        Command::Keys => {
            for key in cache.keys() {
                println!("{}", key);
            }
        }
        Command::Get { key, slot } => match cache.get(&key)? {
            Some(snapshot) => {
                let mut readers = snapshot.into_readers();
                let Some(reader) = readers.get_mut(slot) else {
                    bail!("slot {} out of range", slot);
                };
                let mut value = Vec::new();
                reader.read_to_end(&mut value)?;
                println!("{}", String::from_utf8_lossy(&value));
            }
            None => bail!("key not found: {}", key),
        },
        Command::Put { key, values } => {
            if values.len() != cache.value_count() {
                bail!(
                    "expected {} values, got {}",
                    cache.value_count(),
                    values.len()
                );
            }
            let Some(mut editor) = cache.edit(&key)? else {
                bail!("key is being edited: {}", key);
            };
            for (slot, value) in values.iter().enumerate() {
                editor.set(slot, value)?;
            }
            editor.commit()?;
            info!("Stored {}", key);
        }
        Command::Remove { key } => {
            if !cache.remove(&key)? {
                bail!("key not found or busy: {}", key);
            }
            info!("Removed {}", key);
        }
        Command::Flush => cache.flush()?,
        Command::Delete => cache.delete()?,
    }
    Ok(())
}
