//! Configuration Module
//!
//! Loads cache parameters from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the journal and value files
    pub cache_dir: PathBuf,
    /// Application version written to the journal header
    pub app_version: u32,
    /// Number of values per entry
    pub value_count: usize,
    /// Maximum bytes the cache may hold
    pub max_size: u64,
    /// Periodic flush interval in seconds, for long-lived owners that run
    /// [`spawn_flush_task`](crate::tasks::spawn_flush_task)
    pub flush_interval: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_DIR` - Cache directory (default: ./disk-lru-cache)
    /// - `CACHE_APP_VERSION` - Application version (default: 1)
    /// - `CACHE_VALUE_COUNT` - Values per entry (default: 1)
    /// - `CACHE_MAX_SIZE` - Size bound in bytes (default: 10 MiB)
    /// - `FLUSH_INTERVAL` - Flush frequency in seconds (default: 5)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cache_dir: env::var("CACHE_DIR")
                .ok()
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            app_version: parse_var("CACHE_APP_VERSION").unwrap_or(defaults.app_version),
            value_count: parse_var("CACHE_VALUE_COUNT").unwrap_or(defaults.value_count),
            max_size: parse_var("CACHE_MAX_SIZE").unwrap_or(defaults.max_size),
            flush_interval: parse_var("FLUSH_INTERVAL").unwrap_or(defaults.flush_interval),
        }
    }
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("./disk-lru-cache"),
            app_version: 1,
            value_count: 1,
            max_size: 10 * 1024 * 1024,
            flush_interval: 5,
        }
    }
}
