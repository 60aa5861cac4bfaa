//! Disk LRU - A journaled disk cache
//!
//! Stores a fixed number of file-backed values per key, bounded by total
//! size with LRU eviction, and recovers its index from an append-only
//! journal after a crash.

pub mod cache;
pub mod config;
pub mod error;
pub mod tasks;

pub use cache::{CacheStats, DiskLruCache, Editor, Snapshot};
pub use config::Config;
pub use error::{CacheError, Result};
pub use tasks::spawn_flush_task;
