//! Background Tasks Module
//!
//! Optional helpers for long-running owners of a cache.
//!
//! # Tasks
//! - Flush: Periodically trims the cache and flushes its journal

mod flush;

pub use flush::spawn_flush_task;
