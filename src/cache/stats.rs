//! Cache Statistics Module
//!
//! Tracks hits, misses, evictions and journal rebuilds.

use serde::Serialize;

// == Cache Stats ==
/// Counters and gauges describing a cache instance.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Number of `get` calls that returned a snapshot
    pub hits: u64,
    /// Number of `get` calls that found nothing readable
    pub misses: u64,
    /// Number of entries removed by trim-to-size
    pub evictions: u64,
    /// Number of times the journal was rewritten
    pub journal_rebuilds: u64,
    /// Current number of entries in the table
    pub entry_count: usize,
    /// Committed bytes across all entries
    pub size: u64,
    /// Configured size bound in bytes
    pub max_size: u64,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no reads have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    // == Record Hit ==
    /// Increments the hit counter.
    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    // == Record Miss ==
    /// Increments the miss counter.
    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    // == Record Eviction ==
    /// Increments the eviction counter.
    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    // == Record Rebuild ==
    /// Increments the journal rebuild counter.
    pub fn record_rebuild(&mut self) {
        self.journal_rebuilds += 1;
    }
}
