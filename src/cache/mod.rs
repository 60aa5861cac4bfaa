//! Cache Module
//!
//! Journaled disk cache with size-bounded LRU eviction.

mod editor;
mod entry;
mod journal;
mod lru;
mod snapshot;
mod stats;
mod store;


// Re-export public types
pub use editor::{Editor, ValueWriter};
pub use entry::validate_key;
pub use journal::{JournalHeader, JournalRecord};
pub use lru::LruTable;
pub use snapshot::Snapshot;
pub use stats::CacheStats;
pub use store::DiskLruCache;

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 120;

/// Dead journal lines tolerated before the journal is compacted
pub const REDUNDANT_OP_COMPACT_THRESHOLD: usize = 2000;

/// Journal file names inside the cache directory
pub use journal::{JOURNAL_FILE, JOURNAL_FILE_BACKUP, JOURNAL_FILE_TEMP};
