//! Cache Entry Module
//!
//! Per-key metadata: committed value lengths, publish state, the current
//! editor and the sequence number used to detect stale snapshots.

use std::path::{Path, PathBuf};

use crate::cache::MAX_KEY_LENGTH;
use crate::error::{CacheError, Result};

// == Key Validation ==
/// Checks that `key` is 1..=120 characters of `[a-z0-9_-]`.
pub fn validate_key(key: &str) -> Result<()> {
    let valid_chars = key
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-');
    if key.is_empty() || key.len() > MAX_KEY_LENGTH || !valid_chars {
        return Err(CacheError::InvalidArgument(format!(
            "keys must match regex [a-z0-9_-]{{1,{}}}: \"{}\"",
            MAX_KEY_LENGTH, key
        )));
    }
    Ok(())
}

// == Cache Entry ==
/// Metadata for a single key.
#[derive(Debug, Clone)]
pub struct Entry {
    /// The entry's key
    pub key: String,
    /// Committed byte length of each value slot
    pub lengths: Vec<u64>,
    /// True once the entry has been published at least once
    pub readable: bool,
    /// Id of the in-flight editor, if any
    pub current_editor: Option<u64>,
    /// Sequence number of the most recently committed edit
    pub sequence_number: u64,
}

impl Entry {
    // == Constructor ==
    pub fn new(key: String, value_count: usize) -> Self {
        Self {
            key,
            lengths: vec![0; value_count],
            readable: false,
            current_editor: None,
            sequence_number: 0,
        }
    }

    // == Lengths ==
    /// Total committed bytes across all slots, or `None` on overflow.
    pub fn total_length(&self) -> Option<u64> {
        self.lengths
            .iter()
            .try_fold(0u64, |total, &length| total.checked_add(length))
    }

    // == Files ==
    /// Path of the published file for `index`: `<key>.<index>`.
    pub fn clean_file(&self, directory: &Path, index: usize) -> PathBuf {
        directory.join(format!("{}.{}", self.key, index))
    }

    /// Path of the in-progress file for `index`: `<key>.<index>.tmp`.
    pub fn dirty_file(&self, directory: &Path, index: usize) -> PathBuf {
        directory.join(format!("{}.{}.tmp", self.key, index))
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key_accepts_charset() {
        assert!(validate_key("a").is_ok());
        assert!(validate_key("abc_123-xyz").is_ok());
        assert!(validate_key(&"k".repeat(MAX_KEY_LENGTH)).is_ok());
    }

    #[test]
    fn test_validate_key_rejects() {
        for key in ["", "has space", "UPPER", "new\nline", "dot.key", "slash/key"] {
            assert!(
                matches!(validate_key(key), Err(CacheError::InvalidArgument(_))),
                "{:?} should be rejected",
                key
            );
        }
        assert!(validate_key(&"k".repeat(MAX_KEY_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_entry_new() {
        let entry = Entry::new("k1".to_string(), 3);
        assert_eq!(entry.lengths, vec![0, 0, 0]);
        assert!(!entry.readable);
        assert!(entry.current_editor.is_none());
        assert_eq!(entry.total_length(), Some(0));
    }

    #[test]
    fn test_entry_file_names() {
        let entry = Entry::new("k1".to_string(), 2);
        let dir = Path::new("/cache");
        assert_eq!(entry.clean_file(dir, 0), Path::new("/cache/k1.0"));
        assert_eq!(entry.dirty_file(dir, 1), Path::new("/cache/k1.1.tmp"));
    }

    #[test]
    fn test_entry_total_length_overflow() {
        let mut entry = Entry::new("k1".to_string(), 2);
        entry.lengths = vec![3, 4];
        assert_eq!(entry.total_length(), Some(7));
        entry.lengths = vec![u64::MAX, 1];
        assert_eq!(entry.total_length(), None);
    }
}
