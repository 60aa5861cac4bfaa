//! Snapshot Module
//!
//! Point-in-time read handle over a committed entry.

use std::fs::File;
use std::io::Read;

use crate::cache::{DiskLruCache, Editor};
use crate::error::{CacheError, Result};

// == Snapshot ==
/// Read access to every value of an entry as of one committed edit.
///
/// All value files are opened when the snapshot is created. Later commits
/// rename new files over the old paths, so the handles held here keep
/// reading the bytes that were current at snapshot time.
#[derive(Debug)]
pub struct Snapshot {
    cache: DiskLruCache,
    key: String,
    sequence_number: u64,
    readers: Vec<File>,
    lengths: Vec<u64>,
}

impl Snapshot {
    pub(crate) fn new(
        cache: DiskLruCache,
        key: String,
        sequence_number: u64,
        readers: Vec<File>,
        lengths: Vec<u64>,
    ) -> Self {
        Self {
            cache,
            key,
            sequence_number,
            readers,
            lengths,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Sequence number of the commit this snapshot observes.
    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    /// Number of value slots.
    pub fn value_count(&self) -> usize {
        self.readers.len()
    }

    /// Byte length of slot `index` as recorded at commit time.
    pub fn length(&self, index: usize) -> Result<u64> {
        self.check_index(index)?;
        Ok(self.lengths[index])
    }

    /// The open file handle for slot `index`.
    pub fn reader(&mut self, index: usize) -> Result<&mut File> {
        self.check_index(index)?;
        Ok(&mut self.readers[index])
    }

    /// Reads the remainder of slot `index` as UTF-8.
    pub fn get_string(&mut self, index: usize) -> Result<String> {
        let mut value = String::new();
        self.reader(index)?.read_to_string(&mut value)?;
        Ok(value)
    }

    /// Starts an edit of this entry, or returns `None` if the entry has been
    /// changed since this snapshot was taken or is being edited.
    pub fn edit(&self) -> Result<Option<Editor>> {
        self.cache.edit_with_sequence(&self.key, self.sequence_number)
    }

    /// Consumes the snapshot, yielding the open handles in slot order.
    pub fn into_readers(self) -> Vec<File> {
        self.readers
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.readers.len() {
            return Err(CacheError::IndexOutOfRange {
                index,
                value_count: self.readers.len(),
            });
        }
        Ok(())
    }
}
