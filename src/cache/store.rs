//! Cache Store Module
//!
//! The cache engine: journal replay on open, routing of get/edit/remove,
//! size-bounded eviction and journal compaction.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::cache::entry::{validate_key, Entry};
use crate::cache::journal::{
    JournalHeader, JournalReader, JournalRecord, JournalWriter, JOURNAL_FILE,
    JOURNAL_FILE_BACKUP, JOURNAL_FILE_TEMP,
};
use crate::cache::{CacheStats, Editor, LruTable, Snapshot, REDUNDANT_OP_COMPACT_THRESHOLD};
use crate::error::{CacheError, Result};

/// Editor id recorded for `DIRTY` lines replayed from the journal.
const REPLAYED_EDITOR: u64 = 0;

type EvictionListener = Arc<dyn Fn() + Send + Sync>;

// == Disk LRU Cache ==
/// A size-bounded cache of file-backed values, recoverable from its journal.
///
/// Each key maps to `value_count` values stored as files in the cache
/// directory. Handles are cheap to clone and share one engine; every
/// operation is serialized by a single lock.
#[derive(Clone)]
pub struct DiskLruCache {
    shared: Arc<Shared>,
}

struct Shared {
    state: Mutex<CacheState>,
    listener: Mutex<Option<EvictionListener>>,
}

impl DiskLruCache {
    // == Open ==
    /// Opens the cache in `directory`, creating it if none exists.
    ///
    /// A journal written with a different `app_version` or `value_count`, or
    /// one that fails to parse, is discarded together with every file in the
    /// directory and the cache starts empty.
    ///
    /// # Arguments
    /// * `directory` - Directory holding the journal and value files
    /// * `app_version` - Caller version; a change invalidates existing data
    /// * `value_count` - Number of values per entry, must be positive
    /// * `max_size` - Maximum bytes to store, must be positive
    pub fn open(
        directory: impl AsRef<Path>,
        app_version: u32,
        value_count: usize,
        max_size: u64,
    ) -> Result<Self> {
        if max_size == 0 {
            return Err(CacheError::InvalidArgument("max_size <= 0".to_string()));
        }
        if value_count == 0 {
            return Err(CacheError::InvalidArgument("value_count <= 0".to_string()));
        }
        let directory = directory.as_ref().to_path_buf();

        // Prefer the primary journal; fall back to the backup left by an
        // interrupted rebuild.
        let backup = directory.join(JOURNAL_FILE_BACKUP);
        if backup.exists() {
            let journal = directory.join(JOURNAL_FILE);
            if journal.exists() {
                fs::remove_file(&backup)?;
            } else {
                fs::rename(&backup, &journal)?;
            }
        }

        let header = JournalHeader::new(app_version, value_count);
        let mut state = CacheState::new(directory.clone(), header, max_size);

        if state.journal_path().exists() {
            match state.replay_journal() {
                Ok(()) => {
                    info!(
                        "Opened cache at {:?}: {} entries, {} bytes",
                        directory,
                        state.table.len(),
                        state.size
                    );
                    return Ok(Self::from_state(state));
                }
                Err(err) => {
                    warn!(
                        "Cache at {:?} is corrupt ({}), removing its contents",
                        directory, err
                    );
                    drop(state);
                    remove_dir_all_if_exists(&directory)?;
                    state = CacheState::new(directory.clone(), header, max_size);
                }
            }
        }

        fs::create_dir_all(&directory)?;
        state.rebuild_journal()?;
        info!("Created cache at {:?}", directory);
        Ok(Self::from_state(state))
    }

    fn from_state(mut state: CacheState) -> Self {
        state.eviction_notice = false;
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                listener: Mutex::new(None),
            }),
        }
    }

    /// Runs `op` under the engine lock, then fires the eviction listener if
    /// the operation completed an eviction pass.
    pub(crate) fn with_state<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&mut CacheState) -> Result<T>,
    {
        let (result, notify) = {
            let mut state = self.shared.state.lock();
            let result = op(&mut state);
            (result, std::mem::take(&mut state.eviction_notice))
        };
        if notify {
            let listener = self.shared.listener.lock().clone();
            if let Some(listener) = listener {
                listener();
            }
        }
        result
    }

    // == Get ==
    /// Returns a snapshot of `key`, or `None` if it is absent or has never
    /// been published. A returned snapshot moves the entry to the most
    /// recently used position.
    pub fn get(&self, key: &str) -> Result<Option<Snapshot>> {
        let found = self.with_state(|state| state.get(key))?;
        Ok(found.map(|(sequence_number, readers, lengths)| {
            Snapshot::new(self.clone(), key.to_string(), sequence_number, readers, lengths)
        }))
    }

    // == Edit ==
    /// Starts an edit of `key`, or returns `None` if another edit of the
    /// same key is in flight.
    pub fn edit(&self, key: &str) -> Result<Option<Editor>> {
        self.edit_inner(key, None)
    }

    /// Starts an edit only if the entry still carries `sequence_number`.
    pub fn edit_with_sequence(&self, key: &str, sequence_number: u64) -> Result<Option<Editor>> {
        self.edit_inner(key, Some(sequence_number))
    }

    fn edit_inner(&self, key: &str, expected: Option<u64>) -> Result<Option<Editor>> {
        let grant = self.with_state(|state| state.edit(key, expected))?;
        Ok(grant.map(|(id, readable, value_count)| {
            Editor::new(self.clone(), key.to_string(), id, readable, value_count)
        }))
    }

    // == Remove ==
    /// Removes `key` and its files. Returns false if the key is absent or
    /// currently being edited.
    pub fn remove(&self, key: &str) -> Result<bool> {
        self.with_state(|state| state.remove(key))
    }

    // == Flush ==
    /// Trims to size and pushes buffered journal lines to disk.
    pub fn flush(&self) -> Result<()> {
        self.with_state(|state| state.flush())
    }

    // == Close ==
    /// Aborts in-flight edits, trims to size and closes the journal.
    /// Closing an already closed cache does nothing.
    pub fn close(&self) -> Result<()> {
        self.with_state(|state| state.close())
    }

    // == Delete ==
    /// Closes the cache and deletes its directory, including files that
    /// were not created by the cache.
    pub fn delete(&self) -> Result<()> {
        self.with_state(|state| {
            state.close()?;
            remove_dir_all_if_exists(&state.directory)?;
            info!("Deleted cache at {:?}", state.directory);
            Ok(())
        })
    }

    // == Accessors ==
    /// Committed bytes across all entries.
    pub fn size(&self) -> u64 {
        self.shared.state.lock().size
    }

    pub fn max_size(&self) -> u64 {
        self.shared.state.lock().max_size
    }

    /// Changes the size bound, evicting immediately if the cache is over it.
    pub fn set_max_size(&self, max_size: u64) -> Result<()> {
        if max_size == 0 {
            return Err(CacheError::InvalidArgument("max_size <= 0".to_string()));
        }
        self.with_state(|state| {
            state.max_size = max_size;
            if state.is_closed() {
                return Ok(());
            }
            state.cleanup()
        })
    }

    pub fn directory(&self) -> PathBuf {
        self.shared.state.lock().directory.clone()
    }

    pub fn value_count(&self) -> usize {
        self.shared.state.lock().header.value_count
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().is_closed()
    }

    /// Published keys from least to most recently used.
    pub fn keys(&self) -> Vec<String> {
        let state = self.shared.state.lock();
        state
            .table
            .iter()
            .filter(|(_, entry)| entry.readable)
            .map(|(key, _)| key.to_string())
            .collect()
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.shared.state.lock();
        let mut stats = state.stats.clone();
        stats.entry_count = state.table.len();
        stats.size = state.size;
        stats.max_size = state.max_size;
        stats
    }

    // == Eviction Listener ==
    /// Registers a callback fired after an eviction pass evicts entries or
    /// compacts the journal. It runs after the engine lock is released.
    pub fn set_eviction_listener<F>(&self, listener: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let listener: EvictionListener = Arc::new(listener);
        *self.shared.listener.lock() = Some(listener);
    }
}

impl std::fmt::Debug for DiskLruCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("DiskLruCache")
            .field("directory", &state.directory)
            .field("size", &state.size)
            .field("max_size", &state.max_size)
            .field("entries", &state.table.len())
            .finish()
    }
}

// == Cache State ==
/// Engine state guarded by the cache lock.
pub(crate) struct CacheState {
    directory: PathBuf,
    header: JournalHeader,
    max_size: u64,
    /// Committed bytes across all entries
    size: u64,
    table: LruTable<Entry>,
    /// Open journal writer; `None` once closed
    journal: Option<JournalWriter>,
    /// Journal lines that no longer describe a live entry
    redundant_op_count: usize,
    next_sequence_number: u64,
    next_editor_id: u64,
    stats: CacheStats,
    /// Set when an eviction pass completes; drained by `with_state`
    eviction_notice: bool,
}

impl CacheState {
    fn new(directory: PathBuf, header: JournalHeader, max_size: u64) -> Self {
        Self {
            directory,
            header,
            max_size,
            size: 0,
            table: LruTable::new(),
            journal: None,
            redundant_op_count: 0,
            // Replayed entries hold 0; commits in this session start above it.
            next_sequence_number: 1,
            next_editor_id: REPLAYED_EDITOR + 1,
            stats: CacheStats::new(),
            eviction_notice: false,
        }
    }

    fn journal_path(&self) -> PathBuf {
        self.directory.join(JOURNAL_FILE)
    }

    fn is_closed(&self) -> bool {
        self.journal.is_none()
    }

    fn check_not_closed(&self) -> Result<()> {
        if self.is_closed() {
            return Err(CacheError::IllegalState("cache is closed".to_string()));
        }
        Ok(())
    }

    fn journal(&mut self) -> Result<&mut JournalWriter> {
        self.journal
            .as_mut()
            .ok_or_else(|| CacheError::IllegalState("cache is closed".to_string()))
    }

    // == Recovery ==
    /// Rebuilds the entry table from the journal and opens it for append.
    fn replay_journal(&mut self) -> Result<()> {
        let journal_path = self.journal_path();
        let mut reader = JournalReader::open(&journal_path, &self.header)?;
        while let Some(record) = reader.next_record()? {
            self.apply_record(record);
        }
        self.redundant_op_count = reader.lines_read().saturating_sub(self.table.len());

        self.process_journal()?;

        if reader.has_unterminated_line() {
            warn!("Journal ends with a truncated line, rewriting it");
            self.rebuild_journal()?;
        } else {
            self.journal = Some(JournalWriter::append(&journal_path)?);
        }
        Ok(())
    }

    fn apply_record(&mut self, record: JournalRecord) {
        let value_count = self.header.value_count;
        match record {
            JournalRecord::Remove(key) => {
                self.table.remove(&key);
            }
            JournalRecord::Clean(key, lengths) => {
                self.table.touch(&key);
                let entry = self
                    .table
                    .get_or_insert_with(&key, || Entry::new(key.clone(), value_count));
                entry.readable = true;
                entry.current_editor = None;
                entry.lengths = lengths;
            }
            JournalRecord::Dirty(key) => {
                self.table.touch(&key);
                let entry = self
                    .table
                    .get_or_insert_with(&key, || Entry::new(key.clone(), value_count));
                entry.current_editor = Some(REPLAYED_EDITOR);
            }
            JournalRecord::Read(key) => {
                self.table.touch(&key);
            }
        }
    }

    /// Drops entries whose edit was interrupted and totals the rest.
    fn process_journal(&mut self) -> Result<()> {
        delete_if_exists(&self.directory.join(JOURNAL_FILE_TEMP))?;
        for key in self.table.keys() {
            let Some(entry) = self.table.get(&key) else {
                continue;
            };
            if entry.current_editor.is_none() {
                self.size = entry
                    .total_length()
                    .and_then(|length| self.size.checked_add(length))
                    .ok_or_else(|| {
                        CacheError::CorruptJournal(format!("lengths of {} overflow", key))
                    })?;
                continue;
            }
            for index in 0..self.header.value_count {
                delete_if_exists(&entry.clean_file(&self.directory, index))?;
                delete_if_exists(&entry.dirty_file(&self.directory, index))?;
            }
            debug!("Dropped interrupted edit of {}", key);
            self.table.remove(&key);
        }
        Ok(())
    }

    // == Rebuild ==
    /// Writes a compact journal holding one line per entry, then swaps it in
    /// with the journal -> backup, temp -> journal, delete backup sequence.
    fn rebuild_journal(&mut self) -> Result<()> {
        if let Some(journal) = self.journal.as_mut() {
            journal.flush()?;
        }

        let temp = self.directory.join(JOURNAL_FILE_TEMP);
        let mut writer = JournalWriter::create(&temp, &self.header)?;
        for (key, entry) in self.table.iter() {
            let record = if entry.current_editor.is_some() {
                JournalRecord::Dirty(key.to_string())
            } else {
                JournalRecord::Clean(key.to_string(), entry.lengths.clone())
            };
            writer.write_record(&record)?;
        }
        writer.finish()?;

        let journal = self.journal_path();
        let backup = self.directory.join(JOURNAL_FILE_BACKUP);
        if journal.exists() {
            fs::rename(&journal, &backup)?;
        }
        fs::rename(&temp, &journal)?;
        delete_if_exists(&backup)?;

        self.journal = Some(JournalWriter::append(&journal)?);
        self.redundant_op_count = 0;
        self.stats.record_rebuild();
        debug!("Rebuilt journal with {} entries", self.table.len());
        Ok(())
    }

    /// Compaction pays off once dead lines outnumber live entries and reach
    /// the fixed threshold.
    fn journal_rebuild_required(&self) -> bool {
        self.redundant_op_count >= REDUNDANT_OP_COMPACT_THRESHOLD
            && self.redundant_op_count >= self.table.len()
    }

    /// Trims to size and compacts the journal if due.
    fn cleanup(&mut self) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        self.trim_to_size()?;
        if self.journal_rebuild_required() {
            self.rebuild_journal()?;
            self.eviction_notice = true;
        }
        Ok(())
    }

    fn cleanup_if_needed(&mut self) -> Result<()> {
        if self.size > self.max_size || self.journal_rebuild_required() {
            self.cleanup()?;
        }
        Ok(())
    }

    // == Get ==
    fn get(&mut self, key: &str) -> Result<Option<(u64, Vec<File>, Vec<u64>)>> {
        self.check_not_closed()?;
        validate_key(key)?;

        let entry = match self.table.get(key) {
            Some(entry) if entry.readable => entry,
            _ => {
                self.stats.record_miss();
                return Ok(None);
            }
        };

        // Open every slot up front so a later commit cannot mix old and new
        // values within one snapshot.
        let mut readers = Vec::with_capacity(self.header.value_count);
        for index in 0..self.header.value_count {
            let path = entry.clean_file(&self.directory, index);
            match File::open(&path) {
                Ok(file) => readers.push(file),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    warn!("Value file {:?} is missing", path);
                    self.stats.record_miss();
                    return Ok(None);
                }
                Err(err) => return Err(err.into()),
            }
        }
        let sequence_number = entry.sequence_number;
        let lengths = entry.lengths.clone();

        self.redundant_op_count += 1;
        let journal = self.journal()?;
        journal.write_record(&JournalRecord::Read(key.to_string()))?;
        journal.flush()?;
        self.table.touch(key);
        self.stats.record_hit();

        if self.journal_rebuild_required() {
            self.cleanup()?;
        }
        Ok(Some((sequence_number, readers, lengths)))
    }

    // == Edit ==
    /// Binds a new editor to `key`. Returns the editor id, whether the entry
    /// was already readable, and the value count.
    fn edit(&mut self, key: &str, expected: Option<u64>) -> Result<Option<(u64, bool, usize)>> {
        self.check_not_closed()?;
        validate_key(key)?;

        let existing = self.table.get(key);
        if let Some(expected) = expected {
            if existing.map_or(true, |entry| entry.sequence_number != expected) {
                return Ok(None);
            }
        }
        if existing.map_or(false, |entry| entry.current_editor.is_some()) {
            return Ok(None);
        }

        let id = self.next_editor_id;
        self.next_editor_id += 1;

        let value_count = self.header.value_count;
        self.table.touch(key);
        let entry = self
            .table
            .get_or_insert_with(key, || Entry::new(key.to_string(), value_count));
        entry.current_editor = Some(id);
        let readable = entry.readable;

        // Journal the edit before any value is written so a crash leaves a
        // DIRTY line behind.
        let journal = self.journal()?;
        journal.write_record(&JournalRecord::Dirty(key.to_string()))?;
        journal.flush()?;

        Ok(Some((id, readable, value_count)))
    }

    fn current_entry(&self, key: &str, editor_id: u64) -> Result<&Entry> {
        match self.table.get(key) {
            Some(entry) if entry.current_editor == Some(editor_id) => Ok(entry),
            _ => Err(CacheError::IllegalState(format!(
                "editor for {} is no longer current",
                key
            ))),
        }
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.header.value_count {
            return Err(CacheError::IndexOutOfRange {
                index,
                value_count: self.header.value_count,
            });
        }
        Ok(())
    }

    /// Dirty file path for slot `index`, if `editor_id` still owns `key`.
    pub(crate) fn dirty_path(&self, key: &str, editor_id: u64, index: usize) -> Result<PathBuf> {
        self.check_index(index)?;
        let entry = self.current_entry(key, editor_id)?;
        Ok(entry.dirty_file(&self.directory, index))
    }

    /// Clean file path for slot `index`, or `None` if never published.
    pub(crate) fn clean_path_for_editor(
        &self,
        key: &str,
        editor_id: u64,
        index: usize,
    ) -> Result<Option<PathBuf>> {
        self.check_index(index)?;
        let entry = self.current_entry(key, editor_id)?;
        Ok(entry
            .readable
            .then(|| entry.clean_file(&self.directory, index)))
    }

    // == Complete Edit ==
    /// Publishes (`success`) or discards the edit owned by `editor_id`.
    ///
    /// `written` lists the slots the editor wrote; it is only present for an
    /// entry's first publish, which must write every slot.
    pub(crate) fn complete_edit(
        &mut self,
        key: &str,
        editor_id: u64,
        success: bool,
        written: Option<&[bool]>,
    ) -> Result<()> {
        let entry = self.current_entry(key, editor_id)?;

        if success && !entry.readable {
            for index in 0..self.header.value_count {
                let slot_written =
                    written.map_or(false, |w| w.get(index).copied().unwrap_or(false));
                if !slot_written || !entry.dirty_file(&self.directory, index).exists() {
                    self.complete_edit(key, editor_id, false, None)?;
                    return Err(CacheError::IncompleteFirstPublish {
                        key: key.to_string(),
                        index,
                    });
                }
            }
        }

        let directory = &self.directory;
        let value_count = self.header.value_count;
        let Some(entry) = self.table.get_mut(key) else {
            return Ok(());
        };
        // A failing slot must not leave the entry bound to this editor, so the
        // first file error is held until the journal record is written.
        let mut file_error = None;
        for index in 0..value_count {
            let dirty = entry.dirty_file(directory, index);
            let outcome = if !success {
                delete_if_exists(&dirty)
            } else if dirty.exists() {
                let clean = entry.clean_file(directory, index);
                match fs::rename(&dirty, &clean).and_then(|()| fs::metadata(&clean)) {
                    Ok(metadata) => {
                        let old_length = entry.lengths[index];
                        let new_length = metadata.len();
                        entry.lengths[index] = new_length;
                        self.size = self.size - old_length + new_length;
                        Ok(())
                    }
                    Err(err) => Err(err.into()),
                }
            } else {
                Ok(())
            };
            if let Err(err) = outcome {
                warn!("Failed to finish slot {} of {}: {}", index, key, err);
                file_error.get_or_insert(err);
            }
        }

        self.redundant_op_count += 1;
        entry.current_editor = None;
        let published = success && file_error.is_none();
        let record = if entry.readable || published {
            entry.readable = true;
            if success {
                entry.sequence_number = self.next_sequence_number;
                self.next_sequence_number += 1;
            }
            JournalRecord::Clean(key.to_string(), entry.lengths.clone())
        } else {
            // Slots renamed before a failing one belong to no entry now.
            for index in 0..value_count {
                self.size -= entry.lengths[index];
                if let Err(err) = delete_if_exists(&entry.clean_file(directory, index)) {
                    file_error.get_or_insert(err);
                }
            }
            self.table.remove(key);
            JournalRecord::Remove(key.to_string())
        };

        let journal = self.journal()?;
        journal.write_record(&record)?;
        journal.flush()?;
        debug!("{} edit of {}", if success { "Committed" } else { "Aborted" }, key);

        if let Some(err) = file_error {
            return Err(err);
        }
        self.cleanup_if_needed()
    }

    // == Remove ==
    fn remove(&mut self, key: &str) -> Result<bool> {
        self.check_not_closed()?;
        validate_key(key)?;

        if !self.remove_entry(key)? {
            return Ok(false);
        }
        self.journal()?.flush()?;
        if self.journal_rebuild_required() {
            self.cleanup()?;
        }
        Ok(true)
    }

    /// Deletes an idle entry's files and journals its removal.
    fn remove_entry(&mut self, key: &str) -> Result<bool> {
        let directory = &self.directory;
        let entry = match self.table.get_mut(key) {
            Some(entry) if entry.current_editor.is_none() => entry,
            _ => return Ok(false),
        };

        for index in 0..entry.lengths.len() {
            delete_if_exists(&entry.clean_file(directory, index))?;
            self.size -= entry.lengths[index];
            entry.lengths[index] = 0;
        }

        self.redundant_op_count += 1;
        self.journal()?
            .write_record(&JournalRecord::Remove(key.to_string()))?;
        self.table.remove(key);
        Ok(true)
    }

    // == Trim To Size ==
    /// Evicts least recently used idle entries until within `max_size`.
    /// Returns the number of entries evicted.
    fn trim_to_size(&mut self) -> Result<usize> {
        let mut evicted = 0;
        while self.size > self.max_size {
            let victim = self
                .table
                .iter()
                .find(|(_, entry)| entry.current_editor.is_none())
                .map(|(key, _)| key.to_string());
            let Some(key) = victim else {
                break;
            };
            self.remove_entry(&key)?;
            self.stats.record_eviction();
            evicted += 1;
            debug!("Evicted {}", key);
        }
        if evicted > 0 {
            self.eviction_notice = true;
            self.journal()?.flush()?;
            info!(
                "Evicted {} entries, size now {} of {} bytes",
                evicted, self.size, self.max_size
            );
        }
        Ok(evicted)
    }

    // == Flush ==
    fn flush(&mut self) -> Result<()> {
        self.check_not_closed()?;
        self.trim_to_size()?;
        self.journal()?.flush()
    }

    // == Close ==
    fn close(&mut self) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        let editing: Vec<(String, u64)> = self
            .table
            .iter()
            .filter_map(|(key, entry)| entry.current_editor.map(|id| (key.to_string(), id)))
            .collect();
        for (key, id) in editing {
            self.complete_edit(&key, id, false, None)?;
        }
        self.trim_to_size()?;
        if let Some(journal) = self.journal.take() {
            journal.finish()?;
        }
        info!("Closed cache at {:?}", self.directory);
        Ok(())
    }
}

// == File Helpers ==
fn delete_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn remove_dir_all_if_exists(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    const MAX: u64 = 1024 * 1024;

    fn open(dir: &TempDir, max_size: u64) -> DiskLruCache {
        DiskLruCache::open(dir.path(), 100, 2, max_size).unwrap()
    }

    fn put(cache: &DiskLruCache, key: &str, a: &str, b: &str) {
        let mut editor = cache.edit(key).unwrap().unwrap();
        editor.set(0, a).unwrap().set(1, b).unwrap();
        editor.commit().unwrap();
    }

    fn journal_lines(dir: &TempDir) -> Vec<String> {
        fs::read_to_string(dir.path().join(JOURNAL_FILE))
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_open_rejects_bad_arguments() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            DiskLruCache::open(dir.path(), 1, 0, 10),
            Err(CacheError::InvalidArgument(_))
        ));
        assert!(matches!(
            DiskLruCache::open(dir.path(), 1, 2, 0),
            Err(CacheError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_new_cache_writes_header() {
        let dir = TempDir::new().unwrap();
        let _cache = open(&dir, MAX);
        assert_eq!(
            journal_lines(&dir),
            vec!["libcore.io.DiskLruCache", "1", "100", "2", ""]
        );
    }

    #[test]
    fn test_journal_records_operations() {
        let dir = TempDir::new().unwrap();
        let cache = open(&dir, MAX);

        put(&cache, "k1", "A", "BB");
        cache.get("k1").unwrap().unwrap();
        cache.remove("k1").unwrap();

        assert_eq!(
            &journal_lines(&dir)[5..],
            &["DIRTY k1", "CLEAN k1 1 2", "READ k1", "REMOVE k1"]
        );
    }

    #[test]
    fn test_invalid_key_rejected() {
        let dir = TempDir::new().unwrap();
        let cache = open(&dir, MAX);
        assert!(matches!(
            cache.get("Bad Key"),
            Err(CacheError::InvalidArgument(_))
        ));
        assert!(matches!(cache.edit(""), Err(CacheError::InvalidArgument(_))));
        assert!(matches!(
            cache.remove("a/b"),
            Err(CacheError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_operations_on_closed_cache() {
        let dir = TempDir::new().unwrap();
        let cache = open(&dir, MAX);
        cache.close().unwrap();
        cache.close().unwrap();

        assert!(cache.is_closed());
        assert!(matches!(cache.get("k1"), Err(CacheError::IllegalState(_))));
        assert!(matches!(cache.edit("k1"), Err(CacheError::IllegalState(_))));
        assert!(matches!(cache.remove("k1"), Err(CacheError::IllegalState(_))));
        assert!(matches!(cache.flush(), Err(CacheError::IllegalState(_))));
    }

    #[test]
    fn test_second_edit_returns_none() {
        let dir = TempDir::new().unwrap();
        let cache = open(&dir, MAX);

        let first = cache.edit("k1").unwrap();
        assert!(first.is_some());
        assert!(cache.edit("k1").unwrap().is_none());
        assert!(!cache.remove("k1").unwrap());

        first.unwrap().abort().unwrap();
        assert!(cache.edit("k1").unwrap().is_some());
    }

    #[test]
    fn test_size_accounting() {
        let dir = TempDir::new().unwrap();
        let cache = open(&dir, MAX);

        put(&cache, "k1", "aaa", "bb");
        assert_eq!(cache.size(), 5);
        put(&cache, "k1", "a", "b");
        assert_eq!(cache.size(), 2);
        put(&cache, "k2", "1234", "");
        assert_eq!(cache.size(), 6);
        assert!(cache.remove("k1").unwrap());
        assert_eq!(cache.size(), 4);
        assert!(!dir.path().join("k1.0").exists());
        assert!(!cache.remove("k1").unwrap());
    }

    #[test]
    fn test_abort_first_publish_leaves_no_trace() {
        let dir = TempDir::new().unwrap();
        let cache = open(&dir, MAX);

        let mut editor = cache.edit("k1").unwrap().unwrap();
        editor.set(0, "A").unwrap().set(1, "B").unwrap();
        editor.abort().unwrap();

        assert!(cache.get("k1").unwrap().is_none());
        assert!(!dir.path().join("k1.0").exists());
        assert!(!dir.path().join("k1.0.tmp").exists());
        assert!(!dir.path().join("k1.1.tmp").exists());
        assert_eq!(journal_lines(&dir).last().unwrap(), "REMOVE k1");
    }

    #[test]
    fn test_abort_overwrite_keeps_old_values() {
        let dir = TempDir::new().unwrap();
        let cache = open(&dir, MAX);
        put(&cache, "k1", "A", "B");

        let mut editor = cache.edit("k1").unwrap().unwrap();
        editor.set(0, "CCC").unwrap();
        editor.abort().unwrap();

        let mut snapshot = cache.get("k1").unwrap().unwrap();
        assert_eq!(snapshot.get_string(0).unwrap(), "A");
        assert_eq!(snapshot.get_string(1).unwrap(), "B");
        assert_eq!(cache.size(), 2);
        assert!(journal_lines(&dir).contains(&"CLEAN k1 1 1".to_string()));
    }

    #[test]
    fn test_get_with_missing_file_returns_none() {
        let dir = TempDir::new().unwrap();
        let cache = open(&dir, MAX);
        put(&cache, "k1", "A", "B");

        fs::remove_file(dir.path().join("k1.1")).unwrap();
        assert!(cache.get("k1").unwrap().is_none());
    }

    #[test]
    fn test_trim_evicts_least_recently_used() {
        let dir = TempDir::new().unwrap();
        let cache = open(&dir, 10);

        put(&cache, "a", "aa", "aa");
        put(&cache, "b", "bb", "bb");
        cache.get("a").unwrap().unwrap();
        put(&cache, "c", "cc", "cc");

        assert!(cache.size() <= 10);
        assert!(cache.get("b").unwrap().is_none());
        assert!(cache.get("a").unwrap().is_some());
        assert!(cache.get("c").unwrap().is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_trim_skips_entries_being_edited() {
        let dir = TempDir::new().unwrap();
        let cache = open(&dir, 8);

        put(&cache, "a", "aa", "aa");
        let editor = cache.edit("a").unwrap().unwrap();
        put(&cache, "b", "bb", "bb");
        put(&cache, "c", "c", "");

        assert!(cache.get("b").unwrap().is_none());
        drop(editor);
        assert!(cache.get("a").unwrap().is_some());
    }

    #[test]
    fn test_set_max_size_evicts() {
        let dir = TempDir::new().unwrap();
        let cache = open(&dir, MAX);
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        cache.set_eviction_listener(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        put(&cache, "a", "aa", "aa");
        put(&cache, "b", "bb", "bb");
        cache.set_max_size(5).unwrap();

        assert_eq!(cache.max_size(), 5);
        assert_eq!(cache.size(), 4);
        assert_eq!(cache.keys(), vec!["b"]);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(matches!(
            cache.set_max_size(0),
            Err(CacheError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_listener_may_reenter_cache() {
        let dir = TempDir::new().unwrap();
        let cache = open(&dir, 4);
        let observed = Arc::new(AtomicUsize::new(0));
        let inner = cache.clone();
        let seen = observed.clone();
        cache.set_eviction_listener(move || {
            seen.store(inner.size() as usize, Ordering::SeqCst);
        });

        put(&cache, "a", "aa", "aa");
        put(&cache, "b", "bb", "b");

        assert_eq!(observed.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_compaction_after_redundant_ops() {
        let dir = TempDir::new().unwrap();
        let cache = open(&dir, MAX);
        put(&cache, "k1", "A", "B");

        for _ in 0..REDUNDANT_OP_COMPACT_THRESHOLD + 10 {
            cache.get("k1").unwrap().unwrap();
        }

        let lines = journal_lines(&dir);
        assert!(lines.len() < 5 + REDUNDANT_OP_COMPACT_THRESHOLD);
        assert!(cache.stats().journal_rebuilds >= 2);
        assert!(!dir.path().join(JOURNAL_FILE_BACKUP).exists());
        assert!(!dir.path().join(JOURNAL_FILE_TEMP).exists());
    }

    #[test]
    fn test_keys_in_lru_order() {
        let dir = TempDir::new().unwrap();
        let cache = open(&dir, MAX);
        put(&cache, "a", "1", "1");
        put(&cache, "b", "1", "1");
        put(&cache, "c", "1", "1");
        cache.get("a").unwrap();

        let pending = cache.edit("d").unwrap().unwrap();
        assert_eq!(cache.keys(), vec!["b", "c", "a"]);
        drop(pending);
    }

    #[test]
    fn test_delete_removes_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache");
        let cache = DiskLruCache::open(&path, 1, 1, MAX).unwrap();
        let mut editor = cache.edit("k1").unwrap().unwrap();
        editor.set(0, "A").unwrap();
        editor.commit().unwrap();

        cache.delete().unwrap();
        assert!(!path.exists());
        assert!(cache.is_closed());
    }
}
