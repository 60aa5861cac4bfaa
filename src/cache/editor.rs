//! Editor Module
//!
//! Scoped write handle for one in-flight edit of one entry.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use tracing::debug;

use crate::cache::DiskLruCache;
use crate::error::{CacheError, Result};

// == Editor ==
/// Exclusive write access to the values of a single entry.
///
/// Values are written to dirty files and published atomically by
/// [`Editor::commit`]. An editor that is dropped without being committed
/// is aborted.
pub struct Editor {
    cache: DiskLruCache,
    key: String,
    id: u64,
    /// Slots written so far; only tracked for an entry's first publish
    written: Option<Vec<bool>>,
    /// First I/O error absorbed by a value writer
    fault: Option<io::Error>,
    done: bool,
}

impl Editor {
    // == Constructor ==
    pub(crate) fn new(
        cache: DiskLruCache,
        key: String,
        id: u64,
        readable: bool,
        value_count: usize,
    ) -> Self {
        Self {
            cache,
            key,
            id,
            written: (!readable).then(|| vec![false; value_count]),
            fault: None,
            done: false,
        }
    }

    /// The key being edited.
    pub fn key(&self) -> &str {
        &self.key
    }

    // == Output Stream ==
    /// Returns a writer for value slot `index`, replacing its dirty file.
    ///
    /// I/O failures on the returned writer never surface per call; they are
    /// recorded on the editor and cause [`Editor::commit`] to abort.
    pub fn new_output_stream(&mut self, index: usize) -> Result<ValueWriter<'_>> {
        let key = &self.key;
        let id = self.id;
        let opened = self.cache.with_state(|state| {
            let path = state.dirty_path(key, id, index)?;
            Ok(open_dirty_file(&path))
        })?;

        if let Some(written) = self.written.as_mut() {
            written[index] = true;
        }

        let out = match opened {
            Ok(file) => Some(BufWriter::new(file)),
            Err(err) => {
                debug!("Failed to open dirty file for {}: {}", self.key, err);
                self.fault.get_or_insert(err);
                None
            }
        };
        Ok(ValueWriter {
            out,
            fault: &mut self.fault,
        })
    }

    // == Set ==
    /// Writes `value` as the whole content of slot `index`.
    pub fn set(&mut self, index: usize, value: &str) -> Result<&mut Self> {
        let mut writer = self.new_output_stream(index)?;
        writer.write_all(value.as_bytes())?;
        drop(writer);
        Ok(self)
    }

    // == Get String ==
    /// Reads the last committed value of slot `index`, or `None` if the entry
    /// has never been published.
    pub fn get_string(&self, index: usize) -> Result<Option<String>> {
        let path = self
            .cache
            .with_state(|state| state.clean_path_for_editor(&self.key, self.id, index))?;
        match path {
            Some(path) => match fs::read_to_string(path) {
                Ok(value) => Ok(Some(value)),
                Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
                Err(err) => Err(err.into()),
            },
            None => Ok(None),
        }
    }

    // == Commit ==
    /// Publishes the edit, making it visible to readers.
    ///
    /// If a value writer hit an I/O error, or a value file cannot be
    /// published, the edit is aborted, the entry is removed, and that error
    /// is returned.
    pub fn commit(mut self) -> Result<()> {
        self.done = true;
        if let Some(err) = self.fault.take() {
            let aborted = self
                .cache
                .with_state(|state| state.complete_edit(&self.key, self.id, false, None));
            if let Err(abort_err) = aborted {
                debug!("Abort of faulted edit {} failed: {}", self.key, abort_err);
            }
            self.cache.remove(&self.key)?;
            return Err(err.into());
        }
        let written = self.written.take();
        let published = self.cache.with_state(|state| {
            state.complete_edit(&self.key, self.id, true, written.as_deref())
        });
        if let Err(CacheError::Io(err)) = published {
            self.cache.remove(&self.key)?;
            return Err(err.into());
        }
        published
    }

    // == Abort ==
    /// Discards the edit. Previously committed values stay untouched.
    pub fn abort(mut self) -> Result<()> {
        self.done = true;
        self.cache
            .with_state(|state| state.complete_edit(&self.key, self.id, false, None))
    }
}

impl Drop for Editor {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let result = self
            .cache
            .with_state(|state| state.complete_edit(&self.key, self.id, false, None));
        if let Err(err) = result {
            debug!("Abandoned edit of {} could not be aborted: {}", self.key, err);
        }
    }
}

impl std::fmt::Debug for Editor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Editor")
            .field("key", &self.key)
            .field("id", &self.id)
            .field("has_errors", &self.fault.is_some())
            .finish()
    }
}

fn open_dirty_file(path: &Path) -> io::Result<File> {
    match File::create(path) {
        Ok(file) => Ok(file),
        Err(_) => {
            // The cache directory may have been removed from under us.
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            File::create(path)
        }
    }
}

// == Value Writer ==
/// Writer for one value slot that never reports I/O errors to the caller.
///
/// The first failure is stored on the owning [`Editor`] and every later
/// write becomes a no-op. Buffered bytes are flushed on drop.
pub struct ValueWriter<'a> {
    out: Option<BufWriter<File>>,
    fault: &'a mut Option<io::Error>,
}

impl ValueWriter<'_> {
    fn fail(&mut self, err: io::Error) {
        self.out = None;
        self.fault.get_or_insert(err);
    }
}

impl Write for ValueWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(out) = self.out.as_mut() {
            if let Err(err) = out.write_all(buf) {
                self.fail(err);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(out) = self.out.as_mut() {
            if let Err(err) = out.flush() {
                self.fail(err);
            }
        }
        Ok(())
    }
}

impl Drop for ValueWriter<'_> {
    fn drop(&mut self) {
        let _ = Write::flush(self);
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;
    use tempfile::TempDir;

    fn open_cache(dir: &TempDir) -> DiskLruCache {
        DiskLruCache::open(dir.path(), 100, 2, 1024 * 1024).unwrap()
    }

    #[test]
    fn test_value_writer_absorbs_missing_file() {
        let mut fault = None;
        {
            let mut writer = ValueWriter {
                out: None,
                fault: &mut fault,
            };
            assert_eq!(writer.write(b"abc").unwrap(), 3);
            writer.flush().unwrap();
        }
        assert!(fault.is_none());
    }

    #[test]
    fn test_set_chain_and_commit() {
        let dir = TempDir::new().unwrap();
        let cache = open_cache(&dir);

        let mut editor = cache.edit("k1").unwrap().unwrap();
        editor.set(0, "A").unwrap().set(1, "B").unwrap();
        editor.commit().unwrap();

        let mut snapshot = cache.get("k1").unwrap().unwrap();
        assert_eq!(snapshot.get_string(0).unwrap(), "A");
        assert_eq!(snapshot.get_string(1).unwrap(), "B");
    }

    #[test]
    fn test_output_stream_index_out_of_range() {
        let dir = TempDir::new().unwrap();
        let cache = open_cache(&dir);

        let mut editor = cache.edit("k1").unwrap().unwrap();
        let result = editor.new_output_stream(2);
        assert!(matches!(
            result,
            Err(CacheError::IndexOutOfRange {
                index: 2,
                value_count: 2
            })
        ));
    }

    #[test]
    fn test_first_publish_requires_every_slot() {
        let dir = TempDir::new().unwrap();
        let cache = open_cache(&dir);

        let mut editor = cache.edit("k1").unwrap().unwrap();
        editor.set(0, "A").unwrap();
        let result = editor.commit();
        assert!(matches!(
            result,
            Err(CacheError::IncompleteFirstPublish { index: 1, .. })
        ));

        assert!(cache.get("k1").unwrap().is_none());
        assert!(!dir.path().join("k1.0.tmp").exists());
        assert!(cache.edit("k1").unwrap().is_some());
    }

    #[test]
    fn test_overwrite_may_skip_slots() {
        let dir = TempDir::new().unwrap();
        let cache = open_cache(&dir);

        let mut editor = cache.edit("k1").unwrap().unwrap();
        editor.set(0, "A").unwrap().set(1, "B").unwrap();
        editor.commit().unwrap();

        let mut editor = cache.edit("k1").unwrap().unwrap();
        editor.set(1, "CC").unwrap();
        editor.commit().unwrap();

        let mut snapshot = cache.get("k1").unwrap().unwrap();
        assert_eq!(snapshot.get_string(0).unwrap(), "A");
        assert_eq!(snapshot.get_string(1).unwrap(), "CC");
        assert_eq!(cache.size(), 3);
    }

    #[test]
    fn test_get_string_reads_committed_value() {
        let dir = TempDir::new().unwrap();
        let cache = open_cache(&dir);

        let mut editor = cache.edit("k1").unwrap().unwrap();
        assert_eq!(editor.get_string(0).unwrap(), None);
        editor.set(0, "A").unwrap().set(1, "B").unwrap();
        editor.commit().unwrap();

        let mut editor = cache.edit("k1").unwrap().unwrap();
        editor.set(0, "Z").unwrap();
        assert_eq!(editor.get_string(0).unwrap(), Some("A".to_string()));
        editor.abort().unwrap();
    }

    #[test]
    fn test_drop_aborts_edit() {
        let dir = TempDir::new().unwrap();
        let cache = open_cache(&dir);

        {
            let mut editor = cache.edit("k1").unwrap().unwrap();
            editor.set(0, "A").unwrap();
        }

        assert!(!dir.path().join("k1.0.tmp").exists());
        assert!(cache.edit("k1").unwrap().is_some());
    }

    #[test]
    fn test_faulted_commit_removes_entry() {
        let dir = TempDir::new().unwrap();
        let cache = open_cache(&dir);

        let mut editor = cache.edit("k1").unwrap().unwrap();
        editor.set(0, "A").unwrap().set(1, "B").unwrap();
        editor.commit().unwrap();

        // A directory in the way makes both the write and the cleanup fail.
        fs::create_dir(dir.path().join("k1.0.tmp")).unwrap();
        let mut editor = cache.edit("k1").unwrap().unwrap();
        editor.set(0, "C").unwrap();
        assert!(matches!(editor.commit(), Err(CacheError::Io(_))));

        assert!(cache.get("k1").unwrap().is_none());
        assert!(!dir.path().join("k1.0").exists());
        assert!(!dir.path().join("k1.1").exists());
        assert_eq!(cache.size(), 0);
        assert!(!cache.remove("k1").unwrap());

        assert!(cache.edit("k1").unwrap().is_some());
    }

    #[test]
    fn test_faulted_first_publish_releases_key() {
        let dir = TempDir::new().unwrap();
        let cache = open_cache(&dir);

        fs::create_dir(dir.path().join("k1.0.tmp")).unwrap();
        let mut editor = cache.edit("k1").unwrap().unwrap();
        editor.set(0, "A").unwrap().set(1, "B").unwrap();
        assert!(matches!(editor.commit(), Err(CacheError::Io(_))));

        assert!(cache.get("k1").unwrap().is_none());
        assert!(!dir.path().join("k1.1.tmp").exists());
        assert!(cache.edit("k1").unwrap().is_some());
    }

    #[test]
    fn test_stale_editor_after_close() {
        let dir = TempDir::new().unwrap();
        let cache = open_cache(&dir);

        let mut editor = cache.edit("k1").unwrap().unwrap();
        cache.close().unwrap();

        assert!(matches!(
            editor.new_output_stream(0),
            Err(CacheError::IllegalState(_))
        ));
        assert!(matches!(editor.commit(), Err(CacheError::IllegalState(_))));
    }
}
