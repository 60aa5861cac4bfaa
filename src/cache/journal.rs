//! Journal Module
//!
//! Reads and writes the append-only text journal that makes the entry
//! table recoverable after a crash.
//!
//! ```text
//! libcore.io.DiskLruCache
//! 1
//! 100
//! 2
//!
//! CLEAN 3400330d1dfc7f3f7f4b8d4d803dfcf6 832 21054
//! DIRTY 335c4c6028171cfddfbaae1a9c313c52
//! CLEAN 335c4c6028171cfddfbaae1a9c313c52 3934 2342
//! REMOVE 335c4c6028171cfddfbaae1a9c313c52
//! DIRTY 1ab96a171faeeee38496d8b330771a7a
//! CLEAN 1ab96a171faeeee38496d8b330771a7a 1600 234
//! READ 335c4c6028171cfddfbaae1a9c313c52
//! ```
//!
//! The header is the magic string, the journal format version, the
//! application version, the value count and a blank line. Every following
//! line records one state change of one entry.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::cache::entry::validate_key;
use crate::error::{CacheError, Result};

// == File Names ==
pub const JOURNAL_FILE: &str = "journal";
pub const JOURNAL_FILE_TEMP: &str = "journal.tmp";
pub const JOURNAL_FILE_BACKUP: &str = "journal.bkp";

// == Header Constants ==
pub const MAGIC: &str = "libcore.io.DiskLruCache";
pub const VERSION: &str = "1";

const CLEAN: &str = "CLEAN";
const DIRTY: &str = "DIRTY";
const REMOVE: &str = "REMOVE";
const READ: &str = "READ";

// == Journal Header ==
/// The fixed five-line preamble of a journal file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalHeader {
    /// Caller-supplied application version
    pub app_version: u32,
    /// Number of value slots per entry
    pub value_count: usize,
}

impl JournalHeader {
    pub fn new(app_version: u32, value_count: usize) -> Self {
        Self {
            app_version,
            value_count,
        }
    }

    /// Writes the header lines, including the trailing blank line.
    pub fn write_to<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        writeln!(out, "{}", MAGIC)?;
        writeln!(out, "{}", VERSION)?;
        writeln!(out, "{}", self.app_version)?;
        writeln!(out, "{}", self.value_count)?;
        writeln!(out)
    }

    /// Checks the five header lines read from disk against this header.
    pub fn validate(&self, lines: &[String]) -> Result<()> {
        let app_version = self.app_version.to_string();
        let value_count = self.value_count.to_string();
        let expected = [MAGIC, VERSION, app_version.as_str(), value_count.as_str(), ""];

        let matches = lines.len() == expected.len()
            && lines.iter().zip(expected.iter()).all(|(l, e)| l == e);
        if matches {
            Ok(())
        } else {
            Err(CacheError::CorruptJournal(format!(
                "unexpected journal header: {:?}",
                lines
            )))
        }
    }
}

// == Journal Record ==
/// One operation line of the journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalRecord {
    /// An edit started
    Dirty(String),
    /// An edit was published with the given per-slot byte lengths
    Clean(String, Vec<u64>),
    /// The entry was removed, or a first edit was abandoned
    Remove(String),
    /// The entry was read
    Read(String),
}

impl JournalRecord {
    /// Parses a single journal line (without its line terminator).
    ///
    /// The keyword before the first space must match exactly. `CLEAN` must be
    /// followed by the key and exactly `value_count` decimal lengths; every
    /// other keyword is followed by the key alone.
    pub fn parse(line: &str, value_count: usize) -> Result<Self> {
        let corrupt = || CacheError::CorruptJournal(format!("unexpected journal line: {:?}", line));

        let (keyword, rest) = line.split_once(' ').ok_or_else(corrupt)?;

        let record = match keyword {
            CLEAN => {
                let mut parts = rest.split(' ');
                let key = parts.next().ok_or_else(corrupt)?;
                let lengths = parts
                    .map(|p| p.parse::<u64>().map_err(|_| corrupt()))
                    .collect::<Result<Vec<_>>>()?;
                if lengths.len() != value_count {
                    return Err(corrupt());
                }
                JournalRecord::Clean(key.to_string(), lengths)
            }
            DIRTY | REMOVE | READ => {
                if rest.contains(' ') {
                    return Err(corrupt());
                }
                let key = rest.to_string();
                match keyword {
                    DIRTY => JournalRecord::Dirty(key),
                    REMOVE => JournalRecord::Remove(key),
                    _ => JournalRecord::Read(key),
                }
            }
            _ => return Err(corrupt()),
        };

        validate_key(record.key()).map_err(|_| corrupt())?;
        Ok(record)
    }

    /// Returns the key this record refers to.
    pub fn key(&self) -> &str {
        match self {
            JournalRecord::Dirty(key)
            | JournalRecord::Clean(key, _)
            | JournalRecord::Remove(key)
            | JournalRecord::Read(key) => key,
        }
    }
}

impl fmt::Display for JournalRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JournalRecord::Dirty(key) => write!(f, "{} {}", DIRTY, key),
            JournalRecord::Remove(key) => write!(f, "{} {}", REMOVE, key),
            JournalRecord::Read(key) => write!(f, "{} {}", READ, key),
            JournalRecord::Clean(key, lengths) => {
                write!(f, "{} {}", CLEAN, key)?;
                for length in lengths {
                    write!(f, " {}", length)?;
                }
                Ok(())
            }
        }
    }
}

// == Journal Reader ==
/// Streams records out of an existing journal after validating its header.
pub struct JournalReader {
    reader: BufReader<File>,
    value_count: usize,
    lines_read: usize,
    unterminated: bool,
}

impl JournalReader {
    /// Opens `path` and validates its header against `header`.
    pub fn open(path: &Path, header: &JournalHeader) -> Result<Self> {
        let file = File::open(path)?;
        let mut reader = Self {
            reader: BufReader::new(file),
            value_count: header.value_count,
            lines_read: 0,
            unterminated: false,
        };

        let mut lines = Vec::with_capacity(5);
        for _ in 0..5 {
            match reader.read_line()? {
                Some(line) => lines.push(line),
                None => break,
            }
        }
        header.validate(&lines)?;
        Ok(reader)
    }

    /// Returns the next record, or `None` at end of file.
    pub fn next_record(&mut self) -> Result<Option<JournalRecord>> {
        match self.read_line()? {
            Some(line) => {
                self.lines_read += 1;
                JournalRecord::parse(&line, self.value_count).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Number of operation lines read so far (header excluded).
    pub fn lines_read(&self) -> usize {
        self.lines_read
    }

    /// True when the file ended with a partial line, which is ignored.
    pub fn has_unterminated_line(&self) -> bool {
        self.unterminated
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        let mut buf = Vec::new();
        let n = self.reader.read_until(b'\n', &mut buf)?;
        if n == 0 {
            return Ok(None);
        }
        if buf.last() != Some(&b'\n') {
            self.unterminated = true;
            return Ok(None);
        }
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
        String::from_utf8(buf)
            .map(Some)
            .map_err(|_| CacheError::CorruptJournal("journal line is not UTF-8".to_string()))
    }
}

// == Journal Writer ==
/// Buffered append-mode writer over a journal file.
#[derive(Debug)]
pub struct JournalWriter {
    out: BufWriter<File>,
}

impl JournalWriter {
    /// Opens an existing journal for appending.
    pub fn append(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().append(true).open(path)?;
        Ok(Self {
            out: BufWriter::new(file),
        })
    }

    /// Creates (or truncates) a journal at `path` and writes `header`.
    pub fn create(path: &Path, header: &JournalHeader) -> Result<Self> {
        let file = File::create(path)?;
        let mut out = BufWriter::new(file);
        header.write_to(&mut out)?;
        Ok(Self { out })
    }

    /// Buffers one record line.
    pub fn write_record(&mut self, record: &JournalRecord) -> Result<()> {
        writeln!(self.out, "{}", record)?;
        Ok(())
    }

    /// Pushes buffered lines to the operating system.
    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }

    /// Flushes and fsyncs the file, then closes it.
    pub fn finish(mut self) -> Result<()> {
        self.out.flush()?;
        self.out.get_ref().sync_all()?;
        Ok(())
    }
}
