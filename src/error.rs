//! Error types for the disk cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the disk cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Bad constructor parameters or a malformed key
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Journal header or line failed to parse
    #[error("Corrupt journal: {0}")]
    CorruptJournal(String),

    /// Operation not allowed in the current state (closed cache, stale editor)
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// Value slot index outside `[0, value_count)`
    #[error("Index {index} out of range for value count {value_count}")]
    IndexOutOfRange { index: usize, value_count: usize },

    /// First commit of an entry did not write every slot
    #[error("Newly created entry {key} didn't create value for index {index}")]
    IncompleteFirstPublish { key: String, index: usize },

    /// Underlying file system failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// == Result Type Alias ==
/// Convenience Result type for the disk cache.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CacheError::IndexOutOfRange {
            index: 3,
            value_count: 2,
        };
        assert_eq!(err.to_string(), "Index 3 out of range for value count 2");

        let err = CacheError::IncompleteFirstPublish {
            key: "k1".to_string(),
            index: 1,
        };
        assert!(err.to_string().contains("k1"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: CacheError = io.into();
        assert!(matches!(err, CacheError::Io(_)));
    }
}
