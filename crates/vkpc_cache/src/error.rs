//! Error types for cache operations.

use std::path::PathBuf;

/// Errors that can occur during cache operations.
///
/// Cache operations are fail-safe: lookups turn every error into a miss and
/// failed saves are logged and dropped. This enum is used for internal error
/// propagation within the cache subsystem.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An I/O error occurred while reading or writing cache files.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A chunk in the cache file could not be decoded.
    #[error("invalid chunk at offset {offset}: {reason}")]
    InvalidChunk {
        /// Byte offset of the chunk in the cache file.
        offset: u64,
        /// Description of the problem.
        reason: String,
    },

    /// The cache file has grown past the range a 32-bit offset can address.
    #[error("cache file {path} is too large to index ({size} bytes)")]
    FileTooLarge {
        /// The cache file path.
        path: PathBuf,
        /// Current file size.
        size: u64,
    },

    /// The shared memory segment could not be set up.
    #[error("shared memory segment {path}: {reason}")]
    SharedMemory {
        /// The segment path.
        path: PathBuf,
        /// Description of the problem.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_display() {
        let err = CacheError::Io {
            path: PathBuf::from("/tmp/shadercache.bin"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
        };
        let msg = err.to_string();
        assert!(msg.contains("cache I/O error"));
        assert!(msg.contains("shadercache.bin"));
    }

    #[test]
    fn invalid_chunk_display() {
        let err = CacheError::InvalidChunk {
            offset: 128,
            reason: "hash mismatch".to_string(),
        };
        assert_eq!(err.to_string(), "invalid chunk at offset 128: hash mismatch");
    }

    #[test]
    fn file_too_large_display() {
        let err = CacheError::FileTooLarge {
            path: PathBuf::from("big.bin"),
            size: 1 << 33,
        };
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn shared_memory_display() {
        let err = CacheError::SharedMemory {
            path: PathBuf::from("/dev/shm/vkpc.shm"),
            reason: "size mismatch".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("shared memory segment"));
        assert!(msg.contains("size mismatch"));
    }
}
