//! Named shared memory segment backing the cache index across processes.
//!
//! The segment is a file mapped with `memmap2`, by default under `/dev/shm`,
//! holding `capacity * 4 + 1` native-endian words: the tail counter followed
//! by the node arena. Every process that opens the same cache file derives
//! the same segment name, so they all search and extend one tree instead of
//! each scanning the cache file.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use memmap2::MmapMut;
use vkpc_common::KeyHash;

use crate::error::CacheError;
use crate::index::{arena_words, ArenaWords};

/// A mapped shared memory segment.
pub struct SharedSegment {
    path: PathBuf,
    map: MmapMut,
    _file: File,
}

impl SharedSegment {
    /// Opens the segment at `path`, creating it if needed.
    ///
    /// Returns the segment and whether it was (re)initialized to zero, in
    /// which case the caller must populate it. A segment whose size does not
    /// match `capacity` is reinitialized. The caller must hold the
    /// cross-process lock so that no other process resizes it meanwhile.
    pub fn open_or_create(path: &Path, capacity: u32) -> Result<(Self, bool), CacheError> {
        let shm_error = |reason: String| CacheError::SharedMemory {
            path: path.to_path_buf(),
            reason,
        };
        let io_error = |source: std::io::Error| CacheError::Io {
            path: path.to_path_buf(),
            source,
        };

        let bytes = (arena_words(capacity) * 4) as u64;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(io_error)?;
        let len = file.metadata().map_err(io_error)?.len();

        let fresh = len != bytes;
        if fresh {
            if len != 0 {
                log::warn!(
                    "shared cache index {} has {len} bytes, expected {bytes}; reinitializing",
                    path.display()
                );
            }
            file.set_len(0).map_err(io_error)?;
            file.set_len(bytes).map_err(io_error)?;
        }

        // SAFETY: the mapping is only read or written while the
        // cross-process lock is held, and every process resizes the file
        // only under that same lock.
        let map = unsafe { MmapMut::map_mut(&file) }
            .map_err(|e| shm_error(format!("mmap failed: {e}")))?;

        Ok((
            Self {
                path: path.to_path_buf(),
                map,
                _file: file,
            },
            fresh,
        ))
    }

    /// The segment file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Derives the segment and lock file paths for a cache file.
    ///
    /// The name embeds the hash of the absolute cache path, so processes
    /// sharing a cache file meet in the same segment.
    pub fn paths_for(cache_path: &Path, dir: Option<&Path>) -> (PathBuf, PathBuf) {
        let absolute = if cache_path.is_absolute() {
            cache_path.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(cache_path))
                .unwrap_or_else(|_| cache_path.to_path_buf())
        };
        let stem = format!(
            "vkpc-{}",
            KeyHash::from_bytes(absolute.to_string_lossy().as_bytes())
        );
        let dir = dir.map(Path::to_path_buf).unwrap_or_else(default_dir);
        (
            dir.join(format!("{stem}.shm")),
            dir.join(format!("{stem}.lock")),
        )
    }
}

impl ArenaWords for SharedSegment {
    fn word_count(&self) -> usize {
        self.map.len() / 4
    }

    fn load(&self, i: usize) -> u32 {
        let b = &self.map[i * 4..i * 4 + 4];
        u32::from_ne_bytes([b[0], b[1], b[2], b[3]])
    }

    fn store(&mut self, i: usize, value: u32) {
        self.map[i * 4..i * 4 + 4].copy_from_slice(&value.to_ne_bytes());
    }

    fn clear(&mut self) {
        self.map.fill(0);
    }
}

fn default_dir() -> PathBuf {
    let shm = Path::new("/dev/shm");
    if shm.is_dir() {
        shm.to_path_buf()
    } else {
        std::env::temp_dir()
    }
}
