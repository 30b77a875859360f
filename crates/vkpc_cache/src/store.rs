//! Append-only chunk file holding cached artifacts.
//!
//! The file is a plain concatenation of chunks with no file header. Each
//! chunk is, in the writing machine's byte order:
//!
//! ```text
//! u32 chunk_size      bytes following this field
//! u32 hash            FNV-1 hash of the key text
//! i32 format          artifact format tag
//! u32 length          binary length
//! u8  binary[length]
//! u32 source_length   key text length
//! u8  source[source_length]
//! ```
//!
//! Chunks are never rewritten. The only way to reclaim space is to truncate
//! the whole file.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use vkpc_common::KeyHash;

use crate::error::CacheError;
use crate::index::{ArenaWords, CacheIndex};
use crate::key::CacheKey;

/// Bytes of fixed-size fields after `chunk_size`: hash, format, length, source_length.
const FIXED_FIELDS: u64 = 16;

/// Format tag of a cached artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactFormat {
    /// A SPIR-V module as a sequence of 32-bit words.
    SpirvBinary,
}

impl ArtifactFormat {
    /// The on-disk tag.
    pub fn to_raw(self) -> i32 {
        match self {
            ArtifactFormat::SpirvBinary => 0,
        }
    }

    /// Decodes an on-disk tag.
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(ArtifactFormat::SpirvBinary),
            _ => None,
        }
    }
}

/// A compiled shader binary as stored in the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedArtifact {
    format: ArtifactFormat,
    binary: Vec<u8>,
}

impl CachedArtifact {
    /// Wraps raw binary bytes.
    pub fn new(format: ArtifactFormat, binary: Vec<u8>) -> Self {
        Self { format, binary }
    }

    /// Wraps a SPIR-V module given as words.
    pub fn spirv(words: &[u32]) -> Self {
        let binary = words.iter().flat_map(|w| w.to_ne_bytes()).collect();
        Self::new(ArtifactFormat::SpirvBinary, binary)
    }

    /// The format tag.
    pub fn format(&self) -> ArtifactFormat {
        self.format
    }

    /// The binary payload.
    pub fn binary(&self) -> &[u8] {
        &self.binary
    }

    /// Size of the binary payload in bytes.
    pub fn size(&self) -> usize {
        self.binary.len()
    }

    /// Consumes the artifact, returning its payload.
    pub fn into_binary(self) -> Vec<u8> {
        self.binary
    }

    /// Reinterprets the payload as SPIR-V words.
    ///
    /// Returns `None` if the payload is not a whole number of words.
    pub fn spirv_words(&self) -> Option<Vec<u32>> {
        if self.binary.len() % 4 != 0 {
            return None;
        }
        Some(
            self.binary
                .chunks_exact(4)
                .map(|b| u32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
        )
    }
}

/// Result of [`PersistentStore::append`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// A new chunk was written at `offset`.
    Appended {
        /// Byte offset of the new chunk.
        offset: u32,
    },
    /// A chunk with the same hash and key text already existed at `offset`.
    AlreadyPresent {
        /// Byte offset of the existing chunk.
        offset: u32,
    },
}

/// Summary of a full scan of a cache file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of complete chunks.
    pub chunks: usize,
    /// Number of distinct key hashes among them.
    pub distinct_hashes: usize,
    /// Total size of the file in bytes.
    pub file_bytes: u64,
    /// Bytes after the last complete chunk (a torn or corrupt tail).
    pub trailing_bytes: u64,
}

/// The cache file on disk.
#[derive(Debug, Clone)]
pub struct PersistentStore {
    path: PathBuf,
}

impl PersistentStore {
    /// Creates a handle for the cache file at `path`. No I/O is performed.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The cache file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Scans the cache file into a fresh heap-backed index.
    pub fn load(&self, capacity: u32) -> CacheIndex {
        let mut index = CacheIndex::with_capacity(capacity);
        self.load_into(&mut index);
        index
    }

    /// Scans the cache file, inserting every chunk's hash and offset.
    ///
    /// Stops at the first chunk that cannot be read in full, keeping
    /// whatever was indexed so far, and warns that the file needs
    /// truncating: chunks appended after a torn one are never found by a
    /// scan. A missing file indexes nothing. Returns the number of chunks
    /// indexed.
    pub fn load_into<A: ArenaWords>(&self, index: &mut CacheIndex<A>) -> usize {
        let Ok(file) = File::open(&self.path) else {
            return 0;
        };
        let file_bytes = file.metadata().map(|m| m.len()).unwrap_or(0);
        let mut reader = BufReader::new(file);
        let mut offset: u64 = 0;
        let mut count = 0;

        while offset < file_bytes {
            let Ok(chunk_size) = read_u32(&mut reader) else {
                break;
            };
            let Ok(hash) = read_u32(&mut reader) else {
                break;
            };
            let Ok(data) = u32::try_from(offset) else {
                break;
            };
            let end = offset + 4 + u64::from(chunk_size);
            if u64::from(chunk_size) < FIXED_FIELDS || end > file_bytes {
                break;
            }
            index.insert(KeyHash::from_raw(hash), data);
            count += 1;

            // The hash field has already been consumed.
            if reader.seek_relative(i64::from(chunk_size) - 4).is_err() {
                break;
            }
            offset = end;
        }

        if offset < file_bytes {
            log::warn!(
                "cache file {} has {} unreadable bytes at offset {offset}; entries written \
                 after them cannot be found until the cache is cleared with `vkpc truncate`",
                self.path.display(),
                file_bytes - offset
            );
        }
        log::info!(
            "indexed {count} cached shaders from {}",
            self.path.display()
        );
        count
    }

    /// Looks up the artifact stored under `key`.
    ///
    /// A hit requires the indexed chunk to carry the same hash and exactly
    /// the same key text. Any read failure or mismatch is a miss.
    pub fn lookup<A: ArenaWords>(
        &self,
        index: &CacheIndex<A>,
        key: &CacheKey,
    ) -> Option<CachedArtifact> {
        let node = index.search(key.hash())?;
        match self.read_chunk(u64::from(node.data), key) {
            Ok(artifact) => Some(artifact),
            Err(e) => {
                log::debug!("cache entry {} unusable: {e}", key.hash());
                None
            }
        }
    }

    /// Appends `artifact` under `key` and indexes it.
    ///
    /// If the index already leads to a chunk with the same hash and key
    /// text, nothing is written.
    pub fn append<A: ArenaWords>(
        &self,
        index: &mut CacheIndex<A>,
        key: &CacheKey,
        artifact: &CachedArtifact,
    ) -> Result<AppendOutcome, CacheError> {
        if let Some(node) = index.search(key.hash()) {
            if self.read_chunk(u64::from(node.data), key).is_ok() {
                return Ok(AppendOutcome::AlreadyPresent { offset: node.data });
            }
        }

        let chunk = encode_chunk(key, artifact, &self.path)?;
        self.ensure_parent()?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;
        let size = file.metadata().map_err(|e| self.io_error(e))?.len();
        let offset = u32::try_from(size)
            .ok()
            .filter(|o| u64::from(*o) + chunk.len() as u64 <= u64::from(u32::MAX))
            .ok_or_else(|| CacheError::FileTooLarge {
                path: self.path.clone(),
                size,
            })?;

        file.write_all(&chunk).map_err(|e| self.io_error(e))?;
        index.insert(key.hash(), offset);
        Ok(AppendOutcome::Appended { offset })
    }

    /// Empties the cache file, creating it if needed.
    pub fn truncate(&self) -> Result<(), CacheError> {
        self.ensure_parent()?;
        File::create(&self.path).map_err(|e| self.io_error(e))?;
        Ok(())
    }

    /// Walks every chunk header and reports what the file contains.
    pub fn stats(&self) -> Result<StoreStats, CacheError> {
        let file = File::open(&self.path).map_err(|e| self.io_error(e))?;
        let file_bytes = file.metadata().map_err(|e| self.io_error(e))?.len();
        let mut reader = BufReader::new(file);
        let mut hashes = HashSet::new();
        let mut offset: u64 = 0;
        let mut chunks = 0;

        loop {
            let Ok(chunk_size) = read_u32(&mut reader) else {
                break;
            };
            let Ok(hash) = read_u32(&mut reader) else {
                break;
            };
            let end = offset + 4 + u64::from(chunk_size);
            if u64::from(chunk_size) < FIXED_FIELDS || end > file_bytes {
                break;
            }
            hashes.insert(hash);
            chunks += 1;
            offset = end;
            if reader.seek_relative(i64::from(chunk_size) - 4).is_err() {
                break;
            }
        }

        Ok(StoreStats {
            chunks,
            distinct_hashes: hashes.len(),
            file_bytes,
            trailing_bytes: file_bytes - offset,
        })
    }

    /// Reads and verifies the chunk at `offset` against `key`.
    fn read_chunk(&self, offset: u64, key: &CacheKey) -> Result<CachedArtifact, CacheError> {
        let invalid = |reason: String| CacheError::InvalidChunk { offset, reason };

        let mut file = File::open(&self.path).map_err(|e| self.io_error(e))?;
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| self.io_error(e))?;
        let mut reader = BufReader::new(file);

        let chunk_size = u64::from(read_u32(&mut reader).map_err(|e| self.io_error(e))?);
        let hash = read_u32(&mut reader).map_err(|e| self.io_error(e))?;
        if hash != key.hash().get() {
            return Err(invalid(format!(
                "hash {hash:08x} does not match {}",
                key.hash()
            )));
        }

        let raw_format = read_u32(&mut reader).map_err(|e| self.io_error(e))? as i32;
        let format = ArtifactFormat::from_raw(raw_format)
            .ok_or_else(|| invalid(format!("unknown artifact format {raw_format}")))?;

        let length = u64::from(read_u32(&mut reader).map_err(|e| self.io_error(e))?);
        if FIXED_FIELDS + length > chunk_size {
            return Err(invalid(format!(
                "binary length {length} overruns chunk size {chunk_size}"
            )));
        }
        let binary = read_bytes(&mut reader, length).map_err(|e| self.io_error(e))?;

        let source_length = u64::from(read_u32(&mut reader).map_err(|e| self.io_error(e))?);
        if FIXED_FIELDS + length + source_length != chunk_size {
            return Err(invalid(format!(
                "field lengths do not add up to chunk size {chunk_size}"
            )));
        }
        if source_length != key.text().len() as u64 {
            return Err(invalid("key text length differs".to_string()));
        }
        let source = read_bytes(&mut reader, source_length).map_err(|e| self.io_error(e))?;
        if source != key.text().as_bytes() {
            return Err(invalid("key text differs".to_string()));
        }

        Ok(CachedArtifact::new(format, binary))
    }

    fn ensure_parent(&self) -> Result<(), CacheError> {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                std::fs::create_dir_all(parent).map_err(|e| CacheError::Io {
                    path: parent.to_path_buf(),
                    source: e,
                })
            }
            _ => Ok(()),
        }
    }

    fn io_error(&self, source: std::io::Error) -> CacheError {
        CacheError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

/// Serializes one chunk.
fn encode_chunk(
    key: &CacheKey,
    artifact: &CachedArtifact,
    path: &Path,
) -> Result<Vec<u8>, CacheError> {
    let too_large = || CacheError::FileTooLarge {
        path: path.to_path_buf(),
        size: (artifact.size() + key.text().len()) as u64,
    };
    let length = u32::try_from(artifact.size()).map_err(|_| too_large())?;
    let source_length = u32::try_from(key.text().len()).map_err(|_| too_large())?;
    let chunk_size = u32::try_from(FIXED_FIELDS + u64::from(length) + u64::from(source_length))
        .map_err(|_| too_large())?;

    let mut out = Vec::with_capacity(4 + chunk_size as usize);
    out.extend_from_slice(&chunk_size.to_ne_bytes());
    out.extend_from_slice(&key.hash().get().to_ne_bytes());
    out.extend_from_slice(&artifact.format().to_raw().to_ne_bytes());
    out.extend_from_slice(&length.to_ne_bytes());
    out.extend_from_slice(artifact.binary());
    out.extend_from_slice(&source_length.to_ne_bytes());
    out.extend_from_slice(key.text().as_bytes());
    Ok(out)
}

fn read_u32(reader: &mut impl Read) -> std::io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_ne_bytes(buf))
}

fn read_bytes(reader: &mut impl Read, len: u64) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.take(len).read_to_end(&mut buf)?;
    if buf.len() as u64 != len {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "chunk ends early",
        ));
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_store() -> (tempfile::TempDir, PersistentStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistentStore::new(dir.path().join("shadercache.bin"));
        (dir, store)
    }

    fn artifact(words: &[u32]) -> CachedArtifact {
        CachedArtifact::spirv(words)
    }

    #[test]
    fn append_then_lookup() {
        let (_dir, store) = make_store();
        let mut index = CacheIndex::with_capacity(64);
        let key = CacheKey::new("vertex:VOID_SOURCE");
        let art = artifact(&[0x0723_0203, 0x0001_0000, 0, 1, 0]);

        let outcome = store.append(&mut index, &key, &art).unwrap();
        assert_eq!(outcome, AppendOutcome::Appended { offset: 0 });
        assert_eq!(store.lookup(&index, &key).unwrap(), art);
    }

    #[test]
    fn chunk_layout_on_disk() {
        let (_dir, store) = make_store();
        let mut index = CacheIndex::with_capacity(8);
        let key = CacheKey::new("k");
        store
            .append(&mut index, &key, &CachedArtifact::new(ArtifactFormat::SpirvBinary, vec![1, 2, 3, 4]))
            .unwrap();

        let raw = std::fs::read(store.path()).unwrap();
        assert_eq!(raw.len(), 4 + 16 + 4 + 1);
        let word = |i: usize| u32::from_ne_bytes(raw[i..i + 4].try_into().unwrap());
        assert_eq!(word(0), 16 + 4 + 1, "chunk size excludes its own field");
        assert_eq!(word(4), key.hash().get());
        assert_eq!(word(8), 0);
        assert_eq!(word(12), 4);
        assert_eq!(&raw[16..20], &[1, 2, 3, 4]);
        assert_eq!(word(20), 1);
        assert_eq!(raw[24], b'k');
    }

    #[test]
    fn second_chunk_offset_follows_first() {
        let (_dir, store) = make_store();
        let mut index = CacheIndex::with_capacity(8);
        let a = CacheKey::new("a");
        let b = CacheKey::new("b");
        store.append(&mut index, &a, &artifact(&[1])).unwrap();
        let outcome = store.append(&mut index, &b, &artifact(&[2])).unwrap();
        assert_eq!(outcome, AppendOutcome::Appended { offset: 4 + 16 + 4 + 1 });
    }

    #[test]
    fn lookup_missing_file_is_miss() {
        let (_dir, store) = make_store();
        let mut index = CacheIndex::with_capacity(8);
        index.insert(CacheKey::new("x").hash(), 0);
        assert!(store.lookup(&index, &CacheKey::new("x")).is_none());
    }

    #[test]
    fn lookup_unindexed_is_miss() {
        let (_dir, store) = make_store();
        let index = CacheIndex::with_capacity(8);
        assert!(store.lookup(&index, &CacheKey::new("x")).is_none());
    }

    #[test]
    fn colliding_hashes_are_disambiguated_by_text() {
        let (_dir, store) = make_store();
        let mut index = CacheIndex::with_capacity(8);
        let shared = KeyHash::from_raw(0xdead_beef);
        let first = CacheKey::with_hash("first program", shared);
        let second = CacheKey::with_hash("second program", shared);

        store.append(&mut index, &first, &artifact(&[1])).unwrap();
        assert!(
            store.lookup(&index, &second).is_none(),
            "same hash, different text must miss"
        );

        store.append(&mut index, &second, &artifact(&[2])).unwrap();
        assert_eq!(store.lookup(&index, &second).unwrap(), artifact(&[2]));
        // The index holds one node per hash, now pointing at the second chunk.
        assert!(store.lookup(&index, &first).is_none());
    }

    #[test]
    fn append_skips_existing_entry() {
        let (_dir, store) = make_store();
        let mut index = CacheIndex::with_capacity(8);
        let key = CacheKey::new("dup");
        store.append(&mut index, &key, &artifact(&[1])).unwrap();
        let size = std::fs::metadata(store.path()).unwrap().len();

        let outcome = store.append(&mut index, &key, &artifact(&[1])).unwrap();
        assert_eq!(outcome, AppendOutcome::AlreadyPresent { offset: 0 });
        assert_eq!(std::fs::metadata(store.path()).unwrap().len(), size);
    }

    #[test]
    fn load_rebuilds_index() {
        let (_dir, store) = make_store();
        let mut index = CacheIndex::with_capacity(64);
        let keys: Vec<CacheKey> = (0..10).map(|i| CacheKey::new(format!("key {i}"))).collect();
        for (i, key) in keys.iter().enumerate() {
            store.append(&mut index, key, &artifact(&[i as u32])).unwrap();
        }

        let first = store.load(64);
        let second = store.load(64);
        for (i, key) in keys.iter().enumerate() {
            let a = first.search(key.hash()).unwrap();
            let b = second.search(key.hash()).unwrap();
            assert_eq!(a.data, b.data);
            assert_eq!(a.data, index.search(key.hash()).unwrap().data);
            assert_eq!(store.lookup(&first, key).unwrap(), artifact(&[i as u32]));
        }
    }

    #[test]
    fn load_missing_file_is_empty() {
        let (_dir, store) = make_store();
        assert!(store.load(8).is_empty());
    }

    #[test]
    fn load_stops_at_torn_header() {
        let (_dir, store) = make_store();
        let mut index = CacheIndex::with_capacity(8);
        let key = CacheKey::new("whole");
        store.append(&mut index, &key, &artifact(&[7])).unwrap();

        let mut file = OpenOptions::new().append(true).open(store.path()).unwrap();
        file.write_all(&[0xff, 0xff]).unwrap();
        drop(file);

        let loaded = store.load(8);
        assert_eq!(loaded.len(), 1);
        assert_eq!(store.lookup(&loaded, &key).unwrap(), artifact(&[7]));
    }

    #[test]
    fn load_skips_chunk_torn_mid_body() {
        let (_dir, store) = make_store();
        let mut index = CacheIndex::with_capacity(8);
        let key = CacheKey::new("whole");
        store.append(&mut index, &key, &artifact(&[7])).unwrap();

        // Intact size and hash fields, body cut short.
        let torn = CacheKey::new("vertex:after torn");
        let mut file = OpenOptions::new().append(true).open(store.path()).unwrap();
        file.write_all(&100u32.to_ne_bytes()).unwrap();
        file.write_all(&torn.hash().get().to_ne_bytes()).unwrap();
        file.write_all(&[0]).unwrap();
        drop(file);

        let loaded = store.load(8);
        assert_eq!(loaded.len(), 1);
        assert!(loaded.search(torn.hash()).is_none());
        assert_eq!(store.lookup(&loaded, &key).unwrap(), artifact(&[7]));
        assert_eq!(store.stats().unwrap().trailing_bytes, 9);
    }

    #[test]
    fn truncated_binary_is_miss() {
        let (_dir, store) = make_store();
        let mut index = CacheIndex::with_capacity(8);
        let key = CacheKey::new("truncated");
        store.append(&mut index, &key, &artifact(&[1, 2, 3, 4])).unwrap();

        let raw = std::fs::read(store.path()).unwrap();
        std::fs::write(store.path(), &raw[..raw.len() - 3]).unwrap();
        assert!(store.lookup(&index, &key).is_none());
    }

    #[test]
    fn unknown_format_is_miss() {
        let (_dir, store) = make_store();
        let mut index = CacheIndex::with_capacity(8);
        let key = CacheKey::new("fmt");
        store.append(&mut index, &key, &artifact(&[1])).unwrap();

        let mut raw = std::fs::read(store.path()).unwrap();
        raw[8..12].copy_from_slice(&5i32.to_ne_bytes());
        std::fs::write(store.path(), &raw).unwrap();
        assert!(store.lookup(&index, &key).is_none());
    }

    #[test]
    fn append_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistentStore::new(dir.path().join("a").join("b").join("cache.bin"));
        let mut index = CacheIndex::with_capacity(8);
        store
            .append(&mut index, &CacheKey::new("x"), &artifact(&[1]))
            .unwrap();
        assert!(store.path().exists());
    }

    #[test]
    fn truncate_empties_file() {
        let (_dir, store) = make_store();
        let mut index = CacheIndex::with_capacity(8);
        store
            .append(&mut index, &CacheKey::new("x"), &artifact(&[1]))
            .unwrap();
        store.truncate().unwrap();
        assert_eq!(std::fs::metadata(store.path()).unwrap().len(), 0);
        assert!(store.load(8).is_empty());
    }

    #[test]
    fn stats_counts_chunks() {
        let (_dir, store) = make_store();
        let mut index = CacheIndex::with_capacity(8);
        for name in ["a", "b", "c"] {
            store
                .append(&mut index, &CacheKey::new(name), &artifact(&[1]))
                .unwrap();
        }
        let mut file = OpenOptions::new().append(true).open(store.path()).unwrap();
        file.write_all(&[1, 2, 3]).unwrap();
        drop(file);

        let stats = store.stats().unwrap();
        assert_eq!(stats.chunks, 3);
        assert_eq!(stats.distinct_hashes, 3);
        assert_eq!(stats.trailing_bytes, 3);
        assert_eq!(stats.file_bytes, 3 * 25 + 3);
    }

    #[test]
    fn spirv_words_roundtrip() {
        let art = artifact(&[0x0723_0203, 42]);
        assert_eq!(art.size(), 8);
        assert_eq!(art.spirv_words().unwrap(), vec![0x0723_0203, 42]);
        let odd = CachedArtifact::new(ArtifactFormat::SpirvBinary, vec![1, 2, 3]);
        assert!(odd.spirv_words().is_none());
    }
}
