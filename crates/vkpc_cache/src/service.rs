//! The shader cache service.
//!
//! [`ShaderCache`] owns the lock, the index and the cache file for one
//! configured cache. It is created cheaply and opens everything on first
//! use: exactly one thread performs the setup (truncating the file if asked,
//! mapping the shared segment or scanning the file) while the others wait.
//! Setup failures disable the cache for the life of the service; builds
//! still succeed, they just never hit.

use std::path::Path;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use vkpc_config::{CacheConfig, LockKind};

use crate::error::CacheError;
use crate::index::{arena_words, Arena, CacheIndex};
use crate::key::CacheKey;
use crate::lock::{CacheLock, LocalLock, LockGuard, SharedLock};
use crate::shm::SharedSegment;
use crate::store::{AppendOutcome, CachedArtifact, PersistentStore, StoreStats};

/// Opened cache state. The index mutex is only taken while `lock` is held.
struct CacheState {
    lock: Box<dyn CacheLock>,
    index: Mutex<CacheIndex<Arena>>,
    store: PersistentStore,
}

/// Persistent shader binary cache shared by every build of a process.
///
/// Every lookup and every save runs under the configured [`CacheLock`], so
/// concurrent builds from any number of threads (and, with
/// [`LockKind::Shared`], processes) never corrupt the index or the file.
/// Mixing [`LockKind::Local`] and [`LockKind::Shared`] processes on one
/// cache file is not supported.
pub struct ShaderCache {
    config: CacheConfig,
    state: OnceCell<Option<CacheState>>,
}

impl ShaderCache {
    /// Creates the service. Nothing is opened until first use.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            state: OnceCell::new(),
        }
    }

    /// The configuration the service was created with.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// The cache file path.
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Whether caching was requested in the configuration.
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Opens the cache if that has not happened yet.
    ///
    /// Returns `true` if the cache is usable. Called implicitly by
    /// [`lookup`](Self::lookup) and [`save`](Self::save).
    pub fn initialize(&self) -> bool {
        self.state().is_some()
    }

    /// Looks up the artifact stored under `key`.
    ///
    /// Every failure along the way reads as a miss.
    pub fn lookup(&self, key: &CacheKey) -> Option<CachedArtifact> {
        let state = self.state()?;
        let _guard = acquire_or_warn(state)?;
        let index = state.index.lock();
        let hit = state.store.lookup(&index, key);
        if hit.is_some() {
            log::debug!("cache hit {}", key.hash());
        } else {
            log::debug!("cache miss {}", key.hash());
        }
        hit
    }

    /// Stores `artifact` under `key` unless an identical entry exists.
    ///
    /// Returns `true` if the cache now holds the entry. Write failures are
    /// logged and otherwise ignored.
    pub fn save(&self, key: &CacheKey, artifact: &CachedArtifact) -> bool {
        let Some(state) = self.state() else {
            return false;
        };
        let Some(_guard) = acquire_or_warn(state) else {
            return false;
        };
        let mut index = state.index.lock();
        match state.store.append(&mut index, key, artifact) {
            Ok(AppendOutcome::Appended { offset }) => {
                log::debug!("cached {} at offset {offset}", key.hash());
                true
            }
            Ok(AppendOutcome::AlreadyPresent { .. }) => {
                log::debug!("cache entry {} already present", key.hash());
                true
            }
            Err(e) => {
                log::warn!("failed to write shader cache entry: {e}");
                false
            }
        }
    }

    /// Number of occupied index slots, or 0 if the cache is unusable.
    pub fn len(&self) -> u32 {
        let Some(state) = self.state() else {
            return 0;
        };
        let Some(_guard) = acquire_or_warn(state) else {
            return 0;
        };
        let index = state.index.lock();
        index.len()
    }

    /// Returns `true` if the index holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Scans the cache file under the lock and reports its contents.
    pub fn stats(&self) -> Result<StoreStats, CacheError> {
        match self.state() {
            Some(state) => {
                let _guard = LockGuard::acquire(state.lock.as_ref())?;
                state.store.stats()
            }
            None => PersistentStore::new(&self.config.path).stats(),
        }
    }

    fn state(&self) -> Option<&CacheState> {
        if !self.config.enabled {
            return None;
        }
        self.state
            .get_or_init(|| match open(&self.config) {
                Ok(state) => Some(state),
                Err(e) => {
                    log::warn!(
                        "shader cache {} disabled: {e}",
                        self.config.path.display()
                    );
                    None
                }
            })
            .as_ref()
    }
}

/// Takes the cache lock, or logs why it could not be taken.
fn acquire_or_warn(state: &CacheState) -> Option<LockGuard<'_>> {
    match LockGuard::acquire(state.lock.as_ref()) {
        Ok(guard) => Some(guard),
        Err(e) => {
            log::warn!("shader cache skipped: {e}");
            None
        }
    }
}

fn open(config: &CacheConfig) -> Result<CacheState, CacheError> {
    let store = PersistentStore::new(&config.path);
    match config.lock {
        LockKind::Local => open_local(config, store),
        LockKind::Shared => open_shared(config, store),
    }
}

fn open_local(config: &CacheConfig, store: PersistentStore) -> Result<CacheState, CacheError> {
    let lock: Box<dyn CacheLock> = Box::new(LocalLock::new());
    let mut index = CacheIndex::from_arena(Arena::Heap(vec![0; arena_words(config.capacity)]))?;
    {
        let _guard = LockGuard::acquire(lock.as_ref())?;
        if config.truncate {
            store.truncate()?;
        }
        let loaded = store.load_into(&mut index);
        log::info!(
            "loaded {loaded} shader cache entries from {}",
            store.path().display()
        );
    }
    Ok(CacheState {
        lock,
        index: Mutex::new(index),
        store,
    })
}

fn open_shared(config: &CacheConfig, store: PersistentStore) -> Result<CacheState, CacheError> {
    let (segment_path, lock_path) =
        SharedSegment::paths_for(&config.path, config.shared_memory_dir.as_deref());
    let lock: Box<dyn CacheLock> = Box::new(SharedLock::open(&lock_path)?);
    let index = {
        let _guard = LockGuard::acquire(lock.as_ref())?;
        if config.truncate {
            store.truncate()?;
        }
        let (segment, fresh) = SharedSegment::open_or_create(&segment_path, config.capacity)?;
        let mut index = CacheIndex::from_arena(Arena::Shared(segment))?;
        if fresh || config.truncate {
            index.clear();
            let loaded = store.load_into(&mut index);
            log::info!(
                "loaded {loaded} shader cache entries from {} into {}",
                store.path().display(),
                segment_path.display()
            );
        } else {
            log::info!(
                "attached to shared shader cache index {} ({} entries)",
                segment_path.display(),
                index.len()
            );
        }
        index
    };
    Ok(CacheState {
        lock,
        index: Mutex::new(index),
        store,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn local_config(dir: &Path) -> CacheConfig {
        CacheConfig {
            capacity: 64,
            ..CacheConfig::at(dir.join("cache.bin"))
        }
    }

    fn shared_config(dir: &Path) -> CacheConfig {
        CacheConfig {
            lock: LockKind::Shared,
            shared_memory_dir: Some(dir.join("shm")),
            ..local_config(dir)
        }
    }

    fn artifact(seed: u32) -> CachedArtifact {
        CachedArtifact::spirv(&[0x0723_0203, 0x0001_0000, 0, seed, 0])
    }

    #[test]
    fn disabled_cache_never_opens() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ShaderCache::new(CacheConfig {
            enabled: false,
            ..local_config(dir.path())
        });
        assert!(!cache.initialize());
        let key = CacheKey::new("vertex:VOID_SOURCE");
        assert!(!cache.save(&key, &artifact(1)));
        assert!(cache.lookup(&key).is_none());
        assert!(!cache.path().exists());
    }

    #[test]
    fn save_then_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ShaderCache::new(local_config(dir.path()));
        let key = CacheKey::new("vertex:VOID_SOURCE");

        assert!(cache.lookup(&key).is_none());
        assert!(cache.save(&key, &artifact(1)));
        assert_eq!(cache.lookup(&key).unwrap(), artifact(1));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn second_save_is_not_duplicated() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ShaderCache::new(local_config(dir.path()));
        let key = CacheKey::new("fragment:main");
        assert!(cache.save(&key, &artifact(1)));
        assert!(cache.save(&key, &artifact(1)));
        assert_eq!(cache.stats().unwrap().chunks, 1);
    }

    #[test]
    fn new_service_reads_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let key = CacheKey::new("compute:main");
        {
            let cache = ShaderCache::new(local_config(dir.path()));
            cache.save(&key, &artifact(7));
        }
        let cache = ShaderCache::new(local_config(dir.path()));
        assert_eq!(cache.lookup(&key).unwrap(), artifact(7));
    }

    #[test]
    fn truncate_discards_existing_entries() {
        let dir = tempfile::tempdir().unwrap();
        let key = CacheKey::new("compute:main");
        ShaderCache::new(local_config(dir.path())).save(&key, &artifact(7));

        let cache = ShaderCache::new(CacheConfig {
            truncate: true,
            ..local_config(dir.path())
        });
        assert!(cache.lookup(&key).is_none());
        assert_eq!(std::fs::metadata(cache.path()).unwrap().len(), 0);
    }

    #[test]
    fn unwritable_path_still_returns_false() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let cache = ShaderCache::new(CacheConfig {
            capacity: 8,
            ..CacheConfig::at(blocker.join("cache.bin"))
        });
        let key = CacheKey::new("vertex:main");
        assert!(!cache.save(&key, &artifact(1)));
        assert!(cache.lookup(&key).is_none());
    }

    #[test]
    fn threads_append_each_key_once() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(ShaderCache::new(CacheConfig {
            capacity: 1024,
            ..local_config(dir.path())
        }));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for i in 0..20u32 {
                        // Threads overlap on half of the keys.
                        let id = if i % 2 == 0 { i } else { t * 100 + i };
                        let key = CacheKey::new(format!("vertex:shader {id}"));
                        if cache.lookup(&key).is_none() {
                            cache.save(&key, &artifact(id));
                        }
                        assert_eq!(cache.lookup(&key).unwrap(), artifact(id));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        // 10 shared even keys plus 10 private odd keys per thread.
        let stats = cache.stats().unwrap();
        assert_eq!(stats.chunks, 10 + 8 * 10);
        assert_eq!(stats.distinct_hashes, stats.chunks);
    }

    #[test]
    #[cfg(unix)]
    fn shared_instances_see_each_other() {
        let dir = tempfile::tempdir().unwrap();
        let first = ShaderCache::new(shared_config(dir.path()));
        let second = ShaderCache::new(shared_config(dir.path()));
        let key = CacheKey::new("mesh:main");

        assert!(first.initialize());
        assert!(second.initialize());
        assert!(first.save(&key, &artifact(3)));
        // The second instance attached before the save and never rescans.
        assert_eq!(second.lookup(&key).unwrap(), artifact(3));
        assert!(second.save(&key, &artifact(3)));
        assert_eq!(first.stats().unwrap().chunks, 1);
    }

    #[test]
    #[cfg(unix)]
    fn shared_segment_is_rebuilt_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let key = CacheKey::new("task:main");
        ShaderCache::new(local_config(dir.path())).save(&key, &artifact(9));

        let cache = ShaderCache::new(shared_config(dir.path()));
        assert_eq!(cache.lookup(&key).unwrap(), artifact(9));
    }
}
