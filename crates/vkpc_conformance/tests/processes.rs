//! Real processes saving into one shared cache.
//!
//! The test binary re-runs itself: `child_worker` does nothing unless the
//! parent sets `VKPC_WORKER_DIR`, in which case it fills the cache in that
//! directory and exits.
#![cfg(unix)]

use std::path::Path;
use std::process::{Child, Command};

use vkpc_cache::{CacheKey, CachedArtifact, ShaderCache};
use vkpc_config::LockKind;
use vkpc_conformance::cache_config;

const WORKER_DIR: &str = "VKPC_WORKER_DIR";
const WORKER_INDEX: &str = "VKPC_WORKER_INDEX";
const PROCESSES: usize = 6;
const KEYS: u32 = 200;

fn key(i: u32) -> CacheKey {
    CacheKey::new(format!("fragment:process shader {i}"))
}

fn artifact(i: u32) -> CachedArtifact {
    CachedArtifact::spirv(&[0x0723_0203, 0x0001_0000, 0, i, 0])
}

fn fill(dir: &Path, start: u32) {
    let cache = ShaderCache::new(cache_config(dir, LockKind::Shared));
    assert!(cache.initialize(), "shared cache failed to open");
    // Each process walks the keys from a different starting point.
    for n in 0..KEYS {
        let i = (start + n) % KEYS;
        if cache.lookup(&key(i)).is_none() {
            assert!(cache.save(&key(i), &artifact(i)));
        }
        assert_eq!(cache.lookup(&key(i)).unwrap(), artifact(i));
    }
}

#[test]
fn child_worker() {
    let Some(dir) = std::env::var_os(WORKER_DIR) else {
        return;
    };
    let index: u32 = std::env::var(WORKER_INDEX)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    fill(Path::new(&dir), index * 37);
}

fn spawn_worker(dir: &Path, index: usize) -> Child {
    Command::new(std::env::current_exe().unwrap())
        .args(["child_worker", "--exact", "--test-threads=1", "--nocapture"])
        .env(WORKER_DIR, dir)
        .env(WORKER_INDEX, index.to_string())
        .spawn()
        .unwrap()
}

#[test]
fn processes_append_each_key_once() {
    let dir = tempfile::tempdir().unwrap();
    let children: Vec<Child> = (0..PROCESSES)
        .map(|i| spawn_worker(dir.path(), i))
        .collect();
    for (i, mut child) in children.into_iter().enumerate() {
        let status = child.wait().unwrap();
        assert!(status.success(), "worker {i} failed: {status}");
    }

    let cache = ShaderCache::new(cache_config(dir.path(), LockKind::Shared));
    let stats = cache.stats().unwrap();
    assert_eq!(stats.chunks, KEYS as usize);
    assert_eq!(stats.distinct_hashes, KEYS as usize);
    assert_eq!(stats.trailing_bytes, 0);
    for i in 0..KEYS {
        assert_eq!(cache.lookup(&key(i)).unwrap(), artifact(i));
    }
}

#[test]
fn file_written_by_processes_reloads_locally() {
    let dir = tempfile::tempdir().unwrap();
    let mut child = spawn_worker(dir.path(), 0);
    assert!(child.wait().unwrap().success());

    let local = ShaderCache::new(cache_config(dir.path(), LockKind::Local));
    assert_eq!(local.len(), KEYS);
    assert_eq!(local.lookup(&key(KEYS - 1)).unwrap(), artifact(KEYS - 1));
}
