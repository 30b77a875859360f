//! Mutual exclusion around cache lookups and saves.
//!
//! Two variants implement [`CacheLock`]: [`LocalLock`] for threads of one
//! process, and [`SharedLock`] which additionally excludes other processes
//! through an advisory `flock` on a lock file next to the shared segment.
//! Both are reentrant for the owning thread and neither has a timeout: a
//! holder that never releases stalls everybody else.

use std::fs::{File, OpenOptions};
use std::io;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::lock_api::RawReentrantMutex;
use parking_lot::{RawMutex, RawThreadId};

use crate::error::CacheError;

type RawLock = RawReentrantMutex<RawMutex, RawThreadId>;

/// A lock guarding the cache index and cache file.
pub trait CacheLock: Send + Sync {
    /// Blocks until the calling thread holds the lock.
    ///
    /// On error the lock is not held and the caller must not touch the
    /// guarded state.
    fn acquire(&self) -> Result<(), CacheError>;

    /// Releases one level of the lock held by the calling thread.
    ///
    /// A release from a thread that does not hold the lock is logged and
    /// ignored.
    fn release(&self);
}

/// Holds a [`CacheLock`] until dropped.
pub struct LockGuard<'a> {
    lock: &'a dyn CacheLock,
    // Released on the acquiring thread only.
    _not_send: PhantomData<*const ()>,
}

impl<'a> LockGuard<'a> {
    /// Acquires `lock`, releasing it when the guard is dropped.
    pub fn acquire(lock: &'a dyn CacheLock) -> Result<Self, CacheError> {
        lock.acquire()?;
        Ok(Self {
            lock,
            _not_send: PhantomData,
        })
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

/// Unlocks `raw` if the calling thread owns it.
fn release_owned(raw: &RawLock) {
    if !raw.is_owned_by_current_thread() {
        log::error!("cache lock released by a thread that does not hold it");
        return;
    }
    // SAFETY: the calling thread holds `raw`.
    unsafe { raw.unlock() };
}

/// Process-local reentrant lock.
pub struct LocalLock {
    raw: RawLock,
}

impl LocalLock {
    /// Creates an unlocked lock.
    pub fn new() -> Self {
        Self {
            raw: RawLock::INIT,
        }
    }
}

impl Default for LocalLock {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheLock for LocalLock {
    fn acquire(&self) -> Result<(), CacheError> {
        self.raw.lock();
        Ok(())
    }

    fn release(&self) {
        release_owned(&self.raw);
    }
}

/// Cross-process lock: a reentrant in-process lock plus an exclusive
/// `flock` on a named lock file, taken on the outermost acquire.
pub struct SharedLock {
    path: PathBuf,
    file: File,
    local: RawLock,
    depth: AtomicU32,
}

impl SharedLock {
    /// Opens (creating if needed) the lock file at `path`.
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        if !cfg!(unix) {
            return Err(CacheError::SharedMemory {
                path: path.to_path_buf(),
                reason: "the cross-process lock requires a Unix host".to_string(),
            });
        }
        let io_error = |source: io::Error| CacheError::Io {
            path: path.to_path_buf(),
            source,
        };
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
        Self::from_file(path, file)
    }

    /// Wraps an open lock file after checking that it can be locked at all.
    ///
    /// Some filesystems refuse `flock` outright (`ENOLCK` on NFS, for
    /// instance); such a file cannot provide cross-process exclusion.
    fn from_file(path: &Path, file: File) -> Result<Self, CacheError> {
        match try_flock(&file, FlockOp::ExclusiveNonBlocking) {
            Ok(()) => try_flock(&file, FlockOp::Unlock).map_err(|e| unlockable(path, e))?,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => return Err(unlockable(path, e)),
        }
        Ok(Self {
            path: path.to_path_buf(),
            file,
            local: RawLock::INIT,
            depth: AtomicU32::new(0),
        })
    }

    /// The lock file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_file(&self) -> Result<(), CacheError> {
        match try_flock(&self.file, FlockOp::ExclusiveNonBlocking) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                log::debug!(
                    "cache lock {} held by another process, waiting",
                    self.path.display()
                );
            }
            Err(e) => return Err(unlockable(&self.path, e)),
        }
        try_flock(&self.file, FlockOp::Exclusive).map_err(|e| unlockable(&self.path, e))
    }

    fn unlock_file(&self) {
        if let Err(e) = try_flock(&self.file, FlockOp::Unlock) {
            log::error!("cache unlock {}: {e}", self.path.display());
        }
    }
}

impl CacheLock for SharedLock {
    fn acquire(&self) -> Result<(), CacheError> {
        self.local.lock();
        // `depth` is only touched by the thread holding `local`.
        if self.depth.load(Ordering::Relaxed) == 0 {
            if let Err(e) = self.lock_file() {
                release_owned(&self.local);
                return Err(e);
            }
        }
        self.depth.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn release(&self) {
        if !self.local.is_owned_by_current_thread() {
            log::error!(
                "cache lock {} released by a thread that does not hold it",
                self.path.display()
            );
            return;
        }
        if self.depth.fetch_sub(1, Ordering::Relaxed) == 1 {
            self.unlock_file();
        }
        release_owned(&self.local);
    }
}

fn unlockable(path: &Path, source: io::Error) -> CacheError {
    CacheError::SharedMemory {
        path: path.to_path_buf(),
        reason: format!("cannot lock: {source}"),
    }
}

#[derive(Clone, Copy)]
enum FlockOp {
    Exclusive,
    ExclusiveNonBlocking,
    Unlock,
}

#[cfg(unix)]
fn try_flock(file: &File, op: FlockOp) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    let op = match op {
        FlockOp::Exclusive => libc::LOCK_EX,
        FlockOp::ExclusiveNonBlocking => libc::LOCK_EX | libc::LOCK_NB,
        FlockOp::Unlock => libc::LOCK_UN,
    };
    loop {
        // SAFETY: the descriptor stays valid for as long as `file` is borrowed.
        let rc = unsafe { libc::flock(file.as_raw_fd(), op) };
        if rc == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            continue;
        }
        if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
            return Err(io::Error::new(io::ErrorKind::WouldBlock, "lock held"));
        }
        return Err(err);
    }
}

#[cfg(not(unix))]
fn try_flock(_file: &File, _op: FlockOp) -> io::Result<()> {
    Ok(())
}
