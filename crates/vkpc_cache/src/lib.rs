//! Persistent, process-shared cache of compiled shader binaries.
//!
//! A cache entry is located by the FNV-1 hash of a key string describing the
//! tooling, the build options and the shader sources. Entries live in an
//! append-only chunk file; an in-memory binary search tree over the hashes,
//! rebuilt by scanning the file on first use, maps each hash to the offset of
//! its chunk. A [`ShaderCache`] ties the pieces together behind a lock that is
//! either process-local or shared between processes.

#![warn(missing_docs)]

pub mod error;
pub mod index;
pub mod key;
pub mod lock;
pub mod service;
pub mod shm;
pub mod store;

pub use error::CacheError;
pub use index::{Arena, ArenaWords, CacheIndex, CacheNode, NodeId};
pub use key::{CacheKey, KeyBuilder};
pub use lock::{CacheLock, LocalLock, LockGuard, SharedLock};
pub use service::ShaderCache;
pub use shm::SharedSegment;
pub use store::{AppendOutcome, ArtifactFormat, CachedArtifact, PersistentStore, StoreStats};
