//! FNV-1 hashing of cache key strings.

use serde::{Deserialize, Serialize};
use std::fmt;

/// FNV-1 32-bit offset basis.
pub const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;

/// FNV-1 32-bit prime.
pub const FNV_PRIME: u32 = 16_777_619;

/// A 32-bit FNV-1 digest of a cache key string.
///
/// The hash only locates candidate cache entries. It makes no collision
/// resistance claims; entries that share a hash are told apart by comparing
/// the full key text stored next to each artifact.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyHash(u32);

impl KeyHash {
    /// Hashes `data` with FNV-1 (multiply, then xor).
    ///
    /// Hashing stops at the first NUL byte or at the end of the slice,
    /// whichever comes first.
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = data
            .iter()
            .take_while(|&&b| b != 0)
            .fold(FNV_OFFSET_BASIS, |hash, &b| {
                hash.wrapping_mul(FNV_PRIME) ^ u32::from(b)
            });
        Self(hash)
    }

    /// Wraps a raw hash value, e.g. one read back from a cache file.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw 32-bit value.
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for KeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

impl fmt::Debug for KeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyHash({:#010x})", self.0)
    }
}
