//! Array-backed binary search tree over cache key hashes.
//!
//! The arena is a flat run of 32-bit words: word 0 is the tail counter,
//! followed by `capacity` nodes of four words each (`key`, `data`, `right`,
//! `left`). Keeping the layout flat lets the same tree live either in a
//! private `Vec` or in a shared memory segment mapped by several processes.
//!
//! Slot 0 holds the root. Because the root is never anybody's child, a child
//! link of 0 means "no child". The tree is never rebalanced. When the tail
//! counter reaches capacity the next insert wraps it to 0, which replaces the
//! root and orphans every older node: the index forgets entries rather than
//! growing without bound.

use vkpc_common::KeyHash;

use crate::error::CacheError;
use crate::shm::SharedSegment;

/// Words per node: key, data, right child, left child.
pub const NODE_WORDS: usize = 4;

const KEY: usize = 0;
const DATA: usize = 1;
const RIGHT: usize = 2;
const LEFT: usize = 3;

/// Index of a node slot in the arena.
///
/// `NodeId(0)` is the root slot and, as a child link, the "no child" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    /// The root slot, also the "no child" link value.
    pub const ROOT: NodeId = NodeId(0);

    /// The slot index.
    pub fn index(self) -> u32 {
        self.0
    }

    fn is_none_link(self) -> bool {
        self.0 == 0
    }
}

/// Word-addressed storage backing a [`CacheIndex`].
pub trait ArenaWords {
    /// Total number of 32-bit words.
    fn word_count(&self) -> usize;

    /// Reads word `i`. Panics if `i` is out of range.
    fn load(&self, i: usize) -> u32;

    /// Writes word `i`. Panics if `i` is out of range.
    fn store(&mut self, i: usize, value: u32);

    /// Zeroes every word.
    fn clear(&mut self) {
        for i in 0..self.word_count() {
            self.store(i, 0);
        }
    }
}

impl ArenaWords for Vec<u32> {
    fn word_count(&self) -> usize {
        self.len()
    }

    fn load(&self, i: usize) -> u32 {
        self[i]
    }

    fn store(&mut self, i: usize, value: u32) {
        self[i] = value;
    }

    fn clear(&mut self) {
        self.fill(0);
    }
}

/// Arena storage selected when the cache is opened.
pub enum Arena {
    /// Private to this process.
    Heap(Vec<u32>),
    /// Mapped from a named segment shared with other processes.
    Shared(SharedSegment),
}

impl ArenaWords for Arena {
    fn word_count(&self) -> usize {
        match self {
            Arena::Heap(words) => words.word_count(),
            Arena::Shared(segment) => segment.word_count(),
        }
    }

    fn load(&self, i: usize) -> u32 {
        match self {
            Arena::Heap(words) => words.load(i),
            Arena::Shared(segment) => segment.load(i),
        }
    }

    fn store(&mut self, i: usize, value: u32) {
        match self {
            Arena::Heap(words) => words.store(i, value),
            Arena::Shared(segment) => segment.store(i, value),
        }
    }

    fn clear(&mut self) {
        match self {
            Arena::Heap(words) => words.clear(),
            Arena::Shared(segment) => segment.clear(),
        }
    }
}

/// Number of arena words needed for `capacity` nodes plus the tail counter.
pub fn arena_words(capacity: u32) -> usize {
    capacity as usize * NODE_WORDS + 1
}

/// A node read out of the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheNode {
    /// Slot the node lives in.
    pub id: NodeId,
    /// Hash of the entry's key.
    pub key: KeyHash,
    /// Byte offset of the entry's chunk in the cache file.
    pub data: u32,
    /// Right child link.
    pub right: NodeId,
    /// Left child link.
    pub left: NodeId,
}

/// Binary search tree from key hash to cache file offset.
pub struct CacheIndex<A: ArenaWords = Vec<u32>> {
    arena: A,
    capacity: u32,
}

impl CacheIndex<Vec<u32>> {
    /// Creates an empty heap-backed index holding at most `capacity` nodes.
    ///
    /// A capacity of 0 is raised to 1: slot 0 always exists.
    pub fn with_capacity(capacity: u32) -> Self {
        let capacity = capacity.max(1);
        Self {
            arena: vec![0; arena_words(capacity)],
            capacity,
        }
    }
}

impl<A: ArenaWords> CacheIndex<A> {
    /// Wraps existing arena storage, keeping whatever tree it holds.
    pub fn from_arena(arena: A) -> Result<Self, CacheError> {
        let words = arena.word_count();
        if words < 1 + NODE_WORDS || (words - 1) % NODE_WORDS != 0 {
            return Err(CacheError::InvalidChunk {
                offset: 0,
                reason: format!("arena of {words} words is not a whole number of nodes"),
            });
        }
        let capacity = u32::try_from((words - 1) / NODE_WORDS).map_err(|_| {
            CacheError::InvalidChunk {
                offset: 0,
                reason: format!("arena of {words} words exceeds the node id range"),
            }
        })?;
        Ok(Self { arena, capacity })
    }

    /// Maximum number of nodes.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Number of occupied slots, i.e. the tail counter.
    ///
    /// After a wraparound this counts only the slots written since the wrap.
    pub fn len(&self) -> u32 {
        self.tail()
    }

    /// Returns `true` if no entry has been inserted.
    pub fn is_empty(&self) -> bool {
        self.tail() == 0
    }

    /// Forgets every entry.
    pub fn clear(&mut self) {
        self.arena.clear();
    }

    /// Returns the underlying arena storage.
    pub fn arena(&self) -> &A {
        &self.arena
    }

    /// Reads the node in slot `id`, if the slot exists.
    pub fn get(&self, id: NodeId) -> Option<CacheNode> {
        if id.0 >= self.capacity {
            return None;
        }
        let base = Self::node_base(id);
        Some(CacheNode {
            id,
            key: KeyHash::from_raw(self.arena.load(base + KEY)),
            data: self.arena.load(base + DATA),
            right: NodeId(self.arena.load(base + RIGHT)),
            left: NodeId(self.arena.load(base + LEFT)),
        })
    }

    /// Finds the node holding `key`.
    ///
    /// Walks from the root, going right when `key` is greater than the
    /// node's key and left otherwise. A missing child ends the search.
    pub fn search(&self, key: KeyHash) -> Option<CacheNode> {
        if self.is_empty() {
            return None;
        }
        let mut node = self.get(NodeId::ROOT)?;
        // A well-formed tree is never deeper than its capacity; the bound
        // stops a corrupted shared arena from looping forever.
        for _ in 0..self.capacity {
            if node.key == key {
                return Some(node);
            }
            let next = if key > node.key { node.right } else { node.left };
            if next.is_none_link() {
                return None;
            }
            node = self.get(next)?;
        }
        None
    }

    /// Records that the chunk for `key` starts at byte `data`.
    ///
    /// The node is written at the tail slot first. If the walk from the root
    /// finds a node with the same key, that node's `data` is overwritten and
    /// the tail slot is given back, so a key never occupies two nodes.
    pub fn insert(&mut self, key: KeyHash, data: u32) {
        let mut tail = self.tail();
        if tail >= self.capacity {
            log::debug!(
                "cache index full ({} nodes), wrapping to slot 0",
                self.capacity
            );
            tail = 0;
        }

        let new_id = NodeId(tail);
        self.write_node(new_id, key, data);
        tail += 1;
        self.set_tail(tail);

        if new_id == NodeId::ROOT {
            return;
        }

        let mut current = NodeId::ROOT;
        for _ in 0..self.capacity {
            let base = Self::node_base(current);
            let current_key = KeyHash::from_raw(self.arena.load(base + KEY));
            if current_key == key {
                self.arena.store(base + DATA, data);
                self.set_tail(tail - 1);
                return;
            }
            let link = if key > current_key { RIGHT } else { LEFT };
            let child = NodeId(self.arena.load(base + link));
            if child.is_none_link() || child.0 >= self.capacity {
                self.arena.store(base + link, new_id.0);
                return;
            }
            current = child;
        }
    }

    /// Iterates the occupied slots `0..len()` in slot order.
    ///
    /// Slots orphaned by a wraparound are not visited, but slots reachable
    /// only through an overwritten ancestor may be.
    pub fn iter(&self) -> impl Iterator<Item = CacheNode> + '_ {
        (0..self.tail().min(self.capacity)).filter_map(|i| self.get(NodeId(i)))
    }

    fn tail(&self) -> u32 {
        self.arena.load(0)
    }

    fn set_tail(&mut self, tail: u32) {
        self.arena.store(0, tail);
    }

    fn node_base(id: NodeId) -> usize {
        1 + id.0 as usize * NODE_WORDS
    }

    fn write_node(&mut self, id: NodeId, key: KeyHash, data: u32) {
        let base = Self::node_base(id);
        self.arena.store(base + KEY, key.get());
        self.arena.store(base + DATA, data);
        self.arena.store(base + RIGHT, 0);
        self.arena.store(base + LEFT, 0);
    }
}
