//! Core LeanIMT data structure.
//!
//! The node matrix is a jagged sequence of levels: `nodes[0]` holds the
//! leaves in insertion order and the top level holds the root alone. For
//! every level, a parent with two children is their hash and a parent with
//! only a left child *is* that child (the lean rule). The depth is always
//! `ceil(log2(max(size, 1)))`.

mod insert;
mod json;
mod persistence;
mod update;

#[cfg(test)]
mod tests;

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::{
    error::{CodecError, LeanImtError},
    store::KvStore,
};

/// Binary hash used for internal nodes. Must be pure, deterministic and
/// total.
pub type Hasher<N> = Arc<dyn Fn(&N, &N) -> N + Send + Sync>;

/// Optional equality comparator used for leaf lookups and proof checks.
/// When absent, the element type's `PartialEq` is used.
pub type Equal<N> = Arc<dyn Fn(&N, &N) -> bool + Send + Sync>;

/// Serializes a leaf to bytes for the persistence layer.
pub type Encoder<N> = Arc<dyn Fn(&N) -> Result<Vec<u8>, CodecError> + Send + Sync>;

/// Deserializes a leaf from bytes for the persistence layer.
pub type Decoder<N> = Arc<dyn Fn(&[u8]) -> Result<N, CodecError> + Send + Sync>;

/// Storage attachment of a persistent tree: the store plus the leaf codec.
/// A store is always paired with its codec.
pub(crate) struct Persistence<N> {
    pub(crate) store: Arc<dyn KvStore>,
    pub(crate) encode: Encoder<N>,
    pub(crate) decode: Decoder<N>,
}

/// Mutable tree state, guarded by the handle's readers-writer lock.
pub(crate) struct TreeState<N> {
    /// `nodes[0]` = leaves; the top level holds the root alone.
    pub(crate) nodes: Vec<Vec<N>>,
    pub(crate) persistence: Option<Persistence<N>>,
    /// Set by any mutation, cleared by a successful sync.
    pub(crate) dirty: bool,
}

/// A binary Lean Incremental Merkle Tree.
///
/// - dynamic depth: always `ceil(log2(size))`
/// - no zero nodes: a missing right child makes the parent equal the left
/// - proofs omit missing siblings and pack the path into an index integer
///
/// The handle is safe for concurrent use by multiple threads: reads take a
/// shared lock, mutations take an exclusive one.
pub struct LeanImt<N> {
    hash: Hasher<N>,
    eq: Option<Equal<N>>,
    state: RwLock<TreeState<N>>,
}

impl<N: Clone + PartialEq> LeanImt<N> {
    /// Create a new empty in-memory tree.
    ///
    /// If `eq` is `None`, the element type's `PartialEq` is used for leaf
    /// lookups and proof checks.
    pub fn new(hash: Hasher<N>, eq: Option<Equal<N>>) -> Self {
        Self {
            hash,
            eq,
            state: RwLock::new(TreeState {
                nodes: vec![Vec::new()],
                persistence: None,
                dirty: false,
            }),
        }
    }

    /// Open a tree backed by a key-value store.
    ///
    /// Existing leaves are loaded through `decode` and the internal levels
    /// are rebuilt; a store with no `meta:size` entry yields an empty tree.
    pub fn open(
        hash: Hasher<N>,
        eq: Option<Equal<N>>,
        store: Arc<dyn KvStore>,
        encode: Encoder<N>,
        decode: Decoder<N>,
    ) -> Result<Self, LeanImtError> {
        let tree = Self {
            hash,
            eq,
            state: RwLock::new(TreeState {
                nodes: vec![Vec::new()],
                persistence: Some(Persistence {
                    store,
                    encode,
                    decode,
                }),
                dirty: false,
            }),
        };
        {
            let hash = tree.hash.clone();
            let mut state = tree.write_state();
            state.load(&hash)?;
        }
        Ok(tree)
    }

    /// Number of leaves.
    pub fn size(&self) -> usize {
        self.read_state().nodes[0].len()
    }

    /// Current dynamic depth (number of levels minus one).
    pub fn depth(&self) -> usize {
        self.read_state().nodes.len() - 1
    }

    /// A copy of the leaves in insertion order.
    pub fn leaves(&self) -> Vec<N> {
        self.read_state().nodes[0].clone()
    }

    /// The root, or `None` for an empty tree.
    pub fn root(&self) -> Option<N> {
        self.read_state().root()
    }

    /// Index of a leaf by equality, or `None` if not present. Linear scan.
    pub fn index_of(&self, leaf: &N) -> Option<usize> {
        let state = self.read_state();
        state.nodes[0].iter().position(|v| self.equal(v, leaf))
    }

    /// Whether the leaf is present.
    pub fn has(&self, leaf: &N) -> bool {
        self.index_of(leaf).is_some()
    }

    pub(crate) fn equal(&self, a: &N, b: &N) -> bool {
        match &self.eq {
            Some(eq) => eq(a, b),
            None => a == b,
        }
    }

    pub(crate) fn hasher(&self) -> &Hasher<N> {
        &self.hash
    }

    pub(crate) fn eq_fn(&self) -> Option<&Equal<N>> {
        self.eq.as_ref()
    }

    pub(crate) fn read_state(&self) -> RwLockReadGuard<'_, TreeState<N>> {
        self.state.read().unwrap_or_else(|poison| poison.into_inner())
    }

    pub(crate) fn write_state(&self) -> RwLockWriteGuard<'_, TreeState<N>> {
        self.state
            .write()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}

impl<N: Clone> TreeState<N> {
    pub(crate) fn root(&self) -> Option<N> {
        self.nodes.last().and_then(|top| top.first()).cloned()
    }
}

/// Minimal `d >= 0` such that `2^d >= n`.
pub(crate) fn ceil_log2(n: usize) -> usize {
    if n <= 1 {
        0
    } else {
        (usize::BITS - (n - 1).leading_zeros()) as usize
    }
}

/// Write `value` at `level[index]`, growing the level by one when `index`
/// is the next free slot. Level fills are always contiguous.
pub(crate) fn set_or_push<N>(level: &mut Vec<N>, index: usize, value: N) {
    if index < level.len() {
        level[index] = value;
    } else {
        debug_assert_eq!(index, level.len());
        level.push(value);
    }
}

/// Rebuild every internal level from a leaf sequence using the lean rule.
pub(crate) fn build_levels<N: Clone>(leaves: Vec<N>, hash: &Hasher<N>) -> Vec<Vec<N>> {
    let depth = ceil_log2(leaves.len().max(1));
    let mut nodes = Vec::with_capacity(depth + 1);
    nodes.push(leaves);
    for level in 0..depth {
        let current = &nodes[level];
        let parent_count = (current.len() + 1) / 2;
        let mut parents = Vec::with_capacity(parent_count);
        for i in 0..parent_count {
            let li = 2 * i;
            let ri = li + 1;
            if ri < current.len() {
                parents.push(hash(&current[li], &current[ri]));
            } else {
                parents.push(current[li].clone());
            }
        }
        nodes.push(parents);
    }
    nodes
}
