//! In-place leaf updates: single and batch.
//!
//! Like insertion, updates compute every hash from the current matrix
//! before committing any write, so a panicking hash cannot corrupt the
//! tree. Argument validation happens before either phase.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use super::{Hasher, LeanImt, TreeState};
use crate::error::LeanImtError;

impl<N: Clone + PartialEq> LeanImt<N> {
    /// Replace the leaf at `index` and rehash its path to the root.
    pub fn update(&self, index: usize, leaf: N) -> Result<(), LeanImtError> {
        let hash = self.hasher().clone();
        let mut state = self.write_state();
        let size = state.nodes[0].len();
        if index >= size {
            return Err(LeanImtError::IndexOutOfRange { index, size });
        }
        state.update(index, leaf, &hash);
        Ok(())
    }

    /// Replace several leaves at once, rehashing each touched parent only
    /// once per level.
    ///
    /// All indices are validated (range and duplicates) before any leaf is
    /// written. Empty input is a no-op.
    pub fn update_many(&self, indices: &[usize], leaves: &[N]) -> Result<(), LeanImtError> {
        let hash = self.hasher().clone();
        let mut state = self.write_state();
        let size = state.nodes[0].len();

        if indices.len() != leaves.len() {
            return Err(LeanImtError::LengthMismatch {
                indices: indices.len(),
                leaves: leaves.len(),
            });
        }
        let mut seen = HashSet::with_capacity(indices.len());
        for &index in indices {
            if index >= size {
                return Err(LeanImtError::IndexOutOfRange { index, size });
            }
            if !seen.insert(index) {
                return Err(LeanImtError::DuplicateIndex(index));
            }
        }
        if indices.is_empty() {
            return Ok(());
        }

        state.update_many(indices, leaves, &hash);
        Ok(())
    }
}

impl<N: Clone + PartialEq> TreeState<N> {
    pub(crate) fn update(&mut self, index: usize, leaf: N, hash: &Hasher<N>) {
        let depth = self.nodes.len() - 1;

        // Unlike insertion, an updated left child may have a right sibling.
        let mut path = Vec::with_capacity(depth + 1);
        let mut node = leaf;
        let mut idx = index;
        for level in 0..depth {
            path.push(node.clone());
            if idx & 1 == 1 {
                node = hash(&self.nodes[level][idx - 1], &node);
            } else if idx + 1 < self.nodes[level].len() {
                node = hash(&node, &self.nodes[level][idx + 1]);
            }
            idx >>= 1;
        }
        path.push(node);

        let mut idx = index;
        for (level, value) in path.into_iter().enumerate() {
            if level == depth {
                self.nodes[level][0] = value;
            } else {
                self.nodes[level][idx] = value;
                idx >>= 1;
            }
        }

        self.dirty = true;
    }

    pub(crate) fn update_many(&mut self, indices: &[usize], leaves: &[N], hash: &Hasher<N>) {
        // Stage the new leaves and propagate the touched parent set level
        // by level; parents read staged values where present and the
        // existing matrix elsewhere.
        let mut commits: Vec<BTreeMap<usize, N>> = Vec::with_capacity(self.nodes.len());
        let mut prev: BTreeMap<usize, N> = indices
            .iter()
            .zip(leaves)
            .map(|(&index, leaf)| (index, leaf.clone()))
            .collect();
        let mut modified: BTreeSet<usize> = prev.keys().map(|index| index >> 1).collect();

        for level in 1..self.nodes.len() {
            let below = &self.nodes[level - 1];
            let mut stage = BTreeMap::new();
            let mut next = BTreeSet::new();
            for &index in &modified {
                let li = 2 * index;
                let ri = li + 1;
                let left = prev.get(&li).unwrap_or(&below[li]);
                let parent = if ri < below.len() {
                    hash(left, prev.get(&ri).unwrap_or(&below[ri]))
                } else {
                    left.clone()
                };
                stage.insert(index, parent);
                next.insert(index >> 1);
            }
            commits.push(std::mem::replace(&mut prev, stage));
            modified = next;
        }
        commits.push(prev);

        for (level, stage) in commits.into_iter().enumerate() {
            for (index, value) in stage {
                self.nodes[level][index] = value;
            }
        }

        self.dirty = true;
    }
}
