//! Leaf insertion: single append and batch append.
//!
//! Both operations run in two phases: every hash is computed from the
//! current matrix first, and only then are the results committed. A
//! panicking hash therefore cannot leave a half-rehashed matrix behind.

use super::{ceil_log2, set_or_push, Hasher, LeanImt, TreeState};
use crate::error::LeanImtError;

impl<N: Clone + PartialEq> LeanImt<N> {
    /// Append a single leaf at the end, updating the path to the root
    /// bottom-up.
    pub fn insert(&self, leaf: N) {
        let hash = self.hasher().clone();
        let mut state = self.write_state();
        state.insert(leaf, &hash);
    }

    /// Append a block of leaves, recomputing only the affected parents
    /// level by level. More efficient than repeated [`insert`] calls.
    ///
    /// Fails with [`LeanImtError::EmptyBatch`] when `leaves` is empty.
    ///
    /// [`insert`]: LeanImt::insert
    pub fn insert_many(&self, leaves: Vec<N>) -> Result<(), LeanImtError> {
        if leaves.is_empty() {
            return Err(LeanImtError::EmptyBatch);
        }
        let hash = self.hasher().clone();
        let mut state = self.write_state();
        state.insert_many(leaves, &hash);
        Ok(())
    }
}

impl<N: Clone + PartialEq> TreeState<N> {
    pub(crate) fn insert(&mut self, leaf: N, hash: &Hasher<N>) {
        let size = self.nodes[0].len();
        let old_depth = self.nodes.len() - 1;
        let new_depth = ceil_log2(size + 1).max(old_depth);

        // Compute the value each level of the new path will hold. When the
        // new index is a right child the left sibling already exists; when
        // it is a left child the parent equals the node itself until a
        // right sibling arrives with the next leaf.
        let mut path = Vec::with_capacity(new_depth + 1);
        let mut node = leaf;
        let mut index = size;
        for level in 0..new_depth {
            path.push(node.clone());
            if index & 1 == 1 {
                node = hash(&self.nodes[level][index - 1], &node);
            }
            index >>= 1;
        }
        path.push(node);

        // Commit: add the new top level if the depth grew, then write the
        // path, root last.
        if new_depth > old_depth {
            self.nodes.push(Vec::new());
        }
        let mut index = size;
        for (level, value) in path.into_iter().enumerate() {
            if level == new_depth {
                set_or_push(&mut self.nodes[level], 0, value);
            } else {
                set_or_push(&mut self.nodes[level], index, value);
                index >>= 1;
            }
        }

        self.dirty = true;
    }

    pub(crate) fn insert_many(&mut self, leaves: Vec<N>, hash: &Hasher<N>) {
        let old_size = self.nodes[0].len();
        let new_size = old_size + leaves.len();
        let old_depth = self.nodes.len() - 1;
        let new_depth = ceil_log2(new_size).max(old_depth);

        // Stage the affected slice of every level: at each level the block
        // of recomputed parents is the contiguous range
        // [level_start, parent_count). `prev` holds the staged slice of the
        // level below; reads fall back to the existing matrix left of it.
        let mut commits: Vec<(usize, Vec<N>)> = Vec::with_capacity(new_depth + 1);
        let mut prev: (usize, Vec<N>) = (old_size, leaves);
        let mut level_len = new_size;
        let mut start_index = old_size >> 1;

        for level in 0..new_depth {
            let parent_count = (level_len + 1) / 2;
            let mut parents = Vec::with_capacity(parent_count - start_index);
            {
                let (prev_start, prev_vals) = (prev.0, &prev.1);
                let node_at = |i: usize| {
                    if i >= prev_start {
                        &prev_vals[i - prev_start]
                    } else {
                        &self.nodes[level][i]
                    }
                };
                for index in start_index..parent_count {
                    let li = 2 * index;
                    let ri = li + 1;
                    parents.push(if ri < level_len {
                        hash(node_at(li), node_at(ri))
                    } else {
                        node_at(li).clone()
                    });
                }
            }
            commits.push(std::mem::replace(&mut prev, (start_index, parents)));
            level_len = parent_count;
            start_index >>= 1;
        }
        commits.push(prev);

        // Commit level by level; staged ranges extend each level
        // contiguously.
        for (level, (start, values)) in commits.into_iter().enumerate() {
            if level == self.nodes.len() {
                self.nodes.push(Vec::new());
            }
            let target = &mut self.nodes[level];
            for (offset, value) in values.into_iter().enumerate() {
                set_or_push(target, start + offset, value);
            }
        }

        self.dirty = true;
    }
}
