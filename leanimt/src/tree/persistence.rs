//! Leaf persistence: load, sync and close.
//!
//! Only the leaves plus two metadata keys are stored (see [`crate::keys`]);
//! internal levels are derived state and are rebuilt from the leaves on
//! load. Mutations between syncs live only in memory: batch workloads would
//! become quadratically expensive if every insert hit the store, so callers
//! choose the sync cadence.

use super::{build_levels, Hasher, LeanImt, TreeState};
use crate::{
    error::LeanImtError,
    keys::{leaf_key, META_SIZE_KEY, META_VERSION_KEY, SCHEMA_VERSION},
    store::WriteTx as _,
};

impl<N: Clone + PartialEq> LeanImt<N> {
    /// Persist the current leaf sequence in one atomic transaction.
    ///
    /// A no-op for in-memory trees and for persistent trees with no
    /// unsynced changes. On commit failure the store keeps its previous
    /// state and the tree stays dirty for retry.
    pub fn sync(&self) -> Result<(), LeanImtError> {
        self.write_state().sync()
    }

    /// Perform a final [`sync`] and release the store. Idempotent: further
    /// calls on a closed tree are no-ops.
    ///
    /// [`sync`]: LeanImt::sync
    pub fn close(&self) -> Result<(), LeanImtError> {
        let mut state = self.write_state();
        state.sync()?;
        state.persistence = None;
        Ok(())
    }
}

impl<N: Clone + PartialEq> TreeState<N> {
    pub(crate) fn sync(&mut self) -> Result<(), LeanImtError> {
        let Some(persistence) = &self.persistence else {
            return Ok(());
        };
        if !self.dirty {
            return Ok(());
        }

        let mut tx = persistence.store.write_tx();
        let size = self.nodes[0].len();

        for (i, leaf) in self.nodes[0].iter().enumerate() {
            let bytes = (persistence.encode)(leaf)?;
            tx.set(&leaf_key(i), &bytes)?;
        }

        // Clean up leaves beyond the current size in case the tree shrank
        // (e.g. after an import replaced its content).
        let prev_size = match persistence.store.get(META_SIZE_KEY)? {
            Some(bytes) => decode_size(&bytes)?,
            None => 0,
        };
        for i in size..prev_size {
            tx.delete(&leaf_key(i))?;
        }

        tx.set(META_SIZE_KEY, &encode_size(size))?;
        tx.set(META_VERSION_KEY, SCHEMA_VERSION)?;
        tx.commit()?;

        self.dirty = false;
        Ok(())
    }

    pub(crate) fn load(&mut self, hash: &Hasher<N>) -> Result<(), LeanImtError> {
        let Some(persistence) = &self.persistence else {
            return Ok(());
        };

        let size = match persistence.store.get(META_SIZE_KEY)? {
            Some(bytes) => decode_size(&bytes)?,
            // No existing tree: start empty.
            None => {
                self.nodes = vec![Vec::new()];
                self.dirty = false;
                return Ok(());
            }
        };

        let mut leaves = Vec::with_capacity(size);
        for i in 0..size {
            let bytes = persistence.store.get(&leaf_key(i))?.ok_or_else(|| {
                LeanImtError::CorruptedData(format!("missing leaf {i} for stored size {size}"))
            })?;
            leaves.push((persistence.decode)(&bytes)?);
        }

        self.nodes = build_levels(leaves, hash);
        self.dirty = false;
        Ok(())
    }
}

fn encode_size(size: usize) -> Vec<u8> {
    size.to_string().into_bytes()
}

fn decode_size(bytes: &[u8]) -> Result<usize, LeanImtError> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| LeanImtError::CorruptedData("invalid size encoding".into()))
}
