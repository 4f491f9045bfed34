//! Atomic census replacement from a dump.
//!
//! Import rebuilds the census from scratch: every key the previous census
//! owned is purged first, the tree's leaves and metadata as well as the
//! reverse index. Leaving either behind would make the reopened tree
//! append to the old content and produce a root that no longer matches the
//! declared one.

use std::collections::HashMap;
use std::io::BufRead;

use leanimt::keys::{leaf_key, META_SIZE_KEY, META_VERSION_KEY};
use leanimt::{
    bigint::{biguint_decoder, biguint_encoder, biguint_eq},
    KvStore, LeanImt, WriteTx as _,
};
use num_bigint::BigUint;
use num_traits::Zero;

use super::{
    keys::{addr_key, rev_key, weight_key, CENSUS_SIZE_KEY},
    CensusState, CensusTree,
};
use crate::{
    error::CensusError,
    pack::pack_address_weight,
    participant::{CensusDump, CensusParticipant},
};

impl CensusTree {
    /// Replace the census with the contents of a materialized dump,
    /// verifying that the rebuilt root matches `dump.root`.
    ///
    /// On failure the in-memory census is left untouched; the on-disk purge
    /// performed before rebuilding is already committed, so a retry starts
    /// from a clean slate.
    pub fn import_all(&self, dump: &CensusDump) -> Result<(), CensusError> {
        self.import_participants(&dump.root, dump.participants.clone())
    }

    /// Replace the census from a newline-delimited JSON stream of
    /// participants, verifying the rebuilt root against `root`.
    pub fn import<R: BufRead>(&self, root: &BigUint, reader: R) -> Result<(), CensusError> {
        let mut participants = Vec::new();
        for line in reader.lines() {
            let line =
                line.map_err(|e| CensusError::BadCensusDump(format!("stream error: {e}")))?;
            if line.trim().is_empty() {
                continue;
            }
            participants.push(serde_json::from_str::<CensusParticipant>(&line)?);
        }
        self.import_participants(root, participants)
    }

    fn import_participants(
        &self,
        declared_root: &BigUint,
        mut participants: Vec<CensusParticipant>,
    ) -> Result<(), CensusError> {
        if participants.is_empty() {
            return Err(CensusError::EmptyCensus);
        }

        let mut state = self.write_state();

        // Purge everything the previous census owned. Committing the purge
        // before rebuilding lets the replacement tree open on a clean
        // store.
        self.reset_persistent_state(&state)?;

        // Build the replacement aside; the live census is swapped only once
        // the declared root matches.
        let tree = self.make_tree()?;
        let mut address_index = HashMap::new();
        let mut index_to_address = HashMap::new();
        let mut weights = HashMap::new();

        participants.sort_by_key(|p| p.index);

        let mut last_index: Option<u64> = None;
        let mut expected_index = 0u64;
        for participant in &participants {
            if last_index == Some(participant.index) {
                return Err(CensusError::BadCensusDump(format!(
                    "duplicate index {}",
                    participant.index
                )));
            }
            last_index = Some(participant.index);

            // Fill gaps with empty leaves until the next declared index.
            while expected_index < participant.index {
                tree.insert(BigUint::zero());
                expected_index += 1;
            }

            if participant.is_empty_slot() {
                tree.insert(BigUint::zero());
            } else {
                if address_index.contains_key(&participant.address) {
                    return Err(CensusError::DuplicateAddress(participant.address));
                }
                let packed = pack_address_weight(&participant.address, &participant.weight)?;
                tree.insert(packed);

                let index = participant.index as usize;
                address_index.insert(participant.address, index);
                index_to_address.insert(index, participant.address);
                weights.insert(participant.address, participant.weight.clone());
            }
            expected_index += 1;
        }

        let root = tree.root().ok_or(CensusError::EmptyCensus)?;
        if &root != declared_root {
            return Err(CensusError::BadCensusDump(format!(
                "imported root does not match (expected {declared_root}, got {root})"
            )));
        }

        state.tree = tree;
        state.address_index = address_index;
        state.index_to_address = index_to_address;
        state.weights = weights;

        if let Some(store) = &self.store {
            persist_imported(store.as_ref(), &state)?;
        }
        Ok(())
    }

    fn make_tree(&self) -> Result<LeanImt<BigUint>, CensusError> {
        match &self.store {
            Some(store) => Ok(LeanImt::open(
                self.hasher().clone(),
                Some(biguint_eq()),
                store.clone(),
                biguint_encoder(),
                biguint_decoder(),
            )?),
            None => Ok(LeanImt::new(self.hasher().clone(), Some(biguint_eq()))),
        }
    }

    /// Delete every key the census and its tree currently own, in one
    /// transaction: `leaf:<i>` for the current tree size, the three meta
    /// keys, and all index/weight entries derivable from the in-memory
    /// maps.
    fn reset_persistent_state(&self, state: &CensusState) -> Result<(), CensusError> {
        let Some(store) = &self.store else {
            return Ok(());
        };

        let mut tx = store.write_tx();
        for index in 0..state.tree.size() {
            tx.delete(&leaf_key(index))?;
        }
        tx.delete(META_SIZE_KEY)?;
        tx.delete(META_VERSION_KEY)?;
        tx.delete(CENSUS_SIZE_KEY)?;
        for address in state.address_index.keys() {
            tx.delete(&addr_key(address))?;
            tx.delete(&weight_key(address))?;
        }
        for index in state.index_to_address.keys() {
            tx.delete(&rev_key(*index))?;
        }
        tx.commit()?;
        Ok(())
    }
}

/// Persist the rebuilt maps in one transaction.
fn persist_imported(store: &dyn KvStore, state: &CensusState) -> Result<(), CensusError> {
    let mut tx = store.write_tx();
    for (address, &index) in &state.address_index {
        let weight = state
            .weights
            .get(address)
            .ok_or_else(|| CensusError::DataCorruption(format!("missing weight for {address}")))?;
        tx.set(&addr_key(address), index.to_string().as_bytes())?;
        tx.set(&rev_key(index), address.to_checksum(None).as_bytes())?;
        tx.set(&weight_key(address), &weight.to_bytes_be())?;
    }
    tx.set(CENSUS_SIZE_KEY, state.tree.size().to_string().as_bytes())?;
    tx.commit()?;
    Ok(())
}
