//! The census tree: a LeanIMT of packed address/weight leaves plus a
//! reverse index for O(1) address lookups.

mod dump;
mod import;


use std::{
    collections::HashMap,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use alloy_primitives::Address;
use leanimt::{
    bigint::{biguint_decoder, biguint_encoder, biguint_eq},
    Hasher, KvStore, LeanImt, WriteTx as _,
};
use num_bigint::BigUint;

use crate::{
    error::CensusError,
    pack::pack_address_weight,
    participant::CensusProof,
};

pub use dump::DumpReader;

/// Key layout owned by the census, next to the tree's own `leaf:*` and
/// `meta:*` entries. All values are ASCII; addresses use their checksummed
/// hex form.
mod keys {
    use alloy_primitives::Address;

    pub(super) const CENSUS_SIZE_KEY: &[u8] = b"meta:census_size";

    pub(super) fn addr_key(address: &Address) -> Vec<u8> {
        format!("idx:addr:{}", address.to_checksum(None)).into_bytes()
    }

    pub(super) fn rev_key(index: usize) -> Vec<u8> {
        format!("idx:rev:{index}").into_bytes()
    }

    pub(super) fn weight_key(address: &Address) -> Vec<u8> {
        format!("weight:{}", address.to_checksum(None)).into_bytes()
    }
}

use keys::{addr_key, rev_key, weight_key, CENSUS_SIZE_KEY};

/// Mutable census state, guarded by the handle's readers-writer lock. The
/// three maps stay in lockstep with the tree: for every present address
/// with index `i` and weight `w`, leaf `i` equals `pack(address, w)`.
struct CensusState {
    tree: LeanImt<BigUint>,
    address_index: HashMap<Address, usize>,
    index_to_address: HashMap<usize, Address>,
    weights: HashMap<Address, BigUint>,
}

impl CensusState {
    fn empty(tree: LeanImt<BigUint>) -> Self {
        Self {
            tree,
            address_index: HashMap::new(),
            index_to_address: HashMap::new(),
            weights: HashMap::new(),
        }
    }
}

/// A voting census over a LeanIMT.
///
/// Stores address/weight pairs as packed leaves and provides address-based
/// lookups, Merkle proofs, streaming dumps and atomic root-checked import.
/// Safe for concurrent use; the census lock is held across the underlying
/// tree call, so a census write linearizes tree and map mutation.
pub struct CensusTree {
    hasher: Hasher<BigUint>,
    store: Option<Arc<dyn KvStore>>,
    state: RwLock<CensusState>,
}

impl CensusTree {
    /// Create a new empty in-memory census.
    pub fn new(hasher: Hasher<BigUint>) -> Self {
        let tree = LeanImt::new(hasher.clone(), Some(biguint_eq()));
        Self {
            hasher,
            store: None,
            state: RwLock::new(CensusState::empty(tree)),
        }
    }

    /// Open a census backed by a key-value store, reloading the tree leaves
    /// and rebuilding the in-memory maps from the persisted reverse index.
    pub fn open(store: Arc<dyn KvStore>, hasher: Hasher<BigUint>) -> Result<Self, CensusError> {
        let tree = LeanImt::open(
            hasher.clone(),
            Some(biguint_eq()),
            store.clone(),
            biguint_encoder(),
            biguint_decoder(),
        )?;
        let mut state = CensusState::empty(tree);
        load_maps(store.as_ref(), &mut state)?;
        Ok(Self {
            hasher,
            store: Some(store),
            state: RwLock::new(state),
        })
    }

    /// Add an address with its voting weight.
    ///
    /// The pair is packed into a new tree leaf and the reverse index is
    /// persisted immediately in one transaction; the leaf itself reaches
    /// the store on the next [`sync`](CensusTree::sync).
    pub fn add(&self, address: Address, weight: &BigUint) -> Result<(), CensusError> {
        let mut state = self.write_state();
        if state.address_index.contains_key(&address) {
            return Err(CensusError::AddressAlreadyExists(address));
        }

        let packed = pack_address_weight(&address, weight)?;
        state.tree.insert(packed);

        let index = state.tree.size() - 1;
        state.address_index.insert(address, index);
        state.index_to_address.insert(index, address);
        state.weights.insert(address, weight.clone());

        if let Some(store) = &self.store {
            persist_entry(store.as_ref(), &address, index, weight, state.tree.size())?;
        }
        Ok(())
    }

    /// Add many address/weight pairs in one tree batch and one storage
    /// transaction. Empty input is a successful no-op.
    pub fn add_bulk(&self, addresses: &[Address], weights: &[BigUint]) -> Result<(), CensusError> {
        if addresses.len() != weights.len() {
            return Err(CensusError::LengthMismatch);
        }
        if addresses.is_empty() {
            return Ok(());
        }

        let mut state = self.write_state();

        let mut batch = std::collections::HashSet::with_capacity(addresses.len());
        for address in addresses {
            if state.address_index.contains_key(address) {
                return Err(CensusError::AddressAlreadyExists(*address));
            }
            if !batch.insert(*address) {
                return Err(CensusError::DuplicateAddress(*address));
            }
        }

        let mut packed = Vec::with_capacity(addresses.len());
        for (address, weight) in addresses.iter().zip(weights) {
            packed.push(pack_address_weight(address, weight)?);
        }

        let start = state.tree.size();
        state.tree.insert_many(packed)?;

        for (i, (address, weight)) in addresses.iter().zip(weights).enumerate() {
            let index = start + i;
            state.address_index.insert(*address, index);
            state.index_to_address.insert(index, *address);
            state.weights.insert(*address, weight.clone());
        }

        if let Some(store) = &self.store {
            persist_bulk(store.as_ref(), addresses, weights, start, state.tree.size())?;
        }
        Ok(())
    }

    /// Update the weight of an existing address in place.
    pub fn update(&self, address: Address, new_weight: &BigUint) -> Result<(), CensusError> {
        let mut state = self.write_state();
        let Some(&index) = state.address_index.get(&address) else {
            return Err(CensusError::AddressNotFound(address));
        };

        let packed = pack_address_weight(&address, new_weight)?;
        state.tree.update(index, packed)?;
        state.weights.insert(address, new_weight.clone());

        if let Some(store) = &self.store {
            persist_entry(store.as_ref(), &address, index, new_weight, state.tree.size())?;
        }
        Ok(())
    }

    /// Build a membership proof for an address.
    pub fn generate_proof(&self, address: &Address) -> Result<CensusProof, CensusError> {
        let state = self.read_state();
        let Some(&index) = state.address_index.get(address) else {
            return Err(CensusError::AddressNotFound(*address));
        };
        let weight = state
            .weights
            .get(address)
            .ok_or_else(|| CensusError::DataCorruption(format!("missing weight for {address}")))?
            .clone();

        let proof = state.tree.generate_proof(index)?;
        Ok(CensusProof {
            root: proof.root,
            index: proof.index,
            address: *address,
            weight,
            siblings: proof.siblings,
        })
    }

    /// Whether the address is part of the census.
    pub fn has(&self, address: &Address) -> bool {
        self.read_state().address_index.contains_key(address)
    }

    /// The weight registered for an address, if present.
    pub fn weight(&self, address: &Address) -> Option<BigUint> {
        self.read_state().weights.get(address).cloned()
    }

    /// The Merkle root, or `None` for an empty census.
    pub fn root(&self) -> Option<BigUint> {
        self.read_state().tree.root()
    }

    /// Number of tree leaves, including empty slots left by an import.
    pub fn size(&self) -> usize {
        self.read_state().tree.size()
    }

    /// Persist outstanding tree changes. The reverse index is already
    /// persisted on every mutation.
    pub fn sync(&self) -> Result<(), CensusError> {
        let state = self.write_state();
        state.tree.sync()?;
        Ok(())
    }

    /// Final sync and release of the underlying store. Idempotent.
    pub fn close(&self) -> Result<(), CensusError> {
        let state = self.write_state();
        state.tree.close()?;
        Ok(())
    }

    pub(crate) fn hasher(&self) -> &Hasher<BigUint> {
        &self.hasher
    }

    fn read_state(&self) -> RwLockReadGuard<'_, CensusState> {
        self.state.read().unwrap_or_else(|poison| poison.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, CensusState> {
        self.state
            .write()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}

/// Rebuild the in-memory maps from `idx:rev:*` and `weight:*`. An index
/// with no reverse entry is a gap (empty slot), not an error.
fn load_maps(store: &dyn KvStore, state: &mut CensusState) -> Result<(), CensusError> {
    let Some(size_bytes) = store.get(CENSUS_SIZE_KEY)? else {
        return Ok(());
    };
    let census_size: usize = std::str::from_utf8(&size_bytes)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| CensusError::DataCorruption("invalid census size encoding".into()))?;

    for index in 0..census_size {
        let Some(addr_bytes) = store.get(&rev_key(index))? else {
            continue;
        };
        let address: Address = std::str::from_utf8(&addr_bytes)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| {
                CensusError::DataCorruption(format!("invalid address at index {index}"))
            })?;
        let weight_bytes = store
            .get(&weight_key(&address))?
            .ok_or_else(|| CensusError::DataCorruption(format!("missing weight for {address}")))?;
        let weight = BigUint::from_bytes_be(&weight_bytes);

        state.address_index.insert(address, index);
        state.index_to_address.insert(index, address);
        state.weights.insert(address, weight);
    }
    Ok(())
}

/// Persist one entry's index mappings and weight in a single transaction.
fn persist_entry(
    store: &dyn KvStore,
    address: &Address,
    index: usize,
    weight: &BigUint,
    census_size: usize,
) -> Result<(), CensusError> {
    let mut tx = store.write_tx();
    tx.set(&addr_key(address), index.to_string().as_bytes())?;
    tx.set(&rev_key(index), address.to_checksum(None).as_bytes())?;
    tx.set(&weight_key(address), &weight.to_bytes_be())?;
    tx.set(CENSUS_SIZE_KEY, census_size.to_string().as_bytes())?;
    tx.commit()?;
    Ok(())
}

/// Persist a batch of entries in a single transaction, with one trailing
/// census-size write.
fn persist_bulk(
    store: &dyn KvStore,
    addresses: &[Address],
    weights: &[BigUint],
    start: usize,
    census_size: usize,
) -> Result<(), CensusError> {
    let mut tx = store.write_tx();
    for (i, (address, weight)) in addresses.iter().zip(weights).enumerate() {
        let index = start + i;
        tx.set(&addr_key(address), index.to_string().as_bytes())?;
        tx.set(&rev_key(index), address.to_checksum(None).as_bytes())?;
        tx.set(&weight_key(address), &weight.to_bytes_be())?;
    }
    tx.set(CENSUS_SIZE_KEY, census_size.to_string().as_bytes())?;
    tx.commit()?;
    Ok(())
}
