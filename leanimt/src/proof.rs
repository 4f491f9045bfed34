//! Membership proofs: generation and stand-alone verification.
//!
//! A proof records only the siblings that actually exist along the path
//! from the leaf to the root; levels where the lean rule applied (no right
//! neighbor) contribute neither a sibling nor a path bit. The surviving
//! path bits are packed LSB-first into `index`: bit `k` is 1 when the
//! `k`-th recorded sibling sits on the left of the current node, 0 when on
//! the right.
//!
//! This layout is deliberate: in-circuit verifiers pad the sibling vector
//! with zeros and skip hashing on a zero sibling, so the out-of-circuit
//! proof must not introduce implicit zero padding of its own.

use serde::{Deserialize, Serialize};

use crate::{error::LeanImtError, tree::LeanImt};

/// Fields needed to verify membership of `leaf` under `root`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof<N> {
    /// Root at the time the proof was produced.
    pub root: N,
    /// The proved leaf value.
    pub leaf: N,
    /// Packed path bits, LSB-first; one bit per recorded sibling.
    pub index: u64,
    /// The actually-present siblings, bottom-up; lean levels are omitted.
    pub siblings: Vec<N>,
}

impl<N: Clone + PartialEq> LeanImt<N> {
    /// Build a membership proof for the leaf at `index`.
    pub fn generate_proof(&self, index: usize) -> Result<MerkleProof<N>, LeanImtError> {
        let state = self.read_state();
        let size = state.nodes[0].len();
        if index >= size {
            return Err(LeanImtError::IndexOutOfRange { index, size });
        }

        let leaf = state.nodes[0][index].clone();
        let depth = state.nodes.len() - 1;
        let mut siblings = Vec::with_capacity(depth);
        let mut packed: u64 = 0;
        let mut recorded: u32 = 0;

        let mut idx = index;
        for level in 0..depth {
            if idx & 1 == 1 {
                // Right child: the left sibling always exists.
                siblings.push(state.nodes[level][idx - 1].clone());
                packed |= 1 << recorded;
                recorded += 1;
            } else if idx + 1 < state.nodes[level].len() {
                siblings.push(state.nodes[level][idx + 1].clone());
                recorded += 1;
            }
            // No right sibling: lean skip, nothing recorded.
            idx >>= 1;
        }

        let root = state.root().ok_or_else(|| {
            LeanImtError::CorruptedData("non-empty tree has no root".into())
        })?;

        Ok(MerkleProof {
            root,
            leaf,
            index: packed,
            siblings,
        })
    }

    /// Verify a proof using this tree's hash and equality functions. Does
    /// not compare against the current root: the proof carries its own.
    pub fn verify_proof(&self, proof: &MerkleProof<N>) -> bool {
        let Some(computed) = compute_root(proof, self.hasher().as_ref()) else {
            return false;
        };
        match self.eq_fn() {
            Some(eq) => eq(&computed, &proof.root),
            None => computed == proof.root,
        }
    }
}

/// Verify a proof against its embedded root using `hash` and the element
/// type's equality. Pure: touches no tree state, usable by third-party
/// validators.
///
/// A single-leaf proof has no siblings and is valid iff `leaf == root`.
pub fn verify_proof<N, F>(proof: &MerkleProof<N>, hash: F) -> bool
where
    N: Clone + PartialEq,
    F: Fn(&N, &N) -> N,
{
    match compute_root(proof, &hash) {
        Some(computed) => computed == proof.root,
        None => false,
    }
}

/// Like [`verify_proof`], with an explicit equality comparator.
pub fn verify_proof_with<N, F, E>(proof: &MerkleProof<N>, hash: F, eq: E) -> bool
where
    N: Clone,
    F: Fn(&N, &N) -> N,
    E: Fn(&N, &N) -> bool,
{
    match compute_root(proof, &hash) {
        Some(computed) => eq(&computed, &proof.root),
        None => false,
    }
}

/// Fold the siblings over the leaf following the packed path bits. Returns
/// `None` for malformed proofs claiming more than 64 recorded levels.
fn compute_root<N: Clone, F: Fn(&N, &N) -> N + ?Sized>(
    proof: &MerkleProof<N>,
    hash: &F,
) -> Option<N> {
    if proof.siblings.len() > u64::BITS as usize {
        return None;
    }
    let mut node = proof.leaf.clone();
    for (k, sibling) in proof.siblings.iter().enumerate() {
        if (proof.index >> k) & 1 == 1 {
            node = hash(sibling, &node);
        } else {
            node = hash(&node, sibling);
        }
    }
    Some(node)
}
