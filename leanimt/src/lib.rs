//! Lean Incremental Merkle Tree (LeanIMT).
//!
//! An append-only binary Merkle tree with dynamic depth and no zero padding:
//! when a node has only a left child, the parent equals that child, and the
//! depth is always exactly `ceil(log2(size))`. Internal nodes are computed
//! by a caller-supplied binary hash over a generic element type, so the tree
//! works equally for ZK-friendly field hashes (Poseidon, MiMC) and byte
//! hashes (SHA-256, BLAKE3).
//!
//! Proofs omit the siblings of "lean" levels and encode the remaining path
//! as a bit-packed integer, which keeps them bit-compatible with in-circuit
//! verifiers that skip hashing when a sibling slot is empty.
//!
//! Trees can optionally be backed by a transactional key-value store (see
//! [`store`]): only the leaves are persisted, internal levels are rebuilt on
//! load, and durability is explicit through [`LeanImt::sync`].
//!
//! All operations are synchronous and safe for concurrent use from multiple
//! threads; the handle serializes access through a single readers-writer
//! lock.

mod error;
pub mod bigint;
pub mod keys;
pub mod proof;
pub mod store;
mod tree;

pub use error::{CodecError, LeanImtError};
pub use proof::{verify_proof, verify_proof_with, MerkleProof};
pub use store::{KvStore, MemoryStore, StoreError, WriteTx};
pub use tree::{Decoder, Encoder, Equal, Hasher, LeanImt};
