//! Census overlay over the LeanIMT.
//!
//! A census maps Ethereum-style 20-byte addresses to 88-bit voting weights.
//! Each pair is packed into a single 248-bit tree leaf
//! (`address * 2^88 + weight`), small enough for a BN254-sized scalar
//! field, so membership proofs verify both the address and its weight with
//! a single leaf opening, in a circuit or out of it.
//!
//! On top of the tree the census keeps three in-memory maps in lockstep
//! (address to index, index to address, address to weight) for O(1)
//! lookups, persists a reverse index alongside the tree's own leaf storage,
//! and supports portable newline-delimited JSON dumps with atomic
//! root-checked import.

mod census;
mod error;
pub mod pack;
mod participant;

pub use census::{CensusTree, DumpReader};
pub use error::CensusError;
pub use pack::{pack_address_weight, unpack_address_weight, WEIGHT_BITS};
pub use participant::{CensusDump, CensusParticipant, CensusProof};
