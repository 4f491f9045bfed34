//! Census wire types: participants, dumps and proofs.
//!
//! Participants serialize as `{"index": 0, "address": "0x…", "weight":
//! "100"}`: addresses in their hex form, big integers as decimal strings
//! (decimal numbers are also accepted when decoding, for producers that
//! emit bare JSON numbers).

use alloy_primitives::Address;
use leanimt::{verify_proof_with, Hasher, MerkleProof};
use num_bigint::BigUint;
use num_traits::Zero;
use serde::{Deserialize, Serialize};

use crate::{error::CensusError, pack::pack_address_weight};

/// One census member: its tree index, address and weight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CensusParticipant {
    pub index: u64,
    pub address: Address,
    #[serde(with = "biguint_dec")]
    pub weight: BigUint,
}

impl CensusParticipant {
    /// An empty slot: the zero address with zero weight. Dumps use it to
    /// encode gaps left by an import.
    pub fn empty_slot(index: u64) -> Self {
        Self {
            index,
            address: Address::ZERO,
            weight: BigUint::zero(),
        }
    }

    /// Whether this entry represents an empty slot.
    pub fn is_empty_slot(&self) -> bool {
        self.address == Address::ZERO && self.weight.is_zero()
    }
}

/// Full export of the census state, used to move a census between nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CensusDump {
    #[serde(with = "biguint_dec")]
    pub root: BigUint,
    /// Unix timestamp (seconds) at export time.
    pub timestamp: u64,
    /// Number of non-empty participants.
    #[serde(rename = "totalEntries")]
    pub total_entries: usize,
    #[serde(rename = "totalWeight", with = "biguint_dec")]
    pub total_weight: BigUint,
    pub participants: Vec<CensusParticipant>,
}

/// Census membership proof.
///
/// `index` carries the packed path bits of the underlying tree proof (LSB
/// first, one bit per sibling), not the participant's leaf position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CensusProof {
    #[serde(with = "biguint_dec")]
    pub root: BigUint,
    pub index: u64,
    pub address: Address,
    #[serde(with = "biguint_dec")]
    pub weight: BigUint,
    #[serde(with = "biguint_dec_vec")]
    pub siblings: Vec<BigUint>,
}

impl CensusProof {
    /// Verify the proof against its embedded root by re-packing the leaf
    /// from the claimed address and weight. Pure; touches no census state.
    pub fn verify(&self, hash: &Hasher<BigUint>) -> Result<bool, CensusError> {
        let leaf = pack_address_weight(&self.address, &self.weight)?;
        let proof = MerkleProof {
            root: self.root.clone(),
            leaf,
            index: self.index,
            siblings: self.siblings.clone(),
        };
        Ok(verify_proof_with(
            &proof,
            |a: &BigUint, b: &BigUint| hash(a, b),
            |a: &BigUint, b: &BigUint| a == b,
        ))
    }
}

/// Decimal-string serde for `BigUint` fields.
mod biguint_dec {
    use std::fmt;

    use num_bigint::BigUint;
    use serde::{de, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigUint, D::Error> {
        struct DecVisitor;

        impl de::Visitor<'_> for DecVisitor {
            type Value = BigUint;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a decimal string or a non-negative integer")
            }

            fn visit_str<E: de::Error>(self, s: &str) -> Result<BigUint, E> {
                s.parse()
                    .map_err(|_| E::custom(format!("invalid decimal integer: {s:?}")))
            }

            fn visit_u64<E: de::Error>(self, n: u64) -> Result<BigUint, E> {
                Ok(BigUint::from(n))
            }

            fn visit_i64<E: de::Error>(self, n: i64) -> Result<BigUint, E> {
                u64::try_from(n)
                    .map(BigUint::from)
                    .map_err(|_| E::custom("negative integer"))
            }
        }

        deserializer.deserialize_any(DecVisitor)
    }
}

/// Decimal-string serde for `Vec<BigUint>` fields.
mod biguint_dec_vec {
    use num_bigint::BigUint;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        values: &[BigUint],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(values.iter().map(|v| v.to_string()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<BigUint>, D::Error> {
        let raw = Vec::<String>::deserialize(deserializer)?;
        raw.into_iter()
            .map(|s| {
                s.parse()
                    .map_err(|_| D::Error::custom(format!("invalid decimal integer: {s:?}")))
            })
            .collect()
    }
}
