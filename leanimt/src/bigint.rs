//! Hashers, equality and leaf codec for `BigUint` elements.
//!
//! Big unsigned integers are the canonical element type for ZK-oriented
//! trees (leaves are scalar-field elements). The codec uses big-endian
//! magnitude bytes, with zero explicitly encoded as the single byte `0x00`
//! so it stays distinguishable from an empty byte string.

use std::sync::Arc;

use num_bigint::BigUint;
use num_traits::Zero;
use sha2::{Digest, Sha256};

use crate::tree::{Decoder, Encoder, Equal, Hasher};

/// Deterministic, non-cryptographic hash combining the inputs with two
/// primes: `1315423911 * a + 2654435761 * b`. Cheap and stable across
/// implementations, intended for tests and tooling.
pub fn simple_hasher() -> Hasher<BigUint> {
    Arc::new(|a: &BigUint, b: &BigUint| a * 1315423911u64 + b * 2654435761u64)
}

/// SHA-256 over the concatenated big-endian magnitudes, reinterpreted as a
/// big unsigned integer.
pub fn sha256_hasher() -> Hasher<BigUint> {
    Arc::new(|a: &BigUint, b: &BigUint| {
        let mut hasher = Sha256::new();
        hasher.update(a.to_bytes_be());
        hasher.update(b.to_bytes_be());
        BigUint::from_bytes_be(&hasher.finalize())
    })
}

/// BLAKE3 over the concatenated big-endian magnitudes, reinterpreted as a
/// big unsigned integer.
pub fn blake3_hasher() -> Hasher<BigUint> {
    Arc::new(|a: &BigUint, b: &BigUint| {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&a.to_bytes_be());
        hasher.update(&b.to_bytes_be());
        BigUint::from_bytes_be(hasher.finalize().as_bytes())
    })
}

/// Value equality for `BigUint` elements.
pub fn biguint_eq() -> Equal<BigUint> {
    Arc::new(|a: &BigUint, b: &BigUint| a == b)
}

/// Big-endian leaf encoder; zero encodes as the single byte `0x00`.
pub fn biguint_encoder() -> Encoder<BigUint> {
    Arc::new(|n: &BigUint| {
        if n.is_zero() {
            return Ok(vec![0]);
        }
        Ok(n.to_bytes_be())
    })
}

/// Big-endian leaf decoder; both `0x00` and the empty string decode to
/// zero.
pub fn biguint_decoder() -> Decoder<BigUint> {
    Arc::new(|bytes: &[u8]| Ok(BigUint::from_bytes_be(bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_hasher_matches_reference_values() {
        let hash = simple_hasher();
        let a = BigUint::from(2u32);
        let b = BigUint::from(3u32);
        // 1315423911 * 2 + 2654435761 * 3
        assert_eq!(hash(&a, &b), BigUint::from(10594155105u64));
        assert_eq!(
            hash(&BigUint::zero(), &BigUint::from(1u32)),
            BigUint::from(2654435761u64)
        );
    }

    #[test]
    fn codec_round_trips_zero_and_values() {
        let encode = biguint_encoder();
        let decode = biguint_decoder();

        let zero = BigUint::zero();
        let encoded = encode(&zero).expect("encode zero");
        assert_eq!(encoded, vec![0]);
        assert_eq!(decode(&encoded).expect("decode zero"), zero);

        let value = BigUint::parse_bytes(b"340282366920938463463374607431768211456", 10)
            .expect("parse value");
        let encoded = encode(&value).expect("encode value");
        assert_eq!(decode(&encoded).expect("decode value"), value);
    }

    #[test]
    fn decoder_accepts_empty_bytes_as_zero() {
        let decode = biguint_decoder();
        assert_eq!(decode(&[]).expect("decode empty"), BigUint::zero());
    }

    #[test]
    fn crypto_hashers_are_deterministic_and_distinct() {
        let a = BigUint::from(7u32);
        let b = BigUint::from(11u32);

        let sha = sha256_hasher();
        let blake = blake3_hasher();
        assert_eq!(sha(&a, &b), sha(&a, &b));
        assert_eq!(blake(&a, &b), blake(&a, &b));
        assert_ne!(sha(&a, &b), sha(&b, &a));
        assert_ne!(sha(&a, &b), blake(&a, &b));
    }
}
