//! Address/weight leaf packing.
//!
//! A census leaf is the single integer `address * 2^88 + weight`: 160
//! address bits above 88 weight bits, 248 bits total, which fits a
//! BN254-sized scalar field with headroom.

use alloy_primitives::Address;
use num_bigint::BigUint;
use num_traits::One;

use crate::error::CensusError;

/// Number of low bits holding the weight in a packed leaf.
pub const WEIGHT_BITS: u64 = 88;

/// Pack an address and a weight into a single tree leaf.
///
/// Fails with [`CensusError::WeightOverflow`] when the weight does not fit
/// in 88 bits; the address is 160-bit by construction.
pub fn pack_address_weight(address: &Address, weight: &BigUint) -> Result<BigUint, CensusError> {
    if weight.bits() > WEIGHT_BITS {
        return Err(CensusError::WeightOverflow);
    }
    let packed = BigUint::from_bytes_be(address.as_slice()) << WEIGHT_BITS;
    Ok(packed | weight.clone())
}

/// Split a packed leaf back into its address and weight.
///
/// Bits above the 248-bit layout are ignored.
pub fn unpack_address_weight(packed: &BigUint) -> (Address, BigUint) {
    let weight_mask = (BigUint::one() << WEIGHT_BITS) - 1u32;
    let weight = packed & &weight_mask;

    let addr_bits = packed >> WEIGHT_BITS;
    let bytes = addr_bits.to_bytes_be();
    let mut buf = [0u8; 20];
    if bytes.len() >= 20 {
        buf.copy_from_slice(&bytes[bytes.len() - 20..]);
    } else {
        buf[20 - bytes.len()..].copy_from_slice(&bytes);
    }
    (Address::from(buf), weight)
}

#[cfg(test)]
mod tests {
    use alloy_primitives::address;
    use num_traits::Zero;

    use super::*;

    #[test]
    fn pack_unpack_round_trip() {
        let cases = [
            (Address::ZERO, BigUint::zero()),
            (Address::ZERO, BigUint::from(1u32)),
            (
                address!("0000000000000000000000000000000000000001"),
                BigUint::from(100u32),
            ),
            (
                address!("ffffffffffffffffffffffffffffffffffffffff"),
                (BigUint::one() << 88) - 1u32,
            ),
        ];
        for (addr, weight) in cases {
            let packed = pack_address_weight(&addr, &weight).expect("pack");
            let (got_addr, got_weight) = unpack_address_weight(&packed);
            assert_eq!(got_addr, addr);
            assert_eq!(got_weight, weight);
        }
    }

    #[test]
    fn packed_layout_shifts_address_above_weight() {
        let addr = address!("0000000000000000000000000000000000000002");
        let weight = BigUint::from(3u32);
        let packed = pack_address_weight(&addr, &weight).expect("pack");
        assert_eq!(packed, (BigUint::from(2u32) << 88) | BigUint::from(3u32));
    }

    #[test]
    fn weight_must_fit_88_bits() {
        let addr = Address::ZERO;
        let too_big = BigUint::one() << 88;
        assert!(matches!(
            pack_address_weight(&addr, &too_big),
            Err(CensusError::WeightOverflow)
        ));
        let max = (BigUint::one() << 88) - 1u32;
        assert!(pack_address_weight(&addr, &max).is_ok());
    }
}
