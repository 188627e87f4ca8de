//! zklotto-map
//!
//! Shared cryptographic substrate for the zklotto engine: bn256 field
//! helpers, the native Poseidon hash used for every commitment in the
//! system, and the depth-20 authenticated sparse map whose roots are the
//! only state the verifying program ever persists.

pub mod map;

use halo2curves_axiom::bn256::Fr;
use halo2curves_axiom::ff::{Field, PrimeField};
use poseidon_primitives::poseidon::primitives::{ConstantLength, Hash as PoseidonHash, Spec};
use thiserror::Error;

pub use map::{
    empty_leaf, empty_map_root, CheckedWitness, MapWitness, MerkleMapError, RootAndKey,
    SparseMerkleMap, MAP_DEPTH,
};

const POSEIDON_T: usize = 6;
const POSEIDON_RATE: usize = 5;
const POSEIDON_FULL_ROUNDS: usize = 8;
const POSEIDON_PARTIAL_ROUNDS: usize = 57;

/// Errors from byte-level field decoding.
#[derive(Debug, Error)]
pub enum FieldError {
    #[error("invalid bn256 scalar encoding")]
    InvalidEncoding,
}

/// Poseidon hash over a fixed number of field elements.
///
/// Same spec as the on-chain hasher: T = 6, RATE = 5, 8 full and 57 partial
/// rounds, x^5 sbox. Every commitment in the system (ticket hashes, map
/// nodes, the action-state chain) goes through this function.
pub fn poseidon_hash<const L: usize>(values: &[Fr; L]) -> Fr {
    PoseidonHash::<Fr, ZkPoseidonSpec, ConstantLength<L>, POSEIDON_T, POSEIDON_RATE>::init()
        .hash(*values)
}

/// Two-ary Poseidon, the Merkle node hash and list-chaining primitive.
pub fn hash_pair(left: Fr, right: Fr) -> Fr {
    poseidon_hash(&[left, right])
}

pub fn fr_to_bytes(fr: &Fr) -> [u8; 32] {
    let repr = fr.to_repr();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(repr.as_ref());
    bytes
}

pub fn fr_from_bytes(bytes: &[u8; 32]) -> Result<Fr, FieldError> {
    Fr::from_repr(*bytes)
        .into_option()
        .ok_or(FieldError::InvalidEncoding)
}

/// Reduce arbitrary big-endian bytes into the field, base-256 Horner style.
pub fn reduce_be_bytes_to_fr(bytes: &[u8; 32]) -> Fr {
    let mut acc = Fr::zero();
    let base = Fr::from(256);
    for byte in bytes.iter() {
        acc = acc * base + Fr::from(*byte as u64);
    }
    acc
}

#[derive(Debug)]
struct ZkPoseidonSpec;

impl Spec<Fr, POSEIDON_T, POSEIDON_RATE> for ZkPoseidonSpec {
    fn full_rounds() -> usize {
        POSEIDON_FULL_ROUNDS
    }

    fn partial_rounds() -> usize {
        POSEIDON_PARTIAL_ROUNDS
    }

    fn sbox(val: Fr) -> Fr {
        val.pow_vartime([5])
    }

    fn secure_mds() -> usize {
        0
    }
}

/// Serde module for Fr as a 32-byte hex string (little-endian, matching
/// halo2's `to_repr`). Use via `#[serde(with = "zklotto_map::serde_fr_bytes")]`.
pub mod serde_fr_bytes {
    use super::{fr_to_bytes, Fr};
    use halo2curves_axiom::ff::PrimeField;
    use serde::{de, Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S>(fr: &Fr, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let hex_str = format!("0x{}", hex::encode(fr_to_bytes(fr)));
        serializer.serialize_str(&hex_str)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fr, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct FrVisitor;

        impl de::Visitor<'_> for FrVisitor {
            type Value = Fr;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a 32-byte hex string (with or without 0x prefix)")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                let hex_str = v.strip_prefix("0x").unwrap_or(v);
                if hex_str.len() != 64 {
                    return Err(E::custom(format!(
                        "expected 64 hex chars, got {}",
                        hex_str.len()
                    )));
                }
                let mut bytes = [0u8; 32];
                hex::decode_to_slice(hex_str, &mut bytes).map_err(E::custom)?;
                Fr::from_repr(bytes)
                    .into_option()
                    .ok_or_else(|| E::custom("invalid field element encoding"))
            }
        }

        deserializer.deserialize_str(FrVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[test]
    fn map_helpers_are_reachable_from_the_crate_root() {
        assert_eq!(crate::empty_leaf(), Fr::zero());
        assert_ne!(crate::empty_map_root(), crate::empty_leaf());
    }

    #[test]
    fn poseidon_is_deterministic() {
        let a = poseidon_hash(&[Fr::from(1u64), Fr::from(2u64)]);
        let b = poseidon_hash(&[Fr::from(1u64), Fr::from(2u64)]);
        assert_eq!(a, b);
    }

    #[test]
    fn poseidon_is_position_sensitive() {
        let a = hash_pair(Fr::from(1u64), Fr::from(2u64));
        let b = hash_pair(Fr::from(2u64), Fr::from(1u64));
        assert_ne!(a, b);
    }

    #[test]
    fn fr_bytes_round_trip() {
        let value = Fr::from(2024u64);
        let bytes = fr_to_bytes(&value);
        let reconstructed = fr_from_bytes(&bytes).unwrap();
        assert_eq!(value, reconstructed);
    }

    #[test]
    fn fr_from_bytes_rejects_non_canonical() {
        // The all-ones pattern exceeds the bn256 scalar modulus.
        assert!(fr_from_bytes(&[0xff; 32]).is_err());
    }

    #[derive(Serialize, Deserialize)]
    struct Wrapper {
        #[serde(with = "crate::serde_fr_bytes")]
        value: Fr,
    }

    #[test]
    fn serde_fr_round_trip() {
        let wrapper = Wrapper {
            value: Fr::from(123456789u64),
        };
        let json = serde_json::to_string(&wrapper).unwrap();
        let recovered: Wrapper = serde_json::from_str(&json).unwrap();
        assert_eq!(wrapper.value, recovered.value);
    }
}
