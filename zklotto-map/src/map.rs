//! The authenticated sparse map (ASM).
//!
//! A fixed-depth (20) key→value store over the bn256 scalar field. The root
//! commits to every entry; membership and update witnesses let a verifier
//! recompute the root for an asserted leaf value and recover the leaf's key
//! from the sibling path without trusting the caller.
//!
//! The leaf index is the key's big-endian bit decomposition, reversed for
//! circuit-friendliness: the direction bit at level `l` is bit `l` of the
//! key, so a witness recovers the numeric key from its direction bits.

use std::collections::HashMap;

use halo2curves_axiom::bn256::Fr;
use once_cell::sync::Lazy;
use thiserror::Error;

use crate::hash_pair;

/// Depth of every map in the system. Keyspace is `2^20` slots.
pub const MAP_DEPTH: usize = 20;

/// Precomputed roots of fully-empty subtrees, leaf level first.
static EMPTY_SUBTREES: Lazy<[Fr; MAP_DEPTH + 1]> = Lazy::new(|| {
    let mut nodes = [Fr::zero(); MAP_DEPTH + 1];
    for level in 1..=MAP_DEPTH {
        nodes[level] = hash_pair(nodes[level - 1], nodes[level - 1]);
    }
    nodes
});

/// Root of a map with no entries.
pub fn empty_map_root() -> Fr {
    EMPTY_SUBTREES[MAP_DEPTH]
}

/// The designated "empty" leaf value.
pub fn empty_leaf() -> Fr {
    Fr::zero()
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MerkleMapError {
    #[error("key {0} exceeds the 2^20 keyspace of the map")]
    KeyOutOfRange(u64),

    /// Slot 0 is reserved; checked witnesses refuse it so that an absent
    /// entry can never alias a live one.
    #[error("map slot 0 is reserved")]
    ReservedSlot,

    /// The most-significant direction bit must stay clear so that keys stay
    /// unique under field-modulus wraparound near the field boundary.
    #[error("most-significant path bit is set")]
    PathOutOfRange,
}

/// Sparse Merkle map of depth 20 with Poseidon node hashing.
///
/// Only touched nodes are stored; untouched subtrees fall back to the
/// precomputed empty roots, so maps stay small however large the keyspace.
#[derive(Clone, Debug)]
pub struct SparseMerkleMap {
    /// `nodes[level]` maps a position at that level to its hash.
    /// Level 0 holds the leaves, level `MAP_DEPTH` holds the root.
    nodes: Vec<HashMap<u64, Fr>>,
}

impl Default for SparseMerkleMap {
    fn default() -> Self {
        Self::new()
    }
}

impl SparseMerkleMap {
    pub fn new() -> Self {
        Self {
            nodes: vec![HashMap::new(); MAP_DEPTH + 1],
        }
    }

    fn node(&self, level: usize, pos: u64) -> Fr {
        self.nodes[level]
            .get(&pos)
            .copied()
            .unwrap_or(EMPTY_SUBTREES[level])
    }

    /// Current root commitment.
    pub fn root(&self) -> Fr {
        self.node(MAP_DEPTH, 0)
    }

    /// Current leaf value for `key`, or the empty value.
    pub fn get(&self, key: u64) -> Result<Fr, MerkleMapError> {
        check_key(key)?;
        Ok(self.node(0, key))
    }

    /// Write `value` at `key` and rehash the sibling path up to the root.
    pub fn set(&mut self, key: u64, value: Fr) -> Result<(), MerkleMapError> {
        check_key(key)?;
        self.nodes[0].insert(key, value);
        let mut pos = key;
        for level in 0..MAP_DEPTH {
            let parent = pos >> 1;
            let left = self.node(level, parent << 1);
            let right = self.node(level, (parent << 1) | 1);
            self.nodes[level + 1].insert(parent, hash_pair(left, right));
            pos = parent;
        }
        Ok(())
    }

    /// Witness for the leaf at `key` against the current root.
    pub fn witness(&self, key: u64) -> Result<MapWitness, MerkleMapError> {
        check_key(key)?;
        let mut siblings = [Fr::zero(); MAP_DEPTH];
        let mut path_bits = [false; MAP_DEPTH];
        let mut pos = key;
        for level in 0..MAP_DEPTH {
            siblings[level] = self.node(level, pos ^ 1);
            path_bits[level] = pos & 1 == 1;
            pos >>= 1;
        }
        Ok(MapWitness {
            siblings,
            path_bits,
        })
    }

    /// The V2 witness shape: refuses the reserved slot 0 and any key with
    /// the most-significant path bit set.
    pub fn witness_checked(&self, key: u64) -> Result<CheckedWitness, MerkleMapError> {
        CheckedWitness::new(self.witness(key)?)
    }
}

fn check_key(key: u64) -> Result<(), MerkleMapError> {
    if key >= 1 << MAP_DEPTH {
        return Err(MerkleMapError::KeyOutOfRange(key));
    }
    Ok(())
}

/// A witness recomputes `(root, key)` for an asserted leaf value.
///
/// Both concrete witness shapes implement this; consumers take
/// `&dyn RootAndKey` instead of branching on the shape.
pub trait RootAndKey {
    fn compute_root_and_key(&self, value: Fr) -> Result<(Fr, u64), MerkleMapError>;
}

/// Sibling path plus direction bits, leaf level first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MapWitness {
    pub siblings: [Fr; MAP_DEPTH],
    pub path_bits: [bool; MAP_DEPTH],
}

impl MapWitness {
    /// Key recovered from the direction bits alone.
    pub fn recovered_key(&self) -> u64 {
        let mut key = 0u64;
        for (level, bit) in self.path_bits.iter().enumerate() {
            if *bit {
                key |= 1 << level;
            }
        }
        key
    }

    fn fold(&self, value: Fr) -> (Fr, u64) {
        let mut acc = value;
        for (sibling, bit) in self.siblings.iter().zip(self.path_bits.iter()) {
            acc = if *bit {
                hash_pair(*sibling, acc)
            } else {
                hash_pair(acc, *sibling)
            };
        }
        (acc, self.recovered_key())
    }
}

impl RootAndKey for MapWitness {
    fn compute_root_and_key(&self, value: Fr) -> Result<(Fr, u64), MerkleMapError> {
        Ok(self.fold(value))
    }
}

/// V2 witness: a [`MapWitness`] whose most-significant path bit is asserted
/// clear and whose slot is not the reserved slot 0. The assertion is applied
/// at construction and again on every fold, mirroring what the verifying
/// program constrains.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckedWitness(MapWitness);

impl CheckedWitness {
    pub fn new(inner: MapWitness) -> Result<Self, MerkleMapError> {
        if inner.path_bits[MAP_DEPTH - 1] {
            return Err(MerkleMapError::PathOutOfRange);
        }
        if inner.recovered_key() == 0 {
            return Err(MerkleMapError::ReservedSlot);
        }
        Ok(Self(inner))
    }

    pub fn inner(&self) -> &MapWitness {
        &self.0
    }
}

impl RootAndKey for CheckedWitness {
    fn compute_root_and_key(&self, value: Fr) -> Result<(Fr, u64), MerkleMapError> {
        if self.0.path_bits[MAP_DEPTH - 1] {
            return Err(MerkleMapError::PathOutOfRange);
        }
        Ok(self.0.fold(value))
    }
}
