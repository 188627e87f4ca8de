//! Per-round claim tracking.
//!
//! Each round carries a nullifier map keyed like the ticket map. A claim
//! flips the slot's leaf from empty to one; the witness taken before the
//! flip proves to a verifier both that the slot was unclaimed and which
//! slot it was.

use halo2curves_axiom::bn256::Fr;
use zklotto_map::{empty_leaf, CheckedWitness, MerkleMapError, SparseMerkleMap};

use crate::error::EngineError;
use crate::ticket_map_key;

/// One claimed-flag map per round.
#[derive(Clone, Debug, Default)]
pub struct NullifierMap {
    map: SparseMerkleMap,
}

impl NullifierMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(&self) -> Fr {
        self.map.root()
    }

    pub fn is_claimed(&self, ticket_id: u64) -> Result<bool, MerkleMapError> {
        Ok(self.map.get(ticket_map_key(ticket_id))? != empty_leaf())
    }

    /// Mark the ticket claimed. Returns the pre-update witness; folding the
    /// empty leaf through it reproduces the pre-update root and the slot,
    /// which is the unclaimed proof a reward claim carries.
    pub fn check_and_update(&mut self, ticket_id: u64) -> Result<CheckedWitness, EngineError> {
        let key = ticket_map_key(ticket_id);
        if self.map.get(key)? != empty_leaf() {
            return Err(EngineError::AlreadyClaimed(ticket_id));
        }
        let witness = self.map.witness_checked(key)?;
        self.map.set(key, Fr::one())?;
        tracing::debug!(ticket_id, "nullifier set");
        Ok(witness)
    }
}
