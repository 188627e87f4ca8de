//! Purchase actions and the action-log commitment scheme.
//!
//! The external ledger exposes dispatched purchases as ordered lists, each
//! list being one dispatch call's contents, and commits the log with a
//! running checkpoint hash. The engine replicates the same chaining so its
//! folds land on byte-identical checkpoints.

use halo2curves_axiom::bn256::Fr;
use serde::{Deserialize, Serialize};
use zklotto_map::{hash_pair, poseidon_hash};

use crate::ticket::Ticket;

/// A dispatched purchase: the ticket and the round it was bought for.
/// Ordering is defined solely by the log, never by wall-clock time; each
/// action is consumed exactly once by the reduction engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub ticket: Ticket,
    pub round: u64,
}

impl Action {
    pub fn hash(&self) -> Fr {
        poseidon_hash(&[self.ticket.hash(), Fr::from(self.round)])
    }
}

/// One dispatch call's contents.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionList(pub Vec<Action>);

impl ActionList {
    pub fn new(actions: Vec<Action>) -> Self {
        Self(actions)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Action> {
        self.0.iter()
    }

    /// Commitment to the list: a left fold of action hashes from the empty
    /// accumulator. The reduction engine rebuilds exactly this value as its
    /// `processed_action_list` while replaying.
    pub fn commitment(&self) -> Fr {
        self.0
            .iter()
            .fold(Fr::zero(), |acc, action| hash_pair(acc, action.hash()))
    }
}

/// Running checkpoint over the whole log: one `hash(state, list)` link per
/// dispatched list. This is the value the verifying program stores and the
/// reduction proof's `initial_state`/`final_state` refer to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionState(#[serde(with = "zklotto_map::serde_fr_bytes")] pub Fr);

impl ActionState {
    /// Checkpoint of an empty log.
    pub fn genesis() -> Self {
        Self(Fr::zero())
    }

    /// Fold one list boundary into the checkpoint.
    pub fn push_list(&self, list_commitment: Fr) -> Self {
        Self(hash_pair(self.0, list_commitment))
    }

    pub fn as_fr(&self) -> Fr {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_action(round: u64, first_number: u8) -> Action {
        let mut numbers = [1u8; 6];
        numbers[0] = first_number;
        Action {
            ticket: Ticket::from_numbers(&numbers, Fr::from(5u64), 1).unwrap(),
            round,
        }
    }

    #[test]
    fn empty_list_commits_to_zero() {
        assert_eq!(ActionList::default().commitment(), Fr::zero());
    }

    #[test]
    fn list_commitment_is_order_sensitive() {
        let a = sample_action(0, 1);
        let b = sample_action(0, 2);
        let forward = ActionList::new(vec![a.clone(), b.clone()]).commitment();
        let backward = ActionList::new(vec![b, a]).commitment();
        assert_ne!(forward, backward);
    }

    #[test]
    fn checkpoint_chains_list_boundaries() {
        let list_a = ActionList::new(vec![sample_action(0, 1)]);
        let list_b = ActionList::new(vec![sample_action(0, 2)]);

        let state = ActionState::genesis()
            .push_list(list_a.commitment())
            .push_list(list_b.commitment());

        // Same actions in a single list cut once: different checkpoint.
        let merged = ActionList::new(vec![sample_action(0, 1), sample_action(0, 2)]);
        let single = ActionState::genesis().push_list(merged.commitment());
        assert_ne!(state, single);
    }

    #[test]
    fn action_hash_binds_round() {
        let a = sample_action(0, 1);
        let b = sample_action(1, 1);
        assert_ne!(a.hash(), b.hash());
    }
}
