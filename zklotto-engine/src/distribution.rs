//! The score-distribution protocol.
//!
//! Given a round's finalized ticket root, walk every recorded ticket in
//! original slot order, re-commit each ticket hash at its slot into a fresh
//! authenticated map, and accumulate the total weighted score against the
//! round's winning combination. The resulting root is what a per-ticket
//! reward claim is verified against, without the verifier re-scanning the
//! round; the total is the denominator of every payout.

use halo2curves_axiom::bn256::Fr;
use serde::{Deserialize, Serialize};
use zklotto_map::{empty_leaf, empty_map_root, poseidon_hash, RootAndKey};

use crate::backend::ProofBackend;
use crate::config::LotteryConfig;
use crate::error::EngineError;
use crate::ticket::{Ticket, WinningCombination};
use crate::ticket_map_key;

/// Public output of a distribution proof.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionOutput {
    pub round: u64,
    pub winning: WinningCombination,
    /// Root of the re-committed ticket map.
    #[serde(with = "zklotto_map::serde_fr_bytes")]
    pub root: Fr,
    /// Running total of weighted scores.
    pub total: u64,
    /// Iteration cursor: the next slot to be committed.
    pub next_slot: u64,
}

impl DistributionOutput {
    /// Field commitment bound into proof transcripts.
    pub fn commitment(&self) -> Fr {
        poseidon_hash(&[
            Fr::from(self.round),
            self.winning.pack(),
            self.root,
            Fr::from(self.total),
            Fr::from(self.next_slot),
        ])
    }
}

/// A distribution proof: immutable once produced, memoized per round.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DistributionProof {
    pub output: DistributionOutput,
    pub proof: Vec<u8>,
}

/// Chained accumulation of ticket scores in strict slot order. The slot
/// index doubles as the iteration cursor; an out-of-order or skipped slot
/// desyncs the witness and fails the chain.
#[derive(Debug)]
pub struct DistributionEngine {
    output: DistributionOutput,
}

impl DistributionEngine {
    /// Seed the accumulation: empty map root, zero total, cursor at slot 0.
    pub fn init(round: u64, winning: WinningCombination) -> Self {
        Self {
            output: DistributionOutput {
                round,
                winning,
                root: empty_map_root(),
                total: 0,
                next_slot: 0,
            },
        }
    }

    pub fn output(&self) -> &DistributionOutput {
        &self.output
    }

    /// Consume the previous state: assert the witnessed slot is the cursor
    /// and currently empty in the new map, write the ticket hash there, and
    /// add the ticket's score to the running total.
    pub fn add_ticket(
        &mut self,
        ticket: &Ticket,
        witness: &dyn RootAndKey,
    ) -> Result<(), EngineError> {
        let (slot_root, slot_key) = witness.compute_root_and_key(empty_leaf())?;
        if slot_root != self.output.root {
            return Err(EngineError::WitnessMismatch(
                "distribution witness does not match the accumulated root".into(),
            ));
        }
        if slot_key != ticket_map_key(self.output.next_slot) {
            return Err(EngineError::OutOfOrderAction(format!(
                "expected distribution slot {}, witness opens map key {slot_key}",
                self.output.next_slot
            )));
        }
        let (root_next, _) = witness.compute_root_and_key(ticket.hash())?;
        let score = ticket.score(&self.output.winning)?;

        self.output.root = root_next;
        self.output.total = self
            .output
            .total
            .checked_add(score)
            .ok_or(EngineError::AmountOverflow)?;
        self.output.next_slot += 1;
        Ok(())
    }

    /// Close the accumulation and hand the output to the proof backend.
    pub fn finish(self, backend: &dyn ProofBackend) -> Result<DistributionProof, EngineError> {
        let proof = backend.prove_distribution(&self.output)?;
        tracing::info!(
            round = self.output.round,
            tickets = self.output.next_slot,
            total = self.output.total,
            "distribution accumulated"
        );
        Ok(DistributionProof {
            output: self.output,
            proof,
        })
    }
}

/// Reward for one ticket:
/// `bank * score * precision / (total * (precision + commission))`,
/// floored. The commission-adjusted denominator reserves a fixed fraction
/// of the total score for the treasury. Checked on chain bit-for-bit, so
/// the rounding here is the rounding.
pub fn reward_payout(bank: u64, score: u64, total: u64, config: &LotteryConfig) -> u64 {
    if total == 0 {
        return 0;
    }
    let numerator = bank as u128 * score as u128 * config.precision as u128;
    let denominator = total as u128 * (config.precision + config.commission) as u128;
    (numerator / denominator) as u64
}

/// Commission remitted to the treasury for a fully-claimed round: the bank
/// minus the claimable fraction `precision / (precision + commission)`.
pub fn commission_amount(bank: u64, config: &LotteryConfig) -> u64 {
    let claimable =
        bank as u128 * config.precision as u128 / (config.precision + config.commission) as u128;
    bank - claimable as u64
}
