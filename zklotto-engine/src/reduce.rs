//! The batch-reduction protocol.
//!
//! Folds a batch of pending action lists into new ticket/bank roots while
//! producing a proof that the fold was complete, in-order and
//! collision-free relative to a stated action-log checkpoint.
//!
//! The fold is modeled as an explicit `Result` chain: every step consumes
//! the engine's current public output and either advances it or fails with
//! a typed error. `initial_*` roots never change across a fold; only the
//! `new_*` roots roll forward, so the final proof is checked against
//! on-chain state with two equality assertions no matter how many actions
//! were folded.
//!
//! The emergency path reuses this engine unchanged: finalizing roots needs
//! no winning combination, so a round whose randomness never arrived is
//! reduced exactly like any other and then gated to refunds only by the
//! round manager.

use halo2curves_axiom::bn256::Fr;
use serde::{Deserialize, Serialize};
use zklotto_map::{empty_leaf, empty_map_root, hash_pair, poseidon_hash, RootAndKey};

use crate::action::{Action, ActionState};
use crate::backend::ProofBackend;
use crate::config::LotteryConfig;
use crate::error::EngineError;
use crate::{bank_map_key, ticket_map_key};

/// Sequencing cursor: the round being folded and the next expected ticket
/// slot within it. The genesis cursor is `(0, 0)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReduceCursor {
    pub round: u64,
    pub next_ticket_id: u64,
}

impl ReduceCursor {
    pub fn genesis() -> Self {
        Self::default()
    }
}

/// Public output of a reduction proof: the transition it attests to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReduceOutput {
    /// Action-log checkpoint the fold started from.
    pub initial_state: ActionState,
    /// Checkpoint reached by cutting every folded list.
    pub final_state: ActionState,
    /// Ticket root before the fold began. Fixed for the whole fold.
    #[serde(with = "zklotto_map::serde_fr_bytes")]
    pub initial_ticket_root: Fr,
    /// Bank root before the fold began. Fixed for the whole fold.
    #[serde(with = "zklotto_map::serde_fr_bytes")]
    pub initial_bank_root: Fr,
    /// Cursor round the fold started from. Fixed for the whole fold; a
    /// consumer must check it against its own stored cursor, otherwise a
    /// fold seeded past the true cursor could skip slots for good.
    pub initial_round: u64,
    /// Next expected ticket slot at the start of the fold.
    pub initial_ticket_id: u64,
    /// Rolling ticket root.
    #[serde(with = "zklotto_map::serde_fr_bytes")]
    pub new_ticket_root: Fr,
    /// Rolling bank root.
    #[serde(with = "zklotto_map::serde_fr_bytes")]
    pub new_bank_root: Fr,
    /// Running hash of actions folded since the last cut. Must be empty in
    /// any output a consumer accepts.
    #[serde(with = "zklotto_map::serde_fr_bytes")]
    pub processed_action_list: Fr,
    /// Round of the last folded action.
    pub last_processed_round: u64,
    /// Next expected ticket slot within that round.
    pub last_processed_ticket_id: u64,
}

impl ReduceOutput {
    /// Cursor the fold started from.
    pub fn initial_cursor(&self) -> ReduceCursor {
        ReduceCursor {
            round: self.initial_round,
            next_ticket_id: self.initial_ticket_id,
        }
    }

    /// Cursor to resume a later fold from.
    pub fn cursor(&self) -> ReduceCursor {
        ReduceCursor {
            round: self.last_processed_round,
            next_ticket_id: self.last_processed_ticket_id,
        }
    }

    /// Field commitment over the whole output, bound into proof transcripts.
    pub fn commitment(&self) -> Fr {
        poseidon_hash(&[
            self.initial_state.as_fr(),
            self.final_state.as_fr(),
            self.initial_ticket_root,
            self.initial_bank_root,
            Fr::from(self.initial_round),
            Fr::from(self.initial_ticket_id),
            self.new_ticket_root,
            self.new_bank_root,
            self.processed_action_list,
            Fr::from(self.last_processed_round),
            Fr::from(self.last_processed_ticket_id),
        ])
    }
}

/// A reduction proof: public output plus the opaque proof bytes produced by
/// the configured backend. Produced once, verified, optionally composed
/// into the next fold; never mutated.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReduceProof {
    pub output: ReduceOutput,
    pub proof: Vec<u8>,
}

/// Replays the action log against witness-backed ticket/bank state.
#[derive(Debug)]
pub struct ReduceEngine {
    config: LotteryConfig,
    output: ReduceOutput,
}

impl ReduceEngine {
    /// Seed the fold with the externally supplied checkpoint, the current
    /// on-chain roots and the caller-declared starting cursor.
    pub fn init(
        config: &LotteryConfig,
        checkpoint: ActionState,
        ticket_root: Fr,
        bank_root: Fr,
        cursor: ReduceCursor,
    ) -> Self {
        Self {
            config: config.clone(),
            output: ReduceOutput {
                initial_state: checkpoint,
                final_state: checkpoint,
                initial_ticket_root: ticket_root,
                initial_bank_root: bank_root,
                initial_round: cursor.round,
                initial_ticket_id: cursor.next_ticket_id,
                new_ticket_root: ticket_root,
                new_bank_root: bank_root,
                processed_action_list: Fr::zero(),
                last_processed_round: cursor.round,
                last_processed_ticket_id: cursor.next_ticket_id,
            },
        }
    }

    pub fn output(&self) -> &ReduceOutput {
        &self.output
    }

    /// Fold one action, strictly following log order.
    ///
    /// The expected slot is 0 when the action opens a fresh round (the
    /// per-round ticket map starts empty) and the cursor's next slot
    /// otherwise; a witness opening any other slot fails the fold. The
    /// supplied witnesses must be consistent with the rolling roots, and
    /// `bank_value` is the bank leaf the bank witness currently opens to.
    pub fn add_ticket(
        &mut self,
        action: &Action,
        ticket_witness: &dyn RootAndKey,
        bank_witness: &dyn RootAndKey,
        bank_value: u64,
    ) -> Result<(), EngineError> {
        if !action.ticket.check() {
            return Err(EngineError::InvalidTicketShape(
                "ticket number out of range".into(),
            ));
        }

        let out = &self.output;
        let fresh_round = action.round > out.last_processed_round;
        if action.round < out.last_processed_round {
            return Err(EngineError::OutOfOrderAction(format!(
                "round regressed from {} to {}",
                out.last_processed_round, action.round
            )));
        }
        let expected = if fresh_round {
            0
        } else {
            out.last_processed_ticket_id
        };
        let rolling_ticket_root = if fresh_round {
            empty_map_root()
        } else {
            out.new_ticket_root
        };

        let (slot_root, slot_key) = ticket_witness.compute_root_and_key(empty_leaf())?;
        if slot_root != rolling_ticket_root {
            return Err(EngineError::WitnessMismatch(
                "ticket slot witness does not match the rolling ticket root".into(),
            ));
        }
        if slot_key != ticket_map_key(expected) {
            return Err(EngineError::OutOfOrderAction(format!(
                "expected ticket slot {expected} in round {}, witness opens map key {slot_key}",
                action.round
            )));
        }
        let (ticket_root_next, _) = ticket_witness.compute_root_and_key(action.ticket.hash())?;

        let (bank_root, bank_key) = bank_witness.compute_root_and_key(Fr::from(bank_value))?;
        if bank_root != out.new_bank_root {
            return Err(EngineError::WitnessMismatch(
                "bank witness does not match the rolling bank root".into(),
            ));
        }
        if bank_key != bank_map_key(action.round) {
            return Err(EngineError::WitnessMismatch(format!(
                "bank witness opens map key {bank_key}, expected round {}",
                action.round
            )));
        }
        let purchase = self
            .config
            .ticket_price
            .checked_mul(action.ticket.amount)
            .ok_or(EngineError::AmountOverflow)?;
        let bank_value_next = bank_value
            .checked_add(purchase)
            .ok_or(EngineError::AmountOverflow)?;
        let (bank_root_next, _) = bank_witness.compute_root_and_key(Fr::from(bank_value_next))?;

        let out = &mut self.output;
        out.new_ticket_root = ticket_root_next;
        out.new_bank_root = bank_root_next;
        out.processed_action_list = hash_pair(out.processed_action_list, action.hash());
        out.last_processed_round = action.round;
        out.last_processed_ticket_id = expected + 1;

        tracing::debug!(
            round = action.round,
            slot = expected,
            amount = action.ticket.amount,
            "folded purchase action"
        );
        Ok(())
    }

    /// Cut a list boundary: fold the completed `processed_action_list` into
    /// `final_state` exactly the way the ledger commits list boundaries,
    /// and reset the accumulator.
    pub fn cut_actions(&mut self) {
        let out = &mut self.output;
        out.final_state = out.final_state.push_list(out.processed_action_list);
        out.processed_action_list = Fr::zero();
    }

    /// Close the fold. Rejects an unfinished batch (uncut actions) and
    /// hands the output to the proof backend.
    pub fn finish(self, backend: &dyn ProofBackend) -> Result<ReduceProof, EngineError> {
        if self.output.processed_action_list != Fr::zero() {
            return Err(EngineError::IncompleteBatch);
        }
        let proof = backend.prove_reduce(&self.output)?;
        tracing::info!(
            final_round = self.output.last_processed_round,
            "reduction fold complete"
        );
        Ok(ReduceProof {
            output: self.output,
            proof,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionList;
    use crate::backend::NoopBackend;
    use crate::ticket::Ticket;
    use zklotto_map::SparseMerkleMap;

    fn sample_action(round: u64, first_number: u8, amount: u64) -> Action {
        let mut numbers = [1u8; 6];
        numbers[0] = first_number;
        Action {
            ticket: Ticket::from_numbers(&numbers, Fr::from(first_number as u64), amount).unwrap(),
            round,
        }
    }

    /// Drives the engine the way the round manager does: mirror maps are
    /// mutated in lockstep so each witness matches the rolling roots.
    struct Harness {
        config: LotteryConfig,
        engine: ReduceEngine,
        tickets: SparseMerkleMap,
        bank: SparseMerkleMap,
        cursor_round: u64,
    }

    impl Harness {
        fn new() -> Self {
            let config = LotteryConfig::default();
            let tickets = SparseMerkleMap::new();
            let bank = SparseMerkleMap::new();
            let engine = ReduceEngine::init(
                &config,
                ActionState::genesis(),
                tickets.root(),
                bank.root(),
                ReduceCursor::genesis(),
            );
            Self {
                config,
                engine,
                tickets,
                bank,
                cursor_round: 0,
            }
        }

        fn add(&mut self, action: &Action, slot: u64) -> Result<(), EngineError> {
            if action.round > self.cursor_round {
                self.tickets = SparseMerkleMap::new();
                self.cursor_round = action.round;
            }
            let ticket_witness = self.tickets.witness(crate::ticket_map_key(slot)).unwrap();
            let bank_key = crate::bank_map_key(action.round);
            let bank_witness = self.bank.witness(bank_key).unwrap();
            let bank_value = fr_to_u64(self.bank.get(bank_key).unwrap());

            self.engine
                .add_ticket(action, &ticket_witness, &bank_witness, bank_value)?;

            self.tickets
                .set(crate::ticket_map_key(slot), action.ticket.hash())
                .unwrap();
            let purchase = self.config.ticket_price * action.ticket.amount;
            self.bank
                .set(bank_key, Fr::from(bank_value + purchase))
                .unwrap();
            Ok(())
        }
    }

    fn fr_to_u64(value: Fr) -> u64 {
        use halo2curves_axiom::ff::PrimeField;
        let repr = value.to_repr();
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&repr.as_ref()[..8]);
        u64::from_le_bytes(buf)
    }

    #[test]
    fn fold_matches_direct_construction() {
        let mut harness = Harness::new();
        let list_a = ActionList::new(vec![sample_action(0, 1, 1), sample_action(0, 2, 3)]);
        let list_b = ActionList::new(vec![sample_action(0, 3, 2)]);

        let mut slot = 0;
        for action in list_a.iter() {
            harness.add(action, slot).unwrap();
            slot += 1;
        }
        harness.engine.cut_actions();
        for action in list_b.iter() {
            harness.add(action, slot).unwrap();
            slot += 1;
        }
        harness.engine.cut_actions();

        let expected_state = ActionState::genesis()
            .push_list(list_a.commitment())
            .push_list(list_b.commitment());

        let proof = harness.engine.finish(&NoopBackend).unwrap();
        assert_eq!(proof.output.final_state, expected_state);
        // Direct construction from scratch yields the same roots.
        assert_eq!(proof.output.new_ticket_root, harness.tickets.root());
        assert_eq!(proof.output.new_bank_root, harness.bank.root());
        assert_eq!(proof.output.last_processed_ticket_id, 3);
    }

    #[test]
    fn initial_roots_stay_fixed_across_the_fold() {
        let mut harness = Harness::new();
        let initial_ticket_root = harness.tickets.root();
        let initial_bank_root = harness.bank.root();

        harness.add(&sample_action(0, 1, 1), 0).unwrap();
        harness.add(&sample_action(0, 2, 1), 1).unwrap();
        harness.engine.cut_actions();

        let out = harness.engine.output();
        assert_eq!(out.initial_ticket_root, initial_ticket_root);
        assert_eq!(out.initial_bank_root, initial_bank_root);
        assert_eq!(out.initial_cursor(), ReduceCursor::genesis());
        assert_ne!(out.new_ticket_root, initial_ticket_root);
        assert_ne!(out.new_bank_root, initial_bank_root);
    }

    #[test]
    fn skipped_slot_fails_the_fold() {
        let mut harness = Harness::new();
        harness.add(&sample_action(0, 1, 1), 0).unwrap();
        // Slot 1 skipped: witness for slot 2 opens the wrong key.
        let result = harness.add(&sample_action(0, 2, 1), 2);
        assert!(matches!(result, Err(EngineError::OutOfOrderAction(_))));
    }

    #[test]
    fn repeated_slot_fails_the_fold() {
        let mut harness = Harness::new();
        harness.add(&sample_action(0, 1, 1), 0).unwrap();
        let result = harness.add(&sample_action(0, 2, 1), 0);
        assert!(matches!(result, Err(EngineError::OutOfOrderAction(_))));
    }

    #[test]
    fn round_regression_fails_the_fold() {
        let mut harness = Harness::new();
        harness.add(&sample_action(1, 1, 1), 0).unwrap();
        let result = harness.add(&sample_action(0, 2, 1), 1);
        assert!(matches!(result, Err(EngineError::OutOfOrderAction(_))));
    }

    #[test]
    fn fresh_round_restarts_slots_from_zero() {
        let mut harness = Harness::new();
        harness.add(&sample_action(0, 1, 1), 0).unwrap();
        harness.add(&sample_action(0, 2, 1), 1).unwrap();
        // Round 1 opens: slot counter resets, ticket map starts empty.
        harness.add(&sample_action(1, 3, 1), 0).unwrap();
        harness.engine.cut_actions();

        let out = harness.engine.output();
        assert_eq!(out.last_processed_round, 1);
        assert_eq!(out.last_processed_ticket_id, 1);
        assert_eq!(out.new_ticket_root, harness.tickets.root());
    }

    #[test]
    fn stale_ticket_witness_is_a_witness_mismatch() {
        let mut harness = Harness::new();
        let stale = harness.tickets.witness(crate::ticket_map_key(0)).unwrap();
        harness.add(&sample_action(0, 1, 1), 0).unwrap();

        let bank_key = crate::bank_map_key(0);
        let bank_witness = harness.bank.witness(bank_key).unwrap();
        let result = harness.engine.add_ticket(
            &sample_action(0, 2, 1),
            &stale,
            &bank_witness,
            fr_to_u64(harness.bank.get(bank_key).unwrap()),
        );
        assert!(matches!(result, Err(EngineError::WitnessMismatch(_))));
    }

    #[test]
    fn uncut_actions_are_an_incomplete_batch() {
        let mut harness = Harness::new();
        harness.add(&sample_action(0, 1, 1), 0).unwrap();
        let result = harness.engine.finish(&NoopBackend);
        assert!(matches!(result, Err(EngineError::IncompleteBatch)));
    }

    #[test]
    fn invalid_ticket_is_rejected_before_proof_work() {
        let mut harness = Harness::new();
        let mut action = sample_action(0, 1, 1);
        action.ticket.numbers[0] = 0;
        let result = harness.add(&action, 0);
        assert!(matches!(result, Err(EngineError::InvalidTicketShape(_))));
    }

    #[test]
    fn empty_fold_is_idempotent() {
        let harness = Harness::new();
        let initial_ticket_root = harness.tickets.root();
        let initial_bank_root = harness.bank.root();
        let proof = harness.engine.finish(&NoopBackend).unwrap();
        assert_eq!(proof.output.new_ticket_root, initial_ticket_root);
        assert_eq!(proof.output.new_bank_root, initial_bank_root);
        assert_eq!(proof.output.final_state, proof.output.initial_state);
    }
}
