//! Round lifecycle orchestration.
//!
//! The round manager sits between the ledger and the fold engines. It
//! mirrors the authenticated maps the proofs talk about, drives reductions
//! with the clone-mutate-commit pattern (mirrors are cloned, mutated in
//! lockstep with the fold, and committed only after the ledger settles the
//! proof), and produces the witness bundles a claimant submits for rewards
//! and refunds.

use std::collections::{HashMap, HashSet};

use halo2curves_axiom::bn256::Fr;
use zklotto_map::{CheckedWitness, SparseMerkleMap};

use crate::action::{Action, ActionList};
use crate::backend::ProofBackend;
use crate::config::LotteryConfig;
use crate::distribution::{reward_payout, DistributionEngine, DistributionProof};
use crate::error::EngineError;
use crate::ledger::{Ledger, MapId};
use crate::nullifier::NullifierMap;
use crate::reduce::{ReduceEngine, ReduceProof};
use crate::ticket::{Ticket, WinningCombination};
use crate::{bank_map_key, ticket_map_key};

/// Where a round currently is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoundPhase {
    /// Purchases are accepted.
    Open,
    /// The round has ended but purchases are still waiting to be reduced.
    Closed,
    /// All purchases are settled; waiting for a result.
    Reduced,
    /// A result exists but the distribution proof has not been produced.
    ResultProduced,
    /// Rewards can be claimed.
    Payout,
    /// The whole bank has been paid out.
    Drained,
    /// No result arrived in time; refunds only.
    Emergency,
}

/// Everything a reward claim submits for verification.
#[derive(Clone, Debug)]
pub struct RewardWitnesses {
    pub ticket: Ticket,
    pub payout: u64,
    pub distribution: DistributionProof,
    /// Opens the ticket hash in the distribution root.
    pub ticket_witness: CheckedWitness,
    /// Opens the empty leaf in the pre-claim nullifier root.
    pub nullifier_witness: CheckedWitness,
    /// Nullifier root after this claim.
    pub nullifier_root: Fr,
}

/// Everything a refund claim submits for verification.
#[derive(Clone, Debug)]
pub struct RefundWitnesses {
    pub ticket: Ticket,
    pub refund: u64,
    /// Opens the ticket hash in the round's ticket root.
    pub ticket_witness: CheckedWitness,
    pub nullifier_witness: CheckedWitness,
    pub nullifier_root: Fr,
}

/// Mirror of one round's settled state.
#[derive(Clone, Debug, Default)]
struct RoundState {
    tickets: Vec<Ticket>,
    map: SparseMerkleMap,
    bank: u64,
    /// Bank minus everything already claimed.
    remaining: u64,
}

pub struct RoundManager<L: Ledger> {
    config: LotteryConfig,
    ledger: L,
    rounds: HashMap<u64, RoundState>,
    bank_map: SparseMerkleMap,
    results: HashMap<u64, WinningCombination>,
    distributions: HashMap<u64, DistributionProof>,
    nullifiers: HashMap<u64, NullifierMap>,
    emergency: HashSet<u64>,
}

impl<L: Ledger> RoundManager<L> {
    pub fn new(config: LotteryConfig, ledger: L) -> Self {
        Self {
            config,
            ledger,
            rounds: HashMap::new(),
            bank_map: SparseMerkleMap::new(),
            results: HashMap::new(),
            distributions: HashMap::new(),
            nullifiers: HashMap::new(),
            emergency: HashSet::new(),
        }
    }

    pub fn config(&self) -> &LotteryConfig {
        &self.config
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Dispatch a purchase for the round currently open at `current_slot`.
    pub fn buy_ticket(&mut self, current_slot: u64, ticket: Ticket) -> Result<u64, EngineError> {
        if !ticket.check() {
            return Err(EngineError::InvalidTicketShape(
                "ticket number out of range".into(),
            ));
        }
        let round = self.config.round_for_slot(current_slot);
        self.ledger
            .dispatch(ActionList::new(vec![Action { ticket, round }]));
        Ok(round)
    }

    /// Bank accumulated for a round, as of the last settled reduction.
    pub fn bank(&self, round: u64) -> u64 {
        self.rounds.get(&round).map(|state| state.bank).unwrap_or(0)
    }

    pub fn phase(&self, round: u64, current_slot: u64) -> RoundPhase {
        if self.emergency.contains(&round) {
            return RoundPhase::Emergency;
        }
        if current_slot < self.config.round_end_slot(round) {
            return RoundPhase::Open;
        }
        let has_pending = self
            .ledger
            .fetch_actions()
            .iter()
            .any(|list| list.iter().any(|action| action.round == round));
        if has_pending {
            return RoundPhase::Closed;
        }
        if !self.results.contains_key(&round) {
            return RoundPhase::Reduced;
        }
        if !self.distributions.contains_key(&round) {
            return RoundPhase::ResultProduced;
        }
        let remaining = self
            .rounds
            .get(&round)
            .map(|state| state.remaining)
            .unwrap_or(0);
        if remaining > 0 {
            RoundPhase::Payout
        } else {
            RoundPhase::Drained
        }
    }

    /// Fold every pending action list into a reduction proof, settle it on
    /// the ledger, and commit the mirrors. Mirrors are mutated on clones and
    /// dropped on any failure, so a bad batch leaves the manager untouched.
    pub fn reduce(&mut self, backend: &dyn ProofBackend) -> Result<ReduceProof, EngineError> {
        let pending = self.ledger.fetch_actions().to_vec();
        let mut engine = ReduceEngine::init(
            &self.config,
            self.ledger.checkpoint(),
            self.ledger.current_root(MapId::Tickets),
            self.ledger.current_root(MapId::Bank),
            self.ledger.cursor(),
        );

        let mut rounds = self.rounds.clone();
        let mut bank_map = self.bank_map.clone();
        for list in &pending {
            for action in list.iter() {
                let fresh_round = action.round > engine.output().last_processed_round;
                let slot = if fresh_round {
                    0
                } else {
                    engine.output().last_processed_ticket_id
                };
                let state = rounds.entry(action.round).or_default();
                let ticket_witness = state.map.witness(ticket_map_key(slot))?;
                let bank_witness = bank_map.witness(bank_map_key(action.round))?;
                engine.add_ticket(action, &ticket_witness, &bank_witness, state.bank)?;

                state.map.set(ticket_map_key(slot), action.ticket.hash())?;
                state.tickets.push(action.ticket.clone());
                let purchase = self.config.ticket_price * action.ticket.amount;
                state.bank += purchase;
                state.remaining = state.bank;
                bank_map.set(bank_map_key(action.round), Fr::from(state.bank))?;
            }
            engine.cut_actions();
        }

        let proof = engine.finish(backend)?;
        self.ledger.submit_reduce(&proof, backend)?;
        self.rounds = rounds;
        self.bank_map = bank_map;
        Ok(proof)
    }

    /// Record the winning combination for a fully reduced round.
    pub fn set_result(
        &mut self,
        round: u64,
        current_slot: u64,
        winning: WinningCombination,
    ) -> Result<(), EngineError> {
        if winning.is_placeholder() {
            return Err(EngineError::InvalidTicketShape(
                "winning combination is the placeholder".into(),
            ));
        }
        if self.phase(round, current_slot) != RoundPhase::Reduced {
            return Err(EngineError::RoundNotReady(round));
        }
        self.results.insert(round, winning);
        tracing::info!(round, numbers = ?winning.numbers(), "result recorded");
        Ok(())
    }

    /// Switch a result-less round to refunds once two further round
    /// durations have passed since it ended.
    pub fn enable_emergency(&mut self, round: u64, current_slot: u64) -> Result<(), EngineError> {
        if self.results.contains_key(&round) || current_slot < self.config.emergency_slot(round) {
            return Err(EngineError::RoundNotReady(round));
        }
        self.emergency.insert(round);
        tracing::warn!(round, "emergency refunds enabled");
        Ok(())
    }

    /// Distribution proof for a round with a result. Produced once and
    /// memoized; every later claim reuses the same proof.
    pub fn get_distribution(
        &mut self,
        round: u64,
        backend: &dyn ProofBackend,
    ) -> Result<DistributionProof, EngineError> {
        if let Some(proof) = self.distributions.get(&round) {
            return Ok(proof.clone());
        }
        let winning = *self
            .results
            .get(&round)
            .ok_or(EngineError::ResultNotProduced(round))?;
        let tickets = self
            .rounds
            .get(&round)
            .map(|state| state.tickets.clone())
            .unwrap_or_default();

        let mut engine = DistributionEngine::init(round, winning);
        let mut map = SparseMerkleMap::new();
        for (slot, ticket) in tickets.iter().enumerate() {
            let key = ticket_map_key(slot as u64);
            let witness = map.witness(key)?;
            engine.add_ticket(ticket, &witness)?;
            map.set(key, ticket.hash())?;
        }
        let proof = engine.finish(backend)?;
        self.distributions.insert(round, proof.clone());
        Ok(proof)
    }

    /// Claim the reward for one ticket. Marks the ticket's nullifier and
    /// returns the full witness bundle; a second claim for the same ticket
    /// fails.
    pub fn get_reward_witnesses(
        &mut self,
        round: u64,
        ticket_id: u64,
        backend: &dyn ProofBackend,
    ) -> Result<RewardWitnesses, EngineError> {
        if self.emergency.contains(&round) {
            return Err(EngineError::RoundNotReady(round));
        }
        let distribution = self.get_distribution(round, backend)?;
        let winning = distribution.output.winning;

        let (ticket, bank) = {
            let state = self
                .rounds
                .get(&round)
                .ok_or(EngineError::RoundNotReady(round))?;
            let ticket = state
                .tickets
                .get(ticket_id as usize)
                .ok_or_else(|| {
                    EngineError::InvalidTicketShape(format!(
                        "no ticket {ticket_id} in round {round}"
                    ))
                })?
                .clone();
            (ticket, state.bank)
        };
        let payout = reward_payout(
            bank,
            ticket.score(&winning)?,
            distribution.output.total,
            &self.config,
        );

        let nullifiers = self.nullifiers.entry(round).or_default();
        let nullifier_witness = nullifiers.check_and_update(ticket_id)?;
        let nullifier_root = nullifiers.root();

        let state = self
            .rounds
            .get_mut(&round)
            .ok_or(EngineError::RoundNotReady(round))?;
        state.remaining = state
            .remaining
            .checked_sub(payout)
            .ok_or(EngineError::AmountOverflow)?;
        let ticket_witness = state.map.witness_checked(ticket_map_key(ticket_id))?;

        tracing::info!(round, ticket_id, payout, "reward claimed");
        Ok(RewardWitnesses {
            ticket,
            payout,
            distribution,
            ticket_witness,
            nullifier_witness,
            nullifier_root,
        })
    }

    /// Claim the refund for one ticket of an emergency round. Uses the same
    /// nullifier map as rewards, so a ticket refunds at most once.
    pub fn get_refund_witnesses(
        &mut self,
        round: u64,
        ticket_id: u64,
    ) -> Result<RefundWitnesses, EngineError> {
        if !self.emergency.contains(&round) {
            return Err(EngineError::RoundNotReady(round));
        }
        let ticket = self
            .rounds
            .get(&round)
            .and_then(|state| state.tickets.get(ticket_id as usize))
            .ok_or_else(|| {
                EngineError::InvalidTicketShape(format!("no ticket {ticket_id} in round {round}"))
            })?
            .clone();
        let refund = self
            .config
            .ticket_price
            .checked_mul(ticket.amount)
            .ok_or(EngineError::AmountOverflow)?;

        let nullifiers = self.nullifiers.entry(round).or_default();
        let nullifier_witness = nullifiers.check_and_update(ticket_id)?;
        let nullifier_root = nullifiers.root();

        let state = self
            .rounds
            .get_mut(&round)
            .ok_or(EngineError::RoundNotReady(round))?;
        state.remaining = state
            .remaining
            .checked_sub(refund)
            .ok_or(EngineError::AmountOverflow)?;
        let ticket_witness = state.map.witness_checked(ticket_map_key(ticket_id))?;

        tracing::info!(round, ticket_id, refund, "refund claimed");
        Ok(RefundWitnesses {
            ticket,
            refund,
            ticket_witness,
            nullifier_witness,
            nullifier_root,
        })
    }
}
