//! Settlement ledger.
//!
//! The ledger is the authority the engines reduce against: it holds the
//! action-log checkpoint, the two map roots and the sequencing cursor, and
//! accepts a state transition only with a verified reduction proof whose
//! public output chains onto the stored state. [`MemoryLedger`] is the
//! in-process implementation used by the round manager and the tests;
//! anything that can be dispatched to and settled the same way can stand
//! in behind the [`Ledger`] trait.

use halo2curves_axiom::bn256::Fr;
use zklotto_map::empty_map_root;

use crate::action::{ActionList, ActionState};
use crate::backend::ProofBackend;
use crate::error::EngineError;
use crate::reduce::{ReduceCursor, ReduceProof};

/// The authenticated maps the ledger tracks a root for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MapId {
    /// Per-round ticket map. The stored root belongs to the round the
    /// cursor points at.
    Tickets,
    /// Bank map, keyed by round.
    Bank,
}

pub trait Ledger {
    /// Append a list of actions to the pending log.
    fn dispatch(&mut self, list: ActionList);

    /// Action lists dispatched since the current checkpoint.
    fn fetch_actions(&self) -> &[ActionList];

    fn checkpoint(&self) -> ActionState;

    fn current_root(&self, map: MapId) -> Fr;

    fn cursor(&self) -> ReduceCursor;

    /// Verify a reduction proof against the stored state and, if it chains,
    /// commit its output as the new state.
    fn submit_reduce(
        &mut self,
        proof: &ReduceProof,
        backend: &dyn ProofBackend,
    ) -> Result<(), EngineError>;
}

#[derive(Clone, Debug)]
pub struct MemoryLedger {
    checkpoint: ActionState,
    ticket_root: Fr,
    bank_root: Fr,
    cursor: ReduceCursor,
    pending: Vec<ActionList>,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            checkpoint: ActionState::genesis(),
            ticket_root: empty_map_root(),
            bank_root: empty_map_root(),
            cursor: ReduceCursor::genesis(),
            pending: Vec::new(),
        }
    }
}

impl Ledger for MemoryLedger {
    fn dispatch(&mut self, list: ActionList) {
        tracing::debug!(actions = list.len(), "action list dispatched");
        self.pending.push(list);
    }

    fn fetch_actions(&self) -> &[ActionList] {
        &self.pending
    }

    fn checkpoint(&self) -> ActionState {
        self.checkpoint
    }

    fn current_root(&self, map: MapId) -> Fr {
        match map {
            MapId::Tickets => self.ticket_root,
            MapId::Bank => self.bank_root,
        }
    }

    fn cursor(&self) -> ReduceCursor {
        self.cursor
    }

    fn submit_reduce(
        &mut self,
        proof: &ReduceProof,
        backend: &dyn ProofBackend,
    ) -> Result<(), EngineError> {
        backend.verify_reduce(&proof.output, &proof.proof)?;

        let output = &proof.output;
        if output.initial_state != self.checkpoint {
            return Err(EngineError::WitnessMismatch(
                "reduction does not start from the ledger checkpoint".into(),
            ));
        }
        if output.initial_ticket_root != self.ticket_root
            || output.initial_bank_root != self.bank_root
        {
            return Err(EngineError::WitnessMismatch(
                "reduction does not start from the ledger roots".into(),
            ));
        }
        if output.initial_cursor() != self.cursor {
            return Err(EngineError::WitnessMismatch(
                "reduction does not start from the ledger cursor".into(),
            ));
        }
        // The proof must account for exactly the pending lists, in order.
        let expected_final = self
            .pending
            .iter()
            .fold(self.checkpoint, |state, list| {
                state.push_list(list.commitment())
            });
        if output.final_state != expected_final {
            return Err(EngineError::WitnessMismatch(
                "reduction does not cover the pending action lists".into(),
            ));
        }

        self.checkpoint = output.final_state;
        self.ticket_root = output.new_ticket_root;
        self.bank_root = output.new_bank_root;
        self.cursor = output.cursor();
        self.pending.clear();
        tracing::info!(
            round = self.cursor.round,
            next_ticket_id = self.cursor.next_ticket_id,
            "reduction settled"
        );
        Ok(())
    }
}
