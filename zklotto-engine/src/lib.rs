//! zklotto-engine
//!
//! Off-chain engine for a lottery protocol whose authoritative state lives
//! in a handful of authenticated sparse map roots on chain. The engine
//! mirrors that state, folds the append-only purchase-action log into fresh
//! ticket/bank roots (the reduction protocol), computes verifiable
//! proportional reward shares (the distribution protocol), and assembles the
//! witnesses a reward or refund claim needs.
//!
//! # Architecture
//!
//! - [`ticket`] / [`action`] — purchase records and the action-log
//!   commitment scheme the external ledger checkpoints with.
//! - [`reduce`] — chained fold of pending action lists into new map roots.
//!   Each step consumes the previous step's attested output; ordering and
//!   tie-break rules make the fold's result unique.
//! - [`distribution`] — chained accumulation of per-ticket scores against a
//!   winning combination, re-committing every ticket hash at its original
//!   slot so a single claim verifies without re-scanning the round.
//! - [`nullifier`] — one-shot claim flags preventing double reward/refund.
//! - [`random`] — two-party commit/reveal producing the winning combination.
//! - [`round`] — per-round orchestration: mirrors, cursors, proof cache,
//!   claim assembly, lifecycle gating.
//! - [`backend`] — proof production/verification strategy (real transcript
//!   backend or no-op stub), selected at construction.
//! - [`ledger`] — the external ledger/verifier seam, with an in-memory
//!   implementation for tests.
//!
//! The verifying program is the single source of truth; every check here is
//! an advisory optimization constructed to reach the same accept/reject
//! decision.

pub mod action;
pub mod backend;
pub mod config;
pub mod distribution;
pub mod error;
pub mod ledger;
pub mod nullifier;
pub mod random;
pub mod reduce;
pub mod round;
pub mod ticket;

pub use action::{Action, ActionList, ActionState};
pub use backend::{NoopBackend, ProofBackend, TranscriptBackend};
pub use config::LotteryConfig;
pub use distribution::{
    commission_amount, reward_payout, DistributionEngine, DistributionOutput, DistributionProof,
};
pub use error::EngineError;
pub use ledger::{Ledger, MapId, MemoryLedger};
pub use nullifier::NullifierMap;
pub use random::RandomManager;
pub use reduce::{ReduceCursor, ReduceEngine, ReduceOutput, ReduceProof};
pub use round::{RefundWitnesses, RewardWitnesses, RoundManager, RoundPhase};
pub use ticket::{Ticket, WinningCombination, NUMBERS_PER_TICKET, SCORE_COEFFICIENTS};

/// Map slot 0 is reserved, so ticket id `k` lives at map key `k + 1`.
pub(crate) fn ticket_map_key(ticket_id: u64) -> u64 {
    ticket_id + 1
}

/// Round `r`'s accumulated bank lives at map key `r + 1`.
pub(crate) fn bank_map_key(round: u64) -> u64 {
    round + 1
}
