//! Error taxonomy for the lottery engine.

use thiserror::Error;
use zklotto_map::MerkleMapError;

/// Error type shared by the reduction, distribution and claim flows.
///
/// `WitnessMismatch` is always recoverable by resyncing state and rebuilding
/// the witness. `OutOfOrderAction` and `AlreadyClaimed` are structural and
/// must not be retried with the same inputs.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed ticket input, rejected before any proof work.
    #[error("invalid ticket shape: {0}")]
    InvalidTicketShape(String),

    /// An asserted root or key does not match current authenticated state.
    #[error("witness mismatch: {0}")]
    WitnessMismatch(String),

    /// A ticket id skipped or repeated a slot in the fold sequence, or a
    /// round regressed. Non-recoverable without replaying from checkpoint.
    #[error("out-of-order action: {0}")]
    OutOfOrderAction(String),

    /// The processed-action accumulator was not empty at submission time.
    #[error("incomplete batch: processed action list has not been cut")]
    IncompleteBatch,

    /// The nullifier pre-state check failed.
    #[error("already claimed: ticket {0}")]
    AlreadyClaimed(u64),

    /// Temporal gating: the round has not reached the required phase.
    #[error("round {0} is not ready")]
    RoundNotReady(u64),

    /// No (non-placeholder) winning combination has been produced.
    #[error("result not produced for round {0}")]
    ResultNotProduced(u64),

    /// Arithmetic overflow while accumulating amounts or scores.
    #[error("amount overflow")]
    AmountOverflow,

    /// A randomness party tried to commit twice.
    #[error("commitment already recorded for the {0} party")]
    AlreadyCommitted(&'static str),

    /// A randomness reveal does not open the recorded commitment.
    #[error("reveal does not match the {0} party's commitment")]
    RevealMismatch(&'static str),

    /// Proof production or verification failed.
    #[error("proof error: {0}")]
    Proof(String),

    #[error(transparent)]
    Map(#[from] MerkleMapError),
}
