//! Engine configuration.
//!
//! All economic constants and network timing are passed explicitly at
//! construction; nothing is read from process-wide mutable state.

use halo2curves_axiom::bn256::Fr;
use serde::{Deserialize, Serialize};
use zklotto_map::serde_fr_bytes;

/// Configuration shared by the engines and the round manager.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LotteryConfig {
    /// Price of a single ticket in base units.
    pub ticket_price: u64,
    /// Commission numerator; the treasury keeps
    /// `commission / (precision + commission)` of each round's bank.
    pub commission: u64,
    /// Commission precision denominator.
    pub precision: u64,
    /// Number of chain slots in one round.
    pub blocks_per_round: u64,
    /// Slot at which round 0 opened.
    pub start_slot: u64,
    /// Treasury identity the commission is remitted to.
    #[serde(with = "serde_fr_bytes")]
    pub treasury: Fr,
}

impl Default for LotteryConfig {
    fn default() -> Self {
        Self {
            ticket_price: 10_000,
            commission: 3,
            precision: 100,
            blocks_per_round: 480,
            start_slot: 0,
            treasury: Fr::zero(),
        }
    }
}

impl LotteryConfig {
    /// Round index for a chain slot: `(slot - start_slot) / blocks_per_round`.
    /// Slots before `start_slot` belong to round 0.
    pub fn round_for_slot(&self, slot: u64) -> u64 {
        slot.saturating_sub(self.start_slot) / self.blocks_per_round
    }

    /// First slot after the purchase window of `round`.
    pub fn round_end_slot(&self, round: u64) -> u64 {
        self.start_slot + (round + 1) * self.blocks_per_round
    }

    /// Slot at which the emergency branch unlocks: two full round durations
    /// past the round's end with no result produced.
    pub fn emergency_slot(&self, round: u64) -> u64 {
        self.round_end_slot(round) + 2 * self.blocks_per_round
    }
}
