//! Commit-reveal randomness for the winning combination.
//!
//! Two parties, conventionally the operator and a challenger, each commit
//! to a 32-byte value before the round closes and reveal after. Neither
//! party can steer the outcome alone: the seed is a keyed hash over both
//! revealed values, and a party that dislikes the seed can only refuse to
//! reveal, which stalls the round into the refund path instead of biasing
//! the draw.

use crate::error::EngineError;
use crate::ticket::{WinningCombination, NUMBERS_PER_TICKET, NUMBER_MAX, NUMBER_MIN};

pub const OPERATOR: &str = "operator";
pub const CHALLENGER: &str = "challenger";

const COMMIT_KEY: &[u8; 32] = b"zklotto.random.commitment.v1\0\0\0\0";
const SEED_KEY: &[u8; 32] = b"zklotto.random.seed.v1\0\0\0\0\0\0\0\0\0\0";

/// Commitment to a value under a salt. Published before the draw.
pub fn commitment_to(value: &[u8; 32], salt: &[u8; 32]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_keyed(COMMIT_KEY);
    hasher.update(salt);
    hasher.update(value);
    *hasher.finalize().as_bytes()
}

#[derive(Clone, Debug, Default)]
struct PartySlot {
    commitment: Option<[u8; 32]>,
    revealed: Option<[u8; 32]>,
}

/// Commit-reveal state machine for one draw.
#[derive(Clone, Debug, Default)]
pub struct RandomManager {
    operator: PartySlot,
    challenger: PartySlot,
}

impl RandomManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot_mut(&mut self, party: &'static str) -> Result<&mut PartySlot, EngineError> {
        match party {
            OPERATOR => Ok(&mut self.operator),
            CHALLENGER => Ok(&mut self.challenger),
            other => Err(EngineError::RevealMismatch(other)),
        }
    }

    /// Record a party's commitment. One per party per draw.
    pub fn commit(&mut self, party: &'static str, commitment: [u8; 32]) -> Result<(), EngineError> {
        let slot = self.slot_mut(party)?;
        if slot.commitment.is_some() {
            return Err(EngineError::AlreadyCommitted(party));
        }
        slot.commitment = Some(commitment);
        tracing::debug!(party, "randomness committed");
        Ok(())
    }

    /// Open a party's commitment. Rejected if the opening does not hash to
    /// the recorded commitment, or if no commitment was recorded.
    pub fn reveal(
        &mut self,
        party: &'static str,
        value: [u8; 32],
        salt: [u8; 32],
    ) -> Result<(), EngineError> {
        let slot = self.slot_mut(party)?;
        match slot.commitment {
            Some(commitment) if commitment_to(&value, &salt) == commitment => {
                slot.revealed = Some(value);
                tracing::debug!(party, "randomness revealed");
                Ok(())
            }
            _ => Err(EngineError::RevealMismatch(party)),
        }
    }

    pub fn is_revealed(&self) -> bool {
        self.operator.revealed.is_some() && self.challenger.revealed.is_some()
    }

    /// Combined seed, available once both parties have revealed.
    pub fn seed(&self) -> Option<[u8; 32]> {
        let operator = self.operator.revealed?;
        let challenger = self.challenger.revealed?;
        let mut hasher = blake3::Hasher::new_keyed(SEED_KEY);
        hasher.update(&operator);
        hasher.update(&challenger);
        Some(*hasher.finalize().as_bytes())
    }

    /// Six digits drawn from the combined seed.
    pub fn winning_combination(&self) -> Option<WinningCombination> {
        self.seed().map(combination_from_seed)
    }
}

/// One digit per seed byte, folded into the playable range.
fn combination_from_seed(seed: [u8; 32]) -> WinningCombination {
    let span = (NUMBER_MAX - NUMBER_MIN + 1) as u16;
    let mut numbers = [0u8; NUMBERS_PER_TICKET];
    for (digit, byte) in numbers.iter_mut().zip(seed.iter()) {
        *digit = (*byte as u16 % span) as u8 + NUMBER_MIN;
    }
    WinningCombination::new(numbers)
}
