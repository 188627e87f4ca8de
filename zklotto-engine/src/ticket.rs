//! Tickets and winning combinations.

use halo2curves_axiom::bn256::Fr;
use serde::{Deserialize, Serialize};
use zklotto_map::poseidon_hash;

use crate::error::EngineError;

/// Numbers on a ticket.
pub const NUMBERS_PER_TICKET: usize = 6;

/// Smallest and largest valid ticket number, strictly between 0 and 10.
/// The legacy `[0, 9]` variant is not carried.
pub const NUMBER_MIN: u8 = 1;
pub const NUMBER_MAX: u8 = 9;

/// Payout coefficient per positional match count, 0 through 6 matches.
///
/// A static lookup table, not a formula: only six matches pay materially,
/// zero matches pay a token unit so a fully-losing round still produces a
/// nonzero score total.
pub const SCORE_COEFFICIENTS: [u64; NUMBERS_PER_TICKET + 1] =
    [1, 90, 324, 2187, 26244, 590_490, 31_886_460];

/// A purchase record: selected numbers, owner, quantity.
///
/// Created at purchase time and immutable thereafter; rewards and refunds
/// reference it by [`Ticket::hash`], never by mutation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub numbers: [u8; NUMBERS_PER_TICKET],
    #[serde(with = "zklotto_map::serde_fr_bytes")]
    pub owner: Fr,
    pub amount: u64,
}

impl Ticket {
    /// Build a ticket from a number slice. Fails with `InvalidTicketShape`
    /// when the slice length is not [`NUMBERS_PER_TICKET`].
    pub fn from_numbers(numbers: &[u8], owner: Fr, amount: u64) -> Result<Self, EngineError> {
        let numbers: [u8; NUMBERS_PER_TICKET] = numbers.try_into().map_err(|_| {
            EngineError::InvalidTicketShape(format!(
                "expected {} numbers, got {}",
                NUMBERS_PER_TICKET,
                numbers.len()
            ))
        })?;
        Ok(Self {
            numbers,
            owner,
            amount,
        })
    }

    /// True iff every number lies in `[NUMBER_MIN, NUMBER_MAX]`.
    pub fn check(&self) -> bool {
        self.numbers
            .iter()
            .all(|n| (NUMBER_MIN..=NUMBER_MAX).contains(n))
    }

    /// Canonical commitment over (numbers, owner, amount); the ASM leaf
    /// value and the nullifier-independent ticket identity.
    pub fn hash(&self) -> Fr {
        let mut inputs = [Fr::zero(); NUMBERS_PER_TICKET + 2];
        for (slot, number) in inputs.iter_mut().zip(self.numbers.iter()) {
            *slot = Fr::from(*number as u64);
        }
        inputs[NUMBERS_PER_TICKET] = self.owner;
        inputs[NUMBERS_PER_TICKET + 1] = Fr::from(self.amount);
        poseidon_hash(&inputs)
    }

    /// Weighted score against a winning combination: positional matches
    /// select a coefficient, multiplied by the purchased quantity. The
    /// multiply is checked; a quantity large enough to wrap the jackpot
    /// coefficient fits through the purchase-price check, so it must be
    /// rejected here rather than trusted.
    pub fn score(&self, winning: &WinningCombination) -> Result<u64, EngineError> {
        let matches = self
            .numbers
            .iter()
            .zip(winning.numbers().iter())
            .filter(|(a, b)| a == b)
            .count();
        SCORE_COEFFICIENTS[matches]
            .checked_mul(self.amount)
            .ok_or(EngineError::AmountOverflow)
    }
}

/// A round's winning combination. The all-zero value is the emergency
/// placeholder: it finalizes roots for refunds but never unlocks rewards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinningCombination([u8; NUMBERS_PER_TICKET]);

impl WinningCombination {
    pub fn new(numbers: [u8; NUMBERS_PER_TICKET]) -> Self {
        Self(numbers)
    }

    /// The emergency placeholder (value 0).
    pub fn placeholder() -> Self {
        Self([0; NUMBERS_PER_TICKET])
    }

    pub fn is_placeholder(&self) -> bool {
        self.0 == [0; NUMBERS_PER_TICKET]
    }

    pub fn numbers(&self) -> &[u8; NUMBERS_PER_TICKET] {
        &self.0
    }

    /// Field encoding used in proof transcripts, base-10 digit packing.
    pub fn pack(&self) -> Fr {
        let mut acc = 0u64;
        for digit in self.0.iter() {
            acc = acc * 10 + *digit as u64;
        }
        Fr::from(acc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_ticket() -> Ticket {
        Ticket::from_numbers(&[1, 2, 3, 4, 5, 6], Fr::from(77u64), 2).unwrap()
    }

    #[test]
    fn valid_numbers_pass_check() {
        assert!(sample_ticket().check());
        let edge = Ticket::from_numbers(&[1, 9, 1, 9, 1, 9], Fr::from(1u64), 1).unwrap();
        assert!(edge.check());
    }

    #[test]
    fn out_of_bound_numbers_fail_check() {
        let zero = Ticket::from_numbers(&[0, 2, 3, 4, 5, 6], Fr::from(1u64), 1).unwrap();
        assert!(!zero.check());
        let ten = Ticket::from_numbers(&[1, 2, 3, 4, 5, 10], Fr::from(1u64), 1).unwrap();
        assert!(!ten.check());
    }

    #[test]
    fn wrong_width_is_rejected() {
        let result = Ticket::from_numbers(&[1, 2, 3], Fr::from(1u64), 1);
        assert!(matches!(result, Err(EngineError::InvalidTicketShape(_))));
        let result = Ticket::from_numbers(&[1; 7], Fr::from(1u64), 1);
        assert!(matches!(result, Err(EngineError::InvalidTicketShape(_))));
    }

    #[test]
    fn hash_binds_every_field() {
        let base = sample_ticket();
        let mut other = base.clone();
        other.amount = 3;
        assert_ne!(base.hash(), other.hash());

        let mut other = base.clone();
        other.owner = Fr::from(78u64);
        assert_ne!(base.hash(), other.hash());

        let mut other = base.clone();
        other.numbers[5] = 7;
        assert_ne!(base.hash(), other.hash());
    }

    #[test]
    fn score_uses_the_coefficient_table() {
        let winning = WinningCombination::new([1, 2, 3, 4, 5, 6]);
        let full = sample_ticket();
        assert_eq!(full.score(&winning).unwrap(), SCORE_COEFFICIENTS[6] * 2);

        let partial = Ticket::from_numbers(&[1, 2, 3, 9, 9, 9], Fr::from(1u64), 1).unwrap();
        assert_eq!(partial.score(&winning).unwrap(), SCORE_COEFFICIENTS[3]);

        let miss = Ticket::from_numbers(&[9, 9, 9, 9, 9, 9], Fr::from(1u64), 1).unwrap();
        assert_eq!(miss.score(&winning).unwrap(), SCORE_COEFFICIENTS[0]);
    }

    #[test]
    fn oversized_quantity_overflows_the_score() {
        // Cheap enough to pass the purchase-price check, but the jackpot
        // coefficient wraps u64 when multiplied by the quantity.
        let huge = Ticket::from_numbers(&[1; 6], Fr::from(1u64), 1_800_000_000_000_000).unwrap();
        let winning = WinningCombination::new([1, 1, 1, 1, 1, 1]);
        assert!(matches!(
            huge.score(&winning),
            Err(EngineError::AmountOverflow)
        ));
    }

    #[test]
    fn score_counts_positional_matches_only() {
        // Same digits, shifted one position: no positional match.
        let winning = WinningCombination::new([1, 2, 3, 4, 5, 6]);
        let shifted = Ticket::from_numbers(&[6, 1, 2, 3, 4, 5], Fr::from(1u64), 1).unwrap();
        assert_eq!(shifted.score(&winning).unwrap(), SCORE_COEFFICIENTS[0]);
    }

    #[test]
    fn placeholder_combination() {
        assert!(WinningCombination::placeholder().is_placeholder());
        assert!(!WinningCombination::new([1, 1, 1, 1, 1, 1]).is_placeholder());
        assert_eq!(WinningCombination::placeholder().pack(), Fr::zero());
    }
}
