//! The spendable voice-credit balance.
//!
//! Credits move in exactly three ways: a cart `add` reserves the intent's
//! cost, a cart `remove` (or a refund-on-failure commit) gives it back,
//! and a successful sign-up overwrites the balance with the protocol's
//! allotment. Nothing else touches it.

use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_VOICE_CREDITS;
use crate::error::{VoteError, VoteResult};

/// Quadratic cost of a vote: `weight²`.
///
/// Returns `None` if the square does not fit in a `u64`.
///
/// ```
/// use quadvote_protocol::credit::cost;
///
/// assert_eq!(cost(1), Some(1));
/// assert_eq!(cost(4), Some(16));
/// ```
pub fn cost(weight: u64) -> Option<u64> {
    weight.checked_mul(weight)
}

/// Voice-credit balance. Never negative by construction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditLedger {
    balance: u64,
}

impl CreditLedger {
    pub fn new(balance: u64) -> Self {
        Self { balance }
    }

    pub fn balance(&self) -> u64 {
        self.balance
    }

    /// Returns `true` if `amount` could be reserved right now.
    pub fn can_afford(&self, amount: u64) -> bool {
        self.balance >= amount
    }

    /// Deducts `amount`, returning the remaining balance.
    ///
    /// # Errors
    ///
    /// [`VoteError::InsufficientCredits`] if the balance would go
    /// negative. The balance is unchanged in that case.
    pub fn reserve(&mut self, amount: u64) -> VoteResult<u64> {
        if !self.can_afford(amount) {
            return Err(VoteError::InsufficientCredits {
                available: self.balance,
                requested: amount,
            });
        }
        self.balance -= amount;
        Ok(self.balance)
    }

    /// Returns `amount` to the balance, returning the new balance.
    ///
    /// # Errors
    ///
    /// [`VoteError::Overflow`] if the refund would exceed `u64::MAX`.
    pub fn refund(&mut self, amount: u64) -> VoteResult<u64> {
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or(VoteError::Overflow)?;
        Ok(self.balance)
    }

    /// Unconditionally replaces the balance.
    ///
    /// Sign-up uses this: the protocol's allotment supersedes whatever was
    /// tracked locally, including credits already reserved by the cart.
    pub fn set_authoritative(&mut self, balance: u64) {
        self.balance = balance;
    }
}

impl Default for CreditLedger {
    fn default() -> Self {
        Self::new(DEFAULT_VOICE_CREDITS)
    }
}
