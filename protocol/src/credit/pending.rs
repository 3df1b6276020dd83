//! The vote currently being composed, before it goes into the cart.
//!
//! The selection is a `(root, square)` pair: `root` is the vote weight the
//! user is dialing in, `square` is what it will cost. Increments are gated
//! by the ledger balance so the user can never compose a vote they cannot
//! pay for.

use serde::{Deserialize, Serialize};

use super::ledger::{cost, CreditLedger};
use crate::config::MIN_VOTE_WEIGHT;

/// Transient pending vote weight and its quadratic cost.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSelection {
    root: u64,
    square: u64,
}

impl PendingSelection {
    /// `(1, 1)`.
    pub fn new() -> Self {
        Self {
            root: MIN_VOTE_WEIGHT,
            square: MIN_VOTE_WEIGHT * MIN_VOTE_WEIGHT,
        }
    }

    pub fn root(&self) -> u64 {
        self.root
    }

    pub fn square(&self) -> u64 {
        self.square
    }

    /// Raises the weight by one if the new cost fits in `ledger`'s balance.
    ///
    /// Silently leaves the selection alone otherwise. Returns whether the
    /// selection changed.
    pub fn increment(&mut self, ledger: &CreditLedger) -> bool {
        let Some(root) = self.root.checked_add(1) else {
            return false;
        };
        match cost(root) {
            Some(square) if ledger.can_afford(square) => {
                self.root = root;
                self.square = square;
                true
            }
            _ => false,
        }
    }

    /// Lowers the weight by one, floored at 1. Returns whether the
    /// selection changed.
    pub fn decrement(&mut self) -> bool {
        if self.root <= MIN_VOTE_WEIGHT {
            return false;
        }
        self.root -= 1;
        self.square = self.root * self.root;
        true
    }

    /// Back to `(1, 1)`.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for PendingSelection {
    fn default() -> Self {
        Self::new()
    }
}
