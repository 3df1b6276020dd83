//! Outcome of a commit round.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cart::VoteIntent;

/// One intent that did not make it into the committed log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentFailure {
    pub intent_id: Uuid,
    pub nonce: u64,
    pub reason: String,
}

/// What a [`commit_cart`](super::CommitPipeline::commit_cart) round did.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommitReport {
    /// Intents accepted this round, with nonce and receipt, in publish
    /// order.
    pub committed: Vec<VoteIntent>,
    /// Intents that stay in the cart for a later round.
    pub failed: Vec<IntentFailure>,
    /// Credits returned under the refund-on-failure policy.
    pub refunded: u64,
    /// Ledger balance after the round.
    pub balance: u64,
}

impl CommitReport {
    pub fn attempted(&self) -> usize {
        self.committed.len() + self.failed.len()
    }

    /// `true` when nothing failed, including the empty round.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}
