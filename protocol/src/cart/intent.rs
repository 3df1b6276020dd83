//! Vote and key-change intents.
//!
//! An intent is one message the voter wants to send to the protocol. It
//! is born when it enters the cart, picks up a nonce and (on success) a
//! receipt during a commit round, and ends either withdrawn or in the
//! committed-record log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::config::MIN_VOTE_WEIGHT;
use crate::credit::cost;
use crate::crypto::keys::VoterPublicKey;
use crate::error::{VoteError, VoteResult};

/// What an intent asks the protocol to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    /// Spend `weight` votes on a target.
    Vote,
    /// Replace the voter's registered public key.
    KeyChange,
}

/// Opaque handle the protocol returns for an accepted message.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Receipt(String);

impl Receipt {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Receipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Receipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.0.get(..16).unwrap_or(&self.0);
        write!(f, "Receipt({short})")
    }
}

/// A pending or committed protocol message.
///
/// Integer fields serialize as decimal strings; this struct is also the
/// element type of the persisted committed-record log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteIntent {
    id: Uuid,
    kind: IntentKind,
    #[serde(with = "crate::codec::decimal_opt", default)]
    target_id: Option<u64>,
    #[serde(with = "crate::codec::decimal")]
    weight: u64,
    #[serde(with = "crate::codec::decimal")]
    reserved_cost: u64,
    #[serde(with = "crate::codec::decimal_opt", default)]
    nonce: Option<u64>,
    #[serde(default)]
    receipt: Option<Receipt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    new_public_key: Option<VoterPublicKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    committed_at: Option<DateTime<Utc>>,
    /// Whether `reserved_cost` is currently deducted from the ledger.
    /// Only a refund-on-failure round clears it.
    #[serde(skip, default = "credits_held_default")]
    credits_held: bool,
}

fn credits_held_default() -> bool {
    true
}

impl VoteIntent {
    /// A vote of `weight` on `target_id`, costing `weight²`.
    ///
    /// # Errors
    ///
    /// [`VoteError::InvalidWeight`] for a zero weight,
    /// [`VoteError::Overflow`] if the cost does not fit in a `u64`.
    pub fn vote(target_id: u64, weight: u64) -> VoteResult<Self> {
        if weight < MIN_VOTE_WEIGHT {
            return Err(VoteError::InvalidWeight(weight));
        }
        let reserved_cost = cost(weight).ok_or(VoteError::Overflow)?;
        Ok(Self::new(IntentKind::Vote, Some(target_id), weight, reserved_cost, None))
    }

    /// A key change to `new_public_key`. Free: weight 0, cost 0.
    pub fn key_change(new_public_key: VoterPublicKey) -> Self {
        Self::new(IntentKind::KeyChange, None, 0, 0, Some(new_public_key))
    }

    fn new(
        kind: IntentKind,
        target_id: Option<u64>,
        weight: u64,
        reserved_cost: u64,
        new_public_key: Option<VoterPublicKey>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            target_id,
            weight,
            reserved_cost,
            nonce: None,
            receipt: None,
            new_public_key,
            committed_at: None,
            credits_held: true,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> IntentKind {
        self.kind
    }

    pub fn target_id(&self) -> Option<u64> {
        self.target_id
    }

    pub fn weight(&self) -> u64 {
        self.weight
    }

    pub fn reserved_cost(&self) -> u64 {
        self.reserved_cost
    }

    pub fn nonce(&self) -> Option<u64> {
        self.nonce
    }

    pub fn receipt(&self) -> Option<&Receipt> {
        self.receipt.as_ref()
    }

    pub fn new_public_key(&self) -> Option<&VoterPublicKey> {
        self.new_public_key.as_ref()
    }

    pub fn committed_at(&self) -> Option<DateTime<Utc>> {
        self.committed_at
    }

    pub fn is_committed(&self) -> bool {
        self.receipt.is_some()
    }

    pub fn credits_held(&self) -> bool {
        self.credits_held
    }

    pub(crate) fn assign_nonce(&mut self, nonce: u64) {
        self.nonce = Some(nonce);
    }

    pub(crate) fn mark_committed(&mut self, receipt: Receipt) {
        self.receipt = Some(receipt);
        self.committed_at = Some(Utc::now());
    }

    pub(crate) fn set_credits_held(&mut self, held: bool) {
        self.credits_held = held;
    }
}
