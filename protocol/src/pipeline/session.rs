//! The mutable state of one voter session.
//!
//! Everything the pipeline mutates lives in [`Session`], and the pipeline
//! keeps it behind a single mutex. All methods here are synchronous so the
//! lock is never held across a protocol call.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cart::{VoteCart, VoteIntent};
use crate::credit::{CreditLedger, PendingSelection};
use crate::crypto::keys::{VoterKeypair, VoterPublicKey};
use crate::error::{VoteError, VoteResult};
use crate::identity::Identity;
use crate::storage::{records, KeyValueStore, SignUpState};

#[derive(Debug)]
pub struct Session {
    pub(crate) ledger: CreditLedger,
    pub(crate) cart: VoteCart,
    pub(crate) pending: PendingSelection,
    pub(crate) selected: Option<u64>,
    pub(crate) eligibility: Option<u64>,
    pub(crate) sign_up: SignUpState,
    pub(crate) identity: Identity,
    /// Keypairs announced by key-change intents still in the cart.
    pub(crate) staged_keys: HashMap<Uuid, VoterKeypair>,
    pub(crate) committed: Vec<VoteIntent>,
}

/// Read-only view of a session, as served by the node's `/status`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub public_key: VoterPublicKey,
    pub balance: u64,
    pub signed_up: bool,
    pub user_state_index: Option<u64>,
    pub eligible: bool,
    pub selected_target: Option<u64>,
    pub pending_weight: u64,
    pub pending_cost: u64,
    pub held_credits: u64,
    pub cart: Vec<VoteIntent>,
    pub committed_count: usize,
}

impl Session {
    /// Restores the persisted parts of a session. The cart always starts
    /// empty.
    pub fn load(store: &dyn KeyValueStore) -> VoteResult<Self> {
        let identity = Identity::create(store)?;
        let balance = records::load_balance(store)?;
        let sign_up = records::load_sign_up(store)?;
        let committed = records::load_committed(store)?;
        debug!(
            balance,
            signed_up = sign_up.signed_up,
            committed = committed.len(),
            "session restored"
        );
        Ok(Self::from_parts(identity, CreditLedger::new(balance), sign_up, committed))
    }

    pub fn from_parts(
        identity: Identity,
        ledger: CreditLedger,
        sign_up: SignUpState,
        committed: Vec<VoteIntent>,
    ) -> Self {
        Self {
            ledger,
            cart: VoteCart::new(),
            pending: PendingSelection::new(),
            selected: None,
            eligibility: None,
            sign_up,
            identity,
            staged_keys: HashMap::new(),
            committed,
        }
    }

    /// Appends `intent` and clears the composition state.
    pub fn add(&mut self, intent: VoteIntent) -> VoteResult<usize> {
        let len = self.cart.add(intent, &mut self.ledger)?;
        self.pending.reset();
        self.selected = None;
        Ok(len)
    }

    pub fn remove(&mut self, index: usize) -> VoteResult<VoteIntent> {
        let removed = self.cart.remove(index, &mut self.ledger)?;
        if self.staged_keys.remove(&removed.id()).is_some() {
            debug!(intent = %removed.id(), "staged key discarded");
        }
        Ok(removed)
    }

    /// Records `target_id` if the voter is eligible and signed up. Returns
    /// whether the selection was taken.
    pub fn select_target(&mut self, target_id: u64) -> bool {
        if self.eligibility.is_none() || !self.sign_up.signed_up {
            return false;
        }
        self.selected = Some(target_id);
        true
    }

    pub fn increment_pending(&mut self) -> bool {
        self.pending.increment(&self.ledger)
    }

    pub fn decrement_pending(&mut self) -> bool {
        self.pending.decrement()
    }

    /// Turns the selected target and pending weight into a cart entry.
    pub fn add_pending_vote(&mut self) -> VoteResult<usize> {
        let target_id = self.selected.ok_or(VoteError::NoTargetSelected)?;
        let intent = VoteIntent::vote(target_id, self.pending.root())?;
        self.add(intent)
    }

    /// Queues a key change. The new keypair is held until the intent either
    /// commits or is removed.
    pub fn stage_key_change(&mut self) -> VoteResult<usize> {
        let staged = self.identity.stage_key_change();
        let id = staged.intent.id();
        let len = self.add(staged.intent)?;
        self.staged_keys.insert(id, staged.keypair);
        Ok(len)
    }

    /// Applies a protocol-issued balance. Reservations held by the cart are
    /// not re-applied.
    pub fn set_authoritative_balance(&mut self, balance: u64) {
        let held = self.cart.held_credits();
        if held > 0 {
            warn!(
                held,
                previous = self.ledger.balance(),
                balance,
                "authoritative balance overrides credits reserved by the cart"
            );
        }
        self.ledger.set_authoritative(balance);
    }

    pub fn user_state_index(&self) -> Option<u64> {
        self.sign_up
            .user_state_index
            .filter(|_| self.sign_up.signed_up)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            public_key: self.identity.public_key(),
            balance: self.ledger.balance(),
            signed_up: self.sign_up.signed_up,
            user_state_index: self.sign_up.user_state_index,
            eligible: self.eligibility.is_some(),
            selected_target: self.selected,
            pending_weight: self.pending.root(),
            pending_cost: self.pending.square(),
            held_credits: self.cart.held_credits(),
            cart: self.cart.intents().to_vec(),
            committed_count: self.committed.len(),
        }
    }
}
