//! The ordered cart of pending intents.
//!
//! Insertion order is significant: it determines the nonces a commit round
//! hands out. The cart never reorders; it only appends, removes by index,
//! and drops committed intents after a round.

use std::collections::HashSet;

use serde::Serialize;
use uuid::Uuid;

use super::intent::VoteIntent;
use crate::credit::CreditLedger;
use crate::error::{VoteError, VoteResult};

/// Nonce for the intent at insertion position `position` in a cart of
/// `len` intents: the newest gets 1, the oldest gets `len`.
///
/// ```
/// use quadvote_protocol::cart::nonce_for;
///
/// // Cart [A, B, C]: A → 3, B → 2, C → 1.
/// assert_eq!(nonce_for(3, 0), 3);
/// assert_eq!(nonce_for(3, 2), 1);
/// ```
pub fn nonce_for(len: usize, position: usize) -> u64 {
    debug_assert!(position < len);
    (len - position) as u64
}

/// Pending intents, oldest first.
#[derive(Clone, Debug, Default, Serialize)]
pub struct VoteCart {
    intents: Vec<VoteIntent>,
}

impl VoteCart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves the intent's cost from `ledger` and appends it.
    ///
    /// Returns the new cart length.
    ///
    /// # Errors
    ///
    /// [`VoteError::DuplicateIntent`] if an intent with the same id is
    /// already queued or the intent has a receipt;
    /// [`VoteError::InsufficientCredits`]. In both cases neither the cart
    /// nor the ledger change.
    pub fn add(&mut self, intent: VoteIntent, ledger: &mut CreditLedger) -> VoteResult<usize> {
        if intent.is_committed() || self.contains(intent.id()) {
            return Err(VoteError::DuplicateIntent(intent.id()));
        }
        ledger.reserve(intent.reserved_cost())?;
        self.intents.push(intent);
        Ok(self.intents.len())
    }

    /// Removes the intent at `index` and refunds whatever it still holds.
    ///
    /// # Errors
    ///
    /// [`VoteError::IntentNotFound`] for an out-of-range index. A refund
    /// overflow also leaves the cart untouched.
    pub fn remove(&mut self, index: usize, ledger: &mut CreditLedger) -> VoteResult<VoteIntent> {
        let intent = self
            .intents
            .get(index)
            .ok_or(VoteError::IntentNotFound(index))?;
        if intent.credits_held() {
            ledger.refund(intent.reserved_cost())?;
        }
        Ok(self.intents.remove(index))
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.intents.iter().any(|i| i.id() == id)
    }

    pub fn intents(&self) -> &[VoteIntent] {
        &self.intents
    }

    pub fn get(&self, index: usize) -> Option<&VoteIntent> {
        self.intents.get(index)
    }

    pub fn len(&self) -> usize {
        self.intents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }

    /// Sum of credits the cart currently holds against the ledger.
    pub fn held_credits(&self) -> u64 {
        self.intents
            .iter()
            .filter(|i| i.credits_held())
            .map(|i| i.reserved_cost())
            .fold(0u64, u64::saturating_add)
    }

    /// Stamps every intent with its nonce and returns a snapshot of the
    /// stamped intents in insertion order.
    pub(crate) fn assign_nonces(&mut self) -> Vec<VoteIntent> {
        let len = self.intents.len();
        for (position, intent) in self.intents.iter_mut().enumerate() {
            intent.assign_nonce(nonce_for(len, position));
        }
        self.intents.clone()
    }

    pub(crate) fn get_mut(&mut self, id: Uuid) -> Option<&mut VoteIntent> {
        self.intents.iter_mut().find(|i| i.id() == id)
    }

    /// Drops every intent whose id is in `committed`. Returns how many
    /// were dropped.
    pub(crate) fn remove_committed(&mut self, committed: &HashSet<Uuid>) -> usize {
        let before = self.intents.len();
        self.intents.retain(|i| !committed.contains(&i.id()));
        before - self.intents.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::intent::IntentKind;
    use crate::crypto::keys::VoterKeypair;

    fn vote(target: u64, weight: u64) -> VoteIntent {
        VoteIntent::vote(target, weight).unwrap()
    }

    #[test]
    fn add_reserves_exact_cost() {
        let mut ledger = CreditLedger::new(120);
        let mut cart = VoteCart::new();
        assert_eq!(cart.add(vote(1, 3), &mut ledger).unwrap(), 1);
        assert_eq!(ledger.balance(), 111);
        assert_eq!(cart.held_credits(), 9);
    }

    #[test]
    fn add_rejected_when_unaffordable() {
        let mut ledger = CreditLedger::new(8);
        let mut cart = VoteCart::new();
        let err = cart.add(vote(1, 3), &mut ledger).unwrap_err();
        assert!(matches!(err, VoteError::InsufficientCredits { .. }));
        assert!(cart.is_empty());
        assert_eq!(ledger.balance(), 8);
    }

    #[test]
    fn add_rejects_an_id_already_queued() {
        let mut ledger = CreditLedger::new(120);
        let mut cart = VoteCart::new();
        let a = vote(1, 3);
        cart.add(a.clone(), &mut ledger).unwrap();

        let err = cart.add(a.clone(), &mut ledger).unwrap_err();
        assert!(matches!(err, VoteError::DuplicateIntent(id) if id == a.id()));
        assert_eq!(cart.len(), 1);
        assert_eq!(ledger.balance(), 111);
    }

    #[test]
    fn add_rejects_a_committed_record() {
        let mut ledger = CreditLedger::new(120);
        let mut cart = VoteCart::new();
        let mut record = vote(2, 2);
        record.assign_nonce(1);
        record.mark_committed(crate::cart::Receipt::new("ab"));

        assert!(matches!(
            cart.add(record, &mut ledger),
            Err(VoteError::DuplicateIntent(_))
        ));
        assert!(cart.is_empty());
        assert_eq!(ledger.balance(), 120);
    }

    #[test]
    fn remove_is_inverse_of_add() {
        let mut ledger = CreditLedger::new(120);
        let mut cart = VoteCart::new();
        cart.add(vote(1, 2), &mut ledger).unwrap();
        cart.add(vote(2, 5), &mut ledger).unwrap();
        assert_eq!(ledger.balance(), 120 - 4 - 25);

        let removed = cart.remove(1, &mut ledger).unwrap();
        assert_eq!(removed.target_id(), Some(2));
        assert_eq!(ledger.balance(), 120 - 4);

        cart.remove(0, &mut ledger).unwrap();
        assert_eq!(ledger.balance(), 120);
        assert!(cart.is_empty());
    }

    #[test]
    fn remove_key_change_refunds_nothing() {
        let mut ledger = CreditLedger::new(10);
        let mut cart = VoteCart::new();
        let intent = VoteIntent::key_change(VoterKeypair::generate().public_key());
        cart.add(intent, &mut ledger).unwrap();
        assert_eq!(ledger.balance(), 10);
        let removed = cart.remove(0, &mut ledger).unwrap();
        assert_eq!(removed.kind(), IntentKind::KeyChange);
        assert_eq!(ledger.balance(), 10);
    }

    #[test]
    fn remove_out_of_range() {
        let mut ledger = CreditLedger::new(10);
        let mut cart = VoteCart::new();
        assert!(matches!(
            cart.remove(0, &mut ledger),
            Err(VoteError::IntentNotFound(0))
        ));
        assert_eq!(ledger.balance(), 10);
    }

    #[test]
    fn remove_skips_refund_for_released_credits() {
        let mut ledger = CreditLedger::new(50);
        let mut cart = VoteCart::new();
        cart.add(vote(1, 4), &mut ledger).unwrap();
        let id = cart.intents()[0].id();
        ledger.refund(16).unwrap();
        cart.get_mut(id).unwrap().set_credits_held(false);

        cart.remove(0, &mut ledger).unwrap();
        assert_eq!(ledger.balance(), 50);
    }

    #[test]
    fn nonces_descend_from_oldest() {
        let mut ledger = CreditLedger::new(120);
        let mut cart = VoteCart::new();
        for target in [10, 20, 30] {
            cart.add(vote(target, 1), &mut ledger).unwrap();
        }
        let stamped = cart.assign_nonces();
        let nonces: Vec<_> = stamped.iter().map(|i| (i.target_id(), i.nonce())).collect();
        assert_eq!(
            nonces,
            vec![(Some(10), Some(3)), (Some(20), Some(2)), (Some(30), Some(1))]
        );
        assert_eq!(cart.intents()[0].nonce(), Some(3));
    }

    #[test]
    fn single_intent_gets_nonce_one() {
        assert_eq!(nonce_for(1, 0), 1);
    }

    #[test]
    fn remove_committed_keeps_order_of_rest() {
        let mut ledger = CreditLedger::new(120);
        let mut cart = VoteCart::new();
        for target in [1, 2, 3, 4] {
            cart.add(vote(target, 1), &mut ledger).unwrap();
        }
        let committed: HashSet<Uuid> = [cart.intents()[0].id(), cart.intents()[2].id()]
            .into_iter()
            .collect();
        assert_eq!(cart.remove_committed(&committed), 2);
        let left: Vec<_> = cart.intents().iter().map(|i| i.target_id()).collect();
        assert_eq!(left, vec![Some(2), Some(4)]);
    }
}
