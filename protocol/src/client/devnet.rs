//! # Devnet Coordinator
//!
//! An in-process stand-in for the anonymous voting protocol. It keeps the
//! registry of signed-up voters, checks every published message the way
//! the real coordinator would (signature, registered key, credit budget),
//! and issues receipts.
//!
//! It does not encrypt, tally or prove anything. It exists so the node can
//! run end to end on a laptop and so tests can script protocol outcomes:
//! [`DevnetCoordinator::fail_nonce`] makes every publish carrying that
//! nonce fail.
//!
//! ## Rules
//!
//! - State indices start at 1 and grow by one per sign-up.
//! - A public key can sign up once.
//! - A message must be signed by the key currently registered at its
//!   `user_state_index`.
//! - A vote's `weight²` must not exceed the voter's allotment.
//! - A key-change message re-registers the voter under the new key
//!   immediately.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use tracing::{debug, info};

use super::{NetworkGuard, ProtocolError, SignUpResponse, VotingProtocolClient};
use crate::cart::Receipt;
use crate::config::{DEFAULT_VOICE_CREDITS, NETWORK_ID_DEVNET};
use crate::crypto::hash::{domain_separated_hash, RECEIPT_CONTEXT};
use crate::crypto::keys::{VoterKeypair, VoterPublicKey};
use crate::message::{sign_message, SignedMessage, VoteMessage};

#[derive(Debug, Clone)]
struct RegisteredVoter {
    public_key: VoterPublicKey,
    voice_credits: u64,
}

#[derive(Debug, Default)]
struct DevnetState {
    /// Position `i` holds state index `i + 1`.
    voters: Vec<RegisteredVoter>,
    failing_nonces: HashSet<u64>,
    accepted: Vec<SignedMessage>,
    publish_attempts: usize,
}

/// In-process voting protocol and network guard.
#[derive(Debug)]
pub struct DevnetCoordinator {
    network_id: u64,
    voice_credits: u64,
    state: Mutex<DevnetState>,
}

impl DevnetCoordinator {
    /// Devnet network id, [`DEFAULT_VOICE_CREDITS`] per voter.
    pub fn new() -> Self {
        Self::with_settings(NETWORK_ID_DEVNET, DEFAULT_VOICE_CREDITS)
    }

    pub fn with_settings(network_id: u64, voice_credits: u64) -> Self {
        Self {
            network_id,
            voice_credits,
            state: Mutex::new(DevnetState::default()),
        }
    }

    /// Every later publish with this nonce is rejected.
    pub fn fail_nonce(&self, nonce: u64) {
        self.state.lock().failing_nonces.insert(nonce);
    }

    pub fn clear_failures(&self) {
        self.state.lock().failing_nonces.clear();
    }

    /// Messages accepted so far, in arrival order.
    pub fn accepted(&self) -> Vec<SignedMessage> {
        self.state.lock().accepted.clone()
    }

    /// Publish calls seen, accepted or not.
    pub fn publish_attempts(&self) -> usize {
        self.state.lock().publish_attempts
    }

    pub fn voter_count(&self) -> usize {
        self.state.lock().voters.len()
    }

    /// Key currently registered at `user_state_index`.
    pub fn registered_key(&self, user_state_index: u64) -> Option<VoterPublicKey> {
        let state = self.state.lock();
        voter_slot(user_state_index)
            .and_then(|slot| state.voters.get(slot))
            .map(|v| v.public_key.clone())
    }

    fn verify(state: &DevnetState, signed: &SignedMessage) -> Result<usize, ProtocolError> {
        let msg = &signed.message;
        let slot = voter_slot(msg.user_state_index)
            .filter(|slot| *slot < state.voters.len())
            .ok_or_else(|| {
                ProtocolError::Rejected(format!(
                    "unknown state index {}",
                    msg.user_state_index
                ))
            })?;
        let voter = &state.voters[slot];

        if state.failing_nonces.contains(&msg.nonce) {
            return Err(ProtocolError::Rejected(format!(
                "nonce {} refused by coordinator",
                msg.nonce
            )));
        }
        if signed.signer != voter.public_key || !signed.verify() {
            return Err(ProtocolError::Rejected("invalid signature".into()));
        }
        if !msg.is_key_change() {
            let fits = msg
                .weight
                .checked_mul(msg.weight)
                .is_some_and(|c| c <= voter.voice_credits);
            if !fits {
                return Err(ProtocolError::Rejected(format!(
                    "weight {} exceeds voice credit allotment",
                    msg.weight
                )));
            }
        }
        Ok(slot)
    }
}

impl Default for DevnetCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

fn voter_slot(user_state_index: u64) -> Option<usize> {
    user_state_index
        .checked_sub(1)
        .and_then(|s| usize::try_from(s).ok())
}

fn receipt_for(signed: &SignedMessage) -> Receipt {
    let mut bytes = signed.message.signable_bytes();
    bytes.extend_from_slice(signed.signature.as_bytes());
    Receipt::new(hex::encode(domain_separated_hash(RECEIPT_CONTEXT, &bytes)))
}

#[async_trait]
impl VotingProtocolClient for DevnetCoordinator {
    async fn sign_up(
        &self,
        keypair: &VoterKeypair,
        eligibility_token: u64,
    ) -> Result<SignUpResponse, ProtocolError> {
        let public_key = keypair.public_key();
        let mut state = self.state.lock();
        if state.voters.iter().any(|v| v.public_key == public_key) {
            return Err(ProtocolError::SignUpRejected(
                "public key already registered".into(),
            ));
        }
        state.voters.push(RegisteredVoter {
            public_key,
            voice_credits: self.voice_credits,
        });
        let user_state_index = state.voters.len() as u64;
        info!(user_state_index, eligibility_token, "devnet sign-up accepted");
        Ok(SignUpResponse {
            user_state_index,
            voice_credits: self.voice_credits,
        })
    }

    async fn publish(
        &self,
        keypair: &VoterKeypair,
        message: &VoteMessage,
    ) -> Result<Receipt, ProtocolError> {
        let signed = sign_message(message.clone(), keypair);
        let mut state = self.state.lock();
        state.publish_attempts += 1;

        let slot = Self::verify(&state, &signed)?;
        if let Some(new_key) = &signed.message.new_public_key {
            state.voters[slot].public_key = new_key.clone();
        }

        let receipt = receipt_for(&signed);
        debug!(
            user_state_index = message.user_state_index,
            nonce = message.nonce,
            receipt = %receipt,
            "devnet message accepted"
        );
        state.accepted.push(signed);
        Ok(receipt)
    }
}

#[async_trait]
impl NetworkGuard for DevnetCoordinator {
    async fn current_network_id(&self) -> Result<u64, ProtocolError> {
        Ok(self.network_id)
    }
}
