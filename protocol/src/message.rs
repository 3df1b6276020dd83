//! Protocol messages and their signing.
//!
//! A [`VoteMessage`] is what a single cart intent becomes on the wire.
//! Signing is a separate step from building because the keypair lives in
//! the identity, not in the cart: the client signs at publish time with
//! whatever key is active then.

use serde::{Deserialize, Serialize};

use crate::cart::{IntentKind, VoteIntent};
use crate::crypto::keys::{VoterKeypair, VoterPublicKey, VoterSignature};

/// Signing domain tag. Bumped if the byte layout below ever changes.
const SIGNING_DOMAIN: &[u8] = b"quadvote/message/v1";

/// One message of a commit round.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteMessage {
    pub user_state_index: u64,
    /// Vote option. Key changes publish `0`, the protocol's "no option"
    /// slot.
    pub target_id: u64,
    pub weight: u64,
    pub nonce: u64,
    /// Present on key-change messages only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_public_key: Option<VoterPublicKey>,
}

impl VoteMessage {
    /// Builds the message for a nonce-stamped intent.
    ///
    /// Returns `None` if the intent has no nonce yet.
    pub fn from_intent(intent: &VoteIntent, user_state_index: u64) -> Option<Self> {
        let nonce = intent.nonce()?;
        let new_public_key = match intent.kind() {
            IntentKind::KeyChange => intent.new_public_key().cloned(),
            IntentKind::Vote => None,
        };
        Some(Self {
            user_state_index,
            target_id: intent.target_id().unwrap_or(0),
            weight: intent.weight(),
            nonce,
            new_public_key,
        })
    }

    pub fn is_key_change(&self) -> bool {
        self.new_public_key.is_some()
    }

    /// Canonical bytes covered by the signature.
    ///
    /// Layout: domain tag, then `user_state_index`, `target_id`, `weight`,
    /// `nonce` as little-endian u64, then a presence flag and the 32-byte
    /// new public key.
    pub fn signable_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(SIGNING_DOMAIN.len() + 32 + 33);
        buf.extend_from_slice(SIGNING_DOMAIN);
        buf.extend_from_slice(&self.user_state_index.to_le_bytes());
        buf.extend_from_slice(&self.target_id.to_le_bytes());
        buf.extend_from_slice(&self.weight.to_le_bytes());
        buf.extend_from_slice(&self.nonce.to_le_bytes());
        match &self.new_public_key {
            Some(pk) => {
                buf.push(0x01);
                buf.extend_from_slice(pk.as_bytes());
            }
            None => buf.push(0x00),
        }
        buf
    }
}

/// A message plus the signature and the key that produced it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignedMessage {
    pub message: VoteMessage,
    pub signer: VoterPublicKey,
    pub signature: VoterSignature,
}

impl SignedMessage {
    pub fn verify(&self) -> bool {
        self.signer
            .verify(&self.message.signable_bytes(), &self.signature)
    }
}

/// Signs `message` with `keypair`.
pub fn sign_message(message: VoteMessage, keypair: &VoterKeypair) -> SignedMessage {
    let signature = keypair.sign(&message.signable_bytes());
    SignedMessage {
        message,
        signer: keypair.public_key(),
        signature,
    }
}
