//! # Identity Module
//!
//! The voter's signing identity. Exactly one keypair is active at a time;
//! its secret is persisted under `identitySecret` so the protocol keeps
//! seeing the same voter across restarts.
//!
//! Rotation is two-phase:
//!
//! 1. [`Identity::stage_key_change`] mints a new keypair and a key-change
//!    intent carrying its public key. The active identity is untouched.
//! 2. Once the protocol has accepted that intent, the pipeline calls
//!    [`Identity::rotate`], which persists the new secret and swaps it in.
//!
//! A key change that never commits therefore never changes which key signs.

use tracing::{info, warn};

use crate::cart::VoteIntent;
use crate::config::KEY_IDENTITY_SECRET;
use crate::crypto::keys::{VoterKeypair, VoterPublicKey};
use crate::error::{VoteError, VoteResult};
use crate::storage::{KeyValueStore, StoreError};

/// The active voting identity.
#[derive(Debug, Clone)]
pub struct Identity {
    keypair: VoterKeypair,
}

/// A key-change intent together with the keypair it will activate.
#[derive(Debug, Clone)]
pub struct StagedKeyChange {
    pub intent: VoteIntent,
    pub keypair: VoterKeypair,
}

impl Identity {
    /// Loads the persisted identity, or generates and persists a fresh one
    /// on first run.
    ///
    /// # Errors
    ///
    /// [`VoteError::IdentityMissing`] if a secret is persisted but cannot be
    /// decoded. The store is left untouched.
    pub fn create(store: &dyn KeyValueStore) -> VoteResult<Self> {
        let persisted = match store.get(KEY_IDENTITY_SECRET) {
            Ok(v) => v,
            Err(StoreError::InvalidUtf8(_)) => return Err(VoteError::IdentityMissing),
            Err(e) => return Err(e.into()),
        };

        match persisted {
            Some(secret) => {
                let keypair = VoterKeypair::from_secret_hex(&secret).map_err(|e| {
                    warn!(error = %e, "persisted identity secret is unreadable");
                    VoteError::IdentityMissing
                })?;
                info!(public_key = %keypair.public_key(), "voting key loaded");
                Ok(Self { keypair })
            }
            None => {
                let keypair = VoterKeypair::generate();
                store.put(KEY_IDENTITY_SECRET, &keypair.to_secret_hex())?;
                info!(public_key = %keypair.public_key(), "voting key generated");
                Ok(Self { keypair })
            }
        }
    }

    /// Wraps an existing keypair without touching storage.
    pub fn from_keypair(keypair: VoterKeypair) -> Self {
        Self { keypair }
    }

    pub fn keypair(&self) -> &VoterKeypair {
        &self.keypair
    }

    pub fn public_key(&self) -> VoterPublicKey {
        self.keypair.public_key()
    }

    /// The secret in its persisted form.
    pub fn serialized_secret(&self) -> String {
        self.keypair.to_secret_hex()
    }

    /// Mints a new keypair and the key-change intent announcing it.
    pub fn stage_key_change(&self) -> StagedKeyChange {
        let keypair = VoterKeypair::generate();
        let intent = VoteIntent::key_change(keypair.public_key());
        StagedKeyChange { intent, keypair }
    }

    /// Makes `keypair` the active identity and persists its secret.
    ///
    /// The in-memory swap happens even when persisting fails; an `Err`
    /// means the new secret is not durable yet.
    pub fn rotate(&mut self, keypair: VoterKeypair, store: &dyn KeyValueStore) -> VoteResult<()> {
        info!(
            old = %self.keypair.public_key(),
            new = %keypair.public_key(),
            "voting key rotated"
        );
        let secret = keypair.to_secret_hex();
        self.keypair = keypair;
        store.put(KEY_IDENTITY_SECRET, &secret)?;
        Ok(())
    }
}
