//! Error taxonomy for the cart, ledger and commit pipeline.
//!
//! Every fallible QuadVote operation returns a [`VoteError`]. Where an
//! error is raised determines how far it travels:
//!
//! - ledger and cart errors leave state untouched and go straight back to
//!   the caller,
//! - publish errors are caught per intent inside a commit round and show
//!   up in the [`CommitReport`](crate::pipeline::CommitReport),
//! - network rejection aborts an operation before anything is mutated.

use thiserror::Error;
use uuid::Uuid;

use crate::client::ProtocolError;
use crate::storage::StoreError;

/// Errors produced by QuadVote operations.
#[derive(Debug, Error)]
pub enum VoteError {
    /// The active network is the one the pipeline refuses to touch.
    #[error("operation refused on network {network_id}")]
    NetworkRejected {
        /// The network id reported by the guard.
        network_id: u64,
    },

    /// A reservation would drive the balance below zero.
    #[error("insufficient voice credits: available {available}, requested {requested}")]
    InsufficientCredits {
        /// Current ledger balance.
        available: u64,
        /// Cost that was asked for.
        requested: u64,
    },

    /// One intent's publish failed. Local to that intent.
    #[error("submission with nonce {nonce} failed: {reason}")]
    SubmissionFailure {
        /// Nonce the intent was published with.
        nonce: u64,
        /// Protocol error or timeout description.
        reason: String,
    },

    /// A persisted value could not be decoded or encoded.
    #[error("serialization failure for `{key}`: {reason}")]
    SerializationFailure {
        /// Storage key that was being read or written.
        key: String,
        /// Decoder/encoder message.
        reason: String,
    },

    /// No usable signing key. Fatal to any protocol call.
    #[error("no usable identity key material")]
    IdentityMissing,

    /// A sign-up or commit round is already outstanding.
    #[error("another sign-up or commit round is in progress")]
    Busy,

    #[error("voter has not signed up")]
    NotSignedUp,

    /// Vote weights start at 1.
    #[error("invalid vote weight {0}: must be at least 1")]
    InvalidWeight(u64),

    #[error("no vote target selected")]
    NoTargetSelected,

    #[error("no cart intent at index {0}")]
    IntentNotFound(usize),

    /// The intent is already in the cart or already carries a receipt.
    #[error("intent {0} is already queued or committed")]
    DuplicateIntent(Uuid),

    /// Credit arithmetic left the `u64` range.
    #[error("voice credit arithmetic overflow")]
    Overflow,

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Convenience alias used across the crate.
pub type VoteResult<T> = Result<T, VoteError>;
