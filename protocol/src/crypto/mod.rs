//! # Cryptographic Primitives
//!
//! Thin, typed wrappers over audited implementations:
//!
//! - **Ed25519** (`ed25519-dalek`) signs every vote and key-change message.
//! - **BLAKE3** derives receipt handles.
//!
//! The voting protocol's own cryptography (message encryption, circuit
//! proofs) lives behind [`crate::client::VotingProtocolClient`] and is not
//! reimplemented here.

pub mod hash;
pub mod keys;

pub use hash::{blake3_hash, domain_separated_hash};
pub use keys::{KeyError, VoterKeypair, VoterPublicKey, VoterSignature};
