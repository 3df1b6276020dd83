//! # Hashing Utilities
//!
//! BLAKE3 is the only hash in QuadVote. It derives receipt handles from
//! signed vote messages and nothing else, so the surface stays small.

/// Domain tag for receipts issued by the devnet coordinator.
pub const RECEIPT_CONTEXT: &str = "quadvote 2026-01 publish receipt";

/// Compute the BLAKE3 hash of the input data.
///
/// ```
/// use quadvote_protocol::crypto::blake3_hash;
///
/// assert_eq!(blake3_hash(b"quadvote").len(), 32);
/// ```
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Domain-separated BLAKE3 using `derive_key` mode.
///
/// Two different contexts never collide even on identical `data`, because
/// the context string selects a different internal IV.
pub fn domain_separated_hash(context: &str, data: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    hasher.update(data);
    *hasher.finalize().as_bytes()
}
