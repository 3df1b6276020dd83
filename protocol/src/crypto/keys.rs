//! # Voting Key Material
//!
//! Ed25519 keypairs used to sign vote and key-change messages.
//!
//! A voter has exactly one active keypair at a time. The secret half is
//! persisted as a hex string under the `identitySecret` key so the same
//! identity survives restarts; a key-change intent stages a fresh keypair
//! that only becomes active once the protocol has accepted the change.
//!
//! ## Security considerations
//!
//! - Keys are generated from `OsRng`.
//! - Secret bytes are never logged. `Debug` prints the public half only.

use ed25519_dalek::{
    Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey, SECRET_KEY_LENGTH,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;

/// Errors that can occur during key operations. Messages never include
/// key bytes.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid secret key encoding")]
    InvalidSecretKey,

    #[error("invalid public key bytes: not a valid Ed25519 point")]
    InvalidPublicKey,
}

/// The voter's signing keypair.
///
/// `VoterKeypair` does NOT implement `Serialize`. Persisting the secret is
/// an explicit call to [`to_secret_hex`](Self::to_secret_hex).
///
/// # Examples
///
/// ```
/// use quadvote_protocol::crypto::keys::VoterKeypair;
///
/// let kp = VoterKeypair::generate();
/// let msg = b"vote 3 for option 7";
/// let sig = kp.sign(msg);
/// assert!(kp.public_key().verify(msg, &sig));
/// ```
pub struct VoterKeypair {
    signing_key: SigningKey,
}

/// The public half of a voting identity. This is what the protocol
/// registers at sign-up and what a key-change message carries.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoterPublicKey {
    #[serde(with = "hex_bytes")]
    bytes: [u8; 32],
}

/// An Ed25519 signature over a canonical vote message.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterSignature {
    bytes: Vec<u8>,
}

impl VoterKeypair {
    /// Generate a fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Deterministic construction from a 32-byte seed. Tests and fixtures
    /// use this; production identities come from [`generate`](Self::generate).
    pub fn from_seed(seed: &[u8; SECRET_KEY_LENGTH]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Reconstruct a keypair from the hex form written by
    /// [`to_secret_hex`](Self::to_secret_hex).
    pub fn from_secret_hex(hex_str: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_str.trim()).map_err(|_| KeyError::InvalidSecretKey)?;
        let arr: [u8; SECRET_KEY_LENGTH] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidSecretKey)?;
        Ok(Self::from_seed(&arr))
    }

    /// Serialized secret, suitable for the `identitySecret` storage key.
    ///
    /// **Handle with care.** Anyone holding this string can vote as you.
    pub fn to_secret_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    pub fn public_key(&self) -> VoterPublicKey {
        VoterPublicKey {
            bytes: self.signing_key.verifying_key().to_bytes(),
        }
    }

    /// Sign a message. Ed25519 is deterministic: same key and message,
    /// same signature.
    pub fn sign(&self, message: &[u8]) -> VoterSignature {
        VoterSignature {
            bytes: self.signing_key.sign(message).to_bytes().to_vec(),
        }
    }
}

impl Clone for VoterKeypair {
    fn clone(&self) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&self.signing_key.to_bytes()),
        }
    }
}

impl fmt::Debug for VoterKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VoterKeypair(pub={})", self.public_key().to_hex())
    }
}

impl PartialEq for VoterKeypair {
    /// Compares public keys only; secret material is never compared in
    /// variable time.
    fn eq(&self, other: &Self) -> bool {
        self.public_key() == other.public_key()
    }
}

impl Eq for VoterKeypair {}

// ---------------------------------------------------------------------------
// VoterPublicKey
// ---------------------------------------------------------------------------

impl VoterPublicKey {
    /// Validates that the bytes are a real Ed25519 point before accepting
    /// them.
    pub fn try_from_slice(slice: &[u8]) -> Result<Self, KeyError> {
        let bytes: [u8; 32] = slice.try_into().map_err(|_| KeyError::InvalidPublicKey)?;
        VerifyingKey::from_bytes(&bytes).map_err(|_| KeyError::InvalidPublicKey)?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// Returns `false` on any failure, including a malformed signature.
    pub fn verify(&self, message: &[u8], signature: &VoterSignature) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(&self.bytes) else {
            return false;
        };
        let Ok(sig_bytes) = <[u8; 64]>::try_from(signature.bytes.as_slice()) else {
            return false;
        };
        verifying_key
            .verify(message, &DalekSignature::from_bytes(&sig_bytes))
            .is_ok()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(s).map_err(|_| KeyError::InvalidPublicKey)?;
        Self::try_from_slice(&bytes)
    }
}

impl Hash for VoterPublicKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bytes.hash(state);
    }
}

impl fmt::Display for VoterPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for VoterPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VoterPublicKey({})", &self.to_hex()[..16])
    }
}

// ---------------------------------------------------------------------------
// VoterSignature
// ---------------------------------------------------------------------------

impl VoterSignature {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// 128 hex characters for a well-formed signature.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }
}

impl fmt::Debug for VoterSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex_str = self.to_hex();
        if hex_str.len() >= 128 {
            write!(f, "VoterSignature({}...{})", &hex_str[..8], &hex_str[120..])
        } else {
            write!(f, "VoterSignature({})", hex_str)
        }
    }
}

/// Public keys travel as hex strings in JSON (committed log, HTTP API).
mod hex_bytes {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(D::Error::custom)?;
        bytes
            .as_slice()
            .try_into()
            .map_err(|_| D::Error::custom("public key must be 32 bytes"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verify_roundtrip() {
        let kp = VoterKeypair::generate();
        let sig = kp.sign(b"vote");
        assert!(kp.public_key().verify(b"vote", &sig));
    }

    #[test]
    fn wrong_message_fails_verification() {
        let kp = VoterKeypair::generate();
        let sig = kp.sign(b"weight=3");
        assert!(!kp.public_key().verify(b"weight=4", &sig));
    }

    #[test]
    fn wrong_key_fails_verification() {
        let kp1 = VoterKeypair::generate();
        let kp2 = VoterKeypair::generate();
        let sig = kp1.sign(b"message");
        assert!(!kp2.public_key().verify(b"message", &sig));
    }

    #[test]
    fn secret_hex_roundtrip() {
        let kp = VoterKeypair::generate();
        let restored = VoterKeypair::from_secret_hex(&kp.to_secret_hex()).unwrap();
        assert_eq!(kp, restored);
    }

    #[test]
    fn malformed_secret_rejected() {
        assert!(VoterKeypair::from_secret_hex("deadbeef").is_err());
        assert!(VoterKeypair::from_secret_hex("not-hex-at-all").is_err());
        assert!(VoterKeypair::from_secret_hex("").is_err());
    }

    #[test]
    fn public_key_hex_roundtrip() {
        let pk = VoterKeypair::generate().public_key();
        assert_eq!(VoterPublicKey::from_hex(&pk.to_hex()).unwrap(), pk);
    }

    #[test]
    fn public_key_json_is_hex_string() {
        let pk = VoterKeypair::from_seed(&[7u8; 32]).public_key();
        let json = serde_json::to_string(&pk).unwrap();
        assert_eq!(json, format!("\"{}\"", pk.to_hex()));
        let back: VoterPublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pk);
    }

    #[test]
    fn try_from_slice_rejects_wrong_length() {
        assert!(VoterPublicKey::try_from_slice(&[0u8; 16]).is_err());
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let kp = VoterKeypair::generate();
        let debug_str = format!("{:?}", kp);
        assert!(debug_str.starts_with("VoterKeypair(pub="));
        assert!(!debug_str.contains(&kp.to_secret_hex()));
    }

    #[test]
    fn deterministic_from_seed() {
        let a = VoterKeypair::from_seed(&[42u8; 32]);
        let b = VoterKeypair::from_seed(&[42u8; 32]);
        assert_eq!(a.public_key(), b.public_key());
        assert_eq!(a.sign(b"x").as_bytes(), b.sign(b"x").as_bytes());
    }
}
