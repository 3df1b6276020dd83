//! # Client Module: External Collaborators
//!
//! The pipeline talks to the outside world through two traits:
//!
//! - [`VotingProtocolClient`] registers the voter and publishes signed
//!   messages to the anonymous voting protocol.
//! - [`NetworkGuard`] reports which network is active so the pipeline can
//!   refuse to run against production.
//!
//! Both are async and object-safe (`async-trait`), so the pipeline holds
//! them as `Arc<dyn ...>`. [`devnet::DevnetCoordinator`] implements both
//! in-process.

pub mod devnet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::cart::Receipt;
use crate::crypto::keys::VoterKeypair;
use crate::message::VoteMessage;

pub use devnet::DevnetCoordinator;

/// Failures reported by (or on the way to) the voting protocol.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The protocol refused the registration.
    #[error("sign-up rejected: {0}")]
    SignUpRejected(String),

    /// The protocol refused a message.
    #[error("message rejected: {0}")]
    Rejected(String),

    /// The request never got a verdict (connection, RPC, provider).
    #[error("transport error: {0}")]
    Transport(String),

    /// The call did not finish within the configured bound.
    #[error("call timed out after {0:?}")]
    Timeout(Duration),
}

/// What a successful sign-up hands back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignUpResponse {
    pub user_state_index: u64,
    pub voice_credits: u64,
}

/// The anonymous voting protocol, as seen by the pipeline.
#[async_trait]
pub trait VotingProtocolClient: Send + Sync {
    /// Registers `keypair`'s public key, proving eligibility with
    /// `eligibility_token`.
    async fn sign_up(
        &self,
        keypair: &VoterKeypair,
        eligibility_token: u64,
    ) -> Result<SignUpResponse, ProtocolError>;

    /// Signs `message` with `keypair` and submits it.
    async fn publish(
        &self,
        keypair: &VoterKeypair,
        message: &VoteMessage,
    ) -> Result<Receipt, ProtocolError>;
}

/// Reports the active network.
#[async_trait]
pub trait NetworkGuard: Send + Sync {
    async fn current_network_id(&self) -> Result<u64, ProtocolError>;
}

/// A guard that always reports the same network. The node uses this when
/// the network is fixed by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticNetwork(pub u64);

#[async_trait]
impl NetworkGuard for StaticNetwork {
    async fn current_network_id(&self) -> Result<u64, ProtocolError> {
        Ok(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_network_reports_configured_id() {
        assert_eq!(StaticNetwork(5).current_network_id().await.unwrap(), 5);
    }

    #[test]
    fn timeout_error_mentions_duration() {
        let msg = ProtocolError::Timeout(Duration::from_millis(1500)).to_string();
        assert!(msg.contains("1.5s"), "{msg}");
    }
}
