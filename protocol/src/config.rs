//! # Protocol Configuration & Constants
//!
//! Every magic number in QuadVote lives here, together with
//! [`PipelineConfig`], the runtime knobs for the commit pipeline.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Network Identifiers
// ---------------------------------------------------------------------------

/// Ethereum mainnet. The pipeline refuses to sign up or publish here.
pub const NETWORK_ID_MAINNET: u64 = 1;

/// Default network reported by the in-process devnet coordinator.
pub const NETWORK_ID_DEVNET: u64 = 1337;

// ---------------------------------------------------------------------------
// Voice Credits
// ---------------------------------------------------------------------------

/// Starting balance when nothing (or garbage) is persisted under
/// `voiceCredits`. Sign-up replaces it with the protocol's allotment.
pub const DEFAULT_VOICE_CREDITS: u64 = 120;

/// Smallest weight a vote can carry. The pending selection never drops
/// below this.
pub const MIN_VOTE_WEIGHT: u64 = 1;

// ---------------------------------------------------------------------------
// Persistence Keys
// ---------------------------------------------------------------------------

/// JSON array of committed records, integers as decimal strings.
pub const KEY_COMMITTED_VOTES: &str = "committedVotes";

/// Current ledger balance as a decimal string.
pub const KEY_VOICE_CREDITS: &str = "voiceCredits";

/// State index assigned at sign-up, as a decimal string. Its presence
/// doubles as the "signed up" flag.
pub const KEY_USER_STATE_INDEX: &str = "userStateIndex";

/// Hex-encoded Ed25519 secret of the active identity.
pub const KEY_IDENTITY_SECRET: &str = "identitySecret";

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

/// Upper bound on a single `sign_up` or `publish` call. A hung call would
/// otherwise hold the busy flag forever.
pub const DEFAULT_PROTOCOL_CALL_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Pipeline Configuration
// ---------------------------------------------------------------------------

/// What happens to reserved credits when an intent fails to publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundPolicy {
    /// Credits are consumed at `add()` time and stay consumed whether or
    /// not the publish succeeds. The failed intent remains in the cart.
    #[default]
    ChargeOnReserve,
    /// Credits of failed intents are returned to the ledger after the
    /// round. The intent remains in the cart and re-reserves its cost on
    /// the next commit attempt.
    RefundOnFailure,
}

/// Runtime configuration for [`crate::pipeline::CommitPipeline`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Network id on which sign-up and commit are refused.
    pub disallowed_network_id: u64,
    /// Per-call bound for protocol requests.
    #[serde(with = "duration_millis")]
    pub call_timeout: Duration,
    pub refund_policy: RefundPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            disallowed_network_id: NETWORK_ID_MAINNET,
            call_timeout: DEFAULT_PROTOCOL_CALL_TIMEOUT,
            refund_policy: RefundPolicy::default(),
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
