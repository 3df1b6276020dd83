//! End-to-end tests for the QuadVote commit pipeline.
//!
//! Each test wires a [`CommitPipeline`] to an in-process devnet coordinator
//! and drives it through sign-up and one or more commit rounds, then checks
//! the cart, the ledger, the committed log and what the coordinator saw.
//! Tests that care about durability run against a sled database in a
//! temporary directory and reopen it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use quadvote_protocol::client::SignUpResponse;
use quadvote_protocol::config::{
    KEY_COMMITTED_VOTES, KEY_USER_STATE_INDEX, KEY_VOICE_CREDITS, NETWORK_ID_MAINNET,
};
use quadvote_protocol::crypto::keys::VoterKeypair;
use quadvote_protocol::identity::Identity;
use quadvote_protocol::message::VoteMessage;
use quadvote_protocol::storage::records;
use quadvote_protocol::{
    CommitPipeline, DevnetCoordinator, IntentKind, KeyValueStore, MemoryStore, PipelineConfig,
    ProtocolError, Receipt, RefundPolicy, StaticNetwork, VoteError, VoteIntent, VoterDB,
    VotingProtocolClient,
};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn open(
    config: PipelineConfig,
    store: Arc<dyn KeyValueStore>,
    devnet: &Arc<DevnetCoordinator>,
) -> CommitPipeline {
    CommitPipeline::open(config, store, devnet.clone(), devnet.clone()).expect("open pipeline")
}

/// Signed-up pipeline over an in-memory store.
async fn setup(config: PipelineConfig) -> (CommitPipeline, Arc<DevnetCoordinator>) {
    let devnet = Arc::new(DevnetCoordinator::new());
    let pipeline = open(config, Arc::new(MemoryStore::new()), &devnet);
    pipeline.sign_up(42).await.expect("sign up");
    (pipeline, devnet)
}

fn vote(target: u64, weight: u64) -> VoteIntent {
    VoteIntent::vote(target, weight).expect("valid vote")
}

/// Publishes through the devnet after a fixed delay.
struct SlowClient {
    inner: Arc<DevnetCoordinator>,
    delay: Duration,
}

#[async_trait]
impl VotingProtocolClient for SlowClient {
    async fn sign_up(
        &self,
        keypair: &VoterKeypair,
        eligibility_token: u64,
    ) -> Result<SignUpResponse, ProtocolError> {
        self.inner.sign_up(keypair, eligibility_token).await
    }

    async fn publish(
        &self,
        keypair: &VoterKeypair,
        message: &VoteMessage,
    ) -> Result<Receipt, ProtocolError> {
        tokio::time::sleep(self.delay).await;
        self.inner.publish(keypair, message).await
    }
}

async fn slow_pipeline(
    delay: Duration,
    timeout: Duration,
) -> (Arc<CommitPipeline>, Arc<DevnetCoordinator>) {
    let devnet = Arc::new(DevnetCoordinator::new());
    let client = Arc::new(SlowClient {
        inner: devnet.clone(),
        delay,
    });
    let config = PipelineConfig {
        call_timeout: timeout,
        ..PipelineConfig::default()
    };
    let pipeline = CommitPipeline::open(
        config,
        Arc::new(MemoryStore::new()),
        client,
        devnet.clone(),
    )
    .expect("open pipeline");
    pipeline.sign_up(1).await.expect("sign up");
    (Arc::new(pipeline), devnet)
}

// ---------------------------------------------------------------------------
// Nonce ordering
// ---------------------------------------------------------------------------

#[tokio::test]
async fn nonces_count_down_from_the_oldest_intent() {
    let (pipeline, devnet) = setup(PipelineConfig::default()).await;
    for target in [10, 20, 30] {
        pipeline.add_to_cart(vote(target, 1)).unwrap();
    }

    let report = pipeline.commit_cart().await.unwrap();
    assert!(report.is_complete());

    let published: Vec<_> = devnet
        .accepted()
        .iter()
        .map(|m| (m.message.target_id, m.message.nonce))
        .collect();
    assert_eq!(published, vec![(10, 3), (20, 2), (30, 1)]);

    let committed: Vec<_> = report
        .committed
        .iter()
        .map(|i| (i.target_id(), i.nonce()))
        .collect();
    assert_eq!(
        committed,
        vec![(Some(10), Some(3)), (Some(20), Some(2)), (Some(30), Some(1))]
    );
    assert!(report.committed.iter().all(|i| i.receipt().is_some()));
    assert!(pipeline.cart().is_empty());
}

// ---------------------------------------------------------------------------
// Partial failure and persistence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn partial_failure_keeps_only_the_failed_intent() {
    let dir = tempfile::tempdir().unwrap();
    let devnet = Arc::new(DevnetCoordinator::new());
    let (a, b, c);
    {
        let db = Arc::new(VoterDB::open(dir.path()).unwrap());
        let pipeline = open(PipelineConfig::default(), db, &devnet);
        pipeline.sign_up(3).await.unwrap();

        a = vote(1, 2);
        b = vote(2, 3);
        c = vote(3, 4);
        for intent in [&a, &b, &c] {
            pipeline.add_to_cart(intent.clone()).unwrap();
        }
        assert_eq!(pipeline.balance(), 120 - 4 - 9 - 16);

        // B carries nonce 2.
        devnet.fail_nonce(2);
        let report = pipeline.commit_cart().await.unwrap();

        assert_eq!(report.committed.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].intent_id, b.id());
        assert_eq!(report.failed[0].nonce, 2);

        let cart = pipeline.cart();
        assert_eq!(cart.len(), 1);
        assert_eq!(cart[0].id(), b.id());
        assert!(cart[0].receipt().is_none());

        // Charge-on-reserve: B's credits stay reserved.
        assert_eq!(report.refunded, 0);
        assert_eq!(pipeline.balance(), 91);
    }

    let db = VoterDB::open(dir.path()).unwrap();
    let raw = db.get(KEY_COMMITTED_VOTES).unwrap().expect("log persisted");
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    let first = &json.as_array().unwrap()[0];
    assert_eq!(first["nonce"], "3");
    assert_eq!(first["weight"], "2");
    assert_eq!(first["reserved_cost"], "4");
    assert_eq!(first["target_id"], "1");

    let log = records::load_committed(&db).unwrap();
    let ids: Vec<_> = log.iter().map(|i| i.id()).collect();
    assert_eq!(ids, vec![a.id(), c.id()]);
    assert_eq!(log[0].nonce(), Some(3));
    assert_eq!(log[1].nonce(), Some(1));
    assert!(log.iter().all(|i| i.receipt().is_some()));
    assert_eq!(records::load_balance(&db).unwrap(), 91);

    let reopened = open(PipelineConfig::default(), Arc::new(db), &devnet);
    assert_eq!(reopened.committed(), log);
    assert!(reopened.cart().is_empty());
    assert_eq!(reopened.balance(), 91);
}

#[tokio::test]
async fn failed_intent_commits_on_the_next_round() {
    let (pipeline, devnet) = setup(PipelineConfig::default()).await;
    pipeline.add_to_cart(vote(1, 1)).unwrap();
    pipeline.add_to_cart(vote(2, 1)).unwrap();
    devnet.fail_nonce(2);
    pipeline.commit_cart().await.unwrap();

    devnet.clear_failures();
    let report = pipeline.commit_cart().await.unwrap();
    assert_eq!(report.committed.len(), 1);
    assert_eq!(report.committed[0].target_id(), Some(1));
    assert_eq!(report.committed[0].nonce(), Some(1));
    assert_eq!(pipeline.committed().len(), 2);
    assert_eq!(pipeline.balance(), 118);
}

#[tokio::test]
async fn requeued_intent_cannot_shadow_the_original() {
    let (pipeline, devnet) = setup(PipelineConfig::default()).await;
    let a = vote(1, 3);
    pipeline.add_to_cart(a.clone()).unwrap();
    assert!(matches!(
        pipeline.add_to_cart(a.clone()),
        Err(VoteError::DuplicateIntent(id)) if id == a.id()
    ));
    assert_eq!(pipeline.cart().len(), 1);
    assert_eq!(pipeline.balance(), 111);

    devnet.fail_nonce(1);
    let report = pipeline.commit_cart().await.unwrap();
    assert!(report.committed.is_empty());
    assert_eq!(report.failed[0].intent_id, a.id());
    assert_eq!(pipeline.cart().len(), 1);
    assert!(pipeline.committed().is_empty());

    devnet.clear_failures();
    let report = pipeline.commit_cart().await.unwrap();
    let record = report.committed[0].clone();
    assert_eq!(record.nonce(), Some(1));
    assert_eq!(devnet.accepted().len(), 1);

    // A committed record handed back to the cart is refused too.
    assert!(matches!(
        pipeline.add_to_cart(record),
        Err(VoteError::DuplicateIntent(_))
    ));
    assert!(pipeline.cart().is_empty());
    assert_eq!(pipeline.balance(), 111);
}

// ---------------------------------------------------------------------------
// Sign-up
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sign_up_overwrites_persisted_balance() {
    let store = Arc::new(MemoryStore::with_entries([(KEY_VOICE_CREDITS, "40")]));
    let devnet = Arc::new(DevnetCoordinator::new());
    let pipeline = open(PipelineConfig::default(), store.clone(), &devnet);
    assert_eq!(pipeline.balance(), 40);
    assert!(!pipeline.sign_up_state().signed_up);

    let state = pipeline.sign_up(5).await.unwrap();
    assert!(state.signed_up);
    assert_eq!(state.user_state_index, Some(1));
    assert_eq!(pipeline.balance(), 120);
    assert_eq!(store.get(KEY_VOICE_CREDITS).unwrap().as_deref(), Some("120"));
    assert_eq!(store.get(KEY_USER_STATE_INDEX).unwrap().as_deref(), Some("1"));
}

#[tokio::test]
async fn second_sign_up_of_same_key_is_rejected() {
    let (pipeline, devnet) = setup(PipelineConfig::default()).await;
    let err = pipeline.sign_up(42).await.unwrap_err();
    assert!(matches!(
        err,
        VoteError::Protocol(ProtocolError::SignUpRejected(_))
    ));
    assert_eq!(devnet.voter_count(), 1);
    assert!(pipeline.sign_up_state().signed_up);
}

// ---------------------------------------------------------------------------
// Network guard
// ---------------------------------------------------------------------------

#[tokio::test]
async fn commit_on_mainnet_touches_nothing() {
    let store = Arc::new(MemoryStore::with_entries([(KEY_USER_STATE_INDEX, "1")]));
    let devnet = Arc::new(DevnetCoordinator::new());
    let pipeline = CommitPipeline::open(
        PipelineConfig::default(),
        store.clone(),
        devnet.clone(),
        Arc::new(StaticNetwork(NETWORK_ID_MAINNET)),
    )
    .unwrap();
    pipeline.add_to_cart(vote(1, 2)).unwrap();

    let err = pipeline.commit_cart().await.unwrap_err();
    assert!(matches!(err, VoteError::NetworkRejected { network_id: 1 }));
    assert_eq!(devnet.publish_attempts(), 0);
    assert_eq!(pipeline.cart()[0].nonce(), None);
    assert_eq!(pipeline.balance(), 116);
    assert!(store.get(KEY_COMMITTED_VOTES).unwrap().is_none());
    assert!(!pipeline.is_busy());
}

// ---------------------------------------------------------------------------
// Re-entrancy and timeouts
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn overlapping_commit_is_rejected_without_double_submission() {
    let (pipeline, devnet) = slow_pipeline(Duration::from_secs(1), Duration::from_secs(30)).await;
    pipeline.add_to_cart(vote(1, 1)).unwrap();
    pipeline.add_to_cart(vote(2, 1)).unwrap();

    let (first, second) = tokio::join!(pipeline.commit_cart(), pipeline.commit_cart());

    let first = first.unwrap();
    assert_eq!(first.committed.len(), 2);
    assert!(matches!(second, Err(VoteError::Busy)));
    assert_eq!(devnet.publish_attempts(), 2);
    assert_eq!(pipeline.committed().len(), 2);
    assert!(!pipeline.is_busy());
}

#[tokio::test(start_paused = true)]
async fn sign_up_during_commit_is_busy() {
    let (pipeline, _devnet) = slow_pipeline(Duration::from_secs(1), Duration::from_secs(30)).await;
    pipeline.add_to_cart(vote(1, 1)).unwrap();

    let (commit, sign_up) = tokio::join!(pipeline.commit_cart(), pipeline.sign_up(9));
    assert!(commit.unwrap().is_complete());
    assert!(matches!(sign_up, Err(VoteError::Busy)));
}

#[tokio::test(start_paused = true)]
async fn publish_timeout_is_a_per_intent_failure() {
    let (pipeline, devnet) = slow_pipeline(Duration::from_secs(60), Duration::from_secs(5)).await;
    pipeline.add_to_cart(vote(1, 1)).unwrap();
    pipeline.add_to_cart(vote(2, 2)).unwrap();

    let report = pipeline.commit_cart().await.unwrap();
    assert!(report.committed.is_empty());
    assert_eq!(report.failed.len(), 2);
    assert!(report.failed.iter().all(|f| f.reason.contains("timed out")));
    assert_eq!(devnet.accepted().len(), 0);
    assert_eq!(pipeline.cart().len(), 2);
    assert_eq!(pipeline.balance(), 115);
    assert!(!pipeline.is_busy());
}

// ---------------------------------------------------------------------------
// Refund policy
// ---------------------------------------------------------------------------

#[tokio::test]
async fn refund_on_failure_returns_exactly_the_failed_costs() {
    let config = PipelineConfig {
        refund_policy: RefundPolicy::RefundOnFailure,
        ..PipelineConfig::default()
    };
    let (pipeline, devnet) = setup(config).await;
    pipeline.add_to_cart(vote(1, 2)).unwrap();
    pipeline.add_to_cart(vote(2, 3)).unwrap();
    pipeline.add_to_cart(vote(3, 4)).unwrap();
    devnet.fail_nonce(3);
    devnet.fail_nonce(1);

    let report = pipeline.commit_cart().await.unwrap();
    assert_eq!(report.committed.len(), 1);
    assert_eq!(report.refunded, 4 + 16);
    assert_eq!(pipeline.balance(), 120 - 9);
    assert_eq!(report.balance, 111);

    // Withdrawing a refunded intent must not refund it twice.
    pipeline.remove_from_cart(0).unwrap();
    assert_eq!(pipeline.balance(), 111);
}

// ---------------------------------------------------------------------------
// Key change
// ---------------------------------------------------------------------------

#[tokio::test]
async fn committed_key_change_rotates_identity() {
    let dir = tempfile::tempdir().unwrap();
    let devnet = Arc::new(DevnetCoordinator::new());
    let new_key;
    {
        let db = Arc::new(VoterDB::open(dir.path()).unwrap());
        let pipeline = open(PipelineConfig::default(), db, &devnet);
        pipeline.sign_up(1).await.unwrap();
        let old_key = pipeline.public_key();

        pipeline.stage_key_change().unwrap();
        new_key = pipeline.cart()[0].new_public_key().cloned().unwrap();
        assert_eq!(pipeline.public_key(), old_key);

        // Signed with the new key after the rotation lands.
        pipeline.add_to_cart(vote(5, 2)).unwrap();
        let report = pipeline.commit_cart().await.unwrap();

        assert!(report.is_complete());
        assert_eq!(report.committed[0].kind(), IntentKind::KeyChange);
        assert_eq!(pipeline.public_key(), new_key);
        assert_eq!(devnet.registered_key(1), Some(new_key.clone()));

        let accepted = devnet.accepted();
        assert_eq!(accepted[0].signer, old_key);
        assert_eq!(accepted[1].signer, new_key);
    }

    let db = VoterDB::open(dir.path()).unwrap();
    assert_eq!(Identity::create(&db).unwrap().public_key(), new_key);
}

#[tokio::test]
async fn failed_key_change_leaves_identity_alone() {
    let (pipeline, devnet) = setup(PipelineConfig::default()).await;
    let old_key = pipeline.public_key();
    pipeline.stage_key_change().unwrap();
    devnet.fail_nonce(1);

    let report = pipeline.commit_cart().await.unwrap();
    assert_eq!(report.failed.len(), 1);
    assert_eq!(pipeline.public_key(), old_key);
    assert_eq!(devnet.registered_key(1), Some(old_key));
    assert_eq!(pipeline.cart().len(), 1);
}

// ---------------------------------------------------------------------------
// Selection guards
// ---------------------------------------------------------------------------

#[tokio::test]
async fn compose_select_and_commit() {
    let (pipeline, devnet) = setup(PipelineConfig::default()).await;
    assert!(!pipeline.select_target(8));

    pipeline.set_eligibility(Some(77));
    assert!(pipeline.select_target(8));
    assert!(pipeline.increment_pending());
    assert!(pipeline.increment_pending());
    assert!(pipeline.decrement_pending());
    assert_eq!(pipeline.add_pending_vote().unwrap(), 1);
    assert_eq!(pipeline.balance(), 116);

    let snapshot = pipeline.snapshot();
    assert_eq!(snapshot.selected_target, None);
    assert_eq!(snapshot.pending_weight, 1);

    pipeline.commit_cart().await.unwrap();
    let accepted = devnet.accepted();
    assert_eq!(accepted[0].message.target_id, 8);
    assert_eq!(accepted[0].message.weight, 2);
}
