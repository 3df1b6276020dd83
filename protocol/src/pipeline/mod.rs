//! # Pipeline Module: Sign-Up and Commit Rounds
//!
//! [`CommitPipeline`] owns a voter session and drives it against the voting
//! protocol. Local operations (selecting, composing, adding, removing) are
//! synchronous and take the session lock briefly. The two protocol
//! operations, [`sign_up`](CommitPipeline::sign_up) and
//! [`commit_cart`](CommitPipeline::commit_cart), are async and serialized
//! by a [`BusyFlag`].
//!
//! ## Commit round
//!
//! ```text
//! network check ─► busy flag ─► stamp nonces (L-i) ─► publish each intent
//!                                                      │  ok:  receipt, log
//!                                                      │  err: stays in cart
//!                                                      ▼
//!                  persist log + balance ◄─ refund policy ◄─ drop committed
//! ```
//!
//! Publishes run strictly in insertion order, one at a time, each bounded
//! by [`PipelineConfig::call_timeout`]. A failed or timed-out publish only
//! affects its own intent.

pub mod busy;
pub mod report;
pub mod session;

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cart::{Receipt, VoteIntent};
use crate::client::{NetworkGuard, ProtocolError, VotingProtocolClient};
use crate::config::{PipelineConfig, RefundPolicy};
use crate::crypto::keys::{VoterKeypair, VoterPublicKey};
use crate::error::{VoteError, VoteResult};
use crate::message::VoteMessage;
use crate::storage::{records, KeyValueStore, SignUpState};

pub use busy::{BusyFlag, BusyGuard};
pub use report::{CommitReport, IntentFailure};
pub use session::{Session, SessionSnapshot};

/// Drives one voter's cart through the voting protocol.
pub struct CommitPipeline {
    config: PipelineConfig,
    store: Arc<dyn KeyValueStore>,
    client: Arc<dyn VotingProtocolClient>,
    guard: Arc<dyn NetworkGuard>,
    session: Mutex<Session>,
    busy: BusyFlag,
}

/// What a commit round publishes, captured under the session lock.
struct Round {
    user_state_index: u64,
    keypair: VoterKeypair,
    intents: Vec<VoteIntent>,
    /// Intents that could not re-reserve their credits and are skipped.
    skipped: Vec<IntentFailure>,
}

impl CommitPipeline {
    /// Restores the session from `store` and wires up the collaborators.
    ///
    /// # Errors
    ///
    /// [`VoteError::IdentityMissing`] if a persisted identity secret is
    /// unreadable, or a storage error if the backend fails.
    pub fn open(
        config: PipelineConfig,
        store: Arc<dyn KeyValueStore>,
        client: Arc<dyn VotingProtocolClient>,
        guard: Arc<dyn NetworkGuard>,
    ) -> VoteResult<Self> {
        let session = Session::load(store.as_ref())?;
        info!(
            public_key = %session.identity.public_key(),
            balance = session.ledger.balance(),
            signed_up = session.sign_up.signed_up,
            refund_policy = ?config.refund_policy,
            "commit pipeline opened"
        );
        Ok(Self {
            config,
            store,
            client,
            guard,
            session: Mutex::new(session),
            busy: BusyFlag::new(),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn is_busy(&self) -> bool {
        self.busy.is_busy()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.session.lock().snapshot()
    }

    pub fn balance(&self) -> u64 {
        self.session.lock().ledger.balance()
    }

    pub fn cart(&self) -> Vec<VoteIntent> {
        self.session.lock().cart.intents().to_vec()
    }

    pub fn committed(&self) -> Vec<VoteIntent> {
        self.session.lock().committed.clone()
    }

    pub fn sign_up_state(&self) -> SignUpState {
        self.session.lock().sign_up
    }

    pub fn public_key(&self) -> VoterPublicKey {
        self.session.lock().identity.public_key()
    }

    /// Sets or clears the eligibility credential. Clearing it also drops
    /// the selected target.
    pub fn set_eligibility(&self, token: Option<u64>) {
        let mut session = self.session.lock();
        session.eligibility = token;
        if token.is_none() {
            session.selected = None;
        }
    }

    pub fn select_target(&self, target_id: u64) -> bool {
        let selected = self.session.lock().select_target(target_id);
        if !selected {
            debug!(target_id, "selection ignored: not eligible or not signed up");
        }
        selected
    }

    pub fn increment_pending(&self) -> bool {
        self.session.lock().increment_pending()
    }

    pub fn decrement_pending(&self) -> bool {
        self.session.lock().decrement_pending()
    }

    /// Adds a prepared intent. Allowed during a round; the intent waits for
    /// the next one.
    pub fn add_to_cart(&self, intent: VoteIntent) -> VoteResult<usize> {
        self.session.lock().add(intent)
    }

    pub fn add_pending_vote(&self) -> VoteResult<usize> {
        self.session.lock().add_pending_vote()
    }

    /// Withdraws the intent at `index`, refunding whatever it still holds.
    ///
    /// # Errors
    ///
    /// [`VoteError::Busy`] while a round is outstanding, since positions
    /// are about to shift. [`VoteError::IntentNotFound`] for a bad index.
    pub fn remove_from_cart(&self, index: usize) -> VoteResult<VoteIntent> {
        let _busy = self.busy.try_acquire().ok_or(VoteError::Busy)?;
        self.session.lock().remove(index)
    }

    pub fn stage_key_change(&self) -> VoteResult<usize> {
        self.session.lock().stage_key_change()
    }

    /// Registers the voter and adopts the protocol's credit allotment.
    pub async fn sign_up(&self, eligibility_token: u64) -> VoteResult<SignUpState> {
        self.check_network().await?;
        let _busy = self.busy.try_acquire().ok_or(VoteError::Busy)?;

        let keypair = self.session.lock().identity.keypair().clone();
        let response = self
            .bounded(self.client.sign_up(&keypair, eligibility_token))
            .await
            .map_err(|e| {
                warn!(error = %e, "sign-up failed");
                VoteError::Protocol(e)
            })?;

        // The state index marks the voter as signed up on reload, so it goes
        // last.
        records::save_balance(self.store.as_ref(), response.voice_credits)?;
        records::save_user_state_index(self.store.as_ref(), response.user_state_index)?;
        self.store.flush()?;

        let mut session = self.session.lock();
        session.sign_up = SignUpState::registered(response.user_state_index);
        session.set_authoritative_balance(response.voice_credits);
        info!(
            user_state_index = response.user_state_index,
            voice_credits = response.voice_credits,
            "signed up"
        );
        Ok(session.sign_up)
    }

    /// Publishes every intent in the cart as one round.
    ///
    /// # Errors
    ///
    /// Only round-level failures are errors: network rejection, `Busy`,
    /// `NotSignedUp`, and storage failures. Per-intent publish failures are
    /// listed in the returned [`CommitReport`].
    pub async fn commit_cart(&self) -> VoteResult<CommitReport> {
        self.check_network().await?;
        let _busy = self.busy.try_acquire().ok_or(VoteError::Busy)?;

        let Some(round) = self.prepare_round()? else {
            return Ok(CommitReport {
                balance: self.balance(),
                ..CommitReport::default()
            });
        };
        info!(
            intents = round.intents.len(),
            user_state_index = round.user_state_index,
            "commit round started"
        );

        let mut report = CommitReport {
            failed: round.skipped,
            ..CommitReport::default()
        };
        let skipped: HashSet<Uuid> = report.failed.iter().map(|f| f.intent_id).collect();
        let mut keypair = round.keypair;

        for intent in round.intents.iter().filter(|i| !skipped.contains(&i.id())) {
            let nonce = intent.nonce().unwrap_or_default();
            let outcome = match VoteMessage::from_intent(intent, round.user_state_index) {
                Some(message) => self.bounded(self.client.publish(&keypair, &message)).await,
                None => Err(ProtocolError::Rejected("intent has no nonce".into())),
            };
            match outcome {
                Ok(receipt) => {
                    debug!(intent = %intent.id(), nonce, receipt = %receipt, "intent published");
                    if let Some(next) = self.apply_success(intent.id(), receipt, &mut report) {
                        keypair = next;
                    }
                }
                Err(e) => {
                    let failure = VoteError::SubmissionFailure {
                        nonce,
                        reason: e.to_string(),
                    };
                    warn!(intent = %intent.id(), error = %failure, "intent not published");
                    report.failed.push(IntentFailure {
                        intent_id: intent.id(),
                        nonce,
                        reason: e.to_string(),
                    });
                }
            }
        }

        self.finish_round(&mut report)?;
        info!(
            committed = report.committed.len(),
            failed = report.failed.len(),
            refunded = report.refunded,
            balance = report.balance,
            "commit round finished"
        );
        Ok(report)
    }

    /// Stamps nonces and snapshots what to publish. `None` for an empty
    /// cart.
    fn prepare_round(&self) -> VoteResult<Option<Round>> {
        let mut guard = self.session.lock();
        let session = &mut *guard;
        let user_state_index = session.user_state_index().ok_or(VoteError::NotSignedUp)?;
        if session.cart.is_empty() {
            debug!("commit requested with an empty cart");
            return Ok(None);
        }

        let intents = session.cart.assign_nonces();
        let mut skipped = Vec::new();
        for intent in intents.iter().filter(|i| !i.credits_held()) {
            match session.ledger.reserve(intent.reserved_cost()) {
                Ok(_) => {
                    if let Some(entry) = session.cart.get_mut(intent.id()) {
                        entry.set_credits_held(true);
                    }
                }
                Err(e) => {
                    warn!(intent = %intent.id(), error = %e, "retry could not re-reserve credits");
                    skipped.push(IntentFailure {
                        intent_id: intent.id(),
                        nonce: intent.nonce().unwrap_or_default(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(Some(Round {
            user_state_index,
            keypair: session.identity.keypair().clone(),
            intents,
            skipped,
        }))
    }

    /// Records a receipt. Returns the new signing keypair when the intent
    /// was a key change.
    fn apply_success(
        &self,
        id: Uuid,
        receipt: Receipt,
        report: &mut CommitReport,
    ) -> Option<VoterKeypair> {
        let mut guard = self.session.lock();
        let session = &mut *guard;
        let entry = session.cart.get_mut(id)?;
        entry.mark_committed(receipt);
        let record = entry.clone();
        session.committed.push(record.clone());
        report.committed.push(record);

        let keypair = session.staged_keys.remove(&id)?;
        if let Err(e) = session.identity.rotate(keypair.clone(), self.store.as_ref()) {
            warn!(error = %e, "rotated key could not be persisted");
        }
        Some(keypair)
    }

    fn finish_round(&self, report: &mut CommitReport) -> VoteResult<()> {
        let mut guard = self.session.lock();
        let session = &mut *guard;

        let committed: HashSet<Uuid> = report.committed.iter().map(|i| i.id()).collect();
        session.cart.remove_committed(&committed);

        if self.config.refund_policy == RefundPolicy::RefundOnFailure {
            for failure in &report.failed {
                let Some(entry) = session.cart.get_mut(failure.intent_id) else {
                    continue;
                };
                if !entry.credits_held() {
                    continue;
                }
                session.ledger.refund(entry.reserved_cost())?;
                entry.set_credits_held(false);
                report.refunded += entry.reserved_cost();
            }
        }

        let balance = session.ledger.balance();
        let persisted = records::save_committed(self.store.as_ref(), &session.committed)
            .and_then(|_| records::save_balance(self.store.as_ref(), balance))
            .and_then(|_| self.store.flush().map_err(VoteError::from));
        if let Err(e) = persisted {
            let committed: Vec<String> = report
                .committed
                .iter()
                .map(|i| format!("{}@{}", i.id(), i.nonce().unwrap_or_default()))
                .collect();
            warn!(
                error = %e,
                balance,
                committed = ?committed,
                "commit round outcome not persisted"
            );
            return Err(e);
        }
        report.balance = balance;
        Ok(())
    }

    async fn check_network(&self) -> VoteResult<()> {
        let network_id = self.bounded(self.guard.current_network_id()).await?;
        if network_id == self.config.disallowed_network_id {
            warn!(network_id, "refusing to operate on disallowed network");
            return Err(VoteError::NetworkRejected { network_id });
        }
        Ok(())
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, ProtocolError>
    where
        F: Future<Output = Result<T, ProtocolError>>,
    {
        let limit = self.config.call_timeout;
        tokio::time::timeout(limit, call)
            .await
            .unwrap_or(Err(ProtocolError::Timeout(limit)))
    }
}
