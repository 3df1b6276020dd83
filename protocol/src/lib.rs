// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # QuadVote Protocol: Core Library
//!
//! A quadratic-voting cart and commit pipeline for an anonymous voting
//! protocol. Voters compose votes whose cost is the square of their
//! weight, collect them in a cart that reserves voice credits up front, and
//! commit the whole cart as one round of signed, nonce-ordered messages.
//! Some messages may be refused while others land; the cart, the ledger
//! and the committed log stay consistent either way.
//!
//! ## Architecture
//!
//! Modules, leaves first:
//!
//! - **config**: Constants, storage keys and [`PipelineConfig`].
//! - **crypto**: Ed25519 voter keys and BLAKE3 helpers.
//! - **credit**: Voice-credit ledger, quadratic cost, pending selection.
//! - **cart**: Vote intents and the ordered cart that reserves for them.
//! - **identity**: The active signing key and staged key changes.
//! - **storage**: Key-value persistence (sled, in-memory) and typed records.
//! - **message**: Canonical vote messages and their signatures.
//! - **client**: Protocol and network traits, plus an in-process devnet.
//! - **pipeline**: Sign-up and commit rounds over a single-writer session.
//!
//! ## Invariants
//!
//! 1. The ledger balance never goes below zero.
//! 2. Every reservation is matched by exactly one refund or one permanent
//!    consumption.
//! 3. In a round over `L` intents, the intent at insertion position `i`
//!    publishes with nonce `L - i`.

pub mod cart;
pub(crate) mod codec;
pub mod client;
pub mod config;
pub mod credit;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod message;
pub mod pipeline;
pub mod storage;

pub use cart::{IntentKind, Receipt, VoteCart, VoteIntent};
pub use client::{
    DevnetCoordinator, NetworkGuard, ProtocolError, StaticNetwork, VotingProtocolClient,
};
pub use config::{PipelineConfig, RefundPolicy};
pub use credit::{cost, CreditLedger, PendingSelection};
pub use error::{VoteError, VoteResult};
pub use pipeline::{CommitPipeline, CommitReport, IntentFailure, SessionSnapshot};
pub use storage::{KeyValueStore, MemoryStore, SignUpState, VoterDB};
