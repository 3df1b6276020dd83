//! # Cart Module: Pending Intents
//!
//! ```text
//! intent.rs      VoteIntent (vote or key change), receipts
//! vote_cart.rs   ordered cart with credit reservation and nonce policy
//! ```
//!
//! The cart is session state. It is never persisted as such: only the
//! ledger balance it has reserved against and, after commit, the
//! committed-record log survive a restart.

pub mod intent;
pub mod vote_cart;

pub use intent::{IntentKind, Receipt, VoteIntent};
pub use vote_cart::{nonce_for, VoteCart};
