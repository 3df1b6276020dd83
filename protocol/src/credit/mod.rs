//! # Credit Module: Voice Credits & Quadratic Cost
//!
//! Voice credits are the voter's finite budget. A vote of weight `w`
//! costs `w²` credits, so concentrating influence on one option gets
//! expensive fast.
//!
//! ```text
//! ledger.rs    spendable balance: reserve / refund / authoritative overwrite
//! pending.rs   the vote being composed: weight ± 1, gated by the balance
//! ```
//!
//! All amounts are `u64`. Arithmetic is checked; an overflow is an error,
//! never a wrap.

pub mod ledger;
pub mod pending;

pub use ledger::{cost, CreditLedger};
pub use pending::PendingSelection;
