//! # Storage Module
//!
//! Durable key-value persistence for a voter's session.
//!
//! ```text
//! db.rs        VoterDB: sled-backed store
//! memory.rs    MemoryStore: HashMap behind a lock
//! records.rs   typed load/save of balance, sign-up, committed log
//! ```
//!
//! Everything above this layer talks to a `&dyn KeyValueStore` with
//! string keys and string values. Typed decoding lives in `records.rs`,
//! which is also where unreadable values get replaced by safe defaults.

pub mod db;
pub mod memory;
pub mod records;

pub use db::VoterDB;
pub use memory::MemoryStore;
pub use records::SignUpState;

/// Errors raised by a storage backend.
///
/// A value that is present but undecodable is *not* a `StoreError`; the
/// typed loaders in [`records`] recover from those with defaults.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("value for `{0}` is not valid UTF-8")]
    InvalidUtf8(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable string key-value store.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> StoreResult<Option<String>>;

    fn put(&self, key: &str, value: &str) -> StoreResult<()>;

    fn remove(&self, key: &str) -> StoreResult<()>;

    /// Make previous writes durable. No-op for volatile backends.
    fn flush(&self) -> StoreResult<()> {
        Ok(())
    }
}
