//! # VoterDB: sled-backed Persistence
//!
//! Durable [`KeyValueStore`] for a single voter's session, built on sled's
//! embedded key-value store.
//!
//! ## Tree Layout
//!
//! | Tree      | Key (UTF-8)        | Value (UTF-8)                     |
//! |-----------|--------------------|-----------------------------------|
//! | `session` | `committedVotes`   | JSON array of committed intents   |
//! | `session` | `voiceCredits`     | decimal balance                   |
//! | `session` | `userStateIndex`   | decimal state index               |
//! | `session` | `identitySecret`   | hex Ed25519 secret                |
//!
//! Values are plain strings so that a store written here reads the same as
//! any other key-value backend behind the trait.

use sled::{Db, Tree};
use std::path::Path;

use super::{KeyValueStore, StoreError, StoreResult};

/// Persistent storage engine for one voter.
///
/// sled is thread-safe; `VoterDB` can be shared via `Arc` without extra
/// locking.
#[derive(Debug, Clone)]
pub struct VoterDB {
    db: Db,
    session: Tree,
}

impl VoterDB {
    /// Open or create a database at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// In-memory database removed on drop. For tests.
    pub fn open_temporary() -> StoreResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> StoreResult<Self> {
        let session = db.open_tree("session")?;
        Ok(Self { db, session })
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.session.len()
    }

    pub fn is_empty(&self) -> bool {
        self.session.is_empty()
    }
}

impl KeyValueStore for VoterDB {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        match self.session.get(key.as_bytes())? {
            Some(bytes) => String::from_utf8(bytes.to_vec())
                .map(Some)
                .map_err(|_| StoreError::InvalidUtf8(key.to_string())),
            None => Ok(None),
        }
    }

    fn put(&self, key: &str, value: &str) -> StoreResult<()> {
        self.session.insert(key.as_bytes(), value.as_bytes())?;
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        self.session.remove(key.as_bytes())?;
        Ok(())
    }

    /// Blocks until every buffered write is durable.
    fn flush(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }
}
