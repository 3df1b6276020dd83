//! Typed records on top of the string store.
//!
//! Reads never fail on bad data. A missing or malformed value is replaced
//! by its default (empty log, 120 credits, not signed up) and the decode
//! error is logged at `warn`. Only a backend failure (I/O, sled) reaches
//! the caller.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{KeyValueStore, StoreError};
use crate::cart::VoteIntent;
use crate::config::{
    DEFAULT_VOICE_CREDITS, KEY_COMMITTED_VOTES, KEY_USER_STATE_INDEX, KEY_VOICE_CREDITS,
};
use crate::error::{VoteError, VoteResult};

/// Whether and where the voter is registered with the protocol.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignUpState {
    pub signed_up: bool,
    pub user_state_index: Option<u64>,
}

impl SignUpState {
    pub fn registered(user_state_index: u64) -> Self {
        Self {
            signed_up: true,
            user_state_index: Some(user_state_index),
        }
    }
}

/// Reads `key`, mapping an undecodable byte string to `None` like any
/// other malformed value.
fn read_raw(store: &dyn KeyValueStore, key: &str) -> VoteResult<Option<String>> {
    match store.get(key) {
        Ok(value) => Ok(value),
        Err(StoreError::InvalidUtf8(_)) => {
            warn!(key, "persisted value is not UTF-8, using default");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

fn read_u64(store: &dyn KeyValueStore, key: &str) -> VoteResult<Option<u64>> {
    let Some(raw) = read_raw(store, key)? else {
        return Ok(None);
    };
    match raw.trim().parse::<u64>() {
        Ok(v) => Ok(Some(v)),
        Err(e) => {
            warn!(key, error = %e, "persisted value is not an unsigned integer, using default");
            Ok(None)
        }
    }
}

/// Committed-record log, oldest first. Empty when missing or unreadable.
pub fn load_committed(store: &dyn KeyValueStore) -> VoteResult<Vec<VoteIntent>> {
    let Some(raw) = read_raw(store, KEY_COMMITTED_VOTES)? else {
        return Ok(Vec::new());
    };
    match serde_json::from_str::<Option<Vec<VoteIntent>>>(&raw) {
        Ok(records) => Ok(records.unwrap_or_default()),
        Err(e) => {
            warn!(error = %e, "committed log is unreadable, starting empty");
            Ok(Vec::new())
        }
    }
}

/// Writes the whole committed log.
///
/// # Errors
///
/// [`VoteError::SerializationFailure`] if encoding fails; the stored log
/// is left as it was.
pub fn save_committed(store: &dyn KeyValueStore, records: &[VoteIntent]) -> VoteResult<()> {
    let json = serde_json::to_string(records).map_err(|e| VoteError::SerializationFailure {
        key: KEY_COMMITTED_VOTES.to_string(),
        reason: e.to_string(),
    })?;
    store.put(KEY_COMMITTED_VOTES, &json)?;
    Ok(())
}

/// Persisted ledger balance, or [`DEFAULT_VOICE_CREDITS`].
pub fn load_balance(store: &dyn KeyValueStore) -> VoteResult<u64> {
    Ok(read_u64(store, KEY_VOICE_CREDITS)?.unwrap_or(DEFAULT_VOICE_CREDITS))
}

pub fn save_balance(store: &dyn KeyValueStore, balance: u64) -> VoteResult<()> {
    store.put(KEY_VOICE_CREDITS, &balance.to_string())?;
    Ok(())
}

/// Signed up iff a readable state index is persisted.
pub fn load_sign_up(store: &dyn KeyValueStore) -> VoteResult<SignUpState> {
    Ok(read_u64(store, KEY_USER_STATE_INDEX)?
        .map(SignUpState::registered)
        .unwrap_or_default())
}

pub fn save_user_state_index(store: &dyn KeyValueStore, index: u64) -> VoteResult<()> {
    store.put(KEY_USER_STATE_INDEX, &index.to_string())?;
    Ok(())
}
