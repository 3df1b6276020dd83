//! In-memory [`KeyValueStore`]. Nothing survives the process; tests and
//! throwaway sessions use it.

use parking_lot::RwLock;
use std::collections::HashMap;

use super::{KeyValueStore, StoreResult};

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seeded store, handy for simulating what a previous run left
    /// behind.
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: RwLock::new(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> StoreResult<()> {
        self.entries.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}
