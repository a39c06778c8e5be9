//! # Keyed Store
//!
//! Versioned key-value storage behind a trait, so the OTP registry and
//! order ledger can swap the volatile in-memory reference implementation
//! for a durable one without touching the state machines.
//!
//! Versions drive optimistic concurrency: read-modify-write cycles use
//! `compare_and_swap`, which makes mutations on the same key linearizable
//! while keys hash to independent shards and never contend with each other
//! through a single global lock.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

/// A stored value together with its monotonically increasing version.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<V> {
    pub value: V,
    pub version: u64,
}

/// Error returned when a compare-and-swap loses a race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("store version conflict")]
pub struct VersionConflict;

/// Keyed, versioned storage.
///
/// `expected` semantics for `compare_and_swap` and `delete`:
/// - `None`: the key must be absent (create-only) / delete unconditionally
/// - `Some(v)`: the key must currently hold version `v`
pub trait KeyValueStore<V: Clone>: Send + Sync {
    /// Fetch the current value and version, if any.
    fn get(&self, key: &str) -> Option<Versioned<V>>;

    /// Unconditional write. Returns the new version.
    fn put(&self, key: &str, value: V) -> u64;

    /// Remove the key. With `Some(v)`, only removes if the stored version
    /// still matches (single-use guarantees under races). Returns whether
    /// an entry was removed.
    fn delete(&self, key: &str, expected: Option<u64>) -> bool;

    /// Write only if the current version matches `expected`.
    /// Returns the new version on success.
    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<u64>,
        value: V,
    ) -> Result<u64, VersionConflict>;
}

const SHARD_COUNT: usize = 16;

/// Volatile, single-process reference store. Sharded so operations on
/// unrelated keys proceed independently.
pub struct InMemoryStore<V> {
    shards: Vec<Mutex<HashMap<String, (u64, V)>>>,
}

impl<V: Clone> InMemoryStore<V> {
    pub fn new() -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| Mutex::new(HashMap::new())).collect(),
        }
    }

    fn shard(&self, key: &str) -> &Mutex<HashMap<String, (u64, V)>> {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % SHARD_COUNT]
    }
}

impl<V: Clone> Default for InMemoryStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + Send + Sync> KeyValueStore<V> for InMemoryStore<V> {
    fn get(&self, key: &str) -> Option<Versioned<V>> {
        let shard = self.shard(key).lock().expect("store shard poisoned");
        shard.get(key).map(|(version, value)| Versioned {
            value: value.clone(),
            version: *version,
        })
    }

    fn put(&self, key: &str, value: V) -> u64 {
        let mut shard = self.shard(key).lock().expect("store shard poisoned");
        let version = shard.get(key).map(|(v, _)| v + 1).unwrap_or(1);
        shard.insert(key.to_string(), (version, value));
        version
    }

    fn delete(&self, key: &str, expected: Option<u64>) -> bool {
        let mut shard = self.shard(key).lock().expect("store shard poisoned");
        match expected {
            None => shard.remove(key).is_some(),
            Some(want) => match shard.get(key) {
                Some((have, _)) if *have == want => {
                    shard.remove(key);
                    true
                }
                _ => false,
            },
        }
    }

    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<u64>,
        value: V,
    ) -> Result<u64, VersionConflict> {
        let mut shard = self.shard(key).lock().expect("store shard poisoned");
        let current = shard.get(key).map(|(v, _)| *v);
        if current != expected {
            return Err(VersionConflict);
        }
        let version = current.map(|v| v + 1).unwrap_or(1);
        shard.insert(key.to_string(), (version, value));
        Ok(version)
    }
}
