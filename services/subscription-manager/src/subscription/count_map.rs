//! Reference counters keyed by topic or provider

use rustc_hash::FxHashMap;
use std::hash::Hash;

/// Map of key to a strictly positive count
///
/// A key whose count drops to zero is removed, so `contains` doubles as a
/// "count > 0" check.
#[derive(Debug, Clone)]
pub struct CountMap<K> {
    counts: FxHashMap<K, usize>,
}

impl<K> Default for CountMap<K> {
    fn default() -> Self {
        Self {
            counts: FxHashMap::default(),
        }
    }
}

impl<K: Eq + Hash> CountMap<K> {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Count for `key`, zero when absent
    pub fn get(&self, key: &K) -> usize {
        self.counts.get(key).copied().unwrap_or(0)
    }

    /// Whether `key` has a positive count
    pub fn contains(&self, key: &K) -> bool {
        self.counts.contains_key(key)
    }

    /// Keys with a positive count
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.counts.keys()
    }

    /// Number of keys with a positive count
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// True when no key is counted
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Drop every counter
    pub fn clear(&mut self) {
        self.counts.clear();
    }

    /// Add one to `key`
    pub fn increment(&mut self, key: K) {
        *self.counts.entry(key).or_insert(0) += 1;
    }

    /// Subtract one from `key`, removing it at zero
    ///
    /// Decrementing an absent key is a no-op.
    pub fn decrement(&mut self, key: &K) {
        let Some(count) = self.counts.get_mut(key) else {
            return;
        };

        // Zero is never stored.
        debug_assert!(*count > 0, "count map held a zero count");

        if *count <= 1 {
            self.counts.remove(key);
        } else {
            *count -= 1;
        }
    }
}
