//! A single LRU + TTL bounded collection.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    stored_at: Instant,
}

impl<V> Entry<V> {
    fn is_valid(&self, ttl: Option<Duration>) -> bool {
        match ttl {
            Some(ttl) => self.stored_at.elapsed() < ttl,
            None => true,
        }
    }
}

/// One keyed collection with its own LRU bound and an optional TTL.
///
/// LRU and TTL are independent: an entry can be evicted by whichever
/// condition triggers first. Reads and writes both refresh recency.
pub(crate) struct Store<K, V> {
    entries: HashMap<K, Entry<V>>,
    /// Key recency, most recent first.
    recency: Vec<K>,
    max_size: usize,
    ttl: Option<Duration>,
}

impl<K: Eq + Hash + Clone, V: Clone> Store<K, V> {
    pub(crate) fn new(max_size: usize, ttl: Option<Duration>) -> Self {
        Self {
            entries: HashMap::new(),
            recency: Vec::new(),
            max_size,
            ttl,
        }
    }

    /// Look up a key, evicting it instead if its TTL has lapsed.
    ///
    /// A successful lookup counts as an access for recency purposes.
    pub(crate) fn get(&mut self, key: &K) -> Option<V> {
        match self.entries.get(key) {
            Some(entry) if entry.is_valid(self.ttl) => {
                let value = entry.value.clone();
                self.touch(key);
                Some(value)
            }
            Some(_) => {
                self.remove(key);
                None
            }
            None => None,
        }
    }

    /// Insert or overwrite with a fresh timestamp, then evict down to the
    /// configured bound.
    pub(crate) fn insert(&mut self, key: K, value: V) {
        self.entries.insert(
            key.clone(),
            Entry {
                value,
                stored_at: Instant::now(),
            },
        );
        self.touch(&key);
        while self.entries.len() > self.max_size {
            match self.recency.pop() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.recency.clear();
    }

    fn remove(&mut self, key: &K) {
        self.entries.remove(key);
        self.recency.retain(|k| k != key);
    }

    /// Move a key to the front of the recency order.
    fn touch(&mut self, key: &K) {
        self.recency.retain(|k| k != key);
        self.recency.insert(0, key.clone());
    }
}
