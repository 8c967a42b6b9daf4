//! Cache Entry Module
//!
//! Defines a cached item, its metadata, and the slot links used by the
//! recency list.

use std::time::Duration;

use tokio::time::Instant;

// == Slot Id ==
/// Stable index of an entry inside the recency list's arena.
///
/// Slot ids are only meaningful to the list that issued them and are reused
/// once the entry occupying them is unlinked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(pub(crate) usize);

impl SlotId {
    pub fn index(self) -> usize {
        self.0
    }
}

// == Cache Entry ==
/// A single cached key-value pair with cost and last-access metadata.
#[derive(Debug)]
pub struct Entry<K, V> {
    pub(crate) key: K,
    pub(crate) value: V,
    pub(crate) cost: u64,
    /// Refreshed by every `get` and every `set`
    pub(crate) last_access: Instant,
    pub(crate) prev: Option<SlotId>,
    pub(crate) next: Option<SlotId>,
}

impl<K, V> Entry<K, V> {
    // == Constructor ==
    /// Creates an unlinked entry last accessed at `now`.
    pub fn new(key: K, value: V, cost: u64, now: Instant) -> Self {
        Self {
            key,
            value,
            cost,
            last_access: now,
            prev: None,
            next: None,
        }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn cost(&self) -> u64 {
        self.cost
    }

    pub fn last_access(&self) -> Instant {
        self.last_access
    }

    /// Consumes the entry, yielding its key and value.
    pub fn into_parts(self) -> (K, V) {
        (self.key, self.value)
    }

    // == Touch ==
    /// Refreshes the last-access time.
    pub(crate) fn touch(&mut self, now: Instant) {
        self.last_access = now;
    }

    // == Is Older Than ==
    /// Returns true when the entry has been idle for strictly longer than
    /// `max_age` as of `now`.
    pub fn is_older_than(&self, max_age: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.last_access) > max_age
    }
}
