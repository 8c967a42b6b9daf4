//! Cache Store Module
//!
//! Unlocked cache engine combining the key index with the recency list.
//!
//! `LruStore` never destroys a value itself. Every operation that removes
//! entries hands them back as a [`Detached`] batch, so the caller decides
//! where and when destruction happens.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use tokio::time::Instant;

use crate::cache::{CacheStats, Entry, RecencyList, SlotId};
use crate::error::{CacheError, Result};

// == Detached ==
/// Entries removed from a store, not yet destroyed.
#[derive(Debug)]
pub enum Detached<K, V> {
    /// Nothing was removed
    Empty,
    /// A value replaced by `set` on an existing key
    Replaced(V),
    /// Individually unlinked entries, in eviction order
    Entries(Vec<Entry<K, V>>),
    /// The whole previous contents, swapped out by `take_all`
    All {
        list: RecencyList<K, V>,
        index: HashMap<K, SlotId>,
    },
}

impl<K, V> Detached<K, V> {
    /// Number of entries in the batch. A replaced value does not count as an
    /// entry since its key is still cached.
    pub fn len(&self) -> usize {
        match self {
            Detached::Empty | Detached::Replaced(_) => 0,
            Detached::Entries(entries) => entries.len(),
            Detached::All { list, .. } => list.len(),
        }
    }

    /// True when dropping the batch would destroy nothing.
    pub fn is_empty(&self) -> bool {
        matches!(self, Detached::Empty)
            || matches!(self, Detached::Entries(entries) if entries.is_empty())
            || matches!(self, Detached::All { list, .. } if list.is_empty())
    }
}

// == Cache Store ==
/// Index and recency list mutated in lockstep, plus aggregate counters.
#[derive(Debug)]
pub struct LruStore<K, V> {
    /// Key to slot mapping
    index: HashMap<K, SlotId>,
    /// Recency ordering and entry storage
    list: RecencyList<K, V>,
    /// Sum of the cost of every indexed entry
    total_cost: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<K, V> LruStore<K, V> {
    // == Length ==
    /// Returns the current number of entries.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn total_cost(&self) -> u64 {
        self.total_cost
    }

    // == Take All ==
    /// Swaps the live index and list for empty ones in O(1).
    pub fn take_all(&mut self) -> Detached<K, V> {
        if self.index.is_empty() {
            return Detached::Empty;
        }
        self.total_cost = 0;
        Detached::All {
            list: std::mem::take(&mut self.list),
            index: std::mem::take(&mut self.index),
        }
    }
}

impl<K, V> LruStore<K, V>
where
    K: Hash + Eq + Clone,
{
    // == Constructor ==
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self {
            index: HashMap::new(),
            list: RecencyList::new(),
            total_cost: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    // == Contains ==
    /// Checks for a key without touching recency.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index.contains_key(key)
    }

    // == Get ==
    /// Retrieves a value, marking the entry most recently used.
    ///
    /// A miss mutates nothing but the miss counter.
    pub fn get<Q>(&mut self, key: &Q, now: Instant) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        let Some(&id) = self.index.get(key) else {
            self.misses += 1;
            return None;
        };

        // Clone before touching so a panicking clone leaves the entry as it was.
        let entry = self.list.get_mut(id)?;
        let value = entry.value.clone();
        entry.touch(now);
        self.list.move_to_head(id);
        self.hits += 1;
        Some(value)
    }

    // == Insert ==
    /// Stores a value with the given cost.
    ///
    /// An existing key keeps its slot: value, cost and access time are
    /// replaced and the entry moves to the head. The old value comes back as
    /// [`Detached::Replaced`]. Never evicts; limits are enforced by trims.
    pub fn insert(&mut self, key: K, value: V, cost: u64, now: Instant) -> Result<Detached<K, V>> {
        if let Some(&id) = self.index.get(&key) {
            let old_cost = self.list.get(id).map(Entry::cost).unwrap_or(0);
            let total_cost = (self.total_cost - old_cost)
                .checked_add(cost)
                .ok_or(CacheError::CostOverflow {
                    entry_cost: cost,
                    total_cost: self.total_cost,
                })?;

            let Some(entry) = self.list.get_mut(id) else {
                return Err(CacheError::Integrity(
                    "indexed key points at a vacant slot".to_string(),
                ));
            };
            let old_value = std::mem::replace(&mut entry.value, value);
            entry.cost = cost;
            entry.touch(now);
            self.list.move_to_head(id);
            self.total_cost = total_cost;
            return Ok(Detached::Replaced(old_value));
        }

        let total_cost = self
            .total_cost
            .checked_add(cost)
            .ok_or(CacheError::CostOverflow {
                entry_cost: cost,
                total_cost: self.total_cost,
            })?;

        let id = self
            .list
            .insert_at_head(Entry::new(key.clone(), value, cost, now));
        self.index.insert(key, id);
        self.total_cost = total_cost;
        Ok(Detached::Empty)
    }

    // == Remove ==
    /// Unlinks an entry by key. Absent keys are a no-op.
    pub fn remove<Q>(&mut self, key: &Q) -> Detached<K, V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let Some(id) = self.index.remove(key) else {
            return Detached::Empty;
        };
        match self.list.unlink(id) {
            Some(entry) => {
                self.total_cost -= entry.cost;
                Detached::Entries(vec![entry])
            }
            None => Detached::Empty,
        }
    }

    // == Trim To Count ==
    /// Evicts from the tail until at most `limit` entries remain.
    pub fn trim_to_count(&mut self, limit: usize) -> Detached<K, V> {
        if limit == 0 {
            return self.evict_all();
        }
        self.evict_while(|store, _| store.index.len() > limit)
    }

    // == Trim To Cost ==
    /// Evicts from the tail until the aggregate cost is at most `limit`.
    pub fn trim_to_cost(&mut self, limit: u64) -> Detached<K, V> {
        if limit == 0 {
            return self.evict_all();
        }
        self.evict_while(|store, _| store.total_cost > limit)
    }

    // == Trim To Age ==
    /// Evicts from the tail while the entry has been idle longer than
    /// `max_age`, stopping at the first entry within bound.
    ///
    /// Stopping early is sound because every `get` and `insert` refreshes
    /// the access time and moves the entry to the head, so access times are
    /// non-decreasing from tail to head.
    pub fn trim_to_age(&mut self, max_age: Duration, now: Instant) -> Detached<K, V> {
        if max_age.is_zero() {
            return self.evict_all();
        }
        self.evict_while(|_, tail| tail.is_older_than(max_age, now))
    }

    // == Iteration ==
    /// Walks entries from most to least recently used.
    pub fn iter(&self) -> impl Iterator<Item = &Entry<K, V>> {
        self.list.iter().map(|(_, entry)| entry)
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            total_entries: self.index.len(),
            total_cost: self.total_cost,
        }
    }

    // == Validate ==
    /// Walks the whole store checking the structural invariants. O(n);
    /// intended for diagnostics and tests.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(CacheError::Integrity(msg));

        if self.list.len() != self.index.len() {
            return fail(format!(
                "list holds {} entries but index holds {}",
                self.list.len(),
                self.index.len()
            ));
        }

        if let Some(head) = self.list.head().and_then(|id| self.list.get(id)) {
            if head.prev.is_some() {
                return fail("head has a predecessor".to_string());
            }
        }
        if let Some(tail) = self.list.peek_tail() {
            if tail.next.is_some() {
                return fail("tail has a successor".to_string());
            }
        }

        let mut forward = 0usize;
        let mut cost = 0u64;
        let mut newest_seen: Option<Instant> = None;
        for (id, entry) in self.list.iter() {
            forward += 1;
            if forward > self.index.len() {
                return fail("forward traversal does not terminate".to_string());
            }
            if self.index.get(&entry.key) != Some(&id) {
                return fail(format!("slot {} is not indexed under its key", id.index()));
            }
            if let Some(newer) = newest_seen {
                if entry.last_access > newer {
                    return fail("access times are not ordered by recency".to_string());
                }
            }
            newest_seen = Some(entry.last_access);
            cost += entry.cost;
        }

        let backward = self.list.iter_rev().take(self.index.len() + 1).count();
        if forward != self.index.len() || backward != self.index.len() {
            return fail(format!(
                "traversals disagree: forward {}, backward {}, index {}",
                forward,
                backward,
                self.index.len()
            ));
        }
        if cost != self.total_cost {
            return fail(format!(
                "total_cost is {} but entries sum to {}",
                self.total_cost, cost
            ));
        }
        Ok(())
    }

    fn evict_all(&mut self) -> Detached<K, V> {
        self.evictions += self.index.len() as u64;
        self.take_all()
    }

    fn evict_while<F>(&mut self, mut should_evict: F) -> Detached<K, V>
    where
        F: FnMut(&Self, &Entry<K, V>) -> bool,
    {
        let mut evicted = Vec::new();
        while let Some(tail) = self.list.peek_tail() {
            if !should_evict(self, tail) {
                break;
            }
            let Some(entry) = self.list.pop_tail() else {
                break;
            };
            self.index.remove(&entry.key);
            self.total_cost -= entry.cost;
            evicted.push(entry);
        }

        if evicted.is_empty() {
            return Detached::Empty;
        }
        self.evictions += evicted.len() as u64;
        Detached::Entries(evicted)
    }
}

impl<K, V> Default for LruStore<K, V>
where
    K: Hash + Eq + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
