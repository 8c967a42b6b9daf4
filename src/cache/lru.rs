//! Recency List Module
//!
//! Implements the doubly-linked recency ordering used for LRU eviction.
//!
//! Entries live in a slot arena owned by the list; links are slot indices,
//! so the list never holds a second owner of any entry.
//! - Head = Most recently used
//! - Tail = Least recently used

use super::entry::{Entry, SlotId};

// == Recency List ==
/// Arena-backed doubly-linked list of entries ordered by recency.
#[derive(Debug)]
pub struct RecencyList<K, V> {
    slots: Vec<Option<Entry<K, V>>>,
    free: Vec<usize>,
    head: Option<SlotId>,
    tail: Option<SlotId>,
    len: usize,
}

impl<K, V> RecencyList<K, V> {
    // == Constructor ==
    /// Creates a new empty list.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn head(&self) -> Option<SlotId> {
        self.head
    }

    pub fn tail(&self) -> Option<SlotId> {
        self.tail
    }

    pub fn get(&self, id: SlotId) -> Option<&Entry<K, V>> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: SlotId) -> Option<&mut Entry<K, V>> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Returns the least recently used entry without unlinking it.
    pub fn peek_tail(&self) -> Option<&Entry<K, V>> {
        self.tail.and_then(|id| self.get(id))
    }

    // == Insert At Head ==
    /// Stores `entry` in the arena and links it as the new head.
    ///
    /// On an empty list the entry becomes both head and tail.
    pub fn insert_at_head(&mut self, mut entry: Entry<K, V>) -> SlotId {
        entry.prev = None;
        entry.next = self.head;

        let id = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(entry);
                SlotId(idx)
            }
            None => {
                self.slots.push(Some(entry));
                SlotId(self.slots.len() - 1)
            }
        };

        match self.head {
            Some(old_head) => {
                if let Some(old) = self.get_mut(old_head) {
                    old.prev = Some(id);
                }
            }
            None => self.tail = Some(id),
        }
        self.head = Some(id);
        self.len += 1;
        id
    }

    // == Move To Head ==
    /// Marks an entry as most recently used.
    ///
    /// No-op when the entry already sits at the head.
    pub fn move_to_head(&mut self, id: SlotId) {
        if self.head == Some(id) || self.get(id).is_none() {
            return;
        }
        self.detach_links(id);

        let old_head = self.head;
        if let Some(entry) = self.get_mut(id) {
            entry.prev = None;
            entry.next = old_head;
        }
        match old_head {
            Some(old) => {
                if let Some(entry) = self.get_mut(old) {
                    entry.prev = Some(id);
                }
            }
            None => self.tail = Some(id),
        }
        self.head = Some(id);
    }

    // == Unlink ==
    /// Removes an entry from the list and the arena, returning it.
    ///
    /// Head and tail are patched when the entry was either. Returns None for
    /// a vacant slot.
    pub fn unlink(&mut self, id: SlotId) -> Option<Entry<K, V>> {
        self.get(id)?;
        self.detach_links(id);

        let mut entry = self.slots.get_mut(id.0)?.take()?;
        entry.prev = None;
        entry.next = None;
        self.free.push(id.0);
        self.len -= 1;
        Some(entry)
    }

    // == Pop Tail ==
    /// Unlinks and returns the least recently used entry.
    pub fn pop_tail(&mut self) -> Option<Entry<K, V>> {
        let tail = self.tail?;
        self.unlink(tail)
    }

    // == Iteration ==
    /// Walks entries from most to least recently used.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            list: self,
            cursor: self.head,
            forward: true,
        }
    }

    /// Walks entries from least to most recently used.
    pub fn iter_rev(&self) -> Iter<'_, K, V> {
        Iter {
            list: self,
            cursor: self.tail,
            forward: false,
        }
    }

    /// Splices the entry's neighbours together and fixes head/tail. The
    /// entry's own links are left stale for the caller to overwrite.
    fn detach_links(&mut self, id: SlotId) {
        let (prev, next) = match self.get(id) {
            Some(entry) => (entry.prev, entry.next),
            None => return,
        };

        match prev {
            Some(p) => {
                if let Some(entry) = self.get_mut(p) {
                    entry.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(n) => {
                if let Some(entry) = self.get_mut(n) {
                    entry.prev = prev;
                }
            }
            None => self.tail = prev,
        }
    }
}

impl<K, V> Default for RecencyList<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

// == Iterator ==
/// Iterator over list entries in either direction.
pub struct Iter<'a, K, V> {
    list: &'a RecencyList<K, V>,
    cursor: Option<SlotId>,
    forward: bool,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (SlotId, &'a Entry<K, V>);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cursor?;
        let entry = self.list.get(id)?;
        self.cursor = if self.forward { entry.next } else { entry.prev };
        Some((id, entry))
    }
}
