//! Arena-based intrusive LRU list.
//!
//! A `Vec` arena with index links instead of raw pointers; no unsafe code.
//! Head is most-recently used, tail is the eviction end. Entries remember
//! their slot so unlink and touch are O(1); scored insertion for the
//! non-recency policies walks from the tail.

use std::sync::Arc;

use super::entry::{CacheEntry, UNLINKED};

#[derive(Debug)]
struct Node {
    entry: Option<Arc<CacheEntry>>,
    /// Toward the head.
    prev: usize,
    /// Toward the tail.
    next: usize,
}

/// Doubly-linked recency list over cache entries.
#[derive(Debug)]
pub(crate) struct LruList {
    nodes: Vec<Node>,
    free: Vec<usize>,
    head: usize,
    tail: usize,
    len: usize,
}

impl LruList {
    pub(crate) fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            head: UNLINKED,
            tail: UNLINKED,
            len: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    fn alloc(&mut self, entry: Arc<CacheEntry>) -> usize {
        let node = Node {
            entry: Some(entry),
            prev: UNLINKED,
            next: UNLINKED,
        };
        if let Some(slot) = self.free.pop() {
            self.nodes[slot] = node;
            slot
        } else {
            self.nodes.push(node);
            self.nodes.len() - 1
        }
    }

    /// Links an entry at the head (most-recently used).
    pub(crate) fn push_head(&mut self, entry: Arc<CacheEntry>) -> usize {
        let slot = self.alloc(entry);
        self.nodes[slot].next = self.head;
        if self.head != UNLINKED {
            self.nodes[self.head].prev = slot;
        } else {
            self.tail = slot;
        }
        self.head = slot;
        self.len += 1;
        self.entry(slot).set_lru_pos(slot);
        slot
    }

    /// Links an entry ordered by score: nodes with smaller scores sit closer
    /// to the tail and are evicted first. Ties resolve toward the head, so
    /// equally scored entries fall back to recency order. `score_of` must be
    /// consistent with `score`.
    pub(crate) fn push_scored<F>(&mut self, entry: Arc<CacheEntry>, score: f64, score_of: F) -> usize
    where
        F: Fn(&CacheEntry) -> f64,
    {
        // First node from the tail whose score exceeds the new one.
        let mut cur = self.tail;
        while cur != UNLINKED && score_of(self.entry(cur)) <= score {
            cur = self.nodes[cur].prev;
        }
        if cur == UNLINKED {
            return self.push_head(entry);
        }
        let slot = self.alloc(entry);
        let after = self.nodes[cur].next;
        self.nodes[slot].prev = cur;
        self.nodes[slot].next = after;
        self.nodes[cur].next = slot;
        if after != UNLINKED {
            self.nodes[after].prev = slot;
        } else {
            self.tail = slot;
        }
        self.len += 1;
        self.entry(slot).set_lru_pos(slot);
        slot
    }

    /// Unlinks a slot and returns its entry.
    pub(crate) fn unlink(&mut self, slot: usize) -> Arc<CacheEntry> {
        let (prev, next) = (self.nodes[slot].prev, self.nodes[slot].next);
        if prev != UNLINKED {
            self.nodes[prev].next = next;
        } else {
            self.head = next;
        }
        if next != UNLINKED {
            self.nodes[next].prev = prev;
        } else {
            self.tail = prev;
        }
        let entry = self.nodes[slot]
            .entry
            .take()
            .expect("unlink of an empty LRU slot");
        self.nodes[slot].prev = UNLINKED;
        self.nodes[slot].next = UNLINKED;
        self.free.push(slot);
        self.len -= 1;
        entry.set_lru_pos(UNLINKED);
        entry
    }

    /// Moves a slot to the head; returns the (possibly new) slot index.
    pub(crate) fn touch(&mut self, slot: usize) -> usize {
        if self.head == slot {
            return slot;
        }
        let entry = self.unlink(slot);
        self.push_head(entry)
    }

    /// The eviction end.
    pub(crate) fn tail(&self) -> Option<usize> {
        (self.tail != UNLINKED).then_some(self.tail)
    }

    /// The next slot toward the head, for the eviction walk.
    pub(crate) fn toward_head(&self, slot: usize) -> Option<usize> {
        let prev = self.nodes[slot].prev;
        (prev != UNLINKED).then_some(prev)
    }

    /// The entry stored at a slot.
    ///
    /// # Panics
    ///
    /// Panics on a freed slot; slots are only handed out while linked.
    pub(crate) fn entry(&self, slot: usize) -> &Arc<CacheEntry> {
        self.nodes[slot]
            .entry
            .as_ref()
            .expect("access to an empty LRU slot")
    }

    pub(crate) fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.head = UNLINKED;
        self.tail = UNLINKED;
        self.len = 0;
    }
}
