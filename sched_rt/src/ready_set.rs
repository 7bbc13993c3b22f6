//! Ordered ready set
//!
//! An indexed binary min-heap over thread slots. Each slot has at most one
//! entry; a side table maps slot -> heap position, so removing or re-keying
//! an arbitrary thread is O(log N) without searching.
//!
//! Entries are ordered by `(key, ready_seq)`. `ready_seq` is stamped when a
//! thread becomes ready and survives re-keying, so equal keys always resolve
//! to whoever became ready first, whatever the heap's internal shape.
//!
//! All storage is sized at construction. No operation allocates.

use crate::policy::PriorityKey;

/// Position marker for slots with no entry
const ABSENT: u32 = u32::MAX;

/// One ready thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyEntry {
    /// Thread slot
    pub slot: u32,
    /// Cached priority key
    pub key: PriorityKey,
    /// Order in which the thread became ready
    pub ready_seq: u64,
}

impl ReadyEntry {
    fn precedes(&self, other: &ReadyEntry) -> bool {
        (self.key, self.ready_seq) < (other.key, other.ready_seq)
    }
}

/// Indexed min-heap of ready threads
#[derive(Debug)]
pub struct ReadySet {
    heap: Vec<ReadyEntry>,
    position: Box<[u32]>,
    next_seq: u64,
}

impl ReadySet {
    /// Creates an empty ready set for `capacity` slots
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            heap: Vec::with_capacity(capacity),
            position: vec![ABSENT; capacity].into_boxed_slice(),
            next_seq: 0,
        }
    }

    /// Number of slots this set can hold
    pub fn capacity(&self) -> usize {
        self.position.len()
    }

    /// Number of ready threads
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// True if nothing is ready
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// True if `slot` has an entry
    pub fn contains(&self, slot: usize) -> bool {
        self.position.get(slot).is_some_and(|&p| p != ABSENT)
    }

    /// Entry of `slot`, if ready
    pub fn get(&self, slot: usize) -> Option<&ReadyEntry> {
        let pos = *self.position.get(slot)?;
        self.heap.get(pos as usize)
    }

    /// The entry that should run next, without removing it
    pub fn peek(&self) -> Option<&ReadyEntry> {
        self.heap.first()
    }

    /// Inserts `slot` with `key`
    ///
    /// If the slot is already present this behaves as [`ReadySet::rekey`]
    /// and keeps its original ready order. Returns the entry's ready
    /// sequence number. Out-of-range slots are ignored and return `None`.
    pub fn insert(&mut self, slot: usize, key: PriorityKey) -> Option<u64> {
        if slot >= self.capacity() {
            return None;
        }
        if self.contains(slot) {
            self.rekey(slot, key);
            return self.get(slot).map(|e| e.ready_seq);
        }

        let ready_seq = self.next_seq;
        self.next_seq += 1;

        // Never exceeds the reserved capacity: at most one entry per slot.
        let index = self.heap.len();
        self.heap.push(ReadyEntry {
            slot: slot as u32,
            key,
            ready_seq,
        });
        self.position[slot] = index as u32;
        self.sift_up(index);
        Some(ready_seq)
    }

    /// Removes `slot`'s entry, returning it
    pub fn remove(&mut self, slot: usize) -> Option<ReadyEntry> {
        let pos = *self.position.get(slot)?;
        if pos == ABSENT {
            return None;
        }
        let index = pos as usize;
        let last = self.heap.len() - 1;
        self.swap(index, last);
        let entry = self.heap.pop()?;
        self.position[slot] = ABSENT;

        if index < self.heap.len() {
            self.restore(index);
        }
        Some(entry)
    }

    /// Removes and returns the entry that should run next
    pub fn pop(&mut self) -> Option<ReadyEntry> {
        let slot = self.peek()?.slot as usize;
        self.remove(slot)
    }

    /// Replaces `slot`'s key in place
    ///
    /// Returns false if the slot has no entry.
    pub fn rekey(&mut self, slot: usize, key: PriorityKey) -> bool {
        let Some(&pos) = self.position.get(slot) else {
            return false;
        };
        if pos == ABSENT {
            return false;
        }
        let index = pos as usize;
        self.heap[index].key = key;
        self.restore(index);
        true
    }

    /// Entries in selection order
    ///
    /// Allocates; diagnostics and tests only.
    pub fn ordered(&self) -> Vec<ReadyEntry> {
        let mut entries = self.heap.clone();
        entries.sort_by(|a, b| (a.key, a.ready_seq).cmp(&(b.key, b.ready_seq)));
        entries
    }

    /// Removes every entry
    pub fn clear(&mut self) {
        for entry in self.heap.drain(..) {
            self.position[entry.slot as usize] = ABSENT;
        }
    }

    fn restore(&mut self, index: usize) {
        if index > 0 && self.heap[index].precedes(&self.heap[(index - 1) / 2]) {
            self.sift_up(index);
        } else {
            self.sift_down(index);
        }
    }

    fn sift_up(&mut self, mut index: usize) {
        while index > 0 {
            let parent = (index - 1) / 2;
            if !self.heap[index].precedes(&self.heap[parent]) {
                break;
            }
            self.swap(index, parent);
            index = parent;
        }
    }

    fn sift_down(&mut self, mut index: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * index + 1;
            let right = left + 1;
            let mut best = index;
            if left < len && self.heap[left].precedes(&self.heap[best]) {
                best = left;
            }
            if right < len && self.heap[right].precedes(&self.heap[best]) {
                best = right;
            }
            if best == index {
                break;
            }
            self.swap(index, best);
            index = best;
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.heap.swap(a, b);
        self.position[self.heap[a].slot as usize] = a as u32;
        self.position[self.heap[b].slot as usize] = b as u32;
    }
}
