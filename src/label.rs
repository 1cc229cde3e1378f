//! Bidirectional `label <-> slot` directory plus free-slot bookkeeping
//! (`spec.md` §4.3). Insertion takes the directory lock only for the
//! duration of the lookup+update; lookups take a shared lock.

use crate::error::{IndexError, Result};
use parking_lot::RwLock;
use std::collections::HashMap;

pub struct LabelDirectory {
    inner: RwLock<Inner>,
}

struct Inner {
    label_to_slot: HashMap<u64, u32>,
    slot_to_label: HashMap<u32, u64>,
    free_slots: Vec<u32>,
    next_fresh_slot: u32,
    capacity: u32,
}

impl LabelDirectory {
    pub fn new(capacity: u32) -> Self {
        Self {
            inner: RwLock::new(Inner {
                label_to_slot: HashMap::new(),
                slot_to_label: HashMap::new(),
                free_slots: Vec::new(),
                next_fresh_slot: 0,
                capacity,
            }),
        }
    }

    pub fn lookup(&self, label: u64) -> Option<u32> {
        self.inner.read().label_to_slot.get(&label).copied()
    }

    pub fn label_of(&self, slot: u32) -> Option<u64> {
        self.inner.read().slot_to_label.get(&slot).copied()
    }

    /// Allocate a fresh slot for `label`: first a free (released) slot, else
    /// the next never-used slot. Fails with `CAPACITY_EXCEEDED` when the
    /// index is full and the caller has disabled auto-resize (the caller
    /// decides whether to grow and retry).
    pub fn allocate(&self, label: u64) -> Result<u32> {
        let mut inner = self.inner.write();
        if let Some(slot) = inner.free_slots.pop() {
            inner.label_to_slot.insert(label, slot);
            inner.slot_to_label.insert(slot, label);
            return Ok(slot);
        }
        if inner.next_fresh_slot >= inner.capacity {
            return Err(IndexError::CapacityExceeded(format!(
                "no free slot below capacity {}",
                inner.capacity
            )));
        }
        let slot = inner.next_fresh_slot;
        inner.next_fresh_slot += 1;
        inner.label_to_slot.insert(label, slot);
        inner.slot_to_label.insert(slot, label);
        Ok(slot)
    }

    /// Atomically rebind `slot` to `label` in both directions (used by
    /// replace-on-add, where the slot is already owned by `label`'s prior
    /// binding and we're just re-asserting it after a vector rewrite).
    pub fn rebind(&self, slot: u32, label: u64) {
        let mut inner = self.inner.write();
        if let Some(old_label) = inner.slot_to_label.insert(slot, label) {
            inner.label_to_slot.remove(&old_label);
        }
        inner.label_to_slot.insert(label, slot);
    }

    /// Release `slot`'s label binding and return it to the free list,
    /// keeping it eligible for a future `allocate` re-insert.
    pub fn release(&self, slot: u32) {
        let mut inner = self.inner.write();
        if let Some(label) = inner.slot_to_label.remove(&slot) {
            inner.label_to_slot.remove(&label);
        }
        inner.free_slots.push(slot);
    }

    pub fn notify_capacity_grown(&self, new_capacity: u32) {
        let mut inner = self.inner.write();
        inner.capacity = new_capacity;
    }

    /// Wholesale-replace directory state from a recovery scan of the record
    /// table: `bound` is every (label, slot) pair found with a non-zero
    /// label, `deleted_slots` among those are also free-listed so a future
    /// `allocate` can reclaim them once the record bytes are cleared by the
    /// caller. Any slot below `capacity` not present in `bound` is free.
    pub fn seed_from_scan(&self, bound: Vec<(u64, u32)>, capacity: u32) {
        let mut inner = self.inner.write();
        inner.label_to_slot.clear();
        inner.slot_to_label.clear();
        inner.free_slots.clear();
        inner.capacity = capacity;
        let mut occupied = vec![false; capacity as usize];
        for (label, slot) in bound {
            occupied[slot as usize] = true;
            inner.label_to_slot.insert(label, slot);
            inner.slot_to_label.insert(slot, label);
        }
        inner.next_fresh_slot = occupied
            .iter()
            .rposition(|&b| b)
            .map(|i| i as u32 + 1)
            .unwrap_or(0);
        for slot in 0..inner.next_fresh_slot {
            if !occupied[slot as usize] {
                inner.free_slots.push(slot);
            }
        }
    }

    pub fn all_labels(&self) -> Vec<(u64, u32)> {
        let inner = self.inner.read();
        inner
            .label_to_slot
            .iter()
            .map(|(&l, &s)| (l, s))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().label_to_slot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_then_lookup() {
        let dir = LabelDirectory::new(10);
        let slot = dir.allocate(42).unwrap();
        assert_eq!(dir.lookup(42), Some(slot));
        assert_eq!(dir.label_of(slot), Some(42));
    }

    #[test]
    fn capacity_exceeded() {
        let dir = LabelDirectory::new(2);
        dir.allocate(1).unwrap();
        dir.allocate(2).unwrap();
        assert!(dir.allocate(3).is_err());
    }

    #[test]
    fn release_then_reallocate_reuses_slot() {
        let dir = LabelDirectory::new(2);
        let slot = dir.allocate(1).unwrap();
        dir.release(slot);
        let new_slot = dir.allocate(2).unwrap();
        assert_eq!(slot, new_slot);
        assert_eq!(dir.lookup(1), None);
    }

    #[test]
    fn rebind_updates_both_directions() {
        let dir = LabelDirectory::new(2);
        let slot = dir.allocate(1).unwrap();
        dir.rebind(slot, 1);
        assert_eq!(dir.lookup(1), Some(slot));
    }
}
