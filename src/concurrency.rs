//! Lock types and ordering for the index (`spec.md` §4.5/§5): a single
//! global structural read/write lock, a label-directory lock (owned by
//! `label::LabelDirectory` itself), and a flat array of per-slot mutexes.
//! Lock order is always structural < directory < per-slot, and multiple
//! per-slot locks are always taken in ascending slot order to avoid
//! deadlock.

use parking_lot::{ArcMutexGuard, Mutex, RawMutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::Arc;

/// The entry-point pointer and max level are the only truly global mutable
/// scalars (`spec.md` §9); they're guarded together so a reader snapshots
/// both consistently.
#[derive(Debug, Clone, Copy)]
pub struct EntryPoint {
    pub slot: u32,
    pub max_level: u8,
}

/// `None` until the first node is ever inserted; that node becomes the
/// initial entry point (conventionally landing in slot 0), after which the
/// entry point is always `Some`.
pub struct StructuralLock {
    state: RwLock<Option<EntryPoint>>,
}

impl StructuralLock {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(None),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Option<EntryPoint>> {
        self.state.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Option<EntryPoint>> {
        self.state.write()
    }

    pub fn snapshot(&self) -> Option<EntryPoint> {
        *self.state.read()
    }
}

impl Default for StructuralLock {
    fn default() -> Self {
        Self::new()
    }
}

/// One independently-owned mutex per slot, so a lock handle (an
/// `ArcMutexGuard`) can outlive the lookup into the (growable) slot table.
pub struct SlotLocks {
    locks: RwLock<Vec<Arc<Mutex<()>>>>,
}

pub type SlotGuard = ArcMutexGuard<RawMutex, ()>;

impl SlotLocks {
    pub fn new(capacity: u32) -> Self {
        Self {
            locks: RwLock::new((0..capacity).map(|_| Arc::new(Mutex::new(()))).collect()),
        }
    }

    pub fn grow(&self, new_capacity: u32) {
        let mut locks = self.locks.write();
        while (locks.len() as u32) < new_capacity {
            locks.push(Arc::new(Mutex::new(())));
        }
    }

    /// Lock a single slot.
    pub fn lock_one(&self, slot: u32) -> SlotGuard {
        let mutex = Arc::clone(&self.locks.read()[slot as usize]);
        Mutex::lock_arc(&mutex)
    }

    /// Lock multiple slots in ascending index order (deduplicated) to avoid
    /// deadlock with another writer locking an overlapping set.
    pub fn lock_many(&self, mut slots: Vec<u32>) -> Vec<SlotGuard> {
        slots.sort_unstable();
        slots.dedup();
        slots.into_iter().map(|s| self.lock_one(s)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn single_slot_lock_excludes_concurrent_writers() {
        let locks = Arc::new(SlotLocks::new(4));
        let counter = Arc::new(Mutex::new(0));
        let mut handles = vec![];
        for _ in 0..8 {
            let locks = Arc::clone(&locks);
            let counter = Arc::clone(&counter);
            handles.push(thread::spawn(move || {
                let _g = locks.lock_one(1);
                let mut c = counter.lock();
                *c += 1;
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*counter.lock(), 8);
    }

    #[test]
    fn grow_keeps_existing_indices_lockable() {
        let locks = SlotLocks::new(2);
        locks.grow(10);
        let _g = locks.lock_one(9);
    }

    #[test]
    fn lock_many_sorts_and_dedups() {
        let locks = SlotLocks::new(10);
        let _g = locks.lock_many(vec![5, 1, 1, 3]);
    }
}
