//! Variable-length, per-slot storage for level-`ℓ>0` adjacency lists
//! (`link_lists.bin` in `spec.md` §6). Only nodes drawn above level 0
//! consume space here. Addressed by an in-memory offset table (offset,
//! length) per slot, persisted as a prefix of the file so recovery doesn't
//! need to scan.

use crate::error::{IndexError, Result};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, Default)]
pub struct LinkEntry {
    pub offset: u64,
    pub len: u32,
}

pub struct LinkListTable {
    m: usize,
    entries: RwLock<Vec<LinkEntry>>,
    blob: RwLock<Vec<u8>>,
    dirty: AtomicBool,
}

impl LinkListTable {
    /// Bytes consumed per level: a u16 count prefix plus capacity for `2·M`
    /// neighbor slot indices.
    fn level_stride(&self) -> usize {
        2 + 2 * self.m * 4
    }

    pub fn new(capacity: u32, m: usize) -> Self {
        Self {
            m,
            entries: RwLock::new(vec![LinkEntry::default(); capacity as usize]),
            blob: RwLock::new(Vec::new()),
            dirty: AtomicBool::new(false),
        }
    }

    pub fn grow(&self, new_capacity: u32) {
        let mut entries = self.entries.write();
        if new_capacity as usize > entries.len() {
            entries.resize(new_capacity as usize, LinkEntry::default());
            self.dirty.store(true, Ordering::Release);
        }
    }

    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    /// Restore the dirty flag after a failed flush, so the next
    /// `persistDirty` retries the write.
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    fn check_bounds(&self, slot: u32, capacity: u32) -> Result<()> {
        if slot >= capacity {
            return Err(IndexError::OutOfBounds { slot, capacity });
        }
        Ok(())
    }

    /// Allocate (or reallocate) the blob region for `slot` to hold exactly
    /// `level_count` levels of zeroed link lists. Called once per insert
    /// (or replace-in-place) when the node's level is drawn; old bytes are
    /// abandoned in the blob rather than reclaimed in place.
    pub fn alloc_for_level_count(&self, slot: u32, level_count: u8) -> Result<()> {
        let capacity = self.entries.read().len() as u32;
        self.check_bounds(slot, capacity)?;
        let stride = self.level_stride();
        let needed = stride * level_count as usize;
        let mut blob = self.blob.write();
        let offset = blob.len() as u64;
        let new_len = blob.len() + needed;
        blob.resize(new_len, 0);
        drop(blob);
        let mut entries = self.entries.write();
        entries[slot as usize] = LinkEntry {
            offset,
            len: needed as u32,
        };
        drop(entries);
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    pub fn read_level_adj(&self, slot: u32, level: u8) -> Result<Vec<u32>> {
        let capacity = self.entries.read().len() as u32;
        self.check_bounds(slot, capacity)?;
        let entry = self.entries.read()[slot as usize];
        let stride = self.level_stride();
        let level_off = entry.offset as usize + (level as usize - 1) * stride;
        let blob = self.blob.read();
        if level_off + 2 > blob.len() {
            return Ok(Vec::new());
        }
        let count = u16::from_le_bytes(blob[level_off..level_off + 2].try_into().unwrap()) as usize;
        let adj_base = level_off + 2;
        let mut out = Vec::with_capacity(count);
        for i in 0..count {
            let off = adj_base + i * 4;
            out.push(u32::from_le_bytes(blob[off..off + 4].try_into().unwrap()));
        }
        Ok(out)
    }

    pub fn write_level_adj(&self, slot: u32, level: u8, list: &[u32]) -> Result<()> {
        let capacity = self.entries.read().len() as u32;
        self.check_bounds(slot, capacity)?;
        debug_assert!(list.len() <= 2 * self.m);
        let entry = self.entries.read()[slot as usize];
        let stride = self.level_stride();
        let level_off = entry.offset as usize + (level as usize - 1) * stride;
        let mut blob = self.blob.write();
        if level_off + stride > blob.len() {
            return Err(IndexError::InternalCorruption(format!(
                "link list region for slot {slot} level {level} not allocated"
            )));
        }
        blob[level_off..level_off + 2].copy_from_slice(&(list.len() as u16).to_le_bytes());
        let adj_base = level_off + 2;
        for (i, &n) in list.iter().enumerate() {
            let off = adj_base + i * 4;
            blob[off..off + 4].copy_from_slice(&n.to_le_bytes());
        }
        drop(blob);
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    pub fn snapshot(&self) -> (Vec<LinkEntry>, Vec<u8>) {
        (self.entries.read().clone(), self.blob.read().clone())
    }

    pub fn load(&self, entries: Vec<LinkEntry>, blob: Vec<u8>) {
        *self.entries.write() = entries;
        *self.blob.write() = blob;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_then_write_then_read() {
        let table = LinkListTable::new(4, 8);
        table.alloc_for_level_count(0, 2).unwrap();
        table.write_level_adj(0, 1, &[1, 2, 3]).unwrap();
        table.write_level_adj(0, 2, &[4]).unwrap();
        assert_eq!(table.read_level_adj(0, 1).unwrap(), vec![1, 2, 3]);
        assert_eq!(table.read_level_adj(0, 2).unwrap(), vec![4]);
    }

    #[test]
    fn reallocation_on_replace_abandons_old_region() {
        let table = LinkListTable::new(4, 8);
        table.alloc_for_level_count(0, 1).unwrap();
        table.write_level_adj(0, 1, &[9]).unwrap();
        table.alloc_for_level_count(0, 2).unwrap();
        assert_eq!(table.read_level_adj(0, 1).unwrap(), Vec::<u32>::new());
    }

    #[test]
    fn write_without_alloc_fails() {
        let table = LinkListTable::new(4, 8);
        assert!(table.write_level_adj(0, 1, &[1]).is_err());
    }
}
