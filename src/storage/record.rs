//! Fixed-stride record table: one record per slot, byte-addressed through
//! `record_range(slot)`. Covers the level-0 portion of `spec.md` §3/§4.2 —
//! vector, level-0 adjacency list, level count, label, deleted flag — plus
//! the parallel original-vector table used to reconstruct the caller's
//! un-normalized input.

use crate::error::{IndexError, Result};
use crate::storage::page::DirtyBitmap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// Byte layout of one level-0 record, computed once from `(dim, vector_width,
/// m0)` and fixed for the lifetime of the index.
#[derive(Debug, Clone, Copy)]
pub struct RecordLayout {
    pub dim: usize,
    pub vector_width: usize,
    pub m0: usize,
    pub vector_off: usize,
    pub level_off: usize,
    pub adj_count_off: usize,
    pub adj_off: usize,
    pub label_off: usize,
    pub deleted_off: usize,
    pub stride: usize,
}

impl RecordLayout {
    pub fn new(dim: usize, vector_width: usize, m0: usize) -> Self {
        let vector_off = 0;
        let vector_bytes = dim * vector_width;
        let level_off = vector_off + vector_bytes;
        let adj_count_off = level_off + 1;
        let adj_off = adj_count_off + 2;
        let adj_bytes = 2 * m0 * 4;
        let label_off = adj_off + adj_bytes;
        let deleted_off = label_off + 8;
        let raw_stride = deleted_off + 1;
        let stride = raw_stride.div_ceil(8) * 8;
        Self {
            dim,
            vector_width,
            m0,
            vector_off,
            level_off,
            adj_count_off,
            adj_off,
            label_off,
            deleted_off,
            stride,
        }
    }
}

pub struct RecordTable {
    layout: RecordLayout,
    capacity: RwLock<u32>,
    bytes: RwLock<Vec<u8>>,
    original: RwLock<Vec<u8>>,
    dirty: DirtyBitmap,
    /// The original-vector table conceptually shares the level-0 dirty
    /// bitmap (`spec.md` §9); tracked separately in practice since its
    /// stride differs from the level-0 record stride.
    original_dirty: AtomicBool,
}

impl RecordTable {
    pub fn new(layout: RecordLayout, capacity: u32, page_size: usize) -> Self {
        let total = layout.stride * capacity as usize;
        let orig_bytes = layout.dim * layout.vector_width * capacity as usize;
        Self {
            layout,
            capacity: RwLock::new(capacity),
            bytes: RwLock::new(vec![0u8; total]),
            original: RwLock::new(vec![0u8; orig_bytes]),
            dirty: DirtyBitmap::new(total, page_size),
            original_dirty: AtomicBool::new(false),
        }
    }

    pub fn take_original_dirty(&self) -> bool {
        self.original_dirty.swap(false, Ordering::AcqRel)
    }

    /// Restore the original-table dirty flag after a failed flush, so the
    /// next `persistDirty` retries the write.
    pub fn mark_original_dirty(&self) {
        self.original_dirty.store(true, Ordering::Release);
    }

    pub fn layout(&self) -> RecordLayout {
        self.layout
    }

    pub fn capacity(&self) -> u32 {
        *self.capacity.read()
    }

    pub fn dirty_bitmap(&self) -> &DirtyBitmap {
        &self.dirty
    }

    fn check_bounds(&self, slot: u32) -> Result<()> {
        let capacity = self.capacity();
        if slot >= capacity {
            return Err(IndexError::OutOfBounds { slot, capacity });
        }
        Ok(())
    }

    /// Grow the backing byte arrays to `new_capacity`, preserving existing
    /// bytes verbatim. Never shrinks.
    pub fn grow(&self, new_capacity: u32) {
        let mut capacity = self.capacity.write();
        if new_capacity <= *capacity {
            return;
        }
        let old_total = self.layout.stride * *capacity as usize;
        let new_total = self.layout.stride * new_capacity as usize;
        let new_orig = self.layout.dim * self.layout.vector_width * new_capacity as usize;
        self.bytes.write().resize(new_total, 0);
        self.original.write().resize(new_orig, 0);
        self.dirty.grow(new_total);
        self.dirty.mark_range(old_total, new_total);
        self.original_dirty.store(true, Ordering::Release);
        *capacity = new_capacity;
    }

    fn record_range(&self, slot: u32) -> std::ops::Range<usize> {
        let start = slot as usize * self.layout.stride;
        start..start + self.layout.stride
    }

    pub fn read_vector_f32(&self, slot: u32) -> Result<Vec<f32>> {
        self.check_bounds(slot)?;
        let bytes = self.bytes.read();
        let base = slot as usize * self.layout.stride + self.layout.vector_off;
        let mut out = Vec::with_capacity(self.layout.dim);
        for i in 0..self.layout.dim {
            let off = base + i * 4;
            out.push(f32::from_le_bytes(bytes[off..off + 4].try_into().unwrap()));
        }
        Ok(out)
    }

    pub fn write_vector_f32(&self, slot: u32, vec: &[f32]) -> Result<()> {
        self.check_bounds(slot)?;
        debug_assert_eq!(vec.len(), self.layout.dim);
        let mut bytes = self.bytes.write();
        let base = slot as usize * self.layout.stride + self.layout.vector_off;
        for (i, &v) in vec.iter().enumerate() {
            let off = base + i * 4;
            bytes[off..off + 4].copy_from_slice(&v.to_le_bytes());
        }
        drop(bytes);
        let range = self.record_range(slot);
        self.dirty.mark_range(range.start, range.end);
        Ok(())
    }

    pub fn read_vector_u8(&self, slot: u32) -> Result<Vec<u8>> {
        self.check_bounds(slot)?;
        let bytes = self.bytes.read();
        let base = slot as usize * self.layout.stride + self.layout.vector_off;
        Ok(bytes[base..base + self.layout.dim].to_vec())
    }

    pub fn write_vector_u8(&self, slot: u32, vec: &[u8]) -> Result<()> {
        self.check_bounds(slot)?;
        debug_assert_eq!(vec.len(), self.layout.dim);
        let mut bytes = self.bytes.write();
        let base = slot as usize * self.layout.stride + self.layout.vector_off;
        bytes[base..base + self.layout.dim].copy_from_slice(vec);
        drop(bytes);
        let range = self.record_range(slot);
        self.dirty.mark_range(range.start, range.end);
        Ok(())
    }

    pub fn read_original_f32(&self, slot: u32) -> Result<Vec<f32>> {
        self.check_bounds(slot)?;
        let orig = self.original.read();
        let rec_bytes = self.layout.dim * self.layout.vector_width;
        let base = slot as usize * rec_bytes;
        let mut out = Vec::with_capacity(self.layout.dim);
        for i in 0..self.layout.dim {
            let off = base + i * 4;
            out.push(f32::from_le_bytes(
                orig[off..off + 4].try_into().unwrap(),
            ));
        }
        Ok(out)
    }

    pub fn write_original_f32(&self, slot: u32, vec: &[f32]) -> Result<()> {
        self.check_bounds(slot)?;
        debug_assert_eq!(vec.len(), self.layout.dim);
        let mut orig = self.original.write();
        let rec_bytes = self.layout.dim * self.layout.vector_width;
        let base = slot as usize * rec_bytes;
        for (i, &v) in vec.iter().enumerate() {
            let off = base + i * 4;
            orig[off..off + 4].copy_from_slice(&v.to_le_bytes());
        }
        drop(orig);
        self.original_dirty.store(true, Ordering::Release);
        Ok(())
    }

    pub fn read_original(&self, slot: u32) -> Result<Vec<u8>> {
        self.check_bounds(slot)?;
        let orig = self.original.read();
        let rec_bytes = self.layout.dim * self.layout.vector_width;
        let base = slot as usize * rec_bytes;
        Ok(orig[base..base + rec_bytes].to_vec())
    }

    pub fn write_original(&self, slot: u32, raw: &[u8]) -> Result<()> {
        self.check_bounds(slot)?;
        let rec_bytes = self.layout.dim * self.layout.vector_width;
        debug_assert_eq!(raw.len(), rec_bytes);
        let mut orig = self.original.write();
        let base = slot as usize * rec_bytes;
        orig[base..base + rec_bytes].copy_from_slice(raw);
        drop(orig);
        self.original_dirty.store(true, Ordering::Release);
        Ok(())
    }

    pub fn read_level0_adj(&self, slot: u32) -> Result<Vec<u32>> {
        self.check_bounds(slot)?;
        let bytes = self.bytes.read();
        let rec_base = slot as usize * self.layout.stride;
        let count_off = rec_base + self.layout.adj_count_off;
        let count = u16::from_le_bytes(bytes[count_off..count_off + 2].try_into().unwrap()) as usize;
        let adj_base = rec_base + self.layout.adj_off;
        let mut out = Vec::with_capacity(count);
        for i in 0..count {
            let off = adj_base + i * 4;
            out.push(u32::from_le_bytes(bytes[off..off + 4].try_into().unwrap()));
        }
        Ok(out)
    }

    pub fn write_level0_adj(&self, slot: u32, list: &[u32]) -> Result<()> {
        self.check_bounds(slot)?;
        debug_assert!(list.len() <= 2 * self.layout.m0);
        let mut bytes = self.bytes.write();
        let rec_base = slot as usize * self.layout.stride;
        let count_off = rec_base + self.layout.adj_count_off;
        bytes[count_off..count_off + 2].copy_from_slice(&(list.len() as u16).to_le_bytes());
        let adj_base = rec_base + self.layout.adj_off;
        for (i, &n) in list.iter().enumerate() {
            let off = adj_base + i * 4;
            bytes[off..off + 4].copy_from_slice(&n.to_le_bytes());
        }
        drop(bytes);
        let range = self.record_range(slot);
        self.dirty.mark_range(range.start, range.end);
        Ok(())
    }

    pub fn get_label(&self, slot: u32) -> Result<u64> {
        self.check_bounds(slot)?;
        let bytes = self.bytes.read();
        let off = slot as usize * self.layout.stride + self.layout.label_off;
        Ok(u64::from_le_bytes(bytes[off..off + 8].try_into().unwrap()))
    }

    pub fn set_label(&self, slot: u32, label: u64) -> Result<()> {
        self.check_bounds(slot)?;
        let mut bytes = self.bytes.write();
        let off = slot as usize * self.layout.stride + self.layout.label_off;
        bytes[off..off + 8].copy_from_slice(&label.to_le_bytes());
        drop(bytes);
        let range = self.record_range(slot);
        self.dirty.mark_range(range.start, range.end);
        Ok(())
    }

    pub fn get_deleted(&self, slot: u32) -> Result<bool> {
        self.check_bounds(slot)?;
        let bytes = self.bytes.read();
        let off = slot as usize * self.layout.stride + self.layout.deleted_off;
        Ok(bytes[off] != 0)
    }

    pub fn set_deleted(&self, slot: u32, deleted: bool) -> Result<()> {
        self.check_bounds(slot)?;
        let mut bytes = self.bytes.write();
        let off = slot as usize * self.layout.stride + self.layout.deleted_off;
        bytes[off] = deleted as u8;
        drop(bytes);
        let range = self.record_range(slot);
        self.dirty.mark_range(range.start, range.end);
        Ok(())
    }

    pub fn get_level(&self, slot: u32) -> Result<u8> {
        self.check_bounds(slot)?;
        let bytes = self.bytes.read();
        let off = slot as usize * self.layout.stride + self.layout.level_off;
        Ok(bytes[off])
    }

    pub fn set_level(&self, slot: u32, level: u8) -> Result<()> {
        self.check_bounds(slot)?;
        let mut bytes = self.bytes.write();
        let off = slot as usize * self.layout.stride + self.layout.level_off;
        bytes[off] = level;
        drop(bytes);
        let range = self.record_range(slot);
        self.dirty.mark_range(range.start, range.end);
        Ok(())
    }

    /// Raw snapshot of the whole level-0 table, used by the persistence
    /// engine to write whole pages.
    pub fn snapshot_bytes(&self) -> Vec<u8> {
        self.bytes.read().clone()
    }

    pub fn load_bytes(&self, data: Vec<u8>) {
        *self.bytes.write() = data;
    }

    pub fn snapshot_original(&self) -> Vec<u8> {
        self.original.read().clone()
    }

    pub fn load_original(&self, data: Vec<u8>) {
        *self.original.write() = data;
    }

    pub fn page_bytes(&self, page_idx: usize) -> Vec<u8> {
        let page_size = self.dirty.page_size();
        let bytes = self.bytes.read();
        let start = page_idx * page_size;
        let end = (start + page_size).min(bytes.len());
        bytes[start..end].to_vec()
    }
}
