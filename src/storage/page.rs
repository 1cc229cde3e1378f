//! Dirty-page tracking for the record table. A page owns the contiguous
//! byte subrange it covers; records that straddle a page boundary mark
//! both pages dirty. This is the unit `persist_dirty` writes.

use parking_lot::RwLock;

/// Default page size, matching `rusty-db`'s `BufferPoolManager` default.
pub const DEFAULT_PAGE_SIZE: usize = 4096;

pub struct DirtyBitmap {
    page_size: usize,
    bits: RwLock<Vec<bool>>,
}

impl DirtyBitmap {
    pub fn new(num_bytes: usize, page_size: usize) -> Self {
        let num_pages = num_bytes.div_ceil(page_size).max(1);
        Self {
            page_size,
            bits: RwLock::new(vec![false; num_pages]),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn num_pages(&self) -> usize {
        self.bits.read().len()
    }

    /// Mark every page touched by byte range `[start, end)` dirty.
    pub fn mark_range(&self, start: usize, end: usize) {
        if end <= start {
            return;
        }
        let first_page = start / self.page_size;
        let last_page = (end - 1) / self.page_size;
        let mut bits = self.bits.write();
        for p in first_page..=last_page {
            if p < bits.len() {
                bits[p] = true;
            }
        }
    }

    /// Grow the bitmap to cover `num_bytes`, preserving existing dirty bits.
    pub fn grow(&self, num_bytes: usize) {
        let num_pages = num_bytes.div_ceil(self.page_size).max(1);
        let mut bits = self.bits.write();
        if num_pages > bits.len() {
            bits.resize(num_pages, false);
        }
    }

    /// Re-mark specific pages dirty, used to restore state after a failed
    /// flush so the next `persistDirty` retries the same pages.
    pub fn mark_pages(&self, pages: &[usize]) {
        let mut bits = self.bits.write();
        for &p in pages {
            if p < bits.len() {
                bits[p] = true;
            }
        }
    }

    /// Snapshot the set of dirty page indices and clear them atomically.
    pub fn take_dirty(&self) -> Vec<usize> {
        let mut bits = self.bits.write();
        let dirty: Vec<usize> = bits
            .iter()
            .enumerate()
            .filter(|&(_, &d)| d)
            .map(|(i, _)| i)
            .collect();
        for d in bits.iter_mut() {
            *d = false;
        }
        dirty
    }

    #[cfg(test)]
    pub fn is_clean(&self) -> bool {
        self.bits.read().iter().all(|&d| !d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_range_spans_pages() {
        let bm = DirtyBitmap::new(4096 * 4, 4096);
        bm.mark_range(4090, 4100);
        let dirty = bm.take_dirty();
        assert_eq!(dirty, vec![0, 1]);
        assert!(bm.is_clean());
    }

    #[test]
    fn take_dirty_is_idempotent() {
        let bm = DirtyBitmap::new(4096 * 2, 4096);
        bm.mark_range(0, 10);
        assert_eq!(bm.take_dirty(), vec![0]);
        assert!(bm.take_dirty().is_empty());
    }

    #[test]
    fn grow_preserves_existing_bits() {
        let bm = DirtyBitmap::new(4096, 4096);
        bm.mark_range(0, 10);
        bm.grow(4096 * 3);
        assert_eq!(bm.num_pages(), 3);
        let dirty = bm.take_dirty();
        assert_eq!(dirty, vec![0]);
    }
}
