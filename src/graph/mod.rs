//! HNSW graph engine (`spec.md` §4.4): insert, search, the neighbor
//! selection heuristic, level assignment, and entry-point maintenance.
//! Owns the record table, link-list table, label directory, and the
//! concurrency primitives that guard them.

pub mod heuristic;
pub mod search;
pub mod visited;

use crate::concurrency::{EntryPoint, SlotLocks, StructuralLock};
use crate::config::IndexConfig;
use crate::distance::Metric;
use crate::error::{IndexError, Result};
use crate::filter::Filter;
use crate::label::LabelDirectory;
use crate::storage::{LinkListTable, RecordLayout, RecordTable};
use heuristic::{draw_level, select_neighbors_heuristic, Candidate};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use search::{greedy_descend, search_layer};
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct Graph {
    pub config: IndexConfig,
    pub(crate) records: RecordTable,
    pub(crate) links: LinkListTable,
    pub(crate) labels: LabelDirectory,
    pub(crate) structural: StructuralLock,
    slot_locks: SlotLocks,
    visited_pool: visited::VisitedSetPool,
    rng: Mutex<StdRng>,
    ef: AtomicUsize,
}

/// A single (distance, label) result pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredLabel {
    pub distance: f32,
    pub label: u64,
}

impl Graph {
    pub fn new(config: IndexConfig) -> Self {
        let m0 = config.m0();
        let layout = RecordLayout::new(config.dim, config.vector_width(), m0);
        let records = RecordTable::new(layout, config.initial_capacity, config.page_size);
        let links = LinkListTable::new(config.initial_capacity, config.m);
        let labels = LabelDirectory::new(config.initial_capacity);
        let ef = AtomicUsize::new(config.ef);
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(config.seed)),
            slot_locks: SlotLocks::new(config.initial_capacity),
            visited_pool: visited::VisitedSetPool::new(config.initial_capacity as usize),
            structural: StructuralLock::new(),
            records,
            links,
            labels,
            config,
            ef,
        }
    }

    pub fn set_ef(&self, ef: usize) {
        self.ef.store(ef, Ordering::Relaxed);
    }

    pub fn ef(&self) -> usize {
        self.ef.load(Ordering::Relaxed)
    }

    pub fn capacity(&self) -> u32 {
        self.records.capacity()
    }

    fn check_dim(&self, vec: &[f32]) -> Result<()> {
        if vec.len() != self.config.dim {
            return Err(IndexError::DimensionMismatch {
                expected: self.config.dim,
                actual: vec.len(),
            });
        }
        Ok(())
    }

    fn cap_at(&self, level: u8) -> usize {
        if level == 0 {
            self.config.m0()
        } else {
            self.config.m
        }
    }

    fn neighbors_at(&self, slot: u32, level: u8) -> Result<Vec<u32>> {
        if level == 0 {
            self.records.read_level0_adj(slot)
        } else {
            self.links.read_level_adj(slot, level)
        }
    }

    fn write_neighbors_at(&self, slot: u32, level: u8, list: &[u32]) -> Result<()> {
        if level == 0 {
            self.records.write_level0_adj(slot, list)
        } else {
            self.links.write_level_adj(slot, level, list)
        }
    }

    fn quantize(v: &[f32]) -> Vec<u8> {
        v.iter().map(|&x| x.round().clamp(0.0, 255.0) as u8).collect()
    }

    /// Distance from an in-memory query vector to a stored slot. For
    /// `InnerProduct`/`Cosine` the stored vector was normalized on insert, so
    /// the query is normalized the same way here; otherwise the reported
    /// distance would be off by a factor of `|query|` even though ranking
    /// (the quantity `searchKnn` actually relies on) is unaffected by that
    /// scaling.
    fn query_distance(&self, query: &[f32], slot: u32) -> Result<f32> {
        match self.config.metric {
            Metric::L2Int => {
                let qi = Self::quantize(query);
                let stored = self.records.read_vector_u8(slot)?;
                Ok(self.config.metric.distance_int(&qi, &stored) as f32)
            }
            metric if metric.normalizes() => {
                let mut q = query.to_vec();
                crate::distance::normalize(&mut q);
                let stored = self.records.read_vector_f32(slot)?;
                Ok(metric.distance(&q, &stored))
            }
            _ => {
                let stored = self.records.read_vector_f32(slot)?;
                Ok(self.config.metric.distance(query, &stored))
            }
        }
    }

    fn slot_distance(&self, a: u32, b: u32) -> Result<f32> {
        match self.config.metric {
            Metric::L2Int => {
                let va = self.records.read_vector_u8(a)?;
                let vb = self.records.read_vector_u8(b)?;
                Ok(self.config.metric.distance_int(&va, &vb) as f32)
            }
            _ => {
                let va = self.records.read_vector_f32(a)?;
                let vb = self.records.read_vector_f32(b)?;
                Ok(self.config.metric.distance(&va, &vb))
            }
        }
    }

    /// Write the working (possibly normalized) vector and the exact
    /// original into slot's two parallel tables.
    fn store_vector(&self, slot: u32, vec: &[f32]) -> Result<()> {
        match self.config.metric {
            Metric::L2Int => {
                let q = Self::quantize(vec);
                self.records.write_vector_u8(slot, &q)?;
                self.records.write_original(slot, &q)?;
            }
            Metric::L2 => {
                self.records.write_vector_f32(slot, vec)?;
                self.records.write_original_f32(slot, vec)?;
            }
            Metric::InnerProduct | Metric::Cosine => {
                self.records.write_original_f32(slot, vec)?;
                let mut working = vec.to_vec();
                crate::distance::normalize(&mut working);
                self.records.write_vector_f32(slot, &working)?;
            }
        }
        Ok(())
    }

    /// Grow every capacity-sized structure in lockstep (`spec.md` §4.4.6).
    pub fn resize(&self, new_capacity: u32) -> Result<()> {
        let live = self.labels.len() as u32;
        if new_capacity < live {
            return Err(IndexError::InvalidCapacity(format!(
                "requested capacity {new_capacity} is below current live count {live}"
            )));
        }
        let _guard = self.structural.write();
        self.records.grow(new_capacity);
        self.links.grow(new_capacity);
        self.labels.notify_capacity_grown(new_capacity);
        self.slot_locks.grow(new_capacity);
        self.visited_pool.grow(new_capacity as usize);
        Ok(())
    }

    fn grow_if_auto(&self) -> Result<()> {
        if !self.config.auto_resize {
            return Err(IndexError::CapacityExceeded(
                "index is full and auto-resize is disabled".to_string(),
            ));
        }
        let new_capacity = (self.capacity() * 2).max(self.capacity() + 1);
        self.resize(new_capacity)
    }

    /// Insert or replace-in-place (`spec.md` §4.4.3). Label `0` is reserved
    /// internally to mark a never-allocated slot during recovery scanning
    /// (see `persistence::recover`), so it is not a valid caller label.
    pub fn add(&self, label: u64, vec: &[f32]) -> Result<()> {
        if label == 0 {
            return Err(IndexError::InvalidArgument(
                "label 0 is reserved and cannot be used".to_string(),
            ));
        }
        self.check_dim(vec)?;
        if let Some(slot) = self.labels.lookup(label) {
            self.replace_in_place(slot, vec)
        } else {
            self.insert_fresh(label, vec)
        }
    }

    fn insert_fresh(&self, label: u64, vec: &[f32]) -> Result<()> {
        let slot = loop {
            match self.labels.allocate(label) {
                Ok(slot) => break slot,
                Err(IndexError::CapacityExceeded(_)) => {
                    self.grow_if_auto()?;
                }
                Err(e) => return Err(e),
            }
        };

        let level = draw_level(&mut self.rng.lock(), self.config.m_l());
        self.store_vector(slot, vec)?;
        // Label 0 is reserved to mean "slot never allocated" for recovery
        // scanning; a non-zero label here is what the on-disk scan uses to
        // rebuild the label directory without needing a separate bitmap.
        self.records.set_label(slot, label)?;
        self.records.set_level(slot, level)?;
        self.records.set_deleted(slot, false)?;
        if level > 0 {
            self.links.alloc_for_level_count(slot, level)?;
        }

        let snapshot = self.structural.snapshot();
        match snapshot {
            None => {
                // First node in the index: it becomes the entry point with
                // no edges to wire up.
                let mut guard = self.structural.write();
                if guard.is_none() {
                    *guard = Some(EntryPoint {
                        slot,
                        max_level: level,
                    });
                }
            }
            Some(ep) => {
                self.wire_new_node(slot, level, ep)?;
                if level > ep.max_level {
                    let mut guard = self.structural.write();
                    if guard.map(|g| level > g.max_level).unwrap_or(true) {
                        *guard = Some(EntryPoint {
                            slot,
                            max_level: level,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn replace_in_place(&self, slot: u32, vec: &[f32]) -> Result<()> {
        self.store_vector(slot, vec)?;
        self.records.set_deleted(slot, false)?;
        let level = self.records.get_level(slot)?;
        for lc in 0..=level {
            self.write_neighbors_at(slot, lc, &[])?;
        }

        let snapshot = self.structural.snapshot();
        if let Some(ep) = snapshot {
            if ep.slot != slot {
                self.wire_new_node(slot, level, ep)?;
            } else {
                // Replacing the entry point itself: there's nothing above
                // it to descend from, so just rebuild level 0..=level from
                // itself as the seed (degenerate one-node graph is handled
                // inside wire_new_node's search_layer, which always admits
                // the seed).
                self.wire_new_node(slot, level, ep)?;
            }
        }
        Ok(())
    }

    /// Shared per-level search + heuristic-select + backlink procedure used
    /// by both fresh inserts and replace-in-place.
    fn wire_new_node(&self, slot: u32, level: u8, ep: EntryPoint) -> Result<()> {
        let mut cur_obj = ep.slot;

        for lc in (level + 1..=ep.max_level).rev() {
            cur_obj = greedy_descend(
                |s| self.query_distance_by_slot(slot, s),
                cur_obj,
                |s| self.neighbors_at(s, lc),
            )?;
        }

        let top = level.min(ep.max_level);
        for lc in (0..=top).rev() {
            let mut visited = self.visited_pool.checkout();
            let results = search_layer(
                |s| self.query_distance_by_slot(slot, s),
                &[cur_obj],
                self.config.ef_construction,
                |s| self.neighbors_at(s, lc),
                self.capacity(),
                &mut visited,
            )?;
            self.visited_pool.checkin(visited);

            let mut candidates: Vec<Candidate> = results.into_vec();
            if let Some(best) = candidates.iter().min_by(|a, b| a.distance.total_cmp(&b.distance)) {
                cur_obj = best.slot;
            }
            candidates.retain(|c| c.slot != slot);

            let cap = self.cap_at(lc);
            let selected = select_neighbors_heuristic(candidates, cap, |a, b| {
                self.slot_distance(a, b).unwrap_or(f32::INFINITY)
            });
            let selected_slots: Vec<u32> = selected.iter().map(|c| c.slot).collect();
            self.write_neighbors_at(slot, lc, &selected_slots)?;

            for &n in &selected_slots {
                let _guard = self.slot_locks.lock_one(n);
                let mut existing = self.neighbors_at(n, lc)?;
                if !existing.contains(&slot) {
                    existing.push(slot);
                }
                if existing.len() > cap {
                    let cands: Vec<Candidate> = existing
                        .iter()
                        .map(|&s| {
                            Ok(Candidate {
                                distance: self.slot_distance(n, s)?,
                                slot: s,
                            })
                        })
                        .collect::<Result<Vec<_>>>()?;
                    let reselected = select_neighbors_heuristic(cands, cap, |a, b| {
                        self.slot_distance(a, b).unwrap_or(f32::INFINITY)
                    });
                    let trimmed: Vec<u32> = reselected.iter().map(|c| c.slot).collect();
                    self.write_neighbors_at(n, lc, &trimmed)?;
                } else {
                    self.write_neighbors_at(n, lc, &existing)?;
                }
            }
        }
        Ok(())
    }

    /// Distance between slot `from`'s stored vector and slot `to` — used
    /// while wiring a newly inserted node, where the "query" is itself a
    /// slot already written into the record table.
    fn query_distance_by_slot(&self, from: u32, to: u32) -> Result<f32> {
        self.slot_distance(from, to)
    }

    /// `searchKnn` (`spec.md` §4.4.4): returns the `k` closest survivors,
    /// ascending by distance.
    pub fn search_knn(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&dyn Filter>,
    ) -> Result<Vec<ScoredLabel>> {
        self.check_dim(query)?;
        let snapshot = self.structural.snapshot();
        let Some(ep) = snapshot else {
            return Ok(Vec::new());
        };

        let mut cur_obj = ep.slot;
        for lc in (1..=ep.max_level).rev() {
            cur_obj = greedy_descend(
                |s| self.query_distance(query, s),
                cur_obj,
                |s| self.neighbors_at(s, lc),
            )?;
        }

        let ef = self.ef().max(k);
        let mut visited = self.visited_pool.checkout();
        let results = search_layer(
            |s| self.query_distance(query, s),
            &[cur_obj],
            ef,
            |s| self.neighbors_at(s, 0),
            self.capacity(),
            &mut visited,
        )?;
        self.visited_pool.checkin(visited);

        let mut survivors: Vec<ScoredLabel> = Vec::new();
        for c in results.into_sorted_vec() {
            if self.records.get_deleted(c.slot)? {
                continue;
            }
            let Some(label) = self.labels.label_of(c.slot) else {
                continue;
            };
            if let Some(f) = filter {
                if !f.allows(label) {
                    continue;
                }
            }
            survivors.push(ScoredLabel {
                distance: c.distance,
                label,
            });
        }
        survivors.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        survivors.truncate(k);
        Ok(survivors)
    }

    pub fn mark_delete(&self, label: u64) -> Result<()> {
        let slot = self
            .labels
            .lookup(label)
            .ok_or(IndexError::LabelNotFound(label))?;
        self.records.set_deleted(slot, true)
    }

    pub fn unmark_delete(&self, label: u64) -> Result<()> {
        let slot = self
            .labels
            .lookup(label)
            .ok_or(IndexError::LabelNotFound(label))?;
        self.records.set_deleted(slot, false)
    }

    pub fn get_data_by_label(&self, label: u64) -> Result<Vec<f32>> {
        let slot = self
            .labels
            .lookup(label)
            .ok_or(IndexError::LabelNotFound(label))?;
        match self.config.metric {
            Metric::L2Int => {
                let raw = self.records.read_original(slot)?;
                Ok(raw.into_iter().map(|b| b as f32).collect())
            }
            _ => self.records.read_original_f32(slot),
        }
    }

    /// Force the entry point, used by `persistence::recover` to restore the
    /// graph head read from a header rather than derived from inserts.
    pub(crate) fn set_entry_point(&self, ep: Option<EntryPoint>) {
        *self.structural.write() = ep;
    }

    pub fn get_all_labels(&self) -> Result<(Vec<u64>, Vec<u64>)> {
        let mut live = Vec::new();
        let mut deleted = Vec::new();
        for (label, slot) in self.labels.all_labels() {
            if self.records.get_deleted(slot)? {
                deleted.push(label);
            } else {
                live.push(label);
            }
        }
        Ok((live, deleted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(dim: usize) -> IndexConfig {
        let mut c = IndexConfig::new(dim, Metric::L2);
        c.m = 8;
        c.ef_construction = 64;
        c.ef = 32;
        c.initial_capacity = 64;
        c
    }

    #[test]
    fn insert_and_search_finds_self() {
        let g = Graph::new(cfg(4));
        g.add(1, &[1.0, 0.0, 0.0, 0.0]).unwrap();
        g.add(2, &[0.0, 1.0, 0.0, 0.0]).unwrap();
        g.add(3, &[10.0, 10.0, 10.0, 10.0]).unwrap();
        let results = g.search_knn(&[1.0, 0.0, 0.0, 0.0], 1, None).unwrap();
        assert_eq!(results[0].label, 1);
    }

    #[test]
    fn dimension_mismatch_rejected() {
        let g = Graph::new(cfg(4));
        let err = g.add(1, &[1.0, 2.0]).unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { .. }));
    }

    #[test]
    fn soft_delete_hides_from_results_but_keeps_routing() {
        let g = Graph::new(cfg(2));
        for i in 1..=20u64 {
            g.add(i, &[i as f32, 0.0]).unwrap();
        }
        g.mark_delete(5).unwrap();
        let (live, deleted) = g.get_all_labels().unwrap();
        assert_eq!(live.len(), 19);
        assert_eq!(deleted, vec![5]);
        let results = g.search_knn(&[5.0, 0.0], 20, None).unwrap();
        assert!(!results.iter().any(|r| r.label == 5));
        g.unmark_delete(5).unwrap();
        let results = g.search_knn(&[5.0, 0.0], 20, None).unwrap();
        assert!(results.iter().any(|r| r.label == 5));
    }

    #[test]
    fn cosine_reported_distance_is_query_scale_invariant() {
        let mut c = cfg(2);
        c.metric = Metric::Cosine;
        let g = Graph::new(c);
        g.add(1, &[1.0, 0.0]).unwrap();
        g.add(2, &[0.0, 1.0]).unwrap();

        let short = g.search_knn(&[2.0, 0.0], 1, None).unwrap();
        let long = g.search_knn(&[200.0, 0.0], 1, None).unwrap();
        assert_eq!(short[0].label, 1);
        assert_eq!(long[0].label, 1);
        assert!((short[0].distance - long[0].distance).abs() < 1e-5);
    }

    #[test]
    fn replace_in_place_moves_result() {
        let g = Graph::new(cfg(2));
        for i in 1..=10u64 {
            g.add(i, &[i as f32, 0.0]).unwrap();
        }
        g.add(3, &[100.0, 100.0]).unwrap();
        let got = g.get_data_by_label(3).unwrap();
        assert_eq!(got, vec![100.0, 100.0]);
        let results = g.search_knn(&[100.0, 100.0], 1, None).unwrap();
        assert_eq!(results[0].label, 3);
    }

    #[test]
    fn capacity_exceeded_without_auto_resize() {
        let mut c = cfg(2);
        c.auto_resize = false;
        c.initial_capacity = 2;
        let g = Graph::new(c);
        g.add(1, &[1.0, 1.0]).unwrap();
        g.add(2, &[2.0, 2.0]).unwrap();
        let err = g.add(3, &[3.0, 3.0]).unwrap_err();
        assert!(matches!(err, IndexError::CapacityExceeded(_)));
    }

    #[test]
    fn resize_then_add_succeeds() {
        let mut c = cfg(2);
        c.auto_resize = false;
        c.initial_capacity = 2;
        let g = Graph::new(c);
        g.add(1, &[1.0, 1.0]).unwrap();
        g.add(2, &[2.0, 2.0]).unwrap();
        g.resize(4).unwrap();
        g.add(3, &[3.0, 3.0]).unwrap();
        assert_eq!(g.get_data_by_label(1).unwrap(), vec![1.0, 1.0]);
    }

    #[test]
    fn filter_predicate_excludes_labels() {
        let g = Graph::new(cfg(2));
        for i in 1..=10u64 {
            g.add(i, &[i as f32, 0.0]).unwrap();
        }
        let filter = |label: u64| label.is_multiple_of(2);
        let results = g.search_knn(&[0.0, 0.0], 10, Some(&filter)).unwrap();
        assert!(results.iter().all(|r| r.label % 2 == 0));
    }

    #[test]
    fn mark_delete_unknown_label_fails() {
        let g = Graph::new(cfg(2));
        assert!(matches!(
            g.mark_delete(999).unwrap_err(),
            IndexError::LabelNotFound(999)
        ));
    }
}
