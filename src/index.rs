//! The public façade (`spec.md` §4.7): wires the graph engine to an
//! on-disk directory and exposes the full filter & query surface.

use crate::config::IndexConfig;
use crate::error::Result;
use crate::filter::Filter;
use crate::graph::{Graph, ScoredLabel};
use crate::persistence::Persistence;
use std::path::Path;

/// A persistent HNSW vector index over a single directory. Construction
/// decides whether that directory holds a fresh index or one to recover.
pub struct Index {
    graph: Graph,
    persistence: Persistence,
}

impl Index {
    /// Create a fresh index backed by `dir`, which must not already contain
    /// a persisted index (use `open` to recover one).
    pub fn create(dir: &Path, config: IndexConfig) -> Result<Self> {
        let graph = Graph::new(config);
        let persistence = Persistence::open(dir)?;
        Ok(Self { graph, persistence })
    }

    /// Recover a previously persisted index from `dir`.
    pub fn open(dir: &Path) -> Result<Self> {
        let (_config, graph, persistence) = Persistence::recover(dir)?;
        Ok(Self { graph, persistence })
    }

    pub fn add(&self, label: u64, vector: &[f32]) -> Result<()> {
        tracing::debug!("add: label={} dim={}", label, vector.len());
        let result = self.graph.add(label, vector);
        if let Err(ref e) = result {
            tracing::warn!("add failed for label {}: {}", label, e);
        }
        result
    }

    /// `searchKnn`: the `k` nearest survivors, ascending by distance.
    pub fn search_knn(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&dyn Filter>,
    ) -> Result<Vec<ScoredLabel>> {
        tracing::debug!("search_knn: k={} ef={}", k, self.graph.ef());
        self.graph.search_knn(query, k, filter)
    }

    /// `searchKnnCloserFirst`: identical ordering to `search_knn` — both
    /// already return ascending-by-distance results — kept as a distinct
    /// name to match the public contract callers expect.
    pub fn search_knn_closer_first(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&dyn Filter>,
    ) -> Result<Vec<ScoredLabel>> {
        self.graph.search_knn(query, k, filter)
    }

    pub fn mark_delete(&self, label: u64) -> Result<()> {
        self.graph.mark_delete(label)
    }

    pub fn unmark_delete(&self, label: u64) -> Result<()> {
        self.graph.unmark_delete(label)
    }

    pub fn get_data_by_label(&self, label: u64) -> Result<Vec<f32>> {
        self.graph.get_data_by_label(label)
    }

    pub fn get_all_labels(&self) -> Result<(Vec<u64>, Vec<u64>)> {
        self.graph.get_all_labels()
    }

    /// `resizeIndex`: grows every capacity-sized structure in lockstep, then
    /// extends the on-disk files to match.
    pub fn resize_index(&self, new_capacity: u32) -> Result<()> {
        tracing::info!(
            "resize_index: {} -> {}",
            self.graph.capacity(),
            new_capacity
        );
        self.graph.resize(new_capacity)?;
        self.persistence.grow_on_disk(&self.graph)
    }

    /// Writes every dirty page plus the header; a no-op second call with no
    /// intervening mutation.
    pub fn persist_dirty(&self) -> Result<()> {
        tracing::info!("persist_dirty: flushing to disk");
        let result = self.persistence.persist_dirty(&self.graph);
        if let Err(ref e) = result {
            tracing::warn!("persist_dirty failed: {}", e);
        }
        result
    }

    pub fn set_ef(&self, ef: usize) {
        self.graph.set_ef(ef)
    }

    pub fn ef(&self) -> usize {
        self.graph.ef()
    }

    pub fn capacity(&self) -> u32 {
        self.graph.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::Metric;

    fn cfg(dim: usize) -> IndexConfig {
        let mut c = IndexConfig::new(dim, Metric::L2);
        c.m = 8;
        c.ef_construction = 64;
        c.ef = 32;
        c.initial_capacity = 64;
        c
    }

    #[test]
    fn create_add_search_persist_reopen_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let index = Index::create(dir.path(), cfg(4)).unwrap();
        for i in 1..=30u64 {
            index.add(i, &[i as f32, 0.0, 0.0, 0.0]).unwrap();
        }
        index.mark_delete(7).unwrap();
        index.persist_dirty().unwrap();

        let reopened = Index::open(dir.path()).unwrap();
        let results = reopened
            .search_knn(&[12.0, 0.0, 0.0, 0.0], 1, None)
            .unwrap();
        assert_eq!(results[0].label, 12);
        let (_live, deleted) = reopened.get_all_labels().unwrap();
        assert_eq!(deleted, vec![7]);
    }

    #[test]
    fn resize_index_then_add_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = cfg(2);
        c.auto_resize = false;
        c.initial_capacity = 2;
        let index = Index::create(dir.path(), c).unwrap();
        index.add(1, &[1.0, 1.0]).unwrap();
        index.add(2, &[2.0, 2.0]).unwrap();
        index.resize_index(8).unwrap();
        index.add(3, &[3.0, 3.0]).unwrap();
        assert_eq!(index.capacity(), 8);
    }

    #[test]
    fn set_ef_changes_default_query_width() {
        let dir = tempfile::tempdir().unwrap();
        let index = Index::create(dir.path(), cfg(2)).unwrap();
        index.set_ef(5);
        assert_eq!(index.ef(), 5);
    }
}
