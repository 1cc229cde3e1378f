//! Index construction parameters, modeled on `rusty-db`'s plain
//! `Config`/`DatabaseConfig` struct-plus-`Default` convention rather than a
//! builder macro.

use crate::distance::Metric;
use crate::storage::DEFAULT_PAGE_SIZE;

#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Vector dimension, immutable once the index is constructed.
    pub dim: usize,
    pub metric: Metric,
    /// Max out-degree per node above layer 0.
    pub m: usize,
    /// Candidate-list width during insert.
    pub ef_construction: usize,
    /// Default candidate-list width at query time (mutable via `set_ef`).
    pub ef: usize,
    /// Initial slot capacity.
    pub initial_capacity: u32,
    /// Seed for level assignment, for deterministic construction.
    pub seed: u64,
    /// Whether `add` is allowed to grow capacity automatically.
    pub auto_resize: bool,
    pub page_size: usize,
}

impl IndexConfig {
    pub fn new(dim: usize, metric: Metric) -> Self {
        Self {
            dim,
            metric,
            ..Self::defaults()
        }
    }

    fn defaults() -> Self {
        Self {
            dim: 0,
            metric: Metric::L2,
            m: 16,
            ef_construction: 200,
            ef: 10,
            initial_capacity: 1000,
            seed: 100,
            auto_resize: true,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn m0(&self) -> usize {
        2 * self.m
    }

    /// `mL = 1 / ln(M)`, the level-assignment constant (`spec.md` §4.4).
    pub fn m_l(&self) -> f64 {
        1.0 / (self.m as f64).ln()
    }

    pub fn vector_width(&self) -> usize {
        match self.metric {
            Metric::L2Int => 1,
            _ => 4,
        }
    }
}
