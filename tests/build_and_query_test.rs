// Build an index of random unit vectors and check recall@10 against a
// brute-force baseline.

use hnsw_index::{distance::Metric, Index, IndexConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const DIM: usize = 16;

fn random_unit_vector(rng: &mut StdRng) -> Vec<f32> {
    let mut v: Vec<f32> = (0..DIM).map(|_| rng.random_range(-1.0f32..1.0)).collect();
    hnsw_index::distance::normalize(&mut v);
    v
}

fn brute_force_top_k(vectors: &[(u64, Vec<f32>)], query: &[f32], k: usize) -> Vec<u64> {
    let mut scored: Vec<(f32, u64)> = vectors
        .iter()
        .map(|(label, v)| (hnsw_index::distance::squared_l2(query, v), *label))
        .collect();
    scored.sort_by(|a, b| a.0.total_cmp(&b.0));
    scored.into_iter().take(k).map(|(_, l)| l).collect()
}

#[test]
fn recall_at_10_meets_threshold() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let dir = tempfile::tempdir().unwrap();
    let mut config = IndexConfig::new(DIM, Metric::L2);
    config.m = 16;
    config.ef_construction = 200;
    config.ef = 200;
    config.initial_capacity = 1000;
    let index = Index::create(dir.path(), config).unwrap();

    let mut rng = StdRng::seed_from_u64(42);
    let mut vectors = Vec::with_capacity(1000);
    for i in 0..1000u64 {
        let v = random_unit_vector(&mut rng);
        index.add(i + 1, &v).unwrap();
        vectors.push((i + 1, v));
    }

    let mut total_hits = 0usize;
    let mut total_expected = 0usize;
    for _ in 0..10 {
        let q = random_unit_vector(&mut rng);
        let approx: Vec<u64> = index
            .search_knn(&q, 10, None)
            .unwrap()
            .into_iter()
            .map(|r| r.label)
            .collect();
        let exact = brute_force_top_k(&vectors, &q, 10);
        total_hits += approx.iter().filter(|l| exact.contains(l)).count();
        total_expected += exact.len();
    }

    let recall = total_hits as f64 / total_expected as f64;
    assert!(recall >= 0.99, "recall@10 was {recall}");
}
