// Build an index, query it, persist, drop, reload, and rerun the same
// queries: results must match exactly.

use hnsw_index::{distance::Metric, Index, IndexConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const DIM: usize = 1536;

fn cfg() -> IndexConfig {
    let mut c = IndexConfig::new(DIM, Metric::InnerProduct);
    c.initial_capacity = 100;
    c
}

#[test]
fn reload_reproduces_identical_ranked_results() {
    let dir = tempfile::tempdir().unwrap();
    let mut rng = StdRng::seed_from_u64(9);

    let index = Index::create(dir.path(), cfg()).unwrap();
    for i in 1..=100u64 {
        let v: Vec<f32> = (0..DIM).map(|_| rng.random_range(-1.0f32..1.0)).collect();
        index.add(i, &v).unwrap();
    }

    let queries: Vec<Vec<f32>> = (0..10)
        .map(|_| (0..DIM).map(|_| rng.random_range(-1.0f32..1.0)).collect())
        .collect();

    let before: Vec<Vec<(f32, u64)>> = queries
        .iter()
        .map(|q| {
            index
                .search_knn(q, 10, None)
                .unwrap()
                .into_iter()
                .map(|r| (r.distance, r.label))
                .collect()
        })
        .collect();

    index.persist_dirty().unwrap();
    drop(index);

    let reopened = Index::open(dir.path()).unwrap();
    let after: Vec<Vec<(f32, u64)>> = queries
        .iter()
        .map(|q| {
            reopened
                .search_knn(q, 10, None)
                .unwrap()
                .into_iter()
                .map(|r| (r.distance, r.label))
                .collect()
        })
        .collect();

    assert_eq!(before.len(), after.len());
    for (b, a) in before.iter().zip(after.iter()) {
        assert_eq!(b.len(), a.len());
        for ((bd, bl), (ad, al)) in b.iter().zip(a.iter()) {
            assert_eq!(bl, al);
            assert!((bd - ad).abs() < 1e-6);
        }
    }
}
