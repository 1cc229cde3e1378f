// Re-adding an existing label rewrites its vector and connectivity in
// place rather than creating a second entry.

use hnsw_index::{distance::Metric, Index, IndexConfig};

const DIM: usize = 4;

fn cfg() -> IndexConfig {
    let mut c = IndexConfig::new(DIM, Metric::L2);
    c.initial_capacity = 64;
    c
}

#[test]
fn replace_in_place_moves_nearest_neighbor_rank() {
    let dir = tempfile::tempdir().unwrap();
    let index = Index::create(dir.path(), cfg()).unwrap();

    for i in 1..=30u64 {
        if i == 42 {
            continue;
        }
        index.add(i, &[i as f32, 0.0, 0.0, 0.0]).unwrap();
    }
    let v1 = [42.0f32, 0.0, 0.0, 0.0];
    index.add(42, &v1).unwrap();

    let near_v1 = index.search_knn(&v1, 1, None).unwrap();
    assert_eq!(near_v1[0].label, 42);

    let v2 = [-900.0f32, -900.0, -900.0, -900.0];
    index.add(42, &v2).unwrap();

    assert_eq!(index.get_data_by_label(42).unwrap(), v2);
    let near_v2 = index.search_knn(&v2, 5, None).unwrap();
    assert!(near_v2.iter().any(|r| r.label == 42));

    let near_v1_again = index.search_knn(&v1, 1, None).unwrap();
    assert_ne!(near_v1_again[0].label, 42);
}
