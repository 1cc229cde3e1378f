//! Level assignment and the HNSW "select neighbors heuristic" (`spec.md`
//! §4.4.1, §4.4.3). This is the index's *only* neighbor-selection policy,
//! used both for fresh edges and for trimming a neighbor's list back under
//! cap after a backlink is added.

use rand::rngs::StdRng;
use rand::Rng;

/// Draw `ℓ = ⌊−ln(U) · mL⌋` for a freshly inserted node. Seeded for
/// determinism given a fixed `StdRng` stream.
pub fn draw_level(rng: &mut StdRng, m_l: f64) -> u8 {
    let u: f64 = rng.random_range(f64::MIN_POSITIVE..=1.0);
    (-u.ln() * m_l).floor() as u8
}

#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    pub distance: f32,
    pub slot: u32,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.distance == other.distance && self.slot == other.slot
    }
}
impl Eq for Candidate {}
impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.distance
            .partial_cmp(&other.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(self.slot.cmp(&other.slot))
    }
}

/// Select up to `max_neighbors` candidates from `candidates` (need not be
/// pre-sorted): a candidate `c` is kept only if no already-kept neighbor
/// `k` is strictly closer to `c` than `c` is to the query. Ties go to the
/// candidate seen first after sorting by distance, matching the reference
/// "select neighbors heuristic" behavior of shrinking the pool
/// incrementally rather than taking the naive top-`max_neighbors` closest.
pub fn select_neighbors_heuristic(
    mut candidates: Vec<Candidate>,
    max_neighbors: usize,
    dist: impl Fn(u32, u32) -> f32,
) -> Vec<Candidate> {
    candidates.sort_unstable();
    let mut selected: Vec<Candidate> = Vec::with_capacity(max_neighbors.min(candidates.len()));
    for c in candidates {
        if selected.len() >= max_neighbors {
            break;
        }
        let dominated = selected
            .iter()
            .any(|&k| dist(c.slot, k.slot) < c.distance);
        if !dominated {
            selected.push(c);
        }
    }
    selected
}
