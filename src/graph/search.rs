//! `searchLayer` and the greedy single-level descent used both during
//! insert and query (`spec.md` §4.4.2, §4.4.4).

use super::heuristic::Candidate;
use super::visited::VisitedSet;
use crate::error::{IndexError, Result};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Standard HNSW layer search: min-heap of unexplored candidates, max-heap
/// of the current top-`ef` results. Expands the nearest unvisited
/// candidate, admits neighbors closer than the current worst admitted
/// result, and stops once the best remaining candidate is farther than
/// that worst result.
pub fn search_layer(
    dist_to: impl Fn(u32) -> Result<f32>,
    entry_points: &[u32],
    ef: usize,
    neighbors_at: impl Fn(u32) -> Result<Vec<u32>>,
    capacity: u32,
    visited: &mut VisitedSet,
) -> Result<BinaryHeap<Candidate>> {
    let mut candidates: BinaryHeap<Reverse<Candidate>> = BinaryHeap::new();
    let mut results: BinaryHeap<Candidate> = BinaryHeap::new();

    for &ep in entry_points {
        if visited.is_visited(ep) {
            continue;
        }
        visited.mark(ep);
        let d = dist_to(ep)?;
        let c = Candidate { distance: d, slot: ep };
        candidates.push(Reverse(c));
        results.push(c);
    }

    while let Some(Reverse(nearest)) = candidates.pop() {
        if let Some(&worst) = results.peek().as_ref() {
            if results.len() >= ef && nearest.distance > worst.distance {
                break;
            }
        }

        for neighbor in neighbors_at(nearest.slot)? {
            if neighbor >= capacity {
                return Err(IndexError::InternalCorruption(format!(
                    "neighbor slot {neighbor} >= capacity {capacity}"
                )));
            }
            if visited.is_visited(neighbor) {
                continue;
            }
            visited.mark(neighbor);
            let d = dist_to(neighbor)?;
            let worse_than_results = results.len() >= ef
                && results.peek().map(|w| d >= w.distance).unwrap_or(false);
            if !worse_than_results {
                let c = Candidate { distance: d, slot: neighbor };
                candidates.push(Reverse(c));
                results.push(c);
                if results.len() > ef {
                    // Drop the current worst admitted result.
                    let mut tmp: Vec<Candidate> = results.into_sorted_vec();
                    tmp.pop();
                    results = tmp.into_iter().collect();
                }
            }
        }
    }

    Ok(results)
}

/// Greedy 1-NN descent through a single level, starting from `start`:
/// repeatedly move to the closest neighbor of the current best node until
/// no neighbor improves on it.
pub fn greedy_descend(
    dist_to: impl Fn(u32) -> Result<f32>,
    start: u32,
    neighbors_at: impl Fn(u32) -> Result<Vec<u32>>,
) -> Result<u32> {
    let mut best = start;
    let mut best_dist = dist_to(best)?;
    loop {
        let mut improved = false;
        for neighbor in neighbors_at(best)? {
            let d = dist_to(neighbor)?;
            if d < best_dist {
                best = neighbor;
                best_dist = d;
                improved = true;
            }
        }
        if !improved {
            return Ok(best);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::visited::VisitedSetPool;

    // A tiny fixed graph: a line 0-1-2-3-4, Euclidean-ish distances by index.
    fn neighbors(slot: u32) -> Result<Vec<u32>> {
        Ok(match slot {
            0 => vec![1],
            1 => vec![0, 2],
            2 => vec![1, 3],
            3 => vec![2, 4],
            4 => vec![3],
            _ => vec![],
        })
    }

    fn dist_from(target: u32) -> impl Fn(u32) -> Result<f32> {
        move |slot: u32| Ok(((slot as i32 - target as i32).abs()) as f32)
    }

    #[test]
    fn search_layer_finds_nearest() {
        let pool = VisitedSetPool::new(5);
        let mut visited = pool.checkout();
        let results = search_layer(dist_from(4), &[0], 2, neighbors, 5, &mut visited).unwrap();
        let mut slots: Vec<u32> = results.into_sorted_vec().iter().map(|c| c.slot).collect();
        slots.sort_unstable();
        assert_eq!(slots, vec![3, 4]);
    }

    #[test]
    fn greedy_descend_reaches_target() {
        let best = greedy_descend(dist_from(4), 0, neighbors).unwrap();
        assert_eq!(best, 4);
    }

    #[test]
    fn search_layer_rejects_out_of_bounds_neighbor() {
        let pool = VisitedSetPool::new(5);
        let mut visited = pool.checkout();
        let bad_neighbors = |_: u32| -> Result<Vec<u32>> { Ok(vec![999]) };
        let err = search_layer(dist_from(0), &[0], 2, bad_neighbors, 5, &mut visited).unwrap_err();
        assert!(matches!(err, IndexError::InternalCorruption(_)));
    }
}
