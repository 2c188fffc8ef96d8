//! # Search Scratch Buffers
//!
//! Breadth-first searches run to completion inside the step that starts
//! them. Their frontier, visited set and candidate lists are owned here and
//! cleared between searches, so steady-state stepping does not allocate.

use std::collections::{HashSet, VecDeque};

use rand::Rng;
use tideflow_shared::{CellKey, LayerId, TilePos};

/// Reusable buffers for one simulation.
#[derive(Debug, Default)]
pub struct SearchScratch {
    pub(crate) frontier: VecDeque<CellKey>,
    pub(crate) visited: HashSet<CellKey>,
    /// Outlet candidates with their free capacity.
    pub(crate) candidates: Vec<(CellKey, u8)>,
    /// Neighbor survey of the cell being diffused: target and its volume.
    pub(crate) survey: Vec<(CellKey, u8)>,
    pub(crate) region: Vec<TilePos>,
    pub(crate) positions: Vec<TilePos>,
    pub(crate) layers: Vec<LayerId>,
}

impl SearchScratch {
    /// Creates buffers pre-sized for searches of `capacity` nodes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            frontier: VecDeque::with_capacity(capacity),
            visited: HashSet::with_capacity(capacity),
            candidates: Vec::with_capacity(32),
            survey: Vec::with_capacity(6),
            region: Vec::with_capacity(capacity),
            positions: Vec::with_capacity(capacity),
            layers: Vec::with_capacity(4),
        }
    }

    /// Resets the frontier and visited set for a new search.
    #[inline]
    pub(crate) fn begin_search(&mut self) {
        self.frontier.clear();
        self.visited.clear();
    }

    /// Marks `key` visited. Returns `false` if it already was.
    #[inline]
    pub(crate) fn visit(&mut self, key: CellKey) -> bool {
        self.visited.insert(key)
    }
}

/// Partial Fisher–Yates: randomizes the first `count` slots of `items`
/// with a uniform sample of the whole slice.
pub fn shuffle_prefix<T, R: Rng + ?Sized>(items: &mut [T], count: usize, rng: &mut R) {
    let len = items.len();
    for i in 0..count.min(len.saturating_sub(1)) {
        let j = rng.gen_range(i..len);
        items.swap(i, j);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_shuffle_prefix_is_a_permutation() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut items: Vec<u32> = (0..50).collect();
        shuffle_prefix(&mut items, 10, &mut rng);

        let mut sorted = items.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_shuffle_prefix_is_seed_deterministic() {
        let mut a: Vec<u32> = (0..20).collect();
        let mut b = a.clone();
        shuffle_prefix(&mut a, 20, &mut ChaCha8Rng::seed_from_u64(11));
        shuffle_prefix(&mut b, 20, &mut ChaCha8Rng::seed_from_u64(11));
        assert_eq!(a, b);
    }

    #[test]
    fn test_visit_tracks_membership() {
        let mut scratch = SearchScratch::with_capacity(4);
        let key = CellKey::default();
        assert!(scratch.visit(key));
        assert!(!scratch.visit(key));
        scratch.begin_search();
        assert!(scratch.visit(key));
    }
}
