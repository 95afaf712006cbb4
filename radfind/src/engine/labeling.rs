//! Island labelling.
//!
//! Islands are 4-connected groups of pixels above the flood threshold that
//! contain at least one pixel above the seed threshold. Labelling is a two
//! pass scan with union-find label equivalences.

use ndarray::{Array2, ArrayView2};

/// Disjoint-set forest over `0..n` with path halving.
#[derive(Debug, Clone)]
pub struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    /// Add a new singleton set and return its id.
    pub fn push(&mut self) -> usize {
        let id = self.parent.len();
        self.parent.push(id);
        id
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    pub fn find(&mut self, mut id: usize) -> usize {
        while id != self.parent[id] {
            self.parent[id] = self.parent[self.parent[id]];
            id = self.parent[id];
        }
        id
    }

    /// Merge the sets holding `a` and `b`. The smaller root wins.
    pub fn union(&mut self, a: usize, b: usize) -> usize {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a == root_b {
            return root_a;
        }
        let (keep, absorb) = if root_a < root_b {
            (root_a, root_b)
        } else {
            (root_b, root_a)
        };
        self.parent[absorb] = keep;
        keep
    }

    /// Dense group index per element, numbered in order of first appearance.
    pub fn groups(&mut self) -> Vec<usize> {
        let mut dense = vec![usize::MAX; self.parent.len()];
        let mut next = 0;
        let mut out = Vec::with_capacity(self.parent.len());
        for id in 0..self.parent.len() {
            let root = self.find(id);
            if dense[root] == usize::MAX {
                dense[root] = next;
                next += 1;
            }
            out.push(dense[root]);
        }
        out
    }
}

/// Pixels of one island, `(row, col)` pairs in scan order.
#[derive(Debug, Clone, PartialEq)]
pub struct Island {
    pub pixels: Vec<(usize, usize)>,
    /// Row/col bounds, inclusive: (min_row, min_col, max_row, max_col)
    pub bounds: (usize, usize, usize, usize),
}

impl Island {
    fn new() -> Self {
        Self {
            pixels: Vec::new(),
            bounds: (usize::MAX, usize::MAX, 0, 0),
        }
    }

    fn add(&mut self, row: usize, col: usize) {
        self.pixels.push((row, col));
        let (min_row, min_col, max_row, max_col) = &mut self.bounds;
        *min_row = (*min_row).min(row);
        *min_col = (*min_col).min(col);
        *max_row = (*max_row).max(row);
        *max_col = (*max_col).max(col);
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }
}

/// Label 4-connected components of `mask`. Background is 0, components are
/// numbered from 1 in scan order.
pub fn connected_components(mask: &ArrayView2<bool>) -> (Array2<usize>, usize) {
    let (height, width) = mask.dim();
    let mut labels = Array2::zeros((height, width));
    // Slot 0 is the background
    let mut sets = DisjointSet::new(1);

    for row in 0..height {
        for col in 0..width {
            if !mask[[row, col]] {
                continue;
            }
            let up = if row > 0 { labels[[row - 1, col]] } else { 0 };
            let left = if col > 0 { labels[[row, col - 1]] } else { 0 };
            labels[[row, col]] = match (up, left) {
                (0, 0) => sets.push(),
                (label, 0) | (0, label) => label,
                (up, left) => {
                    sets.union(up, left);
                    up.min(left)
                }
            };
        }
    }

    // Consecutive final labels, background stays 0
    let groups = sets.groups();
    for label in labels.iter_mut() {
        *label = groups[*label];
    }
    let count = groups.iter().copied().max().unwrap_or(0);
    (labels, count)
}

/// Find islands in a signal to noise map.
///
/// Pixels at or above `flood` are grown into islands; islands with no pixel
/// at or above `seed` are dropped. Non-finite values never belong to an island.
pub fn find_islands(snr: &ArrayView2<f64>, seed: f64, flood: f64) -> Vec<Island> {
    let mask = snr.mapv(|value| value.is_finite() && value >= flood);
    let (labels, count) = connected_components(&mask.view());

    let mut islands: Vec<Island> = (0..count).map(|_| Island::new()).collect();
    let mut seeded = vec![false; count];
    for ((row, col), &label) in labels.indexed_iter() {
        if label == 0 {
            continue;
        }
        islands[label - 1].add(row, col);
        if snr[[row, col]] >= seed {
            seeded[label - 1] = true;
        }
    }

    islands
        .into_iter()
        .zip(seeded)
        .filter_map(|(island, seeded)| seeded.then_some(island))
        .collect()
}

/// Local maxima inside `island` at or above `seed`, 8-neighbour comparison.
pub fn count_summits(snr: &ArrayView2<f64>, island: &Island, seed: f64) -> usize {
    let (height, width) = snr.dim();
    island
        .pixels
        .iter()
        .filter(|&&(row, col)| {
            let value = snr[[row, col]];
            if value < seed {
                return false;
            }
            for dr in -1i64..=1 {
                for dc in -1i64..=1 {
                    if dr == 0 && dc == 0 {
                        continue;
                    }
                    let r = row as i64 + dr;
                    let c = col as i64 + dc;
                    if r < 0 || c < 0 || r >= height as i64 || c >= width as i64 {
                        continue;
                    }
                    if snr[[r as usize, c as usize]] > value {
                        return false;
                    }
                }
            }
            true
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_disjoint_set_groups() {
        let mut sets = DisjointSet::new(5);
        sets.union(3, 1);
        sets.union(4, 3);
        assert_eq!(sets.groups(), vec![0, 1, 2, 1, 1]);
        assert_eq!(sets.find(4), 1);
    }

    #[test]
    fn test_connected_components_u_shape() {
        // Two arms joined at the bottom must end up with one label
        let mask = array![
            [true, false, true],
            [true, false, true],
            [true, true, true],
        ];
        let (labels, count) = connected_components(&mask.view());
        assert_eq!(count, 1);
        assert!(labels.iter().all(|&label| label <= 1));
        assert_eq!(labels[[0, 0]], labels[[0, 2]]);
    }

    #[test]
    fn test_diagonal_pixels_are_separate() {
        let mask = array![[true, false], [false, true]];
        let (labels, count) = connected_components(&mask.view());
        assert_eq!(count, 2);
        assert_ne!(labels[[0, 0]], labels[[1, 1]]);
    }

    #[test]
    fn test_empty_mask() {
        let mask = Array2::from_elem((4, 4), false);
        let (labels, count) = connected_components(&mask.view());
        assert_eq!(count, 0);
        assert!(labels.iter().all(|&label| label == 0));
    }

    #[test]
    fn test_seed_and_flood() {
        let snr = array![
            [0.0, 4.5, 0.0, 0.0, 4.5],
            [4.5, 6.0, 4.5, 0.0, 4.5],
            [0.0, 4.5, 0.0, 0.0, f64::NAN],
        ];
        let islands = find_islands(&snr.view(), 5.0, 4.0);
        // The right hand column floods but never seeds
        assert_eq!(islands.len(), 1);
        assert_eq!(islands[0].len(), 5);
        assert_eq!(islands[0].bounds, (0, 0, 2, 2));
    }

    #[test]
    fn test_count_summits() {
        let snr = array![[6.0, 4.0, 7.0], [4.0, 4.0, 4.0]];
        let islands = find_islands(&snr.view(), 5.0, 4.0);
        assert_eq!(islands.len(), 1);
        assert_eq!(count_summits(&snr.view(), &islands[0], 5.0), 2);
    }
}
