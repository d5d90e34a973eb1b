//! Spatial hierarchical clustering
//!
//! Samples are treated as planar (latitude, longitude) points. An agglomerative
//! hierarchy is built with centroid linkage and then cut at a distance threshold
//! to obtain a flat partition.
//!
//! Tie-breaking: when several pairs are equally close, the pair with the lowest
//! first slot index wins, then the lowest second slot index. A merged cluster
//! takes the lower slot index of its two parts. Flat cluster ids are assigned in
//! order of first appearance in the input.

use crate::distance::planar_distance_deg;
use crate::error::{PlaceError, Result};
use crate::types::{ClusterAssignment, LocationSample};

/// One agglomeration step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Merge {
    /// Node id of the first merged cluster (`< n` for original samples)
    pub left: usize,
    /// Node id of the second merged cluster
    pub right: usize,
    /// Centroid distance at which the clusters were merged
    pub distance: f64,
    /// Number of samples in the resulting cluster
    pub size: usize,
}

/// Merge hierarchy over `n` samples.
///
/// Node ids `0..n` are the samples; merge `i` creates node `n + i`.
#[derive(Debug, Clone, PartialEq)]
pub struct Linkage {
    leaf_count: usize,
    merges: Vec<Merge>,
}

impl Linkage {
    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    pub fn merges(&self) -> &[Merge] {
        &self.merges
    }

    /// Flat clusters with no merge above `threshold` inside any cluster.
    ///
    /// A subtree becomes one cluster when the largest merge distance anywhere in
    /// it is at most `threshold`. With centroid linkage a parent can merge closer
    /// than its children, so the subtree maximum is used rather than the parent's
    /// own distance.
    pub fn cut(&self, threshold: f64) -> ClusterAssignment {
        let n = self.leaf_count;
        let mut max_dist = vec![0.0_f64; n + self.merges.len()];
        let mut any_leaf: Vec<usize> = (0..n).collect();
        any_leaf.resize(n + self.merges.len(), 0);

        let mut sets = DisjointSet::new(n);
        for (i, merge) in self.merges.iter().enumerate() {
            let node = n + i;
            max_dist[node] = merge
                .distance
                .max(max_dist[merge.left])
                .max(max_dist[merge.right]);
            any_leaf[node] = any_leaf[merge.left];

            if max_dist[node] <= threshold {
                sets.union(any_leaf[merge.left], any_leaf[merge.right]);
            }
        }

        let mut root_label: Vec<usize> = vec![0; n];
        let mut next_label = 0;
        let labels = (0..n)
            .map(|i| {
                let root = sets.find(i);
                if root_label[root] == 0 {
                    next_label += 1;
                    root_label[root] = next_label;
                }
                root_label[root]
            })
            .collect();

        ClusterAssignment::from_labels(labels)
    }
}

/// Centroid-linkage clusterer
pub struct SpatialClusterer;

impl SpatialClusterer {
    /// Cluster samples and cut the hierarchy at `max_cluster_radius` (degrees).
    pub fn cluster(
        samples: &[LocationSample],
        max_cluster_radius: f64,
    ) -> Result<ClusterAssignment> {
        let linkage = Self::linkage(samples)?;
        Ok(linkage.cut(max_cluster_radius))
    }

    /// Build the full centroid-linkage hierarchy. Requires at least two samples.
    pub fn linkage(samples: &[LocationSample]) -> Result<Linkage> {
        let n = samples.len();
        if n < 2 {
            return Err(PlaceError::InsufficientData { samples: n });
        }

        let mut slots: Vec<Option<Slot>> = samples
            .iter()
            .enumerate()
            .map(|(i, s)| {
                Some(Slot {
                    lat: s.latitude,
                    lon: s.longitude,
                    size: 1,
                    node: i,
                })
            })
            .collect();

        let mut nearest = vec![0usize; n];
        let mut nearest_dist = vec![f64::INFINITY; n];
        for i in 0..n {
            let (j, d) = nearest_of(&slots, i);
            nearest[i] = j;
            nearest_dist[i] = d;
        }

        let mut merges = Vec::with_capacity(n - 1);
        for step in 0..n - 1 {
            let i = closest_slot(&slots, &nearest_dist);
            let j = nearest[i];
            let distance = nearest_dist[i];
            let (a, b) = if i < j { (i, j) } else { (j, i) };

            let (Some(sa), Some(sb)) = (slots[a], slots[b].take()) else {
                break;
            };
            let size = sa.size + sb.size;
            let (wa, wb) = (sa.size as f64, sb.size as f64);
            slots[a] = Some(Slot {
                lat: (sa.lat * wa + sb.lat * wb) / size as f64,
                lon: (sa.lon * wa + sb.lon * wb) / size as f64,
                size,
                node: n + step,
            });
            merges.push(Merge {
                left: sa.node.min(sb.node),
                right: sa.node.max(sb.node),
                distance,
                size,
            });
            nearest_dist[b] = f64::INFINITY;

            for k in 0..n {
                if k == a || slots[k].is_none() {
                    continue;
                }
                if nearest[k] == a || nearest[k] == b {
                    let (m, d) = nearest_of(&slots, k);
                    nearest[k] = m;
                    nearest_dist[k] = d;
                } else if let Some(d) = slot_distance(&slots, k, a) {
                    if d < nearest_dist[k] || (d == nearest_dist[k] && a < nearest[k]) {
                        nearest[k] = a;
                        nearest_dist[k] = d;
                    }
                }
            }
            let (m, d) = nearest_of(&slots, a);
            nearest[a] = m;
            nearest_dist[a] = d;
        }

        Ok(Linkage {
            leaf_count: n,
            merges,
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    lat: f64,
    lon: f64,
    size: usize,
    node: usize,
}

fn slot_distance(slots: &[Option<Slot>], i: usize, j: usize) -> Option<f64> {
    match (slots[i], slots[j]) {
        (Some(a), Some(b)) => Some(planar_distance_deg(a.lat, a.lon, b.lat, b.lon)),
        _ => None,
    }
}

/// Nearest active slot to `i`, lowest index on ties
fn nearest_of(slots: &[Option<Slot>], i: usize) -> (usize, f64) {
    let mut best = (i, f64::INFINITY);
    for j in 0..slots.len() {
        if j == i {
            continue;
        }
        if let Some(d) = slot_distance(slots, i, j) {
            if d < best.1 || best.0 == i {
                best = (j, d);
            }
        }
    }
    best
}

/// Active slot whose nearest neighbour is closest, lowest index on ties
fn closest_slot(slots: &[Option<Slot>], nearest_dist: &[f64]) -> usize {
    let mut best: Option<usize> = None;
    for (i, slot) in slots.iter().enumerate() {
        if slot.is_none() {
            continue;
        }
        match best {
            Some(b) if !(nearest_dist[i] < nearest_dist[b]) => {}
            _ => best = Some(i),
        }
    }
    best.unwrap_or(0)
}

/// Index-based union-find with path halving
struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, x: usize, y: usize) {
        let (rx, ry) = (self.find(x), self.find(y));
        if rx != ry {
            let (lo, hi) = if rx < ry { (rx, ry) } else { (ry, rx) };
            self.parent[hi] = lo;
        }
    }
}
