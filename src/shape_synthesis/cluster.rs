use crate::geo_math::{BoundingBox, LatLng};
use ordered_float::OrderedFloat;
use serde::Deserialize;

/// Number of optimised routes the dashboard shows.
pub const OPTIMISED_ROUTE_COUNT: usize = 4;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub cluster_count: usize,
    pub max_iterations: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            cluster_count: OPTIMISED_ROUTE_COUNT,
            max_iterations: 8,
        }
    }
}

/// Result of a balanced assignment. `members[c]` holds indices into the input
/// slice, in the order they were assigned.
#[derive(Debug, Clone)]
pub struct ClusterAssignment {
    pub members: Vec<Vec<usize>>,
    pub centroids: Vec<LatLng>,
    /// Points placed past capacity because every cluster was full.
    pub overflowed: usize,
}

impl ClusterAssignment {
    pub fn capacity(point_count: usize, cluster_count: usize) -> usize {
        if cluster_count == 0 {
            return 0;
        }
        point_count.div_ceil(cluster_count)
    }

    /// Clusters as coordinate lists, index order preserved.
    pub fn coordinates(&self, points: &[LatLng]) -> Vec<Vec<LatLng>> {
        self.members
            .iter()
            .map(|m| m.iter().map(|&i| points[i]).collect())
            .collect()
    }
}

/// Seeds one centroid per grid cell of the points' bounding box. For four
/// clusters this is the quartile layout NW, NE, SW, SE, matching quadrant
/// order in the layout engine.
fn seed_centroids(bbox: &BoundingBox, k: usize) -> Vec<LatLng> {
    let cols = (k as f64).sqrt().ceil().max(1.0) as usize;
    let rows = k.div_ceil(cols);
    (0..k)
        .map(|i| {
            let row = i / cols;
            let col = i % cols;
            // row 0 is the northern band
            let lat = bbox.max_lat - bbox.lat_span() * (row as f64 + 0.5) / rows as f64;
            let lng = bbox.min_lng + bbox.lng_span() * (col as f64 + 0.5) / cols as f64;
            LatLng::new(lat, lng)
        })
        .collect()
}

fn squared_distance(a: LatLng, b: LatLng) -> f64 {
    (a.lat - b.lat).powi(2) + (a.lng - b.lng).powi(2)
}

/// Greedy capacity-constrained assignment: walk all (point, cluster) pairs in
/// ascending distance order and give each unassigned point to the first
/// cluster that still has room.
///
/// Only `n - k * (capacity - 1)` clusters may reach `capacity`; the others
/// stop one short. The limits then add up to exactly `n`, so every cluster
/// ends at `capacity` or `capacity - 1`.
fn greedy_assign(
    points: &[LatLng],
    centroids: &[LatLng],
    capacity: usize,
) -> (Vec<Vec<usize>>, usize) {
    let k = centroids.len();
    let full_allowed = points.len().saturating_sub(k * capacity.saturating_sub(1));
    let mut full = 0;
    let mut pairs: Vec<(OrderedFloat<f64>, usize, usize)> = Vec::with_capacity(points.len() * k);
    for (pi, p) in points.iter().enumerate() {
        for (ci, c) in centroids.iter().enumerate() {
            pairs.push((OrderedFloat(squared_distance(*p, *c)), pi, ci));
        }
    }
    pairs.sort_unstable();

    let mut members = vec![Vec::new(); k];
    let mut assigned = vec![false; points.len()];
    let mut remaining = points.len();

    for (_, pi, ci) in pairs {
        if remaining == 0 {
            break;
        }
        let size = members[ci].len();
        if assigned[pi] || size >= capacity || (size + 1 == capacity && full >= full_allowed) {
            continue;
        }
        assigned[pi] = true;
        members[ci].push(pi);
        remaining -= 1;
        if size + 1 == capacity {
            full += 1;
        }
    }

    // only reachable when capacity * k < n, kept for pathological inputs
    let mut overflowed = 0;
    for (pi, p) in points.iter().enumerate() {
        if assigned[pi] {
            continue;
        }
        let nearest = centroids
            .iter()
            .enumerate()
            .min_by_key(|(_, c)| OrderedFloat(squared_distance(*p, **c)))
            .map(|(ci, _)| ci)
            .unwrap_or(0);
        members[nearest].push(pi);
        overflowed += 1;
    }

    (members, overflowed)
}

fn recompute_centroids(points: &[LatLng], members: &[Vec<usize>], previous: &mut [LatLng]) {
    for (ci, m) in members.iter().enumerate() {
        if m.is_empty() {
            continue;
        }
        let n = m.len() as f64;
        let (lat, lng) = m
            .iter()
            .fold((0.0, 0.0), |(lat, lng), &i| (lat + points[i].lat, lng + points[i].lng));
        previous[ci] = LatLng::new(lat / n, lng / n);
    }
}

/// Balanced k-means split of `points` into `config.cluster_count` groups of
/// `ceil(n / k)` or `ceil(n / k) - 1` points each. Always returns exactly `k`
/// groups; some may be empty when there are fewer points than clusters.
pub fn assign_balanced(points: &[LatLng], config: &ClusterConfig) -> ClusterAssignment {
    let k = config.cluster_count.max(1);
    let Some(bbox) = BoundingBox::from_points(points) else {
        return ClusterAssignment {
            members: vec![Vec::new(); k],
            centroids: Vec::new(),
            overflowed: 0,
        };
    };

    let capacity = ClusterAssignment::capacity(points.len(), k);
    let mut centroids = seed_centroids(&bbox, k);

    for iteration in 0..config.max_iterations {
        let (members, _) = greedy_assign(points, &centroids, capacity);
        let before = centroids.clone();
        recompute_centroids(points, &members, &mut centroids);
        if before == centroids {
            tracing::debug!("balanced k-means settled after {} iterations", iteration + 1);
            break;
        }
    }

    let (members, overflowed) = greedy_assign(points, &centroids, capacity);
    if overflowed > 0 {
        tracing::warn!("{} points assigned past cluster capacity {}", overflowed, capacity);
    }

    ClusterAssignment {
        members,
        centroids,
        overflowed,
    }
}
