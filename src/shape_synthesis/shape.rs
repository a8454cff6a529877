use crate::geo_math::{BoundingBox, LatLng, LocalPlane, close_ring, haversine_m, open_ring};
use geo::{Area, ConvexHull};
use geo_types::{MultiPoint, Point};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShapeConfig {
    /// Segments every normalised loop is resampled to.
    pub target_segments: usize,
    /// Upper bound of the perpendicular offset on inserted points.
    pub jitter_m: f64,
    /// Radius of the decorative loop around a lone stop.
    pub single_stop_radius_m: f64,
    /// Half extents of the rounded rectangle used for degenerate hulls.
    pub fallback_half_height_m: f64,
    pub fallback_half_width_m: f64,
    pub fallback_corner_radius_m: f64,
    /// Points sampled per individual route for the key-point cache.
    pub key_points_per_route: usize,
}

impl Default for ShapeConfig {
    fn default() -> Self {
        Self {
            target_segments: 12,
            jitter_m: 25.0,
            single_stop_radius_m: 120.0,
            fallback_half_height_m: 600.0,
            fallback_half_width_m: 900.0,
            fallback_corner_radius_m: 200.0,
            key_points_per_route: 6,
        }
    }
}

const SINGLE_STOP_RING_POINTS: usize = 6;

/// Deterministic jitter source seeded from the coordinates it decorates, so the
/// same input always produces the same "organic" output.
pub struct Jitter {
    rng: StdRng,
}

impl Jitter {
    pub fn for_points(points: &[LatLng], salt: u64) -> Self {
        let mut bytes = Vec::with_capacity(points.len() * 16 + 8);
        for p in points {
            bytes.extend_from_slice(&p.lat.to_bits().to_le_bytes());
            bytes.extend_from_slice(&p.lng.to_bits().to_le_bytes());
        }
        bytes.extend_from_slice(&salt.to_le_bytes());
        Self {
            rng: StdRng::seed_from_u64(seahash::hash(&bytes)),
        }
    }

    /// Uniform value in [-1, 1].
    pub fn unit(&mut self) -> f64 {
        self.rng.random_range(-1.0..=1.0)
    }
}

/// Orders the points into a closed loop with the nearest-neighbour heuristic,
/// starting at the westmost point.
///
/// Returns `None` for empty input. A single point becomes a small decorative
/// ring (the stop, six ring points, and the stop again).
pub fn nearest_neighbour_loop(points: &[LatLng], config: &ShapeConfig) -> Option<Vec<LatLng>> {
    match points {
        [] => None,
        [only] => Some(single_stop_loop(*only, config.single_stop_radius_m)),
        _ => {
            let start = points
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| {
                    a.lng.total_cmp(&b.lng).then_with(|| a.lat.total_cmp(&b.lat))
                })
                .map(|(i, _)| i)?;

            let mut visited = vec![false; points.len()];
            let mut path = Vec::with_capacity(points.len() + 1);
            let mut current = start;
            visited[current] = true;
            path.push(points[current]);

            for _ in 1..points.len() {
                let mut best: Option<(usize, f64)> = None;
                for (i, p) in points.iter().enumerate() {
                    if visited[i] {
                        continue;
                    }
                    let d = haversine_m(points[current], *p);
                    if best.is_none_or(|(_, bd)| d < bd) {
                        best = Some((i, d));
                    }
                }
                let Some((next, _)) = best else { break };
                visited[next] = true;
                path.push(points[next]);
                current = next;
            }

            path.push(points[start]);
            Some(path)
        }
    }
}

fn single_stop_loop(stop: LatLng, radius_m: f64) -> Vec<LatLng> {
    let mut ring = Vec::with_capacity(SINGLE_STOP_RING_POINTS + 2);
    ring.push(stop);
    // ring is tangent to the stop: centre sits one radius to the north
    let centre = stop.offset_m(radius_m, 0.0);
    for i in 1..=SINGLE_STOP_RING_POINTS {
        let angle = -std::f64::consts::FRAC_PI_2
            + std::f64::consts::TAU * i as f64 / (SINGLE_STOP_RING_POINTS + 1) as f64;
        ring.push(centre.offset_m(radius_m * angle.sin(), radius_m * angle.cos()));
    }
    ring.push(stop);
    ring
}

/// Resamples a closed loop so it has `config.target_segments` segments.
///
/// Extra points are spread over the edges in proportion to edge length and
/// nudged sideways by a seeded offset. Original vertices stay where they are,
/// and loops that already have enough segments come back unchanged.
pub fn normalise_density(closed: &[LatLng], config: &ShapeConfig, salt: u64) -> Vec<LatLng> {
    let segments = closed.len().saturating_sub(1);
    if segments == 0 || segments >= config.target_segments {
        return closed.to_vec();
    }

    let lengths: Vec<f64> = closed.windows(2).map(|w| haversine_m(w[0], w[1])).collect();
    let total: f64 = lengths.iter().sum();
    let extra = config.target_segments - segments;

    let inserts = if total <= f64::EPSILON {
        // zero-length path: spread evenly
        let mut even = vec![extra / segments; segments];
        for slot in even.iter_mut().take(extra % segments) {
            *slot += 1;
        }
        even
    } else {
        allocate_largest_remainder(&lengths, total, extra)
    };

    let mut jitter = Jitter::for_points(closed, salt);
    let mut out = Vec::with_capacity(config.target_segments + 1);
    for (i, w) in closed.windows(2).enumerate() {
        let (a, b) = (w[0], w[1]);
        out.push(a);
        let count = inserts[i];
        if count == 0 {
            continue;
        }
        let plane = LocalPlane::new(a);
        let (bx, by) = plane.project(b);
        let len = (bx * bx + by * by).sqrt();
        let (nx, ny) = if len > f64::EPSILON {
            (-by / len, bx / len)
        } else {
            (0.0, 0.0)
        };
        for j in 1..=count {
            let t = j as f64 / (count + 1) as f64;
            let offset = jitter.unit() * config.jitter_m;
            out.push(plane.unproject(bx * t + nx * offset, by * t + ny * offset));
        }
    }
    out.push(closed[closed.len() - 1]);
    out
}

fn allocate_largest_remainder(lengths: &[f64], total: f64, extra: usize) -> Vec<usize> {
    let quotas: Vec<f64> = lengths.iter().map(|l| l / total * extra as f64).collect();
    let mut counts: Vec<usize> = quotas.iter().map(|q| q.floor() as usize).collect();
    let assigned: usize = counts.iter().sum();

    let mut order: Vec<usize> = (0..lengths.len()).collect();
    order.sort_by(|&a, &b| {
        let ra = quotas[a] - quotas[a].floor();
        let rb = quotas[b] - quotas[b].floor();
        rb.total_cmp(&ra).then_with(|| a.cmp(&b))
    });
    for &i in order.iter().take(extra.saturating_sub(assigned)) {
        counts[i] += 1;
    }
    counts
}

/// Closed convex hull of the points, counter-clockwise in (lng, lat).
/// Degenerate hulls (fewer than three distinct vertices, or no area) are
/// replaced by a rounded rectangle around the points' centre.
pub fn convex_loop(points: &[LatLng], config: &ShapeConfig) -> Vec<LatLng> {
    let finite: Vec<Point<f64>> = points
        .iter()
        .filter(|p| p.is_finite())
        .map(|p| Point::from(*p))
        .collect();

    let fallback_centre = BoundingBox::from_points(points)
        .map(|b| b.center())
        .unwrap_or(LatLng::new(0.0, 0.0));

    if finite.len() < 3 {
        return rounded_rectangle(fallback_centre, config);
    }

    let hull = MultiPoint::from(finite).convex_hull();
    let mut ring: Vec<LatLng> = hull.exterior().coords().map(|c| LatLng::from(*c)).collect();
    let distinct = open_ring(&ring).len();
    if distinct < 3 || hull.unsigned_area() <= 1e-14 {
        return rounded_rectangle(fallback_centre, config);
    }
    close_ring(&mut ring);
    ring
}

/// Closed rounded rectangle centred on `centre`, corners approximated with
/// quarter arcs of four segments each.
pub fn rounded_rectangle(centre: LatLng, config: &ShapeConfig) -> Vec<LatLng> {
    rounded_rectangle_with(
        centre,
        config.fallback_half_height_m,
        config.fallback_half_width_m,
        config.fallback_corner_radius_m,
    )
}

pub fn rounded_rectangle_with(
    centre: LatLng,
    half_height_m: f64,
    half_width_m: f64,
    corner_m: f64,
) -> Vec<LatLng> {
    const ARC_STEPS: usize = 4;
    let r = corner_m.min(half_height_m).min(half_width_m).max(0.0);
    let (hx, hy) = (half_width_m - r, half_height_m - r);
    // corner centres, counter-clockwise starting north-east
    let corners = [(hx, hy, 0.0), (-hx, hy, 90.0), (-hx, -hy, 180.0), (hx, -hy, 270.0)];

    let mut ring = Vec::with_capacity(corners.len() * (ARC_STEPS + 1) + 1);
    for (cx, cy, start_deg) in corners {
        for step in 0..=ARC_STEPS {
            let angle = (start_deg + 90.0 * step as f64 / ARC_STEPS as f64).to_radians();
            let east = cx + r * angle.cos();
            let north = cy + r * angle.sin();
            ring.push(centre.offset_m(north, east));
        }
    }
    ring.dedup_by(|a, b| a.approx_eq(b, 1e-12));
    close_ring(&mut ring);
    ring
}

/// Evenly spaced samples of a route, always including its first and last stop.
pub fn sample_key_points(route: &[LatLng], per_route: usize) -> Vec<LatLng> {
    if route.len() <= per_route {
        return route.to_vec();
    }
    if per_route < 2 {
        return route.iter().take(per_route).copied().collect();
    }
    let step = (route.len() - 1) as f64 / (per_route - 1) as f64;
    (0..per_route)
        .map(|i| route[((i as f64 * step).round() as usize).min(route.len() - 1)])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_math::{centroid, is_closed};

    fn scatter() -> Vec<LatLng> {
        vec![
            LatLng::new(52.370, 4.890),
            LatLng::new(52.372, 4.902),
            LatLng::new(52.365, 4.895),
            LatLng::new(52.368, 4.880),
            LatLng::new(52.375, 4.885),
        ]
    }

    #[test]
    fn empty_cluster_has_no_loop() {
        assert!(nearest_neighbour_loop(&[], &ShapeConfig::default()).is_none());
    }

    #[test]
    fn single_stop_becomes_eight_point_ring() {
        let stop = LatLng::new(52.37, 4.9);
        let ring = nearest_neighbour_loop(&[stop], &ShapeConfig::default()).unwrap();
        assert_eq!(ring.len(), 8);
        assert_eq!(ring[0], stop);
        assert_eq!(ring[7], stop);
        for p in &ring[1..7] {
            let d = haversine_m(stop, *p);
            assert!(d > 1.0 && d < 260.0, "{d}");
        }
    }

    #[test]
    fn loop_starts_west_and_visits_everything() {
        let points = scatter();
        let ring = nearest_neighbour_loop(&points, &ShapeConfig::default()).unwrap();
        assert!(is_closed(&ring));
        assert_eq!(ring[0], LatLng::new(52.368, 4.880));
        assert_eq!(ring.len(), points.len() + 1);
        for p in &points {
            assert!(ring.contains(p));
        }
    }

    #[test]
    fn two_points_make_a_closed_loop() {
        let points = [LatLng::new(52.37, 4.91), LatLng::new(52.36, 4.90)];
        let ring = nearest_neighbour_loop(&points, &ShapeConfig::default()).unwrap();
        assert_eq!(ring, vec![points[1], points[0], points[1]]);
    }

    #[test]
    fn density_normalisation_hits_target_and_keeps_vertices() {
        let config = ShapeConfig::default();
        let ring = nearest_neighbour_loop(&scatter(), &config).unwrap();
        let dense = normalise_density(&ring, &config, 7);
        assert_eq!(dense.len(), config.target_segments + 1);
        assert!(is_closed(&dense));
        for p in &ring {
            assert!(dense.contains(p));
        }
    }

    #[test]
    fn density_normalisation_is_reproducible() {
        let config = ShapeConfig::default();
        let ring = nearest_neighbour_loop(&scatter(), &config).unwrap();
        assert_eq!(normalise_density(&ring, &config, 3), normalise_density(&ring, &config, 3));
    }

    #[test]
    fn long_loops_are_left_alone() {
        let config = ShapeConfig {
            target_segments: 3,
            ..ShapeConfig::default()
        };
        let ring = nearest_neighbour_loop(&scatter(), &config).unwrap();
        assert_eq!(normalise_density(&ring, &config, 0), ring);
    }

    #[test]
    fn hull_drops_interior_points() {
        let mut points = vec![
            LatLng::new(52.30, 4.80),
            LatLng::new(52.30, 4.90),
            LatLng::new(52.40, 4.90),
            LatLng::new(52.40, 4.80),
        ];
        points.push(LatLng::new(52.35, 4.85));
        let ring = convex_loop(&points, &ShapeConfig::default());
        assert!(is_closed(&ring));
        assert_eq!(ring.len(), 5);
        assert!(!ring.contains(&LatLng::new(52.35, 4.85)));
    }

    #[test]
    fn collinear_hull_falls_back_to_rounded_rectangle() {
        let points = [
            LatLng::new(52.30, 4.80),
            LatLng::new(52.31, 4.81),
            LatLng::new(52.32, 4.82),
        ];
        let ring = convex_loop(&points, &ShapeConfig::default());
        assert!(is_closed(&ring));
        assert!(ring.len() > 8);
        let c = centroid(&ring).unwrap();
        assert!(haversine_m(c, LatLng::new(52.31, 4.81)) < 50.0);
    }

    #[test]
    fn key_points_include_both_ends() {
        let route: Vec<LatLng> = (0..11)
            .map(|i| LatLng::new(52.0 + i as f64 * 0.01, 4.0))
            .collect();
        let keys = sample_key_points(&route, 6);
        assert_eq!(keys.len(), 6);
        assert_eq!(keys[0], route[0]);
        assert_eq!(keys[5], route[10]);
    }
}
