use crate::geo_math::{LatLng, LocalPlane, close_ring, is_closed, open_ring};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    pub chaikin_iterations: usize,
    pub spline_samples_per_segment: usize,
    /// 0.5 is centripetal, 0 uniform, 1 chordal.
    pub spline_alpha: f64,
    /// Run the spline before Chaikin for a more road-like curve.
    pub natural: bool,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            chaikin_iterations: 1,
            spline_samples_per_segment: 12,
            spline_alpha: 0.5,
            natural: true,
        }
    }
}

/// Chaikin corner cutting.
///
/// Closed loops are cut all the way round and re-closed after every pass, so
/// `n` distinct vertices become `2n`. Open polylines keep their end points.
pub fn chaikin(coords: &[LatLng], iterations: usize) -> Vec<LatLng> {
    let mut current = coords.to_vec();
    if current.len() < 3 {
        return current;
    }
    let closed = is_closed(&current);

    for _ in 0..iterations {
        let mut next = Vec::with_capacity(current.len() * 2);
        if !closed {
            next.push(current[0]);
        }
        for w in current.windows(2) {
            let (p1, p2) = (w[0], w[1]);
            // Q = 0.75 P1 + 0.25 P2
            next.push(LatLng::new(0.75 * p1.lat + 0.25 * p2.lat, 0.75 * p1.lng + 0.25 * p2.lng));
            // R = 0.25 P1 + 0.75 P2
            next.push(LatLng::new(0.25 * p1.lat + 0.75 * p2.lat, 0.25 * p1.lng + 0.75 * p2.lng));
        }
        if closed {
            close_ring(&mut next);
        } else {
            next.push(current[current.len() - 1]);
        }
        current = next;
    }
    current
}

/// Closed centripetal Catmull-Rom spline through every vertex of the loop.
///
/// Each vertex contributes `samples_per_segment` points on the segment to its
/// successor, using wrap-around neighbours. Parametrisation happens in a local
/// metric plane so the knot spacing is isotropic.
pub fn catmull_rom_closed(
    coords: &[LatLng],
    samples_per_segment: usize,
    alpha: f64,
) -> Vec<LatLng> {
    let ring = open_ring(coords);
    let n = ring.len();
    if n < 3 || samples_per_segment == 0 {
        return coords.to_vec();
    }

    let plane = LocalPlane::new(ring[0]);
    let pts: Vec<(f64, f64)> = ring.iter().map(|p| plane.project(*p)).collect();

    let mut out = Vec::with_capacity(n * samples_per_segment + 1);
    for i in 0..n {
        let p0 = pts[(i + n - 1) % n];
        let p1 = pts[i];
        let p2 = pts[(i + 1) % n];
        let p3 = pts[(i + 2) % n];
        for s in 0..samples_per_segment {
            let u = s as f64 / samples_per_segment as f64;
            let (x, y) = catmull_rom_point(p0, p1, p2, p3, u, alpha);
            out.push(plane.unproject(x, y));
        }
    }
    close_ring(&mut out);
    out
}

fn knot(t: f64, a: (f64, f64), b: (f64, f64), alpha: f64) -> f64 {
    let d = ((b.0 - a.0).powi(2) + (b.1 - a.1).powi(2)).sqrt();
    // coincident control points would give a zero knot interval
    t + d.powf(alpha).max(1e-6)
}

fn lerp_pt(a: (f64, f64), b: (f64, f64), ta: f64, tb: f64, t: f64) -> (f64, f64) {
    let span = tb - ta;
    if span.abs() < f64::EPSILON {
        return a;
    }
    let wa = (tb - t) / span;
    let wb = (t - ta) / span;
    (wa * a.0 + wb * b.0, wa * a.1 + wb * b.1)
}

/// Barry-Goldman evaluation of the segment p1 -> p2 at `u` in [0, 1).
fn catmull_rom_point(
    p0: (f64, f64),
    p1: (f64, f64),
    p2: (f64, f64),
    p3: (f64, f64),
    u: f64,
    alpha: f64,
) -> (f64, f64) {
    let t0 = 0.0;
    let t1 = knot(t0, p0, p1, alpha);
    let t2 = knot(t1, p1, p2, alpha);
    let t3 = knot(t2, p2, p3, alpha);
    let t = t1 + (t2 - t1) * u;

    let a1 = lerp_pt(p0, p1, t0, t1, t);
    let a2 = lerp_pt(p1, p2, t1, t2, t);
    let a3 = lerp_pt(p2, p3, t2, t3, t);
    let b1 = lerp_pt(a1, a2, t0, t2, t);
    let b2 = lerp_pt(a2, a3, t1, t3, t);
    lerp_pt(b1, b2, t1, t2, t)
}

/// Spline first, then Chaikin, for the "natural" looking optimised loops.
pub fn natural(coords: &[LatLng], config: &SmoothingConfig) -> Vec<LatLng> {
    let splined = catmull_rom_closed(
        coords,
        config.spline_samples_per_segment,
        config.spline_alpha,
    );
    chaikin(&splined, config.chaikin_iterations)
}

/// Applies the configured smoothing pass to one loop.
pub fn smooth(coords: &[LatLng], config: &SmoothingConfig) -> Vec<LatLng> {
    if config.natural {
        natural(coords, config)
    } else {
        chaikin(coords, config.chaikin_iterations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_math::{BoundingBox, haversine_m};

    fn square() -> Vec<LatLng> {
        vec![
            LatLng::new(52.30, 4.80),
            LatLng::new(52.30, 4.82),
            LatLng::new(52.32, 4.82),
            LatLng::new(52.32, 4.80),
            LatLng::new(52.30, 4.80),
        ]
    }

    #[test]
    fn zero_iterations_is_identity() {
        let ring = square();
        assert_eq!(chaikin(&chaikin(&ring, 0), 0), ring);
    }

    #[test]
    fn chaikin_doubles_vertices_and_stays_closed() {
        let ring = square();
        let once = chaikin(&ring, 1);
        assert_eq!(once.len(), 2 * 4 + 1);
        assert!(is_closed(&once));

        let twice = chaikin(&ring, 2);
        assert_eq!(twice.len(), 2 * 8 + 1);
        assert!(is_closed(&twice));
    }

    #[test]
    fn chaikin_keeps_open_endpoints() {
        let line = vec![LatLng::new(0.0, 0.0), LatLng::new(0.0, 1.0), LatLng::new(1.0, 1.0)];
        let out = chaikin(&line, 1);
        assert_eq!(out.first(), line.first());
        assert_eq!(out.last(), line.last());
        assert_eq!(out.len(), 6);
    }

    #[test]
    fn spline_passes_through_control_points() {
        let ring = square();
        let out = catmull_rom_closed(&ring, 10, 0.5);
        assert_eq!(out.len(), 4 * 10 + 1);
        assert!(is_closed(&out));
        for (i, control) in ring[..4].iter().enumerate() {
            assert!(haversine_m(out[i * 10], *control) < 0.01);
        }
    }

    #[test]
    fn smoothing_keeps_extent() {
        let ring = square();
        let source = BoundingBox::from_points(&ring).unwrap();
        let out = smooth(&ring, &SmoothingConfig::default());
        let bbox = BoundingBox::from_points(&out).unwrap();
        // centripetal splines overshoot a little on sharp corners
        assert!(source.expand_m(400.0).contains_box(&bbox));
        assert!(bbox.lat_span() > source.lat_span() * 0.5);
    }

    #[test]
    fn spline_survives_duplicate_vertices() {
        let ring = vec![
            LatLng::new(52.30, 4.80),
            LatLng::new(52.30, 4.80),
            LatLng::new(52.32, 4.82),
            LatLng::new(52.32, 4.80),
            LatLng::new(52.30, 4.80),
        ];
        let out = catmull_rom_closed(&ring, 5, 0.5);
        assert!(out.iter().all(LatLng::is_finite));
    }
}
