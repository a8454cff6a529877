use crate::geo_math::{BoundingBox, LatLng, LocalPlane, centroid, close_ring, is_closed, open_ring};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Relative inset applied to every quadrant, as a fraction of its span.
    pub quadrant_inset_fraction: f64,
    /// How far each centroid travels toward its quadrant centre (0..=1).
    pub recentre_fraction: f64,
    /// Share of the quadrant span a scaled shape should occupy.
    pub fill_fraction: f64,
    pub min_scale: f64,
    pub max_scale: f64,
    pub centroid_min_separation_m: f64,
    pub centroid_separation_rounds: usize,
    pub point_min_separation_m: f64,
    pub point_separation_iterations: usize,
    pub point_push_fraction: f64,
    /// Inward padding of the quadrant used when clamping.
    pub clamp_padding_m: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            quadrant_inset_fraction: 0.04,
            recentre_fraction: 0.85,
            fill_fraction: 0.85,
            min_scale: 0.25,
            max_scale: 1.5,
            centroid_min_separation_m: 600.0,
            centroid_separation_rounds: 6,
            point_min_separation_m: 200.0,
            point_separation_iterations: 4,
            point_push_fraction: 0.5,
            clamp_padding_m: 80.0,
        }
    }
}

impl LayoutConfig {
    /// Deliberately oversized decorative variant: shapes fill their whole
    /// quadrant and may grow up to ten times.
    pub fn oversized() -> Self {
        Self {
            fill_fraction: 1.0,
            max_scale: 10.0,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quadrant {
    NorthWest,
    NorthEast,
    SouthWest,
    SouthEast,
}

impl Quadrant {
    pub const ALL: [Quadrant; 4] = [
        Quadrant::NorthWest,
        Quadrant::NorthEast,
        Quadrant::SouthWest,
        Quadrant::SouthEast,
    ];
}

/// Splits `bbox` at its axis midpoints into NW, NE, SW, SE (in that order).
/// With a zero inset the four rectangles tile the box exactly.
pub fn quadrants(bbox: &BoundingBox, inset_fraction: f64) -> [BoundingBox; 4] {
    let mid = bbox.center();
    let inset = inset_fraction.clamp(0.0, 0.49);
    Quadrant::ALL.map(|q| {
        let (min_lat, max_lat) = match q {
            Quadrant::NorthWest | Quadrant::NorthEast => (mid.lat, bbox.max_lat),
            Quadrant::SouthWest | Quadrant::SouthEast => (bbox.min_lat, mid.lat),
        };
        let (min_lng, max_lng) = match q {
            Quadrant::NorthWest | Quadrant::SouthWest => (bbox.min_lng, mid.lng),
            Quadrant::NorthEast | Quadrant::SouthEast => (mid.lng, bbox.max_lng),
        };
        let dlat = (max_lat - min_lat) * inset;
        let dlng = (max_lng - min_lng) * inset;
        BoundingBox::new(min_lat + dlat, max_lat - dlat, min_lng + dlng, max_lng - dlng)
    })
}

fn translate(shape: &mut [LatLng], dlat: f64, dlng: f64) {
    for p in shape.iter_mut() {
        p.lat += dlat;
        p.lng += dlng;
    }
}

fn scale_about(shape: &mut [LatLng], origin: LatLng, factor: f64) {
    for p in shape.iter_mut() {
        p.lat = origin.lat + (p.lat - origin.lat) * factor;
        p.lng = origin.lng + (p.lng - origin.lng) * factor;
    }
}

/// Moves the shape's centroid `fraction` of the way toward `target`.
pub fn recentre(shape: &mut [LatLng], target: LatLng, fraction: f64) {
    let Some(c) = centroid(shape) else { return };
    let f = fraction.clamp(0.0, 1.0);
    translate(shape, (target.lat - c.lat) * f, (target.lng - c.lng) * f);
}

/// Uniformly scales the shape about its centroid so its larger relative span
/// covers `config.fill_fraction` of the rectangle. Returns the factor used.
pub fn scale_to_fit(shape: &mut [LatLng], rect: &BoundingBox, config: &LayoutConfig) -> f64 {
    let (Some(c), Some(bbox)) = (centroid(shape), BoundingBox::from_points(shape.iter())) else {
        return 1.0;
    };
    let ratio_lat = if rect.lat_span() > 0.0 { bbox.lat_span() / rect.lat_span() } else { 0.0 };
    let ratio_lng = if rect.lng_span() > 0.0 { bbox.lng_span() / rect.lng_span() } else { 0.0 };
    let ratio = ratio_lat.max(ratio_lng);
    if ratio <= f64::EPSILON {
        return 1.0;
    }
    let factor = (config.fill_fraction / ratio).clamp(config.min_scale, config.max_scale);
    scale_about(shape, c, factor);
    factor
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeparationReport {
    pub converged: bool,
    pub rounds: usize,
}

/// Pairwise centroid repulsion in metres.
///
/// Every pair closer than `min_m` is pushed apart symmetrically along the line
/// between the centroids until it sits just past the threshold. A push can
/// create a new violation elsewhere, so this repeats for up to `rounds`.
pub fn separate_centroids(
    shapes: &mut [Vec<LatLng>],
    min_m: f64,
    rounds: usize,
) -> SeparationReport {
    let Some(plane) = plane_for(shapes) else {
        return SeparationReport {
            converged: true,
            rounds: 0,
        };
    };

    for round in 0..rounds {
        let mut violated = false;
        for i in 0..shapes.len() {
            for j in (i + 1)..shapes.len() {
                let (Some(ci), Some(cj)) = (centroid(&shapes[i]), centroid(&shapes[j])) else {
                    continue;
                };
                let (xi, yi) = plane.project(ci);
                let (xj, yj) = plane.project(cj);
                let (dx, dy) = (xj - xi, yj - yi);
                let d = (dx * dx + dy * dy).sqrt();
                if d >= min_m {
                    continue;
                }
                violated = true;
                let (ux, uy) = if d > 1e-9 {
                    (dx / d, dy / d)
                } else {
                    // coincident: split along a fixed per-pair direction
                    let angle = (i * 4 + j) as f64 * 0.7;
                    (angle.cos(), angle.sin())
                };
                // half a metre of slack keeps the pair clear of the threshold
                let push = (min_m - d) / 2.0 + 0.5;
                shift_m(&mut shapes[i], &plane, -ux * push, -uy * push);
                shift_m(&mut shapes[j], &plane, ux * push, uy * push);
            }
        }
        if !violated {
            return SeparationReport {
                converged: true,
                rounds: round,
            };
        }
    }

    SeparationReport {
        converged: min_centroid_distance_m(shapes).is_none_or(|d| d >= min_m),
        rounds,
    }
}

fn plane_for(shapes: &[Vec<LatLng>]) -> Option<LocalPlane> {
    let bbox = BoundingBox::from_points(shapes.iter().flatten())?;
    Some(LocalPlane::new(bbox.center()))
}

fn shift_m(shape: &mut [LatLng], plane: &LocalPlane, east_m: f64, north_m: f64) {
    let Some(c) = centroid(shape) else { return };
    let (x, y) = plane.project(c);
    let moved = plane.unproject(x + east_m, y + north_m);
    translate(shape, moved.lat - c.lat, moved.lng - c.lng);
}

/// Smallest distance between any two shape centroids, in metres.
pub fn min_centroid_distance_m(shapes: &[Vec<LatLng>]) -> Option<f64> {
    let plane = plane_for(shapes)?;
    let centroids: Vec<(f64, f64)> = shapes
        .iter()
        .filter_map(|s| centroid(s))
        .map(|c| plane.project(c))
        .collect();
    let mut best: Option<f64> = None;
    for i in 0..centroids.len() {
        for j in (i + 1)..centroids.len() {
            let dx = centroids[i].0 - centroids[j].0;
            let dy = centroids[i].1 - centroids[j].1;
            let d = (dx * dx + dy * dy).sqrt();
            best = Some(best.map_or(d, |b: f64| b.min(d)));
        }
    }
    best
}

/// Nudges individual points that are still within `min_m` of another shape.
///
/// Each offending point moves away from its nearest foreign neighbour by
/// `push_fraction` of the deficit, or away from that shape's centroid when the
/// two points coincide.
pub fn separate_points(
    shapes: &mut [Vec<LatLng>],
    min_m: f64,
    iterations: usize,
    push_fraction: f64,
) -> usize {
    let Some(plane) = plane_for(shapes) else { return 0 };

    let closed: Vec<bool> = shapes.iter().map(|s| is_closed(s)).collect();
    let mut rings: Vec<Vec<(f64, f64)>> = shapes
        .iter()
        .map(|s| open_ring(s).iter().map(|p| plane.project(*p)).collect())
        .collect();

    let mut moved_total = 0;
    for _ in 0..iterations {
        let centres: Vec<(f64, f64)> = rings.iter().map(|r| mean_xy(r)).collect();
        let mut moved = 0;
        for s in 0..rings.len() {
            for k in 0..rings[s].len() {
                let p = rings[s][k];
                let mut nearest: Option<(usize, (f64, f64), f64)> = None;
                for (o, other) in rings.iter().enumerate() {
                    if o == s {
                        continue;
                    }
                    for q in other {
                        let d = ((p.0 - q.0).powi(2) + (p.1 - q.1).powi(2)).sqrt();
                        if nearest.is_none_or(|(_, _, bd)| d < bd) {
                            nearest = Some((o, *q, d));
                        }
                    }
                }
                let Some((o, q, d)) = nearest else { continue };
                if d >= min_m {
                    continue;
                }
                let (mut vx, mut vy) = (p.0 - q.0, p.1 - q.1);
                let mut len = d;
                if len < 1e-6 {
                    vx = p.0 - centres[o].0;
                    vy = p.1 - centres[o].1;
                    len = (vx * vx + vy * vy).sqrt();
                }
                if len < 1e-6 {
                    (vx, vy, len) = (1.0, 0.0, 1.0);
                }
                let step = (min_m - d) * push_fraction;
                rings[s][k] = (p.0 + vx / len * step, p.1 + vy / len * step);
                moved += 1;
            }
        }
        moved_total += moved;
        if moved == 0 {
            break;
        }
    }

    for (s, ring) in rings.into_iter().enumerate() {
        let mut out: Vec<LatLng> = ring.into_iter().map(|(x, y)| plane.unproject(x, y)).collect();
        if closed[s] {
            close_ring(&mut out);
        }
        shapes[s] = out;
    }
    moved_total
}

fn mean_xy(points: &[(f64, f64)]) -> (f64, f64) {
    if points.is_empty() {
        return (0.0, 0.0);
    }
    let n = points.len() as f64;
    let (x, y) = points.iter().fold((0.0, 0.0), |(x, y), p| (x + p.0, y + p.1));
    (x / n, y / n)
}

/// Violations below this are float noise from an earlier clamp.
const CLAMP_TOLERANCE_DEG: f64 = 1e-12;

/// Keeps the whole shape inside `rect` shrunk by `padding_m`.
///
/// The shape is moved rigidly, never clipped, just far enough that its worst
/// violation sits on the boundary. A shape wider or taller than the padded
/// rectangle is first scaled down about its centroid so it can fit at all.
/// Returns whether anything moved.
pub fn clamp_inward(shape: &mut [LatLng], rect: &BoundingBox, padding_m: f64) -> bool {
    let inner = rect.expand_m(-padding_m);
    let Some(mut bbox) = BoundingBox::from_points(shape.iter()) else {
        return false;
    };
    let mut changed = false;

    let over_lat = if bbox.lat_span() > inner.lat_span() && bbox.lat_span() > 0.0 {
        inner.lat_span() / bbox.lat_span()
    } else {
        1.0
    };
    let over_lng = if bbox.lng_span() > inner.lng_span() && bbox.lng_span() > 0.0 {
        inner.lng_span() / bbox.lng_span()
    } else {
        1.0
    };
    let factor = over_lat.min(over_lng);
    if factor < 1.0 {
        if let Some(c) = centroid(shape) {
            // stay a hair under the limit so rounding cannot poke out
            scale_about(shape, c, factor * 0.999);
            changed = true;
        }
        bbox = match BoundingBox::from_points(shape.iter()) {
            Some(b) => b,
            None => return changed,
        };
    }

    let dlat = if bbox.min_lat < inner.min_lat - CLAMP_TOLERANCE_DEG {
        inner.min_lat - bbox.min_lat
    } else if bbox.max_lat > inner.max_lat + CLAMP_TOLERANCE_DEG {
        inner.max_lat - bbox.max_lat
    } else {
        0.0
    };
    let dlng = if bbox.min_lng < inner.min_lng - CLAMP_TOLERANCE_DEG {
        inner.min_lng - bbox.min_lng
    } else if bbox.max_lng > inner.max_lng + CLAMP_TOLERANCE_DEG {
        inner.max_lng - bbox.max_lng
    } else {
        0.0
    };
    if dlat != 0.0 || dlng != 0.0 {
        translate(shape, dlat, dlng);
        changed = true;
    }
    changed
}

/// Slack on the final centroid check for projection round-off.
const SEPARATION_TOLERANCE_M: f64 = 1e-6;

#[derive(Debug, Clone)]
pub struct LayoutOutcome {
    pub shapes: Vec<Vec<LatLng>>,
    pub quadrants: [BoundingBox; 4],
    pub separation: SeparationReport,
    pub points_nudged: usize,
    pub min_centroid_distance_m: Option<f64>,
}

/// Places up to four shapes into the quadrants of `bounds`, shape `i` into
/// quadrant `i` (NW, NE, SW, SE).
///
/// Order: scale, recentre, separate centroids, separate points, clamp.
pub fn layout(
    mut shapes: Vec<Vec<LatLng>>,
    bounds: &BoundingBox,
    config: &LayoutConfig,
) -> LayoutOutcome {
    let rects = quadrants(bounds, config.quadrant_inset_fraction);
    if shapes.len() > rects.len() {
        tracing::warn!(
            "layout got {} shapes, only {} quadrants; extra shapes dropped",
            shapes.len(),
            rects.len()
        );
        shapes.truncate(rects.len());
    }

    for (shape, rect) in shapes.iter_mut().zip(rects.iter()) {
        scale_to_fit(shape, rect, config);
        recentre(shape, rect.center(), config.recentre_fraction);
    }

    let mut separation = separate_centroids(
        &mut shapes,
        config.centroid_min_separation_m,
        config.centroid_separation_rounds,
    );

    let points_nudged = separate_points(
        &mut shapes,
        config.point_min_separation_m,
        config.point_separation_iterations,
        config.point_push_fraction,
    );

    for (shape, rect) in shapes.iter_mut().zip(rects.iter()) {
        clamp_inward(shape, rect, config.clamp_padding_m);
    }

    // point nudges and clamping can undo the separation, so judge the result
    let min_gap = min_centroid_distance_m(&shapes);
    let required = config.centroid_min_separation_m - SEPARATION_TOLERANCE_M;
    separation.converged = min_gap.is_none_or(|d| d >= required);
    if !separation.converged {
        tracing::warn!(
            "centroids end {:.0} m apart, under the {:.0} m minimum, after {} separation rounds",
            min_gap.unwrap_or_default(),
            config.centroid_min_separation_m,
            separation.rounds
        );
    }
    tracing::debug!(
        "layout placed {} shapes, {} points nudged, min centroid gap {:?} m",
        shapes.len(),
        points_nudged,
        min_gap
    );

    LayoutOutcome {
        shapes,
        quadrants: rects,
        separation,
        points_nudged,
        min_centroid_distance_m: min_gap,
    }
}
