// Copyright: Lastmile Dashboard contributors
// The "optimise" action: 24 courier routes re-laid out as 4 decorative loops

use crate::config::DashboardConfig;
use crate::demo_data::route_letter;
use crate::geo_math::{BoundingBox, LatLng, LocalPlane};
use crate::palette::{optimised_colour, to_hex};
use crate::road_snap::{RoadSnapper, RouteGeometrySource};
use crate::shape_synthesis::cluster::assign_balanced;
use crate::shape_synthesis::layout::{clamp_inward, layout, quadrants};
use crate::shape_synthesis::shape::{
    convex_loop, nearest_neighbour_loop, normalise_density, rounded_rectangle,
    rounded_rectangle_with,
};
use crate::shape_synthesis::smoothing::smooth;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;

/// Bounds used by the emergency shapes when nothing better is known.
pub const DEFAULT_BOUNDS: BoundingBox = BoundingBox {
    min_lat: 52.33,
    max_lat: 52.41,
    min_lng: 4.83,
    max_lng: 4.98,
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OptimiseError {
    #[error("no stop coordinates to optimise")]
    NoPoints,
    #[error("stop coordinate {index} is not finite")]
    NonFinite { index: usize },
    #[error("layout bounds are degenerate: {0:?}")]
    InvalidBounds(BoundingBox),
}

/// One optimised loop as handed to the map surface. `coords` is closed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedRoute {
    pub name: String,
    pub color: String,
    pub coords: Vec<LatLng>,
}

/// Loops before snapping, with the quadrant each one is bound to.
#[derive(Debug, Clone)]
pub struct Synthesis {
    pub shapes: Vec<Vec<LatLng>>,
    pub quadrants: [BoundingBox; 4],
}

/// Checks the input and settles the layout bounds. Stops that all sit on one
/// latitude or longitude (a single stop included) get a flat box, which is
/// opened up by the fallback half width so they still lay out around
/// themselves. Only non-finite or inverted bounds are rejected.
fn validate(
    points: &[LatLng],
    bounds: Option<BoundingBox>,
    config: &DashboardConfig,
) -> Result<BoundingBox, OptimiseError> {
    if points.is_empty() {
        return Err(OptimiseError::NoPoints);
    }
    if let Some(index) = points.iter().position(|p| !p.is_finite()) {
        return Err(OptimiseError::NonFinite { index });
    }
    let bounds = match bounds {
        Some(b) => b,
        None => BoundingBox::from_points(points).ok_or(OptimiseError::NoPoints)?,
    }
    .pad_flat_axes_m(config.shape.fallback_half_width_m.max(1.0));
    if !bounds.is_valid() {
        return Err(OptimiseError::InvalidBounds(bounds));
    }
    Ok(bounds)
}

/// Cluster, build, lay out and smooth. Purely local and deterministic.
pub fn synthesise(
    points: &[LatLng],
    bounds: Option<BoundingBox>,
    config: &DashboardConfig,
) -> Result<Synthesis, OptimiseError> {
    let bounds = validate(points, bounds, config)?;
    let rects = quadrants(&bounds, config.layout.quadrant_inset_fraction);

    let assignment = assign_balanced(points, &config.cluster);
    let shapes: Vec<Vec<LatLng>> = assignment
        .coordinates(points)
        .iter()
        .enumerate()
        .map(|(i, cluster)| match nearest_neighbour_loop(cluster, &config.shape) {
            Some(ring) => normalise_density(&ring, &config.shape, i as u64),
            None => {
                tracing::debug!("cluster {} is empty, using a placeholder loop", i);
                rounded_rectangle(rects[i.min(rects.len() - 1)].center(), &config.shape)
            }
        })
        .collect();

    let outcome = layout(shapes, &bounds, &config.layout);
    let shapes = outcome
        .shapes
        .iter()
        .zip(outcome.quadrants.iter())
        .map(|(shape, rect)| {
            let mut smoothed = smooth(shape, &config.smoothing);
            // spline overshoot can cross the padded quadrant edge
            clamp_inward(&mut smoothed, rect, config.layout.clamp_padding_m);
            smoothed
        })
        .collect();

    Ok(Synthesis {
        shapes,
        quadrants: outcome.quadrants,
    })
}

pub fn to_rendered(shapes: Vec<Vec<LatLng>>) -> Vec<RenderedRoute> {
    shapes
        .into_iter()
        .enumerate()
        .map(|(i, coords)| RenderedRoute {
            name: route_letter(i),
            color: to_hex(optimised_colour(i)),
            coords,
        })
        .collect()
}

/// Full pipeline, including optional road snapping. Snapping failures never
/// surface here; they degrade to straight lines inside the snapper.
pub async fn optimise_routes<S: RouteGeometrySource + Sync>(
    points: &[LatLng],
    bounds: Option<BoundingBox>,
    config: &DashboardConfig,
    snapper: Option<&RoadSnapper<S>>,
) -> Result<Vec<RenderedRoute>, OptimiseError> {
    let synthesis = synthesise(points, bounds, config)?;
    let Some(snapper) = snapper else {
        return Ok(to_rendered(synthesis.shapes));
    };

    let mut snapped_shapes = Vec::with_capacity(synthesis.shapes.len());
    let quadrants = synthesis.quadrants.iter();
    for (i, (shape, rect)) in synthesis.shapes.into_iter().zip(quadrants).enumerate() {
        let (mut snapped, report) = snapper.snap(&shape).await;
        if report.fully_fell_back() {
            tracing::info!("route {} kept its unsnapped geometry", route_letter(i));
        }
        clamp_inward(&mut snapped, rect, config.layout.clamp_padding_m);
        snapped_shapes.push(snapped);
    }
    Ok(to_rendered(snapped_shapes))
}

/// Network-free layout used when the deadline wins: convex hulls of the
/// points falling in each quadrant, laid out like the real thing.
pub fn fallback_routes(
    points: &[LatLng],
    bounds: Option<BoundingBox>,
    config: &DashboardConfig,
) -> Result<Vec<RenderedRoute>, OptimiseError> {
    let bounds = validate(points, bounds, config)?;
    let halves = quadrants(&bounds, 0.0);
    let rects = quadrants(&bounds, config.layout.quadrant_inset_fraction);

    let shapes: Vec<Vec<LatLng>> = halves
        .iter()
        .zip(rects.iter())
        .map(|(half, rect)| {
            let members: Vec<LatLng> =
                points.iter().copied().filter(|p| half.contains(*p)).collect();
            if members.is_empty() {
                rounded_rectangle(rect.center(), &config.shape)
            } else {
                convex_loop(&members, &config.shape)
            }
        })
        .collect();

    let outcome = layout(shapes, &bounds, &config.layout);
    Ok(to_rendered(outcome.shapes))
}

/// Hard-coded rounded rectangles, one per quadrant, for when the pipeline
/// itself failed. Never fails.
pub fn emergency_routes(bounds: Option<BoundingBox>) -> Vec<RenderedRoute> {
    let bounds = bounds.filter(BoundingBox::is_valid).unwrap_or(DEFAULT_BOUNDS);
    let shapes = quadrants(&bounds, 0.1)
        .iter()
        .map(|rect| {
            let centre = rect.center();
            let plane = LocalPlane::new(centre);
            let (half_w, half_h) = plane.project(LatLng::new(rect.max_lat, rect.max_lng));
            let (half_w, half_h) = (half_w.abs() * 0.6, half_h.abs() * 0.6);
            rounded_rectangle_with(centre, half_h, half_w, half_w.min(half_h) * 0.3)
        })
        .collect();
    to_rendered(shapes)
}

#[derive(Debug)]
pub enum OptimiseOutcome {
    Completed(Vec<RenderedRoute>),
    /// The deadline won; the local fallback set is shown instead.
    TimedOut(Vec<RenderedRoute>),
    /// The pipeline failed; emergency shapes keep the map from going blank.
    Recovered {
        routes: Vec<RenderedRoute>,
        error: OptimiseError,
    },
    /// Another run was already in flight.
    Rejected,
}

impl OptimiseOutcome {
    pub fn routes(&self) -> Option<&[RenderedRoute]> {
        match self {
            OptimiseOutcome::Completed(r) | OptimiseOutcome::TimedOut(r) => Some(r),
            OptimiseOutcome::Recovered { routes, .. } => Some(routes),
            OptimiseOutcome::Rejected => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            OptimiseOutcome::Completed(_) => "completed",
            OptimiseOutcome::TimedOut(_) => "timed_out",
            OptimiseOutcome::Recovered { .. } => "recovered",
            OptimiseOutcome::Rejected => "rejected",
        }
    }
}

/// Releases the in-flight flag when the run ends, however it ends.
struct FlightGuard<'a>(&'a AtomicBool);

impl<'a> FlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard(flag))
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Runs the optimise action with a deadline and a single-flight guard.
pub struct Optimiser<S> {
    config: DashboardConfig,
    snapper: Option<RoadSnapper<S>>,
    in_flight: AtomicBool,
}

impl<S: RouteGeometrySource + Sync> Optimiser<S> {
    pub fn new(config: DashboardConfig, snapper: Option<RoadSnapper<S>>) -> Self {
        Self {
            config,
            snapper,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub async fn run(&self, points: &[LatLng], bounds: Option<BoundingBox>) -> OptimiseOutcome {
        let Some(_guard) = FlightGuard::acquire(&self.in_flight) else {
            tracing::info!("optimise already running, ignoring trigger");
            return OptimiseOutcome::Rejected;
        };

        let deadline = Duration::from_millis(self.config.optimise_deadline_ms);
        let pipeline = optimise_routes(points, bounds, &self.config, self.snapper.as_ref());

        match tokio::time::timeout(deadline, pipeline).await {
            Ok(Ok(routes)) => {
                tracing::info!("optimised {} points into {} routes", points.len(), routes.len());
                OptimiseOutcome::Completed(routes)
            }
            Ok(Err(error)) => {
                tracing::warn!("optimise failed, showing emergency routes: {}", error);
                OptimiseOutcome::Recovered {
                    routes: emergency_routes(bounds),
                    error,
                }
            }
            Err(_) => {
                tracing::info!(
                    "optimise missed its {} ms deadline, showing fallback routes",
                    self.config.optimise_deadline_ms
                );
                match fallback_routes(points, bounds, &self.config) {
                    Ok(routes) => OptimiseOutcome::TimedOut(routes),
                    Err(error) => OptimiseOutcome::Recovered {
                        routes: emergency_routes(bounds),
                        error,
                    },
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo_data::DemoDataset;
    use crate::geo_math::is_closed;
    use crate::road_snap::SnapError;
    use crate::shape_synthesis::shape::ShapeConfig;

    struct Offline;

    impl RouteGeometrySource for Offline {
        async fn route_geometry(&self, _waypoints: &[LatLng]) -> Result<Vec<LatLng>, SnapError> {
            Err(SnapError::Status(502))
        }
    }

    struct Hanging;

    impl RouteGeometrySource for Hanging {
        async fn route_geometry(&self, _waypoints: &[LatLng]) -> Result<Vec<LatLng>, SnapError> {
            std::future::pending().await
        }
    }

    struct Slow;

    impl RouteGeometrySource for Slow {
        async fn route_geometry(&self, waypoints: &[LatLng]) -> Result<Vec<LatLng>, SnapError> {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(waypoints.to_vec())
        }
    }

    fn config_with_deadline(ms: u64) -> DashboardConfig {
        DashboardConfig {
            optimise_deadline_ms: ms,
            ..DashboardConfig::default()
        }
    }

    #[test]
    fn synthesis_produces_four_closed_loops() {
        let data = DemoDataset::generate();
        let config = DashboardConfig::default();
        let synthesis = synthesise(&data.pooled_coordinates(), data.bounds(), &config).unwrap();
        assert_eq!(synthesis.shapes.len(), 4);
        assert!(synthesis.shapes.iter().all(|s| s.len() >= 2 && is_closed(s)));
    }

    #[test]
    fn invalid_input_is_reported() {
        let config = DashboardConfig::default();
        assert_eq!(synthesise(&[], None, &config).unwrap_err(), OptimiseError::NoPoints);
        let points = [LatLng::new(52.0, 4.0), LatLng::new(f64::NAN, 4.0)];
        assert_eq!(
            synthesise(&points, None, &config).unwrap_err(),
            OptimiseError::NonFinite { index: 1 }
        );
        let inverted = BoundingBox::new(52.41, 52.33, 4.83, 4.98);
        assert_eq!(
            synthesise(&[LatLng::new(52.37, 4.9)], Some(inverted), &config).unwrap_err(),
            OptimiseError::InvalidBounds(inverted)
        );
        let broken = BoundingBox::new(52.33, f64::INFINITY, 4.83, 4.98);
        assert!(matches!(
            synthesise(&[LatLng::new(52.37, 4.9)], Some(broken), &config),
            Err(OptimiseError::InvalidBounds(_))
        ));
    }

    fn assert_laid_out_around(routes: &[RenderedRoute], points: &[LatLng]) {
        let area = BoundingBox::from_points(points)
            .unwrap()
            .pad_flat_axes_m(ShapeConfig::default().fallback_half_width_m)
            .expand_m(1.0);
        assert_eq!(routes.len(), 4);
        for route in routes {
            assert!(is_closed(&route.coords));
            assert!(
                route.coords.iter().all(|p| area.contains(*p)),
                "route {} left {:?}",
                route.name,
                area
            );
        }
    }

    #[tokio::test]
    async fn a_single_stop_is_laid_out_where_it_is() {
        let stop = [LatLng::new(48.8566, 2.3522)];
        let snapper = RoadSnapper::new(Offline, 25);
        let optimiser = Optimiser::new(DashboardConfig::default(), Some(snapper));
        let outcome = optimiser.run(&stop, None).await;
        let OptimiseOutcome::Completed(routes) = outcome else {
            panic!("expected completion, got {}", outcome.label());
        };
        assert_laid_out_around(&routes, &stop);
    }

    #[tokio::test]
    async fn stops_on_one_latitude_are_laid_out_where_they_are() {
        let stops: Vec<LatLng> = (0..10)
            .map(|i| LatLng::new(52.37, 4.88 + i as f64 * 0.004))
            .collect();
        let snapper = RoadSnapper::new(Offline, 25);
        let optimiser = Optimiser::new(DashboardConfig::default(), Some(snapper));
        let outcome = optimiser.run(&stops, None).await;
        let OptimiseOutcome::Completed(routes) = outcome else {
            panic!("expected completion, got {}", outcome.label());
        };
        assert_laid_out_around(&routes, &stops);

        let fallback = fallback_routes(&stops, None, &DashboardConfig::default()).unwrap();
        assert_laid_out_around(&fallback, &stops);
    }

    #[test]
    fn a_handful_of_points_still_gives_four_routes() {
        let points = [LatLng::new(52.36, 4.88), LatLng::new(52.37, 4.90)];
        let bounds = BoundingBox::new(52.33, 52.41, 4.83, 4.98);
        let synthesis = synthesise(&points, Some(bounds), &DashboardConfig::default()).unwrap();
        assert_eq!(synthesis.shapes.len(), 4);
        assert!(synthesis.shapes.iter().all(|s| is_closed(s)));
    }

    #[test]
    fn fallback_and_emergency_sets_are_complete() {
        let data = DemoDataset::generate();
        let config = DashboardConfig::default();
        let fallback = fallback_routes(&data.pooled_coordinates(), data.bounds(), &config).unwrap();
        assert_eq!(fallback.len(), 4);
        assert!(fallback.iter().all(|r| is_closed(&r.coords)));

        let emergency = emergency_routes(None);
        let names: Vec<&str> = emergency.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["A", "B", "C", "D"]);
        assert!(emergency.iter().all(|r| is_closed(&r.coords)));
        assert!(
            emergency
                .iter()
                .flat_map(|r| r.coords.iter())
                .all(|p| DEFAULT_BOUNDS.contains(*p))
        );
    }

    #[tokio::test]
    async fn offline_snapping_completes_with_unsnapped_routes() {
        let data = DemoDataset::generate();
        let points = data.pooled_coordinates();
        let config = DashboardConfig::default();
        let optimiser = Optimiser::new(config.clone(), Some(RoadSnapper::new(Offline, 25)));
        let outcome = optimiser.run(&points, data.bounds()).await;
        let OptimiseOutcome::Completed(routes) = outcome else {
            panic!("expected completion, got {}", outcome.label());
        };
        let local = synthesise(&points, data.bounds(), &config).unwrap();
        for (route, shape) in routes.iter().zip(local.shapes.iter()) {
            assert_eq!(route.coords.len(), shape.len());
            assert!(route.coords.iter().zip(shape.iter()).all(|(a, b)| a.approx_eq(b, 1e-9)));
        }
        assert!(!optimiser.is_running());
    }

    #[tokio::test]
    async fn deadline_substitutes_fallback_routes() {
        let data = DemoDataset::generate();
        let snapper = RoadSnapper::new(Hanging, 25);
        let optimiser = Optimiser::new(config_with_deadline(50), Some(snapper));
        let outcome = optimiser.run(&data.pooled_coordinates(), data.bounds()).await;
        assert!(matches!(outcome, OptimiseOutcome::TimedOut(ref r) if r.len() == 4));
        assert!(!optimiser.is_running());
    }

    #[tokio::test]
    async fn failures_fall_back_to_emergency_routes_and_release_the_guard() {
        let snapper = RoadSnapper::new(Offline, 25);
        let optimiser = Optimiser::new(DashboardConfig::default(), Some(snapper));
        let outcome = optimiser.run(&[], None).await;
        assert!(matches!(
            outcome,
            OptimiseOutcome::Recovered {
                error: OptimiseError::NoPoints,
                ..
            }
        ));
        assert_eq!(outcome.routes().map(<[RenderedRoute]>::len), Some(4));
        assert!(!optimiser.is_running());
    }

    #[tokio::test]
    async fn overlapping_triggers_are_rejected() {
        let data = DemoDataset::generate();
        let points = data.pooled_coordinates();
        let snapper = RoadSnapper::new(Slow, 25);
        let optimiser = Optimiser::new(DashboardConfig::default(), Some(snapper));
        let (first, second) = tokio::join!(
            optimiser.run(&points, data.bounds()),
            optimiser.run(&points, data.bounds())
        );
        assert!(matches!(first, OptimiseOutcome::Completed(_)));
        assert!(matches!(second, OptimiseOutcome::Rejected));
        assert!(!optimiser.is_running());
    }
}
