use crate::config::DashboardConfig;
use crate::demo_data::DemoDataset;
use crate::geo_math::{BoundingBox, LatLng, centroid, haversine_m, is_closed};
use crate::kpi::compare;
use crate::optimise::{OptimiseOutcome, Optimiser, RenderedRoute};
use crate::render::{RenderOp, plan_render, to_geojson_string};
use crate::road_snap::{RoadSnapper, RouteGeometrySource, SnapError};
use crate::session::{
    Command, LayoutMode, MapSessionState, OutcomeKind, apply, optimise_input, traces_for,
};

struct Offline;

impl RouteGeometrySource for Offline {
    async fn route_geometry(&self, _waypoints: &[LatLng]) -> Result<Vec<LatLng>, SnapError> {
        Err(SnapError::NoRoute)
    }
}

struct Hanging;

impl RouteGeometrySource for Hanging {
    async fn route_geometry(&self, _waypoints: &[LatLng]) -> Result<Vec<LatLng>, SnapError> {
        std::future::pending().await
    }
}

fn city_bounds() -> BoundingBox {
    BoundingBox::new(52.32, 52.42, 4.80, 5.00)
}

fn assert_well_formed(routes: &[RenderedRoute], bounds: &BoundingBox) {
    let names: Vec<&str> = routes.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["A", "B", "C", "D"]);

    for route in routes {
        assert!(route.coords.len() >= 2, "route {} is too short", route.name);
        assert!(is_closed(&route.coords), "route {} is open", route.name);
        assert!(route.coords.iter().all(LatLng::is_finite));
    }

    let centroids: Vec<LatLng> = routes.iter().filter_map(|r| centroid(&r.coords)).collect();
    assert_eq!(centroids.len(), 4);
    for i in 0..centroids.len() {
        for j in (i + 1)..centroids.len() {
            let d = haversine_m(centroids[i], centroids[j]);
            assert!(d >= 600.0, "routes {} and {} are {:.0} m apart", i, j, d);
        }
    }

    let union = BoundingBox::from_points(routes.iter().flat_map(|r| r.coords.iter())).unwrap();
    assert!(bounds.expand_m(1.0).contains_box(&union), "{:?} escapes {:?}", union, bounds);
}

#[tokio::test]
async fn demo_routes_optimise_into_four_separated_loops() {
    let data = DemoDataset::generate();
    let bounds = city_bounds();
    let optimiser = Optimiser::new(DashboardConfig::default(), Some(RoadSnapper::new(Offline, 25)));

    let outcome = optimiser.run(&data.pooled_coordinates(), Some(bounds)).await;
    let OptimiseOutcome::Completed(routes) = outcome else {
        panic!("expected completion, got {}", outcome.label());
    };
    assert_well_formed(&routes, &bounds);
}

#[tokio::test]
async fn deadline_fallback_is_just_as_well_formed() {
    let data = DemoDataset::generate();
    let bounds = city_bounds();
    let config = DashboardConfig {
        optimise_deadline_ms: 30,
        ..DashboardConfig::default()
    };
    let optimiser = Optimiser::new(config, Some(RoadSnapper::new(Hanging, 25)));

    let outcome = optimiser.run(&data.pooled_coordinates(), Some(bounds)).await;
    let OptimiseOutcome::TimedOut(routes) = outcome else {
        panic!("expected the fallback set, got {}", outcome.label());
    };
    assert_well_formed(&routes, &bounds);
}

#[test]
fn synthesis_is_deterministic() {
    let data = DemoDataset::generate();
    let config = DashboardConfig::default();
    let points = data.pooled_coordinates();
    let a = crate::optimise::synthesise(&points, Some(city_bounds()), &config).unwrap();
    let b = crate::optimise::synthesise(&points, Some(city_bounds()), &config).unwrap();
    assert_eq!(a.shapes, b.shapes);
}

#[tokio::test]
async fn session_round_trip_through_both_layouts() {
    let data = DemoDataset::generate();
    let config = DashboardConfig::default();

    let empty = MapSessionState::default();
    let individual = apply(
        empty.clone(),
        Command::ShowIndividual {
            traces: traces_for(&data),
            key_points_per_route: config.shape.key_points_per_route,
        },
    );
    assert_eq!(plan_render(&empty, &individual).len(), 24);

    let (points, bounds) = optimise_input(&individual, &data);
    let optimiser = Optimiser::new(config, Some(RoadSnapper::new(Offline, 25)));
    let outcome = optimiser.run(&points, bounds).await;
    let optimised = apply(individual.clone(), Command::OptimiseFinished(outcome));
    assert_eq!(optimised.mode, LayoutMode::Optimised);
    assert_eq!(optimised.last_outcome, Some(OutcomeKind::Completed));
    if let Some(b) = bounds {
        assert_well_formed(&optimised.optimised, &b);
    }

    let ops = plan_render(&individual, &optimised);
    let removed = ops.iter().filter(|op| matches!(op, RenderOp::Remove(_))).count();
    let drawn = ops.iter().filter(|op| matches!(op, RenderOp::Draw(_))).count();
    assert_eq!((removed, drawn), (24, 4));

    let geojson = to_geojson_string(&optimised);
    assert!(geojson.contains("\"optimised-D\""));

    let comparison = compare(&data, &optimised.optimised);
    assert_eq!(comparison.optimised.route_count, 4);
    assert_eq!(comparison.optimised.stop_count, data.stops.len());

    let back = apply(
        optimised.clone(),
        Command::ShowIndividual {
            traces: traces_for(&data),
            key_points_per_route: 6,
        },
    );
    assert_eq!(back.mode, LayoutMode::Individual);
    assert_eq!(back.optimised, optimised.optimised);
}
