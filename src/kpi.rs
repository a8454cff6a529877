//! KPI cards, timelines and popup text for the dashboard panels.

use crate::demo_data::{DemoDataset, RiskLevel, RouteStop, RouteSummary};
use crate::geo_math::path_length_m;
use crate::optimise::RenderedRoute;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiCards {
    pub route_count: usize,
    pub stop_count: usize,
    pub distance_km: f64,
    pub avg_stops_per_route: f64,
    pub high_risk_routes: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModeComparison {
    pub individual: KpiCards,
    pub optimised: KpiCards,
    /// Negative when the optimised layout is shorter.
    pub distance_change_pct: f64,
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

pub fn individual_kpis(data: &DemoDataset) -> KpiCards {
    let route_count = data.routes.len();
    let stop_count: usize = data.routes.iter().map(|r| r.stop_count).sum();
    let distance_km: f64 = data.routes.iter().map(|r| r.distance_km).sum();
    KpiCards {
        route_count,
        stop_count,
        distance_km: round2(distance_km),
        avg_stops_per_route: if route_count == 0 {
            0.0
        } else {
            round2(stop_count as f64 / route_count as f64)
        },
        high_risk_routes: data.routes.iter().filter(|r| r.risk == RiskLevel::High).count(),
    }
}

/// The optimised layout carries every stop of the dataset, spread over its
/// routes, and none of them is flagged high risk.
pub fn optimised_kpis(data: &DemoDataset, routes: &[RenderedRoute]) -> KpiCards {
    let route_count = routes.len();
    let stop_count = data.stops.len();
    let distance_km: f64 = routes.iter().map(|r| path_length_m(&r.coords) / 1000.0).sum();
    KpiCards {
        route_count,
        stop_count,
        distance_km: round2(distance_km),
        avg_stops_per_route: if route_count == 0 {
            0.0
        } else {
            round2(stop_count as f64 / route_count as f64)
        },
        high_risk_routes: 0,
    }
}

pub fn compare(data: &DemoDataset, routes: &[RenderedRoute]) -> ModeComparison {
    let individual = individual_kpis(data);
    let optimised = optimised_kpis(data, routes);
    let distance_change_pct = if individual.distance_km > 0.0 {
        round2((optimised.distance_km - individual.distance_km) / individual.distance_km * 100.0)
    } else {
        0.0
    };
    ModeComparison {
        individual,
        optimised,
        distance_change_pct,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineEntry {
    pub stop_id: String,
    pub eta: String,
    pub address: String,
}

/// Stops of one route in ETA order.
pub fn timeline(data: &DemoDataset, route_id: &str) -> Vec<TimelineEntry> {
    let mut entries: Vec<TimelineEntry> = data
        .stops_for(route_id)
        .map(|s| TimelineEntry {
            stop_id: s.id.clone(),
            eta: s.eta.clone(),
            address: s.address.clone(),
        })
        .collect();
    entries.sort_by(|a, b| a.eta.cmp(&b.eta));
    entries
}

pub fn stop_popup(stop: &RouteStop) -> String {
    format!("Stop {} · {} · {}", stop.id, stop.eta, stop.address)
}

pub fn route_popup(route: &RouteSummary) -> String {
    format!(
        "Route {} · {} · {} stops · {:.2} km · risk {}",
        route.id, route.courier_name, route.stop_count, route.distance_km, route.risk
    )
}

pub fn optimised_popup(route: &RenderedRoute, stops_served: usize) -> String {
    format!(
        "Optimised route {} · {} stops · {:.2} km",
        route.name,
        stops_served,
        path_length_m(&route.coords) / 1000.0
    )
}
