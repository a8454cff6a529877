// Copyright: Lastmile Dashboard contributors
// Deterministic demo dataset: 24 courier routes and their stops

use crate::geo_math::{BoundingBox, LatLng, path_length_m};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::fmt;

pub const DEMO_ROUTE_COUNT: usize = 24;
const DEMO_SEED: u64 = 0x1a57_3113;
const CITY_CENTRE: LatLng = LatLng::new(52.3676, 4.9041);
const GRID_COLS: usize = 6;
const GRID_ROWS: usize = 4;
const DISTRICT_LAT_STEP: f64 = 0.018;
const DISTRICT_LNG_STEP: f64 = 0.028;

const COURIERS: [&str; DEMO_ROUTE_COUNT] = [
    "Amara Okafor",
    "Bas de Vries",
    "Chen Wei",
    "Daan Janssen",
    "Eva Lindqvist",
    "Farid Haddad",
    "Greta Müller",
    "Hugo Martens",
    "Ines Costa",
    "Jonas Peeters",
    "Kiran Patel",
    "Lotte Visser",
    "Mateo Rossi",
    "Noor Bakker",
    "Oskar Nowak",
    "Priya Nair",
    "Quinn Smit",
    "Rosa Alvarez",
    "Sem Hendriks",
    "Tess Mulder",
    "Umar Rahman",
    "Vera Kuipers",
    "Wout Claes",
    "Xenia Pavlova",
];

const STREETS: [&str; 12] = [
    "Canal Street",
    "Harbour Lane",
    "Market Square",
    "Tulip Road",
    "Mill Avenue",
    "Bridge Street",
    "Station Road",
    "Linden Way",
    "Dock Street",
    "Orchard Lane",
    "Church Street",
    "Garden Row",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RiskLevel {
    Low,
    Med,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::Low => "Low",
            RiskLevel::Med => "Med",
            RiskLevel::High => "High",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteStop {
    pub id: String,
    pub route_id: String,
    /// Estimated time of arrival, "HH:MM".
    pub eta: String,
    pub address: String,
    pub coordinate: LatLng,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteSummary {
    pub id: String,
    pub courier_name: String,
    pub stop_count: usize,
    pub distance_km: f64,
    pub risk: RiskLevel,
}

#[derive(Debug, Clone)]
pub struct DemoDataset {
    pub routes: Vec<RouteSummary>,
    /// Stops of every route, grouped by route in `routes` order.
    pub stops: Vec<RouteStop>,
}

impl DemoDataset {
    /// Builds the 24-route dataset. Always returns the same data.
    pub fn generate() -> Self {
        let mut rng = StdRng::seed_from_u64(DEMO_SEED);
        let mut routes = Vec::with_capacity(DEMO_ROUTE_COUNT);
        let mut stops = Vec::new();

        for (index, courier) in COURIERS.iter().enumerate() {
            let route_id = route_letter(index);
            let district = district_centre(index);
            let stop_count = rng.random_range(8..=13usize);

            // stops sweep around the district so the route reads as a tour
            let start_angle = rng.random_range(0.0..std::f64::consts::TAU);
            let mut minutes = 8 * 60;
            let mut coords = Vec::with_capacity(stop_count);
            for s in 0..stop_count {
                let angle = start_angle + std::f64::consts::TAU * s as f64 / stop_count as f64;
                let radius = rng.random_range(250.0..750.0);
                let coordinate = district.offset_m(radius * angle.sin(), radius * angle.cos());
                minutes += rng.random_range(9..=15);
                let street = STREETS[rng.random_range(0..STREETS.len())];
                let number = rng.random_range(1..=180);
                coords.push(coordinate);
                stops.push(RouteStop {
                    id: format!("{}{}", route_id, s + 1),
                    route_id: route_id.clone(),
                    eta: format!("{:02}:{:02}", minutes / 60, minutes % 60),
                    address: format!("{} {}", number, street),
                    coordinate,
                });
            }

            let distance_km = (path_length_m(&coords) / 1000.0 * 100.0).round() / 100.0;
            routes.push(RouteSummary {
                id: route_id,
                courier_name: courier.to_string(),
                stop_count,
                distance_km,
                risk: risk_for(stop_count, distance_km),
            });
        }

        Self { routes, stops }
    }

    pub fn stops_for<'a>(&'a self, route_id: &'a str) -> impl Iterator<Item = &'a RouteStop> + 'a {
        self.stops.iter().filter(move |s| s.route_id == route_id)
    }

    pub fn route_coordinates(&self, route_id: &str) -> Vec<LatLng> {
        self.stops_for(route_id).map(|s| s.coordinate).collect()
    }

    pub fn pooled_coordinates(&self) -> Vec<LatLng> {
        self.stops.iter().map(|s| s.coordinate).collect()
    }

    pub fn bounds(&self) -> Option<BoundingBox> {
        BoundingBox::from_points(self.stops.iter().map(|s| &s.coordinate))
    }

    pub fn route(&self, route_id: &str) -> Option<&RouteSummary> {
        self.routes.iter().find(|r| r.id == route_id)
    }

    pub fn stop(&self, stop_id: &str) -> Option<&RouteStop> {
        self.stops.iter().find(|s| s.id == stop_id)
    }
}

/// "A" to "X" for the 24 demo routes; later indices wrap with a number.
pub fn route_letter(index: usize) -> String {
    let letter = (b'A' + (index % 26) as u8) as char;
    if index < 26 {
        letter.to_string()
    } else {
        format!("{}{}", letter, index / 26)
    }
}

fn district_centre(index: usize) -> LatLng {
    let row = (index / GRID_COLS) as f64;
    let col = (index % GRID_COLS) as f64;
    LatLng::new(
        CITY_CENTRE.lat + (row - (GRID_ROWS as f64 - 1.0) / 2.0) * DISTRICT_LAT_STEP,
        CITY_CENTRE.lng + (col - (GRID_COLS as f64 - 1.0) / 2.0) * DISTRICT_LNG_STEP,
    )
}

fn risk_for(stop_count: usize, distance_km: f64) -> RiskLevel {
    match (stop_count, distance_km) {
        (13.., _) => RiskLevel::High,
        (_, d) if d > 4.2 => RiskLevel::High,
        (11..=12, _) => RiskLevel::Med,
        (_, d) if d > 3.4 => RiskLevel::Med,
        _ => RiskLevel::Low,
    }
}
