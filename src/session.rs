// Copyright: Lastmile Dashboard contributors
// Map session state and the commands that move it between layouts

use crate::demo_data::DemoDataset;
use crate::geo_math::{BoundingBox, LatLng};
use crate::optimise::{OptimiseOutcome, RenderedRoute};
use crate::palette::{individual_colour, to_hex};
use crate::shape_synthesis::shape::sample_key_points;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LayoutMode {
    #[default]
    Individual,
    Optimised,
}

/// One of the 24 courier routes as drawn. `coords` is the open stop path.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteTrace {
    pub id: String,
    pub color: String,
    pub coords: Vec<LatLng>,
}

impl RouteTrace {
    pub fn layer_id(&self) -> String {
        individual_layer_id(&self.id)
    }
}

pub fn individual_layer_id(route_id: &str) -> String {
    format!("route-{}", route_id)
}

pub fn optimised_layer_id(name: &str) -> String {
    format!("optimised-{}", name)
}

pub fn traces_for(data: &DemoDataset) -> Vec<RouteTrace> {
    let total = data.routes.len();
    data.routes
        .iter()
        .enumerate()
        .map(|(i, route)| RouteTrace {
            id: route.id.clone(),
            color: to_hex(individual_colour(i, total)),
            coords: data.route_coordinates(&route.id),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Completed,
    TimedOut,
    Recovered,
    Rejected,
}

impl From<&OptimiseOutcome> for OutcomeKind {
    fn from(outcome: &OptimiseOutcome) -> Self {
        match outcome {
            OptimiseOutcome::Completed(_) => OutcomeKind::Completed,
            OptimiseOutcome::TimedOut(_) => OutcomeKind::TimedOut,
            OptimiseOutcome::Recovered { .. } => OutcomeKind::Recovered,
            OptimiseOutcome::Rejected => OutcomeKind::Rejected,
        }
    }
}

/// Everything the map view remembers between actions. Owned by whoever
/// drives the UI and replaced wholesale by [`apply`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapSessionState {
    pub mode: LayoutMode,
    /// Bounds of the last 24-route render; the 4-route layout reuses them.
    pub last_bounds: Option<BoundingBox>,
    /// Points sampled from the last 24-route render.
    pub last_key_points: Vec<LatLng>,
    pub individual: Vec<RouteTrace>,
    pub optimised: Vec<RenderedRoute>,
    pub selected: Option<String>,
    pub last_outcome: Option<OutcomeKind>,
}

impl MapSessionState {
    /// Layer ids currently on the map.
    pub fn visible_layer_ids(&self) -> Vec<String> {
        match self.mode {
            LayoutMode::Individual => self.individual.iter().map(RouteTrace::layer_id).collect(),
            LayoutMode::Optimised => self
                .optimised
                .iter()
                .map(|r| optimised_layer_id(&r.name))
                .collect(),
        }
    }

    fn is_visible(&self, layer_id: &str) -> bool {
        self.visible_layer_ids().iter().any(|id| id == layer_id)
    }
}

#[derive(Debug)]
pub enum Command {
    /// Draw the courier routes and remember their bounds and key points.
    ShowIndividual {
        traces: Vec<RouteTrace>,
        key_points_per_route: usize,
    },
    /// Go back to the optimised layers from the last run, if there are any.
    ShowOptimised,
    OptimiseFinished(OptimiseOutcome),
    SelectLayer(String),
    ClearSelection,
}

pub fn apply(state: MapSessionState, command: Command) -> MapSessionState {
    match command {
        Command::ShowIndividual {
            traces,
            key_points_per_route,
        } => {
            let last_bounds = BoundingBox::from_points(traces.iter().flat_map(|t| t.coords.iter()));
            let last_key_points = traces
                .iter()
                .flat_map(|t| sample_key_points(&t.coords, key_points_per_route))
                .collect();
            MapSessionState {
                mode: LayoutMode::Individual,
                last_bounds: last_bounds.or(state.last_bounds),
                last_key_points,
                individual: traces,
                selected: None,
                ..state
            }
        }
        Command::ShowOptimised => {
            if state.optimised.is_empty() {
                return state;
            }
            MapSessionState {
                mode: LayoutMode::Optimised,
                selected: None,
                ..state
            }
        }
        Command::OptimiseFinished(outcome) => {
            let kind = OutcomeKind::from(&outcome);
            let routes = match outcome {
                OptimiseOutcome::Completed(routes) | OptimiseOutcome::TimedOut(routes) => routes,
                OptimiseOutcome::Recovered { routes, .. } => routes,
                OptimiseOutcome::Rejected => {
                    return MapSessionState {
                        last_outcome: Some(kind),
                        ..state
                    };
                }
            };
            MapSessionState {
                mode: LayoutMode::Optimised,
                optimised: routes,
                selected: None,
                last_outcome: Some(kind),
                ..state
            }
        }
        Command::SelectLayer(id) => {
            if !state.is_visible(&id) {
                tracing::debug!("ignoring selection of hidden layer {}", id);
                return state;
            }
            MapSessionState {
                selected: Some(id),
                ..state
            }
        }
        Command::ClearSelection => MapSessionState {
            selected: None,
            ..state
        },
    }
}

/// Points and bounds the next optimise run should use: the remembered key
/// points and bounds when a 24-route render happened, the raw stops otherwise.
pub fn optimise_input(
    state: &MapSessionState,
    data: &DemoDataset,
) -> (Vec<LatLng>, Option<BoundingBox>) {
    let points = if state.last_key_points.is_empty() {
        data.pooled_coordinates()
    } else {
        state.last_key_points.clone()
    };
    (points, state.last_bounds.or_else(|| data.bounds()))
}
