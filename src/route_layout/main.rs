// Copyright: Lastmile Dashboard contributors
// Runs the dashboard layouts on the demo dataset and writes GeoJSON

use anyhow::Context;
use clap::Parser;
use lastmile::config::DashboardConfig;
use lastmile::demo_data::DemoDataset;
use lastmile::kpi::{compare, individual_kpis};
use lastmile::optimise::Optimiser;
use lastmile::render::to_geojson_string;
use lastmile::road_snap::{OsrmClient, RoadSnapper};
use lastmile::session::{Command, MapSessionState, apply, optimise_input, traces_for};
use std::path::PathBuf;
use tracing::info;

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    /// The 24 courier routes as generated
    Individual,
    /// The 4 decorative optimised loops
    Optimised,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(long, value_enum, default_value_t = Mode::Optimised)]
    mode: Mode,
    /// RON file with pipeline settings; missing fields keep their defaults
    #[arg(long)]
    config: Option<PathBuf>,
    /// Snap the optimised loops onto roads through the routing service
    #[arg(long)]
    snap: bool,
    #[arg(long)]
    routing_url: Option<String>,
    /// Where to write the GeoJSON; stdout when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => DashboardConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => DashboardConfig::default(),
    }
    .with_env_overrides();
    if let Some(url) = args.routing_url {
        config.snap.base_url = url;
    }
    if args.snap {
        config.snap.enabled = true;
    }

    let data = DemoDataset::generate();
    let individual = individual_kpis(&data);
    info!(
        "{} routes, {} stops, {:.2} km, {} high risk",
        individual.route_count,
        individual.stop_count,
        individual.distance_km,
        individual.high_risk_routes
    );

    let state = apply(
        MapSessionState::default(),
        Command::ShowIndividual {
            traces: traces_for(&data),
            key_points_per_route: config.shape.key_points_per_route,
        },
    );

    let state = match args.mode {
        Mode::Individual => state,
        Mode::Optimised => {
            let snapper = if config.snap.enabled {
                let client = OsrmClient::new(&config.snap).context("building routing client")?;
                Some(RoadSnapper::new(client, config.snap.max_waypoints))
            } else {
                None
            };
            let optimiser = Optimiser::new(config, snapper);
            let (points, bounds) = optimise_input(&state, &data);
            let outcome = optimiser.run(&points, bounds).await;
            info!("optimise finished: {}", outcome.label());

            let state = apply(state, Command::OptimiseFinished(outcome));
            let comparison = compare(&data, &state.optimised);
            info!(
                "optimised: {} routes, {:.2} km ({:+.2}% vs individual)",
                comparison.optimised.route_count,
                comparison.optimised.distance_km,
                comparison.distance_change_pct
            );
            state
        }
    };

    let geojson = to_geojson_string(&state);
    match args.output {
        Some(path) => {
            std::fs::write(&path, geojson).with_context(|| format!("writing {}", path.display()))?;
            info!("wrote {}", path.display());
        }
        None => println!("{}", geojson),
    }

    Ok(())
}
