use anyhow::Result;
use arena_nav::{
    configuration::AppConfig,
    driver::{shared_driver, SimulatedRobot},
    logging,
    map::{Map, Point},
    navigation::Navigator,
    vision::SharedBallTracker,
};
use clap::{Parser, Subcommand};
use nalgebra as na;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::*;

#[derive(Parser, Debug)]
#[command(
    version,
    author = "David M. Weis <dweis7@gmail.com>",
    about = "Arena navigation on a simulated differential drive robot"
)]
struct Args {
    /// path to config
    #[arg(long)]
    config: Option<PathBuf>,

    /// map file, text or json, overrides the configured map
    #[arg(long)]
    map: Option<PathBuf>,

    /// Sets the level of verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbosity: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Plan and drive to a point in grid units
    Goto { x: f64, y: f64 },
    /// Turn a full circle looking for balls
    Spin,
    /// Drive to random reachable points
    RandomWalk {
        #[arg(long, default_value_t = 5)]
        count: usize,
        #[arg(long)]
        seed: Option<u64>,
        /// Unreachable destinations in a row before giving up
        #[arg(long, default_value_t = 100)]
        max_attempts: usize,
    },
}

fn load_map(path: &Path) -> Result<Map> {
    info!("Loading map from {:?}", path);
    match path.extension().and_then(|extension| extension.to_str()) {
        Some("json") => Map::load_json(path),
        _ => Map::load_text(path),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::setup_tracing(args.verbosity);

    let app_config = AppConfig::load_config(&args.config)?;

    let map = match args.map.as_ref().or(app_config.map_path.as_ref()) {
        Some(path) => load_map(path)?,
        None => {
            info!("Using built in arena");
            Map::default_arena()
        }
    };
    let map = Arc::new(map);

    let robot = SimulatedRobot::new(
        map.clone(),
        app_config.robot.motor_curve,
        app_config.simulation.clone(),
    );
    let probe = robot.probe();
    let tracker = Arc::new(SharedBallTracker::new());
    let mut navigator =
        Navigator::start(map.clone(), shared_driver(Box::new(robot)), tracker, &app_config).await;

    let cancellation = navigator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, cancelling");
            cancellation.cancel();
        }
    });

    let result = match args.command {
        Command::Goto { x, y } => navigator
            .move_to_point(Point::new(x, y))
            .await
            .map(|path| info!(waypoints = path.len(), "arrived")),
        Command::Spin => navigator
            .spin()
            .await
            .map(|outcome| info!(?outcome, "spin finished")),
        Command::RandomWalk {
            count,
            seed,
            max_attempts,
        } => {
            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            navigator.random_walk(&mut rng, count, max_attempts).await
        }
    };

    let truth = probe.true_pose();
    let estimate = navigator.pose();
    info!(
        %truth,
        %estimate,
        error = na::distance(truth.position(), estimate.position()),
        "final pose"
    );
    navigator.shutdown().await?;
    Ok(result?)
}
