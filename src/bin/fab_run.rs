//! Fabrication run CLI.
//!
//! Loads the frame dataset and run configuration, then drives the run against
//! the in-process simulated robot. Connecting a physical cell means supplying
//! a [`RobotInterface`](clay_fab_run::RobotInterface) for its RPC transport.

use std::path::PathBuf;

use clap::Parser;
use clay_fab_run::{
    FabResult, FrameDataset, PlacementLedger, ProgressReporter, RunConfig, RunController,
    SimulatedRobot, LEDGER_PATH, PROGRESS_SOCKET_NAME,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "fab-run")]
#[command(version, about = "Clay extrusion fabrication run", long_about = None)]
struct Args {
    /// Frame dataset with `travel_frames` and `extrude_frames`
    #[arg(long, value_name = "JSON")]
    frames: PathBuf,

    /// Run configuration (defaults are used for missing keys)
    #[arg(long, value_name = "JSON")]
    config: Option<PathBuf>,

    /// Suppress actuator signals, keep motion
    #[arg(long)]
    dry_run: bool,

    /// First element to fabricate
    #[arg(long, value_name = "INDEX", conflicts_with = "resume")]
    start_from: Option<usize>,

    /// Placement ledger directory (bare flag uses the default location)
    #[arg(long, value_name = "DIR", num_args = 0..=1, default_missing_value = LEDGER_PATH)]
    ledger: Option<PathBuf>,

    /// Continue after the last placement recorded in the ledger
    #[arg(long, requires = "ledger")]
    resume: bool,

    /// Local socket name of an operator progress monitor (bare flag uses the default name)
    #[arg(long, value_name = "NAME", num_args = 0..=1, default_missing_value = PROGRESS_SOCKET_NAME)]
    monitor: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> FabResult<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let mut config = match &args.config {
        Some(path) => RunConfig::from_json_file(path)?,
        None => RunConfig::default(),
    };
    config.dry_run |= args.dry_run;
    if let Some(start) = args.start_from {
        config.start_index = start;
    }

    let ledger = args.ledger.as_ref().map(PlacementLedger::open).transpose()?;
    if args.resume {
        if let Some(ledger) = &ledger {
            config.start_index = ledger.resume_index()?;
            config.highest_placed_z = ledger.highest_placed_z()?;
            info!(
                start_index = config.start_index,
                highest_placed_z = ?config.highest_placed_z,
                "resuming from ledger"
            );
        }
    }

    let dataset = FrameDataset::from_json_file(&args.frames)?;
    let mut controller = RunController::from_dataset(config, dataset)?;
    if let Some(ledger) = ledger {
        controller = controller.with_ledger(ledger);
    }
    if let Some(name) = &args.monitor {
        match ProgressReporter::connect(name) {
            Ok(reporter) => controller = controller.with_progress(reporter),
            Err(err) => warn!(%err, %name, "progress monitor unavailable"),
        }
    }

    let mut robot = SimulatedRobot::new(controller.config().home_joints);
    info!("Connected.");

    match controller.run(&mut robot).await {
        Ok(summary) => {
            info!(
                completed = summary.completed,
                recoveries = summary.recoveries,
                highest_placed_z = ?summary.highest_placed_z,
                commands = robot.sent().len(),
                "fabrication complete"
            );
            Ok(())
        }
        Err(err) => {
            let resume_at = controller
                .state()
                .last_completed()
                .map_or(controller.config().start_index, |i| i + 1);
            error!(resume_at, "run stopped; resume with --start-from {resume_at}");
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_ledger_and_monitor_flags_use_defaults() {
        let args = Args::try_parse_from(["fab-run", "--frames", "f.json", "--ledger", "--resume", "--monitor"])
            .expect("args");

        assert_eq!(args.ledger, Some(PathBuf::from(LEDGER_PATH)));
        assert_eq!(args.monitor.as_deref(), Some(PROGRESS_SOCKET_NAME));
        assert!(args.resume);
    }

    #[test]
    fn explicit_ledger_path_wins() {
        let args = Args::try_parse_from(["fab-run", "--frames", "f.json", "--ledger", "/data/run7"])
            .expect("args");

        assert_eq!(args.ledger, Some(PathBuf::from("/data/run7")));
        assert_eq!(args.monitor, None);
    }
}
