//! motion-trace command line.
//!
//! Replays logged IMU samples through the estimator and writes the resulting
//! trajectory as CSV. See `motion-trace --help`.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use log::{debug, info, warn, LevelFilter};

use motion_trace::replay::{self, ReplayOptions, TrajectoryWriter};
use motion_trace::{EstimatorConfig, MotionEstimator};

#[derive(Parser)]
#[command(name = "motion-trace")]
#[command(bin_name = "motion-trace")]
#[command(about = "IMU dead reckoning for pen-trajectory reconstruction")]
struct Cli {
    /// Log at debug level.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Replay(ReplayArgs),
    Config(ConfigArgs),
}

#[derive(clap::Args)]
#[command(about = "Replay a CSV sample log and write the trajectory")]
struct ReplayArgs {
    /// Sample log (Timestamp,Raw_Accel_X,Raw_Accel_Y,Raw_Accel_Z[,Raw_Gyro_*]).
    input: PathBuf,

    /// JSON estimator configuration; missing fields take preset defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Start from the inertial (SI unit) preset.
    #[arg(long)]
    inertial: bool,

    /// Trajectory CSV destination. Defaults to stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Drop (-1, -1, -1) sensor dropout rows.
    #[arg(long)]
    skip_dropouts: bool,
}

#[derive(clap::Args)]
#[command(about = "Print a configuration preset as JSON")]
struct ConfigArgs {
    /// Print the inertial preset instead of the default one.
    #[arg(long)]
    inertial: bool,
}

fn preset(inertial: bool) -> EstimatorConfig {
    if inertial {
        EstimatorConfig::inertial()
    } else {
        EstimatorConfig::default()
    }
}

fn load_config(path: Option<&Path>, inertial: bool) -> Result<EstimatorConfig> {
    let Some(path) = path else {
        return Ok(preset(inertial));
    };

    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let overrides: serde_json::Value = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing {}", path.display()))?;

    // Partial files override the selected preset field by field.
    let mut merged = serde_json::to_value(preset(inertial))?;
    merge_json(&mut merged, overrides);
    Ok(serde_json::from_value(merged)?)
}

fn merge_json(base: &mut serde_json::Value, overrides: serde_json::Value) {
    match (base, overrides) {
        (serde_json::Value::Object(base), serde_json::Value::Object(overrides)) => {
            for (key, value) in overrides {
                match base.get_mut(&key) {
                    Some(slot) => merge_json(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

fn replay_command(args: ReplayArgs) -> Result<()> {
    let config = load_config(args.config.as_deref(), args.inertial)?;
    let mut estimator = MotionEstimator::try_new(config)?;

    let input = File::open(&args.input)
        .with_context(|| format!("opening {}", args.input.display()))?;
    let options = ReplayOptions {
        skip_dropouts: args.skip_dropouts,
        ..ReplayOptions::default()
    };
    let samples = replay::read_samples(BufReader::new(input), &options)
        .with_context(|| format!("reading {}", args.input.display()))?;
    info!("loaded {} samples from {}", samples.len(), args.input.display());

    let output: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        None => Box::new(io::stdout().lock()),
    };
    let mut sink = TrajectoryWriter::new(output)?;
    let summary = replay::run(&mut estimator, samples, &mut sink)?;

    info!(
        "{} samples, {} updates, {} strokes, final position ({:.2}, {:.2}, {:.2})",
        summary.samples_fed,
        summary.updates_emitted,
        summary.strokes.len(),
        summary.final_position.x,
        summary.final_position.y,
        summary.final_position.z
    );
    let diag = &summary.diagnostics;
    debug!(
        "distance {:.2}, heading {:.3} rad, rotations {} applied / {} skipped, \
         {} zero-velocity updates, {} threshold updates, final speed {:.3}",
        summary.total_distance,
        diag.heading_rad,
        diag.rotations_applied,
        diag.rotations_skipped,
        diag.zero_velocity_updates,
        diag.threshold_updates,
        diag.speed
    );

    if let Some(err) = summary.stopped_by {
        warn!("replay ended early");
        return Err(anyhow!(err));
    }
    Ok(())
}

fn config_command(args: ConfigArgs) -> Result<()> {
    let json = serde_json::to_string_pretty(&preset(args.inertial))?;
    println!("{json}");
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let _ = env_logger::builder()
        .filter_level(level)
        .parse_default_env()
        .try_init();

    match cli.command {
        Commands::Replay(args) => replay_command(args),
        Commands::Config(args) => config_command(args),
    }
}
