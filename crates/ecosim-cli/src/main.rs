//! Console driver for the ecosystem simulation.

mod driver;
mod settings;
mod telemetry;

use anyhow::Result;
use clap::Parser;
use driver::DriverOptions;
use ecosim_core::{Neighborhood, SimulationConfig, WorldConfig};
use ecosim_world::stats::default_log_path;
use ecosim_world::{Simulation, StatsSink};
use settings::FileConfig;
use std::path::PathBuf;
use telemetry::LogFormat;
use tokio::signal;
use tokio::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Grid-based predator/prey ecosystem simulation", long_about = None)]
struct Args {
    /// Grid width in cells
    #[arg(long)]
    width: Option<i32>,

    /// Grid height in cells
    #[arg(long)]
    height: Option<i32>,

    /// Seed for a reproducible run
    #[arg(long)]
    seed: Option<u64>,

    /// Use the 8-cell Moore neighborhood instead of Von Neumann
    #[arg(long)]
    moore: bool,

    /// Pause between cycles in milliseconds
    #[arg(long, default_value_t = 1000)]
    delay_ms: u64,

    /// Stop after this many cycles
    #[arg(long)]
    max_cycles: Option<u64>,

    /// Where to write the per-cycle statistics log
    #[arg(long)]
    stats_path: Option<PathBuf>,

    /// TOML file with [world] and [parameters] tables
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Do not print the grid after each cycle
    #[arg(short, long)]
    quiet: bool,

    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,

    /// Print the final summary as JSON
    #[arg(long)]
    summary_json: bool,
}

impl Args {
    /// File values overridden by command-line flags
    fn world_config(&self, file: &FileConfig) -> Result<WorldConfig> {
        let mut world = file.world.clone();
        if let Some(width) = self.width {
            world.width = width;
        }
        if let Some(height) = self.height {
            world.height = height;
        }
        if self.seed.is_some() {
            world.seed = self.seed;
        }
        if self.moore {
            world.neighborhood = Neighborhood::Moore;
        }
        world.validate()?;
        Ok(world)
    }

    fn driver_options(&self) -> DriverOptions {
        DriverOptions {
            delay: Duration::from_millis(self.delay_ms),
            max_cycles: self.max_cycles,
            render: !self.quiet,
        }
    }
}

fn simulation_config(file: &FileConfig) -> SimulationConfig {
    let mut config = SimulationConfig::default();
    let rejected = file.parameters.apply_to(&mut config);
    if rejected > 0 {
        warn!(rejected, "Ignored out-of-range parameters from config file");
    }
    config
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    telemetry::init_telemetry(args.log_format)?;

    let file = match &args.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let world = args.world_config(&file)?;
    let config = simulation_config(&file);
    let stats_path = args.stats_path.clone().unwrap_or_else(default_log_path);

    info!(
        width = world.width,
        height = world.height,
        seed = ?world.seed,
        neighborhood = %world.neighborhood,
        stats_path = %stats_path.display(),
        "Starting ecosystem simulation"
    );

    let mut simulation = Simulation::new(world, config.shared(), StatsSink::with_log(&stats_path))?;
    simulation.initialize()?;
    let stop = simulation.stop_handle();

    let mut run = tokio::spawn(driver::run(simulation, args.driver_options()));

    let summary = tokio::select! {
        result = &mut run => result??,
        _ = shutdown_signal() => {
            stop.stop();
            info!("Waiting for the current cycle to finish");
            run.await??
        }
    };

    println!(
        "Simulation ended after {} cycles: {}",
        summary.stats.cycles, summary.reason
    );
    if args.summary_json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_file() {
        let file = FileConfig::from_toml("[world]\nwidth = 40\nheight = 12\nseed = 1\n").unwrap();
        let args = Args::parse_from(["ecosim", "--height", "20", "--seed", "5", "--moore"]);

        let world = args.world_config(&file).unwrap();

        assert_eq!(world.width, 40);
        assert_eq!(world.height, 20);
        assert_eq!(world.seed, Some(5));
        assert_eq!(world.neighborhood, Neighborhood::Moore);
    }

    #[test]
    fn test_invalid_dimensions_rejected() {
        let args = Args::parse_from(["ecosim", "--width", "0"]);
        assert!(args.world_config(&FileConfig::default()).is_err());
    }

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["ecosim"]);
        let options = args.driver_options();

        assert_eq!(options.delay, Duration::from_millis(1000));
        assert_eq!(options.max_cycles, None);
        assert!(options.render);
        assert_eq!(args.log_format, LogFormat::Text);

        let config = simulation_config(&FileConfig::default());
        assert_eq!(config, SimulationConfig::default());
    }
}
