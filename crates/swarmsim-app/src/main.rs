use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use swarmsim_app::Runtime;
use swarmsim_core::{ControlCommand, Simulation, SwarmConfig};
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "swarmsim",
    version,
    about = "Headless drone swarm simulation with time-travel controls"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the simulation and print the final world as JSON.
    Run(RunArgs),
    /// Print the effective configuration as JSON.
    Config {
        /// Optional JSON config file layered over the defaults.
        #[arg(short, long, env = "SWARMSIM_CONFIG")]
        config: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Number of ticks to run.
    #[arg(long, default_value_t = 500)]
    ticks: u64,
    /// Tick rate override in Hz.
    #[arg(long)]
    hz: Option<f32>,
    /// RNG seed for enemy placement.
    #[arg(long)]
    seed: Option<u64>,
    /// Optional JSON config file layered over the defaults.
    #[arg(short, long, env = "SWARMSIM_CONFIG")]
    config: Option<PathBuf>,
    /// JSON array of commands queued before the first tick.
    #[arg(long)]
    commands: Option<PathBuf>,
    /// Tick at wall-clock rate instead of as fast as possible.
    #[arg(long)]
    realtime: bool,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run(args),
        Command::Config { config } => {
            let config = load_config(config.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_config(path: Option<&Path>) -> Result<SwarmConfig> {
    let Some(path) = path else {
        return Ok(SwarmConfig::default());
    };
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid config {}", path.display()))
}

fn load_commands(path: &Path) -> Result<Vec<ControlCommand>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read commands {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid commands {}", path.display()))
}

fn run(args: RunArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(hz) = args.hz {
        config.tick_hz = hz;
    }
    if args.seed.is_some() {
        config.rng_seed = args.seed;
    }
    let sim = Simulation::new(config).context("failed to build simulation")?;
    let runtime = Runtime::new(sim);

    if let Some(path) = args.commands.as_deref() {
        let commands = load_commands(path)?;
        info!(count = commands.len(), "queueing scripted commands");
        for command in commands {
            runtime.control.enqueue(command)?;
        }
    }

    let ticks = if args.realtime {
        runtime.clock.run(Some(args.ticks))?
    } else {
        let period = runtime.clock.period();
        for _ in 0..args.ticks {
            runtime.clock.tick_once(period)?;
        }
        args.ticks
    };

    let status = runtime.control.status()?;
    info!(
        ticks,
        tick = status.tick,
        friendly = status.friendly_count,
        enemy = status.enemy_count,
        "run finished"
    );
    let view = runtime.control.view()?;
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}
