//! Bench console for a Parker 6K.
//!
//! Loads a controller config, connects, and runs one operator command:
//!
//! ```bash
//! p6k-console --config config/parker6k.example.toml config
//! p6k-console --config config/parker6k.example.toml report
//! p6k-console --config bench.toml move 1 4000 --velocity 25000 --wait
//! p6k-console --config bench.toml send TREV
//! p6k-console --config bench.toml watch --cycles 20
//! ```
//!
//! `RUST_LOG` overrides the configured log level.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use daq_driver_parker6k::{
    ControllerConfig, MotionAxis, MoveRequest, ParamStore, ParamValue, Parker6k,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "p6k-console")]
#[command(about = "Operator console for Parker 6K motion controllers", long_about = None)]
struct Cli {
    /// Controller configuration file (TOML)
    #[arg(long, short)]
    config: PathBuf,

    /// Print every parameter change
    #[arg(long)]
    trace_params: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective configuration (file plus environment) and exit
    Config,

    /// Print the controller and axis summary
    Report,

    /// Poll repeatedly and print each axis' status
    Watch {
        /// Number of poll cycles
        #[arg(long, default_value = "10")]
        cycles: u32,
    },

    /// Move one axis
    Move {
        /// Axis index (1-based)
        axis: u8,
        /// Target (or distance with --relative) in steps
        position: f64,
        /// Incremental move
        #[arg(long)]
        relative: bool,
        /// Slew velocity in steps/s (0 keeps the controller setting)
        #[arg(long, default_value = "0")]
        velocity: f64,
        /// Acceleration in steps/s^2 (needs --velocity)
        #[arg(long, default_value = "0")]
        accel: f64,
        /// Block until the axis reports done
        #[arg(long)]
        wait: bool,
    },

    /// Start several axes together: `sync 1=4000 2=-1000`
    Sync {
        /// axis=target pairs
        #[arg(required = true)]
        targets: Vec<String>,
    },

    /// Stop one axis
    Stop {
        /// Axis index (1-based)
        axis: u8,
    },

    /// Redefine the current position of one axis
    SetPosition {
        /// Axis index (1-based)
        axis: u8,
        /// New position in steps
        position: f64,
    },

    /// Enable or disable a drive
    Drive {
        /// Axis index (1-based)
        axis: u8,
        /// `on` or `off`
        state: String,
    },

    /// Send a raw command and print the reply
    Send {
        /// Command text, e.g. `TREV`
        command: String,
        /// Prefix with this axis index
        #[arg(long)]
        axis: Option<u8>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ControllerConfig::load_from(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;

    if matches!(cli.command, Commands::Config) {
        print!(
            "{}",
            toml::to_string_pretty(&config).context("Failed to render config")?
        );
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    let store = ParamStore::new();
    if cli.trace_params {
        store.subscribe(|address, param, value| {
            let value = match value {
                ParamValue::Int(v) => v.to_string(),
                ParamValue::Float(v) => v.to_string(),
                ParamValue::Str(v) => format!("{:?}", v),
            };
            println!("[{}] {:?} = {}", address, param, value);
        });
    }

    let timeout = config.timeout();
    let mut driver = Parker6k::connect(config, Box::new(store))
        .context("Failed to connect to the 6K")?;

    let result = run(&driver, cli.command, timeout);
    driver.shutdown();
    result
}

fn run(driver: &Parker6k, command: Commands, timeout: Duration) -> Result<()> {
    match command {
        Commands::Config => {}

        Commands::Report => print!("{}", driver.report()),

        Commands::Watch { cycles } => {
            let period = driver.lock().config().idle_poll_period();
            for _ in 0..cycles {
                driver.poll_now();
                print_status(driver)?;
                std::thread::sleep(period);
            }
        }

        Commands::Move {
            axis,
            position,
            relative,
            velocity,
            accel,
            wait,
        } => {
            let handle = driver.axis(axis)?;
            handle
                .move_axis(MoveRequest {
                    position,
                    relative,
                    min_velocity: 0.0,
                    max_velocity: velocity,
                    acceleration: accel,
                })
                .with_context(|| format!("Move on axis {} failed", axis))?;
            if wait {
                wait_done(&handle, timeout * 60)?;
                println!("Axis {} done at {:?}", axis, handle.position()?);
            }
        }

        Commands::Sync { targets } => {
            let targets = targets
                .iter()
                .map(|pair| parse_target(pair))
                .collect::<Result<Vec<_>>>()?;
            driver.set_deferred_moves(true)?;
            for (axis, position) in &targets {
                driver.axis(*axis)?.move_abs(*position)?;
            }
            driver
                .set_deferred_moves(false)
                .context("Synchronized start failed")?;
        }

        Commands::Stop { axis } => driver.axis(axis)?.stop()?,

        Commands::SetPosition { axis, position } => {
            driver.axis(axis)?.set_position(position)?;
        }

        Commands::Drive { axis, state } => {
            let enable = match state.as_str() {
                "on" | "1" => true,
                "off" | "0" => false,
                other => bail!("Drive state must be on or off, got '{}'", other),
            };
            driver.axis(axis)?.set_closed_loop(enable)?;
        }

        Commands::Send { command, axis } => {
            let reply = match axis {
                Some(axis) => driver.axis(axis)?.send_command(&command)?,
                None => driver.send_command(&command)?,
            };
            println!("{}", reply);
        }
    }
    Ok(())
}

fn parse_target(pair: &str) -> Result<(u8, f64)> {
    let (axis, position) = pair
        .split_once('=')
        .with_context(|| format!("Expected axis=target, got '{}'", pair))?;
    Ok((
        axis.trim().parse().context("Bad axis index")?,
        position.trim().parse().context("Bad target")?,
    ))
}

fn wait_done(axis: &impl MotionAxis, limit: Duration) -> Result<()> {
    let start = Instant::now();
    while axis.poll()? {
        if start.elapsed() > limit {
            bail!("Axis {} still moving after {:?}", axis.index(), limit);
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    Ok(())
}

fn print_status(driver: &Parker6k) -> Result<()> {
    for handle in driver.axes() {
        let position = handle.position()?;
        match handle.status()? {
            Some(status) => println!(
                "axis {}: pos={:?} done={} hi={} lo={} homed={} problem={}",
                handle.index(),
                position,
                status.done_moving,
                status.high_limit,
                status.low_limit,
                status.homed,
                status.problem,
            ),
            None => println!("axis {}: no status", handle.index()),
        }
    }
    Ok(())
}
