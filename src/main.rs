use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use swerve_zenoh_runtime::config::{SwerveConfig, LOOP_HZ, MOTOR_PORT};
use swerve_zenoh_runtime::runtime::{self, RunOptions};

/// Swerve base runtime: zenoh commands in, servo commands and odometry out
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Drive simulated devices instead of the servo bus
    #[arg(long)]
    sim: bool,

    /// Serial port of the Feetech servo bus
    #[arg(long, default_value = MOTOR_PORT)]
    port: String,

    /// JSON drive config; built-in defaults when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Control loop rate
    #[arg(long, default_value_t = LOOP_HZ)]
    loop_hz: u64,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init(); // installs the subscriber globally

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => match SwerveConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Config error: {}", e);
                std::process::exit(2);
            }
        },
        None => {
            info!("No config file given, using built-in drive constants");
            SwerveConfig::default()
        }
    };

    let options = RunOptions {
        sim: args.sim,
        port: args.port,
        config,
        loop_hz: args.loop_hz,
    };

    if let Err(e) = runtime::run(options).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
