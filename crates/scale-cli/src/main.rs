//! Scale CLI - Command-line monitor for serial weighing scales
//!
//! Connects to a scale, prints live readings and decodes captured frames.

mod commands;
mod config;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scale_serial::ConnectionManager;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::Config;
use crate::output::{OutputContext, OutputFormat};

#[derive(Parser)]
#[command(name = "scale-cli")]
#[command(author, version, about = "Live serial scale monitor")]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "SCALE_CONFIG")]
    config: Option<PathBuf>,

    /// Serial port (e.g. /dev/ttyUSB0, COM3); first USB port if omitted
    #[arg(short, long, env = "SCALE_PORT")]
    port: Option<String>,

    /// Line speed in baud
    #[arg(short, long)]
    baud: Option<u32>,

    /// Use a simulated scale instead of a serial port
    #[arg(long)]
    mock: bool,

    /// Output format
    #[arg(short, long, value_enum)]
    output: Option<OutputFormat>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Minimal output (for scripting)
    #[arg(short, long)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and print readings until Ctrl+C
    Monitor {
        /// Stop after this many readings
        #[arg(short = 'n', long)]
        count: Option<usize>,
    },

    /// List serial ports
    Ports,

    /// Decode frames without a device (reads stdin when none are given)
    Parse {
        /// Frames to decode
        frames: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    // Load config file
    let config = if let Some(config_path) = &cli.config {
        Config::load_from(config_path)?
    } else {
        Config::load_or_default()
    };

    // Merge CLI args with config
    let merged = config.merge_with_args(
        cli.port.as_deref(),
        cli.baud,
        cli.mock,
        cli.output,
        cli.no_color,
    );

    let ctx = OutputContext::new(merged.output, merged.no_color, cli.quiet);

    match &cli.command {
        Commands::Monitor { count } => {
            let manager = create_manager(&merged.scale)?;
            commands::monitor(&manager, *count, &ctx).await?;
        }

        Commands::Ports => {
            let manager = create_manager(&merged.scale)?;
            commands::ports(&manager, &ctx).await?;
        }

        Commands::Parse { frames } => {
            commands::parse(frames, &ctx)?;
        }
    }

    Ok(())
}

/// Create a connection manager for the configured transport
fn create_manager(config: &scale_serial::ScaleConfig) -> Result<ConnectionManager> {
    ConnectionManager::from_config(config).context("Failed to set up scale transport")
}
