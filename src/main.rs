// SPDX-License-Identifier: GPL-3.0-only

use camera_compositor::backends::camera::CaptureSourceKind;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "camera-compositor")]
#[command(about = "Live camera compositor with a PipeWire virtual camera output")]
#[command(version = camera_compositor::constants::app_info::version())]
struct Cli {
    /// Config file (default: ~/.config/camera-compositor/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the compositor (type `help` on stdin for live commands)
    Run {
        /// Enable sharpness scoring
        #[arg(long)]
        scoring: bool,

        /// Enable segmentation blending
        #[arg(long)]
        segmentation: bool,

        /// Capture source (pipewire, v4l2, test)
        #[arg(long)]
        source: Option<CaptureSourceKind>,

        /// Capture device path or PipeWire node
        #[arg(long)]
        device: Option<String>,

        /// Do not publish a virtual camera; only count output frames
        #[arg(long)]
        no_virtual_camera: bool,
    },

    /// Print the effective configuration
    Config,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=camera_compositor=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            scoring,
            segmentation,
            source,
            device,
            no_virtual_camera,
        } => cli::run(cli::RunOptions {
            config: cli.config,
            scoring,
            segmentation,
            source,
            device,
            no_virtual_camera,
        }),
        Commands::Config => cli::print_config(cli.config.as_deref()),
    }
}
